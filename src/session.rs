//! Per-connection streaming session.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use ffmpeg_ivf::Supervisor;
use tokio::sync::{OnceCell, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::rtc::{Negotiator, SampleSink};
use crate::signaling::message::Signal;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending half of a connection's outbound queue. A single writer task owns
/// the socket and drains the queue in order.
#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::Sender<Signal>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<Signal>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, signal: Signal) -> anyhow::Result<()> {
        self.tx
            .send(signal)
            .await
            .map_err(|e| anyhow::anyhow!("outbound closed, dropped {}", e.0.kind()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Negotiating = 0,
    Streaming = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Negotiating,
            1 => SessionState::Streaming,
            _ => SessionState::Closed,
        }
    }
}

/// Resources owned by one negotiated connection: the negotiator, the
/// encoder supervisor and the cancellation token shared by the session's
/// tasks.
pub struct Session {
    id: ConnectionId,
    negotiator: Box<dyn Negotiator>,
    cancel: CancellationToken,
    encoder: Supervisor,
    outbound: Outbound,
    state: AtomicU8,
    closing: AtomicBool,
    closed: OnceCell<()>,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        negotiator: Box<dyn Negotiator>,
        cancel: CancellationToken,
        outbound: Outbound,
    ) -> Self {
        Self::with_supervisor(id, negotiator, cancel, outbound, Supervisor::default())
    }

    pub fn with_supervisor(
        id: ConnectionId,
        negotiator: Box<dyn Negotiator>,
        cancel: CancellationToken,
        outbound: Outbound,
        encoder: Supervisor,
    ) -> Self {
        Self {
            id,
            negotiator,
            cancel,
            encoder,
            outbound,
            state: AtomicU8::new(SessionState::Negotiating as u8),
            closing: AtomicBool::new(false),
            closed: OnceCell::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn negotiator(&self) -> &dyn Negotiator {
        self.negotiator.as_ref()
    }

    pub fn video_sink(&self) -> Arc<dyn SampleSink> {
        self.negotiator.video_sink()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn encoder(&self) -> &Supervisor {
        &self.encoder
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Negotiating → Streaming. Returns false if the session already moved on.
    pub fn mark_streaming(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Negotiating as u8,
                SessionState::Streaming as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// True once [`Session::close`] has started.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Stop the encoder, fire the cancellation token and close the
    /// negotiator, in that order. Every step runs even if an earlier one
    /// failed. The steps run once; concurrent callers return only after
    /// they have completed.
    pub async fn close(&self) {
        self.closed.get_or_init(|| self.run_close()).await;
    }

    async fn run_close(&self) {
        self.closing.store(true, Ordering::Release);

        if let Err(e) = self.encoder.stop().await {
            log::warn!("Session[{}]: encoder stop failed: {:#}", self.id, e);
        }
        self.cancel.cancel();
        if let Err(e) = self.negotiator.close().await {
            log::warn!("Session[{}]: negotiator close failed: {:#}", self.id, e);
        }

        self.state.store(SessionState::Closed as u8, Ordering::Release);
        log::info!("Session[{}]: closed", self.id);
    }
}
