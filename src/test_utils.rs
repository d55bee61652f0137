//! Fakes shared by the unit tests.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ffmpeg_ivf::{MediaSample, ProcessHandle};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::rtc::{
    IceCandidate, IceCandidateHandler, Negotiator, NegotiatorFactory, SampleSink, SessionDescription,
};

pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

fn push(events: &Events, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

// ------------------------------------------------------------------------
// Sample sink
// ------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<MediaSample>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn samples(&self) -> Vec<MediaSample> {
        self.samples.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.samples.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl SampleSink for RecordingSink {
    async fn write_sample(&self, sample: MediaSample) -> anyhow::Result<()> {
        self.samples.lock().unwrap().push(sample);
        self.notify.notify_waiters();
        Ok(())
    }
}

// ------------------------------------------------------------------------
// Negotiator
// ------------------------------------------------------------------------

/// Records every call. Emits `local_candidates` through the registered
/// handler when the local description is set, like a real ICE agent
/// gathering after the answer.
pub struct FakeNegotiator {
    events: Events,
    sink: Arc<RecordingSink>,
    handler: Mutex<Option<Arc<IceCandidateHandler>>>,
    local_candidates: Vec<IceCandidate>,
    reject_offer: bool,
    cancel_probe: Option<CancellationToken>,
}

impl FakeNegotiator {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            sink: Arc::new(RecordingSink::default()),
            handler: Mutex::new(None),
            local_candidates: Vec::new(),
            reject_offer: false,
            cancel_probe: None,
        }
    }

    pub fn sink(&self) -> Arc<RecordingSink> {
        self.sink.clone()
    }

    /// Record on close whether `token` had already fired.
    pub fn observing(mut self, token: CancellationToken) -> Self {
        self.cancel_probe = Some(token);
        self
    }
}

#[async_trait]
impl Negotiator for FakeNegotiator {
    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        push(&self.events, format!("remote:{}", desc.sdp));
        if self.reject_offer {
            anyhow::bail!("offer rejected");
        }
        Ok(())
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        push(&self.events, "create_answer");
        Ok(SessionDescription::answer("fake-answer"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        push(&self.events, format!("local:{}", desc.sdp));
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            for candidate in &self.local_candidates {
                handler.as_ref()(candidate.clone()).await;
            }
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        push(&self.events, format!("candidate:{}", candidate.candidate));
        Ok(())
    }

    fn on_ice_candidate(&self, handler: IceCandidateHandler) {
        push(&self.events, "on_ice_candidate");
        *self.handler.lock().unwrap() = Some(Arc::new(handler));
    }

    fn video_sink(&self) -> Arc<dyn SampleSink> {
        self.sink.clone()
    }

    async fn close(&self) -> anyhow::Result<()> {
        match &self.cancel_probe {
            Some(token) if token.is_cancelled() => push(&self.events, "close(cancelled)"),
            Some(_) => push(&self.events, "close(live)"),
            None => push(&self.events, "close"),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    events: Events,
    local_candidates: Vec<IceCandidate>,
    reject_offer: bool,
    fail: bool,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn with_local_candidates(mut self, candidates: Vec<IceCandidate>) -> Self {
        self.local_candidates = candidates;
        self
    }

    pub fn rejecting_offers(mut self) -> Self {
        self.reject_offer = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NegotiatorFactory for FakeFactory {
    async fn create(&self) -> anyhow::Result<Box<dyn Negotiator>> {
        if self.fail {
            anyhow::bail!("engine unavailable");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut negotiator = FakeNegotiator::new(self.events.clone());
        negotiator.local_candidates = self.local_candidates.clone();
        negotiator.reject_offer = self.reject_offer;
        Ok(Box::new(negotiator))
    }
}

// ------------------------------------------------------------------------
// Process
// ------------------------------------------------------------------------

/// Exits as soon as it is interrupted, unless built with
/// [`FakeProcess::ignoring_interrupt`], in which case it runs until killed.
pub struct FakeProcess {
    events: Events,
    exits_on_interrupt: bool,
    interrupted: bool,
}

impl FakeProcess {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            exits_on_interrupt: true,
            interrupted: false,
        }
    }

    pub fn ignoring_interrupt(events: Events) -> Self {
        Self {
            exits_on_interrupt: false,
            ..Self::new(events)
        }
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(7)
    }

    fn interrupt(&mut self) -> anyhow::Result<()> {
        push(&self.events, "encoder:interrupt");
        self.interrupted = true;
        Ok(())
    }

    async fn wait(&mut self) -> anyhow::Result<Option<ExitStatus>> {
        if !(self.interrupted && self.exits_on_interrupt) {
            std::future::pending::<()>().await;
        }
        push(&self.events, "encoder:exited");
        Ok(None)
    }

    async fn kill(&mut self) -> anyhow::Result<()> {
        push(&self.events, "encoder:kill");
        Ok(())
    }
}
