use std::sync::Arc;

use crate::media::pipe::Pipe;
use crate::rtc::{IceCandidate, SessionDescription};
use crate::session::{ConnectionId, Outbound, Session};
use crate::signaling::SignalingContext;
use crate::signaling::message::{ANSWER, Signal, SignalError};

/// Signaling state of one socket. Messages are handled one at a time in
/// arrival order by the socket's read loop.
pub struct Connection {
    id: ConnectionId,
    ctx: Arc<SignalingContext>,
    outbound: Outbound,
}

impl Connection {
    pub fn new(id: ConnectionId, ctx: Arc<SignalingContext>, outbound: Outbound) -> Self {
        Self { id, ctx, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Dispatch one inbound text frame.
    pub async fn handle_text(&self, text: &str) -> Result<(), SignalError> {
        match Signal::parse(text)? {
            Signal::Offer(offer) => self.handle_offer(offer).await,
            Signal::IceCandidate(candidate) => self.handle_ice_candidate(candidate).await,
            Signal::Answer(_) => return Err(SignalError::Unexpected(ANSWER)),
        }
        Ok(())
    }

    async fn handle_offer(&self, offer: SessionDescription) {
        let id = self.id;
        if self.ctx.registry.lookup(id).await.is_some() {
            log::warn!("Signaling[{}]: session exists, ignoring second offer", id);
            return;
        }

        let negotiator = match self.ctx.negotiators.create().await {
            Ok(negotiator) => negotiator,
            Err(e) => {
                log::error!("Signaling[{}]: create negotiator failed: {:#}", id, e);
                return;
            }
        };
        let session = Arc::new(Session::new(
            id,
            negotiator,
            self.ctx.shutdown.child_token(),
            self.outbound.clone(),
        ));
        if !self.ctx.registry.register(session.clone()).await {
            session.close().await;
            return;
        }

        let outbound = self.outbound.clone();
        session
            .negotiator()
            .on_ice_candidate(Box::new(move |candidate: IceCandidate| {
                let outbound = outbound.clone();
                Box::pin(async move {
                    if let Err(e) = outbound.send(Signal::IceCandidate(candidate)).await {
                        log::debug!("Signaling[{}]: local candidate dropped: {:#}", id, e);
                    }
                })
            }));

        if let Err(e) = self.negotiate(&session, offer).await {
            // session stays registered until the socket closes
            log::error!("Signaling[{}]: negotiation failed: {:#}", id, e);
            return;
        }

        if !session.mark_streaming() {
            log::info!("Signaling[{}]: session closed during negotiation", id);
            return;
        }
        Pipe::new(session, self.ctx.registry.clone(), self.ctx.encoder.clone()).spawn();
    }

    async fn negotiate(&self, session: &Session, offer: SessionDescription) -> anyhow::Result<()> {
        let negotiator = session.negotiator();
        negotiator.set_remote_description(offer).await?;
        let answer = negotiator.create_answer().await?;
        negotiator.set_local_description(answer.clone()).await?;
        self.outbound.send(Signal::Answer(answer)).await?;
        log::info!("Signaling[{}]: answer sent", self.id);
        Ok(())
    }

    async fn handle_ice_candidate(&self, candidate: IceCandidate) {
        let Some(session) = self.ctx.registry.lookup(self.id).await else {
            log::debug!("Signaling[{}]: no session, dropping candidate", self.id);
            return;
        };
        if let Err(e) = session.negotiator().add_ice_candidate(candidate).await {
            log::warn!("Signaling[{}]: add candidate failed: {:#}", self.id, e);
        }
    }

    /// Tear down whatever session this connection created.
    pub async fn close(&self) {
        self.ctx.registry.teardown(self.id).await;
        log::info!("Signaling[{}]: disconnected", self.id);
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;
