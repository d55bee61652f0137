//! Seam between signaling and the session-negotiation engine.
//!
//! Signaling only sees these traits and plain descriptors; `peer` adapts
//! them onto the `webrtc` crate.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use ffmpeg_ivf::MediaSample;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub mod peer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Offer/answer descriptor as browsers serialize `RTCSessionDescription`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Trickle ICE candidate as browsers serialize `RTCIceCandidateInit`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl Display for IceCandidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (mid {:?})", self.candidate, self.sdp_mid)
    }
}

/// Called for every locally gathered candidate. The returned future is
/// awaited by the engine's callback task.
pub type IceCandidateHandler = Box<dyn Fn(IceCandidate) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives demuxed samples for one outgoing media track.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write_sample(&self, sample: MediaSample) -> anyhow::Result<()>;
}

/// One negotiated peer session.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn create_answer(&self) -> anyhow::Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    fn on_ice_candidate(&self, handler: IceCandidateHandler);

    /// Sink feeding the session's video track.
    fn video_sink(&self) -> Arc<dyn SampleSink>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Builds a [`Negotiator`] per offer.
#[async_trait]
pub trait NegotiatorFactory: Send + Sync {
    async fn create(&self) -> anyhow::Result<Box<dyn Negotiator>>;
}
