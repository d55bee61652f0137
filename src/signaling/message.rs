//! Wire format of the signaling channel.
//!
//! Every text frame is an envelope `{"type": ..., "data": ...}` whose `data`
//! is itself a JSON document serialized to a string. The envelope accepts any
//! `data` so that a bad payload only costs the message it came with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rtc::{IceCandidate, SessionDescription};

pub const OFFER: &str = "offer";
pub const ANSWER: &str = "answer";
pub const ICE_CANDIDATE: &str = "ice-candidate";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("unexpected inbound {0} message")]
    Unexpected(&'static str),
}

impl SignalError {
    /// Envelope errors end the connection's read loop; everything else only
    /// drops the offending message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SignalError::Envelope(_))
    }
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer(_) => OFFER,
            Signal::Answer(_) => ANSWER,
            Signal::IceCandidate(_) => ICE_CANDIDATE,
        }
    }

    pub fn parse(text: &str) -> Result<Signal, SignalError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(SignalError::Envelope)?;
        Self::from_envelope(&envelope)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Signal, SignalError> {
        fn payload<T: serde::de::DeserializeOwned>(
            kind: &'static str,
            data: &Value,
        ) -> Result<T, SignalError> {
            let text = String::deserialize(data)
                .map_err(|source| SignalError::Payload { kind, source })?;
            serde_json::from_str(&text).map_err(|source| SignalError::Payload { kind, source })
        }

        match envelope.kind.as_str() {
            OFFER => Ok(Signal::Offer(payload(OFFER, &envelope.data)?)),
            ANSWER => Ok(Signal::Answer(payload(ANSWER, &envelope.data)?)),
            ICE_CANDIDATE => Ok(Signal::IceCandidate(payload(
                ICE_CANDIDATE,
                &envelope.data,
            )?)),
            other => Err(SignalError::UnknownType(other.to_string())),
        }
    }

    pub fn to_envelope(&self) -> anyhow::Result<Envelope> {
        let data = match self {
            Signal::Offer(desc) | Signal::Answer(desc) => serde_json::to_string(desc)?,
            Signal::IceCandidate(candidate) => serde_json::to_string(candidate)?,
        };
        Ok(Envelope {
            kind: self.kind().to_string(),
            data: Value::String(data),
        })
    }

    /// Text frame ready to be written to the socket.
    pub fn to_text(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self.to_envelope()?)?)
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;
