//! WebSocket signaling endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use ffmpeg_ivf::EncoderSpec;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::manager::SessionRegistry;
use crate::rtc::NegotiatorFactory;
use crate::session::{ConnectionId, Outbound};
use crate::signaling::connection::Connection;
use crate::signaling::message::{ICE_CANDIDATE, SignalError};

pub mod connection;
pub mod message;

const OUTBOUND_CAPACITY: usize = 64;

/// Everything a connection needs from the server.
pub struct SignalingContext {
    pub registry: Arc<SessionRegistry>,
    pub negotiators: Arc<dyn NegotiatorFactory>,
    pub encoder: EncoderSpec,
    pub shutdown: CancellationToken,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<SignalingContext>>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, ctx))
}

async fn serve_socket(socket: WebSocket, ctx: Arc<SignalingContext>) {
    let id = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut rx) = Outbound::channel(OUTBOUND_CAPACITY);

    // sole writer of the socket
    let writer = tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            let text = match signal.to_text() {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Signaling[{}]: encode {} failed: {:#}", id, signal.kind(), e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                log::debug!("Signaling[{}]: write failed: {}", id, e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    let shutdown = ctx.shutdown.clone();
    let connection = Connection::new(id, ctx, outbound);
    log::info!("Signaling[{}]: connected", id);

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = receiver.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = connection.handle_text(text.as_str()).await {
                    if e.is_fatal() {
                        log::warn!("Signaling[{}]: {}, closing", id, e);
                        break;
                    }
                    log_dropped(id, &e);
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::debug!("Signaling[{}]: read failed: {}", id, e);
                break;
            }
        }
    }

    writer.abort();
    connection.close().await;
}

fn log_dropped(id: ConnectionId, e: &SignalError) {
    match e {
        SignalError::UnknownType(_)
        | SignalError::Payload {
            kind: ICE_CANDIDATE,
            ..
        } => log::debug!("Signaling[{}]: dropped message: {}", id, e),
        _ => log::warn!("Signaling[{}]: dropped message: {}", id, e),
    }
}
