use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::config;
use crate::signaling::{self, SignalingContext};

fn app(ctx: Arc<SignalingContext>) -> Router {
    Router::new()
        .route("/ws", get(signaling::ws_handler))
        .with_state(ctx)
        .merge(rtc_dashboard::app_router())
}

pub(crate) fn start_api_server(cancel: CancellationToken, ctx: Arc<SignalingContext>) {
    tokio::spawn(async move {
        let addr = config().listen();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Api: bind {} failed: {}", addr, e);
                cancel.cancel();
                return;
            }
        };
        log::info!("Api: listening on {}", addr);

        if let Err(e) = axum::serve(listener, app(ctx))
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("Api: server error: {}", e);
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Api: shutting down");
}
