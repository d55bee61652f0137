use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::manager::SessionRegistry;
use crate::rtc::peer::WebRtcFactory;
use crate::signaling::SignalingContext;

mod api;
mod config;
mod manager;
mod media;
mod rtc;
mod session;
mod signaling;
#[cfg(test)]
mod test_utils;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("lite_rtc", log::LevelFilter::Debug)
        .filter_module("ffmpeg_ivf", log::LevelFilter::Debug)
        .filter_module("webrtc", log::LevelFilter::Warn)
        .filter_module("webrtc_ice", log::LevelFilter::Warn)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = config::config();
    log::info!(
        "lite-rtc: source {}, encoder {}, {} ice server(s)",
        config.source(),
        config.ffmpeg(),
        config.ice_servers().len()
    );

    let cancel = CancellationToken::new();
    let registry = Arc::new(SessionRegistry::new());
    let ctx = Arc::new(SignalingContext {
        registry: registry.clone(),
        negotiators: Arc::new(WebRtcFactory::new(config.ice_servers().to_vec())),
        encoder: config.encoder_spec(),
        shutdown: cancel.clone(),
    });

    let cancel_clone = cancel.clone();
    api::start_api_server(cancel_clone, ctx);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    for id in registry.ids().await {
        registry.teardown(id).await;
    }

    std::process::exit(0);
}
