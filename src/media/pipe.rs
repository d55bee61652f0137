use std::sync::Arc;

use ffmpeg_ivf::process::shutdown;
use ffmpeg_ivf::{EncoderSpec, IvfDemuxer, spawn_encoder};

use crate::manager::SessionRegistry;
use crate::session::Session;

/// Encoder → demuxer → video track for one session.
pub struct Pipe {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    spec: EncoderSpec,
}

impl Pipe {
    pub fn new(session: Arc<Session>, registry: Arc<SessionRegistry>, spec: EncoderSpec) -> Self {
        Self {
            session,
            registry,
            spec,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Stream until the session is cancelled or the encoder output ends.
    ///
    /// If the encoder cannot start the session is left as it is. If the
    /// output ends on its own the session is torn down.
    pub async fn run(self) {
        let id = self.session.id();
        let cancel = self.session.cancel_token();
        let supervisor = self.session.encoder().clone();

        let (process, stdout) = match spawn_encoder(&self.spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                log::error!("Pipe[{}]: encoder {} failed to start: {:#}", id, self.spec.name(), e);
                return;
            }
        };

        if let Err(mut process) = supervisor.attach(Box::new(process)).await {
            log::info!("Pipe[{}]: session closed while encoder was starting", id);
            if let Err(e) = shutdown(process.as_mut(), supervisor.grace()).await {
                log::warn!("Pipe[{}]: encoder shutdown failed: {:#}", id, e);
            }
            return;
        }
        supervisor.watch(cancel.clone());

        let sink = self.session.video_sink();
        let mut demuxer = IvfDemuxer::new(stdout, self.spec.frame_duration());
        log::info!("Pipe[{}]: streaming from {}", id, self.spec.name());

        loop {
            let sample = tokio::select! {
                _ = cancel.cancelled() => break,
                sample = demuxer.next_sample() => sample,
            };
            let Some(sample) = sample else {
                break;
            };
            if let Err(e) = sink.write_sample(sample).await {
                log::warn!("Pipe[{}]: write sample failed: {:#}", id, e);
            }
        }

        log::info!(
            "Pipe[{}]: stopped after {} frames ({} skipped)",
            id,
            demuxer.emitted(),
            demuxer.skipped()
        );

        if !cancel.is_cancelled() && !self.session.is_closing() {
            log::info!("Pipe[{}]: encoder output ended, tearing down", id);
            self.registry.teardown(id).await;
        }
    }
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
