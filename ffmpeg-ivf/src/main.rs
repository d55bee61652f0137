use std::time::Duration;

use ffmpeg_ivf::{
    EncoderSpec, IvfDemuxer, Supervisor, VideoSource, process::ProcessHandle, spawn_encoder,
};
use tokio_util::sync::CancellationToken;

/// Runs the encoder for a few seconds and logs every frame it produces.
/// Usage: ffmpeg-ivf [testsrc|camera] [seconds]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let mut args = std::env::args().skip(1);
    let source = match args.next().as_deref() {
        Some("camera") => VideoSource::camera(),
        _ => VideoSource::TestPattern,
    };
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);

    let spec = EncoderSpec::for_source("ffmpeg", &source);
    let (process, stdout) = spawn_encoder(&spec)?;
    println!("encoder pid: {:?}, source: {}", process.id(), source);

    let cancel = CancellationToken::new();
    let supervisor = Supervisor::default();
    if supervisor.attach(Box::new(process)).await.is_err() {
        anyhow::bail!("supervisor refused the encoder process");
    }
    let watcher = supervisor.watch(cancel.clone());

    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("ctrl+c received");
            }
        }
        timer.cancel();
    });

    let mut demuxer = IvfDemuxer::new(stdout, spec.frame_duration());
    loop {
        let sample = tokio::select! {
            _ = cancel.cancelled() => break,
            sample = demuxer.next_sample() => sample,
        };
        match sample {
            Some(sample) => println!("frame #{}: {}", demuxer.emitted(), sample),
            None => break,
        }
    }

    cancel.cancel();
    watcher.await?;
    println!(
        "done: {} frames, {} skipped",
        demuxer.emitted(),
        demuxer.skipped()
    );
    Ok(())
}
