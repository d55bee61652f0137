//! IVF frame container demuxer.
//!
//! Layout read from the encoder's stdout:
//! ```text
//! ┌──────────────────────┐
//! │ stream header (32 B) │  read once, discarded
//! ├──────────────────────┤
//! │ frame header (12 B)  │  bytes 0..4: payload size, u32 little-endian
//! │ frame payload        │  bytes 4..12: timestamp, ignored
//! ├──────────────────────┤
//! │ ...                  │
//! └──────────────────────┘
//! ```
//!
//! Oversized frames: a frame header announcing more than [`MAX_FRAME_SIZE`]
//! bytes is skipped without reading its payload, and the next 12 bytes are
//! parsed as a new frame header. On a corrupt stream this can resync on a
//! later header or drift until the source closes. Skipping instead of
//! aborting is a recovery choice, not a correctness guarantee.

use std::time::Duration;

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::sample::MediaSample;

pub const IVF_HEADER_SIZE: usize = 32;
pub const FRAME_HEADER_SIZE: usize = 12;
/// Upper bound on a single frame payload, in bytes.
pub const MAX_FRAME_SIZE: u32 = 10_000_000;

/// Decode the payload size from a frame header.
pub fn frame_size(header: &[u8; FRAME_HEADER_SIZE]) -> u32 {
    u32::from_le_bytes([header[0], header[1], header[2], header[3]])
}

/// Pull-based demuxer: each [`IvfDemuxer::next_sample`] call yields one
/// sample, or `None` once the source is exhausted or fails. Not restartable.
pub struct IvfDemuxer<R> {
    reader: R,
    frame_duration: Duration,
    header_consumed: bool,
    finished: bool,
    emitted: u64,
    skipped: u64,
}

impl<R> IvfDemuxer<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, frame_duration: Duration) -> Self {
        Self {
            reader,
            frame_duration,
            header_consumed: false,
            finished: false,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Samples emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Frame headers skipped because of an oversized length field.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next_sample(&mut self) -> Option<MediaSample> {
        if self.finished {
            return None;
        }

        if !self.header_consumed {
            let mut header = [0u8; IVF_HEADER_SIZE];
            if !self.fill(&mut header).await {
                return self.finish("stream header");
            }
            self.header_consumed = true;
        }

        loop {
            let mut frame_header = [0u8; FRAME_HEADER_SIZE];
            if !self.fill(&mut frame_header).await {
                return self.finish("frame header");
            }

            let size = frame_size(&frame_header);
            if size > MAX_FRAME_SIZE {
                self.skipped += 1;
                log::warn!(
                    "Ivf: skip frame header with oversized length {} (limit {})",
                    size,
                    MAX_FRAME_SIZE
                );
                continue;
            }

            let mut payload = vec![0u8; size as usize];
            if !self.fill(&mut payload).await {
                return self.finish("frame payload");
            }

            self.emitted += 1;
            return Some(MediaSample::new(payload, self.frame_duration));
        }
    }

    /// Turn the demuxer into a lazy stream of samples.
    pub fn into_stream(self) -> impl Stream<Item = MediaSample> {
        futures::stream::unfold(self, |mut demuxer| async move {
            demuxer
                .next_sample()
                .await
                .map(|sample| (sample, demuxer))
        })
    }

    /// Fill `buf` completely. Returns false on a short read or an I/O error.
    async fn fill(&mut self, buf: &mut [u8]) -> bool {
        match self.reader.read_exact(buf).await {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
            Err(e) => {
                log::debug!("Ivf: read failed: {}", e);
                false
            }
        }
    }

    fn finish(&mut self, stage: &str) -> Option<MediaSample> {
        log::debug!(
            "Ivf: end of stream at {} after {} samples",
            stage,
            self.emitted
        );
        self.finished = true;
        None
    }
}

#[cfg(test)]
#[path = "ivf_test.rs"]
mod ivf_test;
