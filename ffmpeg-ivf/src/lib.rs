//! ffmpeg as an external VP8/IVF producer: source command lines, process
//! supervision and the IVF demuxer that turns its stdout into samples.

pub mod ivf;
pub mod process;
pub mod sample;
pub mod source;

pub use ivf::IvfDemuxer;
pub use process::{ProcessHandle, Supervisor, spawn_encoder};
pub use sample::MediaSample;
pub use source::{EncoderSpec, VideoSource};
