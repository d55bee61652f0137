use std::fmt::{Display, Formatter};
use std::time::Duration;

use bytes::Bytes;

/// One demuxed frame payload plus its presentation duration.
///
/// The duration is supplied by whoever opened the stream; it is not read
/// from the container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

impl MediaSample {
    pub fn new(data: impl Into<Bytes>, duration: Duration) -> Self {
        Self {
            data: data.into(),
            duration,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Display for MediaSample {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MediaSample {{ data: {}, duration: {:?} }}",
            self.data.len(),
            self.duration
        )
    }
}
