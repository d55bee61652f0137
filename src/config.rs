use std::sync::LazyLock;

use ffmpeg_ivf::{EncoderSpec, VideoSource, source::default_camera_device};

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_ICE_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

pub struct RtcConfig {
    listen: String,
    ffmpeg: String,
    source: VideoSource,
    ice_servers: Vec<String>,
}

impl RtcConfig {
    pub fn new(listen: &str, ffmpeg: &str, source: VideoSource, ice_servers: Vec<String>) -> Self {
        Self {
            listen: listen.to_string(),
            ffmpeg: ffmpeg.to_string(),
            source,
            ice_servers,
        }
    }

    /// Defaults overridden by `LITE_RTC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let listen = lookup("LITE_RTC_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let ffmpeg = lookup("LITE_RTC_FFMPEG").unwrap_or_else(|| DEFAULT_FFMPEG.to_string());

        let device =
            lookup("LITE_RTC_DEVICE").unwrap_or_else(|| default_camera_device().to_string());
        let source = match lookup("LITE_RTC_SOURCE").as_deref() {
            Some("testsrc") | Some("test") => VideoSource::TestPattern,
            Some("camera") | None => VideoSource::Camera { device },
            Some(other) => {
                log::warn!("Config: unknown source {:?}, using camera", other);
                VideoSource::Camera { device }
            }
        };

        let ice_servers = match lookup("LITE_RTC_ICE_SERVERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
        };

        Self::new(&listen, &ffmpeg, source, ice_servers)
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn ffmpeg(&self) -> &str {
        &self.ffmpeg
    }

    pub fn source(&self) -> &VideoSource {
        &self.source
    }

    pub fn ice_servers(&self) -> &[String] {
        &self.ice_servers
    }

    pub fn encoder_spec(&self) -> EncoderSpec {
        EncoderSpec::for_source(&self.ffmpeg, &self.source)
    }
}

pub fn config() -> &'static RtcConfig {
    static CONFIG: LazyLock<RtcConfig> = LazyLock::new(RtcConfig::from_env);
    &CONFIG
}
