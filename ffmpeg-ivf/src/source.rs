use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Where the encoder takes its video from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    /// lavfi `testsrc` pattern, 640x480 @ 10 fps.
    TestPattern,
    /// Local capture device, 1280x720 @ 30 fps.
    Camera { device: String },
}

impl VideoSource {
    pub fn camera() -> Self {
        Self::Camera {
            device: default_camera_device().to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TestPattern => "test pattern",
            Self::Camera { .. } => "camera",
        }
    }
}

impl Display for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TestPattern => write!(f, "testsrc"),
            Self::Camera { device } => write!(f, "camera({})", device),
        }
    }
}

/// Capture input format for `-f`, per platform.
pub fn camera_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

/// Default `-i` value for [`camera_input_format`].
pub fn default_camera_device() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "/dev/video0"
    }
}

/// Fixed command line for an encoder that writes VP8 in IVF to stdout.
#[derive(Clone, Debug)]
pub struct EncoderSpec {
    name: String,
    program: String,
    args: Vec<String>,
    frame_duration: Duration,
}

impl EncoderSpec {
    /// Arbitrary command; used for custom encoders and tests.
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        frame_duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            frame_duration,
        }
    }

    pub fn for_source(program: impl Into<String>, source: &VideoSource) -> Self {
        match source {
            VideoSource::TestPattern => Self::test_pattern(program),
            VideoSource::Camera { device } => Self::camera(program, device),
        }
    }

    pub fn test_pattern(program: impl Into<String>) -> Self {
        let args = [
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=640x480:rate=10",
            "-vcodec",
            "libvpx",
            "-deadline",
            "realtime",
            "-f",
            "ivf",
            "-",
        ];
        Self::new(
            VideoSource::TestPattern.name(),
            program,
            to_args(&args),
            Duration::from_millis(100),
        )
    }

    pub fn camera(program: impl Into<String>, device: &str) -> Self {
        let mut args = vec!["-f", camera_input_format(), "-framerate", "30"];
        args.extend(["-video_size", "1280x720"]);
        // avfoundation picks a low-quality default pixel format otherwise
        if cfg!(target_os = "macos") {
            args.extend(["-pixel_format", "uyvy422"]);
        }
        args.extend(["-i", device]);
        args.extend([
            "-vcodec", "libvpx", "-b:v", "1000k", "-deadline", "realtime", "-f", "ivf", "-",
        ]);

        Self::new(
            "camera",
            program,
            to_args(&args),
            Duration::from_secs(1) / 30,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
