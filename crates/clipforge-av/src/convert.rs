//! Camcorder stream to MP4 conversion via the ffmpeg CLI.

use crate::command::ToolCommand;
use clipforge_common::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default video encoder (H.264).
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";

/// Default audio encoder.
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

/// An ffmpeg invocation that re-encodes one input file into an MP4 output.
///
/// The output path is overwritten (`-y`): the caller pre-allocates it as an
/// empty temp file.
#[derive(Debug, Clone)]
pub struct Mp4Conversion {
    input: PathBuf,
    output: PathBuf,
    video_codec: String,
    audio_codec: String,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl Mp4Conversion {
    /// Create a conversion with the default H.264/AAC codecs.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Override the video encoder.
    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Override the audio encoder.
    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    /// Extra output options inserted before the output path (e.g. `-preset fast`).
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Kill ffmpeg if it runs longer than this.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the full ffmpeg command for the given binary.
    pub fn command(&self, ffmpeg: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(["-hide_banner", "-nostdin", "-y", "-i"])
            .arg(self.input.to_string_lossy())
            .args(["-c:v", self.video_codec.as_str()])
            .args(["-c:a", self.audio_codec.as_str()])
            .args(["-movflags", "+faststart"])
            .args(self.extra_args.iter().cloned())
            .arg(self.output.to_string_lossy());
        if let Some(limit) = self.timeout {
            cmd.timeout(limit);
        }
        cmd
    }

    /// Run the conversion to completion.
    ///
    /// # Errors
    ///
    /// Returns [`clipforge_common::Error::Tool`] if ffmpeg cannot be launched
    /// or exits non-zero; the message carries ffmpeg's stderr tail.
    pub async fn run(&self, ffmpeg: &Path) -> Result<()> {
        tracing::info!(
            input = %self.input.display(),
            output = %self.output.display(),
            video_codec = %self.video_codec,
            audio_codec = %self.audio_codec,
            "Converting to MP4"
        );

        self.command(ffmpeg).execute().await?;

        tracing::debug!(output = %self.output.display(), "MP4 conversion finished");
        Ok(())
    }
}
