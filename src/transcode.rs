//! Transcode stage: staged upload in, MP4 artifact out.

use crate::artifacts::{Artifact, ArtifactKind, ArtifactStore};
use crate::config::TranscodeConfig;
use async_trait::async_trait;
use clipforge_av::Mp4Conversion;
use clipforge_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Something that converts the file at `input` into the file at `output`.
///
/// Runs to completion before returning. Implementations report failures as
/// [`Error::Tool`]; any other error kind is folded into one by the stage.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// [`Transcoder`] backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    video_codec: String,
    audio_codec: String,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    /// Resolve ffmpeg (configured path first, then `PATH`) and capture codec settings.
    pub fn from_config(config: &TranscodeConfig) -> Result<Self> {
        let ffmpeg = clipforge_av::get_tool_path("ffmpeg", config.ffmpeg_path.as_deref())?;
        Ok(Self::with_binary(ffmpeg, config))
    }

    /// Use an explicit ffmpeg binary without checking that it exists.
    pub fn with_binary(ffmpeg: PathBuf, config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg,
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.ffmpeg
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        Mp4Conversion::new(input, output)
            .video_codec(&self.video_codec)
            .audio_codec(&self.audio_codec)
            .extra_args(self.extra_args.iter().cloned())
            .timeout(self.timeout)
            .run(&self.ffmpeg)
            .await
    }
}

/// Convert `input` into a fresh output artifact.
///
/// Consumes the input artifact and releases it once the tool has finished,
/// whatever the outcome. On failure the partially written output is released
/// too, so the caller only ever holds the finished MP4.
pub async fn transcode(
    transcoder: &dyn Transcoder,
    store: &ArtifactStore,
    mut input: Artifact,
) -> Result<Artifact> {
    let mut output = store.create(ArtifactKind::Output)?;

    input.mark_in_use();
    output.mark_in_use();

    let result = transcoder.convert(input.path(), output.path()).await;
    input.release();

    match result {
        Ok(()) => {
            let len = tokio::fs::metadata(output.path())
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            if len == 0 {
                return Err(Error::tool("ffmpeg", "conversion produced an empty file"));
            }
            Ok(output)
        }
        Err(e @ Error::Tool { .. }) => Err(e),
        Err(other) => Err(Error::tool("transcoder", other.to_string())),
    }
}
