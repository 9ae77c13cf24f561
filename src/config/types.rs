use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted upload body in bytes (default: 4 GiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_max_upload_bytes() -> usize {
    4 * 1024 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Accepted file extensions, compared case-insensitively (default: ["mts"])
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["mts".to_string()]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactsConfig {
    /// Directory for staged uploads and conversion output
    /// (default: `<system temp>/clipforge`)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    #[serde(default = "default_input_suffix")]
    pub input_suffix: String,

    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

fn default_input_suffix() -> String {
    ".mts".to_string()
}
fn default_output_suffix() -> String {
    ".mp4".to_string()
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            input_suffix: default_input_suffix(),
            output_suffix: default_output_suffix(),
        }
    }
}

impl ArtifactsConfig {
    /// Resolved temp directory.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("clipforge"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Video encoder passed to `-c:v` (default: "libx264")
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Audio encoder passed to `-c:a` (default: "aac")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Extra output options, e.g. ["-preset", "fast"]
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Kill ffmpeg after this many seconds (default: no limit)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_video_codec() -> String {
    clipforge_av::convert::DEFAULT_VIDEO_CODEC.to_string()
}
fn default_audio_codec() -> String {
    clipforge_av::convert::DEFAULT_AUDIO_CODEC.to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            extra_args: Vec::new(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Drive folder to upload into (default: the account's root)
    #[serde(default)]
    pub folder_id: Option<String>,

    /// Cached OAuth credential written by `clipforge authorize`
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// OAuth client secrets downloaded from the Google Cloud console
    #[serde(default = "default_client_secrets_path")]
    pub client_secrets_path: PathBuf,

    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Overrides the token endpoint named in the client secrets
    #[serde(default)]
    pub token_uri: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("token.json")
}
fn default_client_secrets_path() -> PathBuf {
    PathBuf::from("credentials.json")
}
fn default_upload_url() -> String {
    "https://www.googleapis.com/upload/drive/v3/files".to_string()
}
fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive.file".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            credentials_path: default_credentials_path(),
            client_secrets_path: default_client_secrets_path(),
            upload_url: default_upload_url(),
            token_uri: None,
            scope: default_scope(),
        }
    }
}
