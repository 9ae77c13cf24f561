mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./clipforge.toml",
        "~/.config/clipforge/config.toml",
        "/etc/clipforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.upload.allowed_extensions.is_empty() {
        anyhow::bail!("upload.allowed_extensions cannot be empty");
    }

    if config
        .upload
        .allowed_extensions
        .iter()
        .any(|e| e.trim_start_matches('.').is_empty())
    {
        anyhow::bail!("upload.allowed_extensions contains an empty extension");
    }

    if config.transcode.video_codec.is_empty() || config.transcode.audio_codec.is_empty() {
        anyhow::bail!("transcode codecs cannot be empty");
    }

    if let Some(ref path) = config.transcode.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    if config.storage.folder_id.as_deref() == Some("") {
        anyhow::bail!("storage.folder_id cannot be an empty string; omit it to use the Drive root");
    }

    Ok(())
}
