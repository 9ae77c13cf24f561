//! External tool detection and management.

use clipforge_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available and get its information.
///
/// # Example
///
/// ```no_run
/// use clipforge_av::check_tool;
///
/// let info = check_tool("ffmpeg", "-version");
/// if info.available {
///     println!("ffmpeg version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str, version_arg: &str) -> ToolInfo {
    check_tool_at(name, Path::new(name), version_arg)
}

/// Check a tool at an explicit location (e.g. from config).
pub fn check_tool_at(name: &str, program: &Path, version_arg: &str) -> ToolInfo {
    let result = Command::new(program).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = if program.components().count() > 1 {
                Some(program.to_path_buf())
            } else {
                which::which(program).ok()
            };

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the tools clipforge shells out to.
///
/// Only ffmpeg is required; ffprobe is reported because it ships alongside
/// and is handy when diagnosing a failed conversion.
pub fn check_tools(ffmpeg_path: Option<&Path>) -> Vec<ToolInfo> {
    let ffmpeg = match ffmpeg_path {
        Some(path) => check_tool_at("ffmpeg", path, "-version"),
        None => check_tool("ffmpeg", "-version"),
    };
    vec![ffmpeg, check_tool("ffprobe", "-version")]
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns [`Error::Tool`] if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool(name, "not found on PATH"))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(tool = name, path = %path.display(), "Configured tool path does not exist, falling back to PATH");
    }

    require_tool(name)
}
