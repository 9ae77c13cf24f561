//! # clipforge-av
//!
//! External media tool plumbing for clipforge.
//!
//! This crate provides:
//! - Detection of external tools (`ffmpeg`, `ffprobe`) on `PATH` or at a configured location
//! - [`ToolCommand`], an async builder that runs a tool to completion and captures its output
//! - [`Mp4Conversion`], the ffmpeg invocation that turns a camcorder stream into H.264/AAC MP4
//!
//! ## Example
//!
//! ```no_run
//! use clipforge_av::{get_tool_path, Mp4Conversion};
//!
//! # async fn example() -> clipforge_common::Result<()> {
//! let ffmpeg = get_tool_path("ffmpeg", None)?;
//! Mp4Conversion::new("/tmp/in.mts", "/tmp/out.mp4")
//!     .run(&ffmpeg)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod convert;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use convert::Mp4Conversion;
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};
