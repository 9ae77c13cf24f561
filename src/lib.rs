//! Clipforge - camcorder clip converter
//!
//! Accepts an uploaded `.mts` clip, converts it to MP4 with ffmpeg, publishes
//! the result to Google Drive and hands back a link that downloads the local
//! copy exactly once. This library crate exposes the pieces for integration
//! testing.

pub mod artifacts;
pub mod config;
pub mod pipeline;
pub mod publish;
pub mod server;
pub mod tokens;
pub mod transcode;
