//! Clipforge-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across clipforge:
//!
//! - **Typed IDs**: the one-time download [`Token`] and per-upload [`RequestId`]
//! - **Path Utilities**: upload extension checks and filename sanitising
//! - **Error Handling**: the request-level error taxonomy and result alias
//!
//! # Examples
//!
//! ```
//! use clipforge_common::{Error, Result, Token};
//! use clipforge_common::paths::has_allowed_extension;
//!
//! let token = Token::generate();
//! assert_eq!(token.to_string().len(), 32);
//!
//! assert!(has_allowed_extension("clip.MTS", &["mts"]));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("download token"))
//! }
//! # assert!(example().is_err());
//! ```

pub mod error;
pub mod ids;
pub mod paths;

pub use error::{Error, Result};
pub use ids::*;
