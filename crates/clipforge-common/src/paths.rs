//! Path utilities for vetting uploaded file names.
//!
//! Uploads arrive with a client-chosen file name. These helpers decide whether
//! the name carries an accepted extension and reduce it to a safe basename
//! before it is ever used for logging or as a download name.

use std::path::Path;

/// Check if a file name ends in one of the allowed extensions.
///
/// The comparison is case-insensitive and requires a non-empty stem, so
/// `".mts"` and `"mts"` are both rejected.
///
/// # Examples
///
/// ```
/// use clipforge_common::paths::has_allowed_extension;
///
/// assert!(has_allowed_extension("clip.mts", &["mts"]));
/// assert!(has_allowed_extension("CLIP.MTS", &["mts"]));
/// assert!(!has_allowed_extension("clip.mov", &["mts"]));
/// ```
pub fn has_allowed_extension<S: AsRef<str>>(file_name: &str, allowed: &[S]) -> bool {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() || ext.is_empty() {
        return false;
    }
    let ext = ext.to_lowercase();
    allowed
        .iter()
        .any(|a| a.as_ref().trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

/// Reduce a client-supplied file name to a safe ASCII basename.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_`, and leading dots are stripped. Returns `None` if nothing
/// usable remains.
///
/// # Examples
///
/// ```
/// use clipforge_common::paths::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
/// assert_eq!(sanitize_filename("my clip.mts").as_deref(), Some("my_clip.mts"));
/// assert_eq!(sanitize_filename("..."), None);
/// ```
pub fn sanitize_filename(file_name: &str) -> Option<String> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned)
    }
}

/// Replace the extension of a file name, e.g. `clip.mts` -> `clip.mp4`.
pub fn with_extension(file_name: &str, ext: &str) -> String {
    Path::new(file_name)
        .with_extension(ext.trim_start_matches('.'))
        .to_string_lossy()
        .into_owned()
}
