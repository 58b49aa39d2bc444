//! Path sanitization for upstream-supplied names.
//!
//! Content paths and archive entry names both come from the network. Neither
//! is trusted to contain directory components: only the final segment is ever
//! used, and the result must resolve to a direct child of the dataset
//! directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Reduces an upstream-supplied path (URL path, archive entry name) to a
/// bare file name.
///
/// Both `/` and `\` are treated as separators regardless of platform, since
/// the string originates elsewhere. Query strings and fragments are dropped.
///
/// # Examples
///
/// ```
/// use kiosk_storage::sanitize_file_name;
///
/// assert_eq!(
///     sanitize_file_name("/common/content/sqlite/en/world_sql_content_1a2b.content").unwrap(),
///     "world_sql_content_1a2b.content"
/// );
/// assert_eq!(sanitize_file_name("..\\..\\evil.content").unwrap(), "evil.content");
/// assert!(sanitize_file_name("../").is_err());
/// assert!(sanitize_file_name("a\0b").is_err());
/// ```
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let without_query = raw.split(['?', '#']).next().unwrap_or_default();
    let name = without_query.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    // Null bytes cause truncation in C-based syscalls; reject them explicitly.
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::from(raw)));
    }
    Ok(name.to_string())
}

/// Joins a sanitized file name onto `root`, verifying that the result is a
/// direct child of `root`.
pub(crate) fn contain(root: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(root.join(name)),
        _ => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(name))),
    }
}
