//! Path decomposition helpers.
//!
//! Paths are slash-separated with no leading slash; the empty string is the
//! root. Directories exist only as marker rows derived from the ancestor
//! prefixes of file paths, so everything here is pure string splitting.

/// Split a path into its parent directory and leaf name.
///
/// `"a/b/c"` becomes `("a/b", "c")`; a root-level name has an empty parent.
pub fn split_path(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("", name),
    }
}

/// One ancestor-directory level of a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirLevel {
    /// Full path of this directory level.
    pub path: String,
    /// Parent directory of this level.
    pub parent: String,
    /// Leaf name of this level.
    pub leaf: String,
    /// Zero-based depth, used as the ordering key for directory rows.
    pub depth: i64,
}

/// The proper ancestor directory levels of a file path, shallowest first.
///
/// `"a/b/c"` yields levels for `"a"` and `"a/b"`. The leaf itself names a
/// file, never a directory, so it is excluded. Root-level names yield
/// nothing.
pub(crate) fn ancestor_dirs(name: &str) -> Vec<DirLevel> {
    let parts: Vec<&str> = name.split('/').collect();
    let mut levels = Vec::with_capacity(parts.len().saturating_sub(1));
    for i in 0..parts.len().saturating_sub(1) {
        levels.push(DirLevel {
            path: parts[..=i].join("/"),
            parent: parts[..i].join("/"),
            leaf: parts[i].to_string(),
            depth: i as i64,
        });
    }
    levels
}
