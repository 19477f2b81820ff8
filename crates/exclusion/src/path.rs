//! Normalized path helpers.
//!
//! Paths handled by this crate are relative to the storage root, use `/` as
//! the separator and never carry a leading or trailing separator. The root
//! itself is spelled [`ROOT_PATH`].

/// The storage root.
pub const ROOT_PATH: &str = "/";

/// Prefix marking hidden entries.
pub const HIDDEN_MARKER: char = '.';

/// Normalizes a host path into the canonical form used as the cache key base.
///
/// Backslashes become `/`, repeated separators and `.` segments collapse, and
/// leading/trailing separators are stripped. An empty result is the root.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() {
        return ROOT_PATH.to_string();
    }
    segments.join("/")
}

/// Returns the cache key for a path. Matching is case-insensitive, so keys
/// are lowercased on top of [`normalize_path`].
pub fn cache_key(path: &str) -> String {
    normalize_path(path).to_lowercase()
}

pub fn is_root(path: &str) -> bool {
    normalize_path(path) == ROOT_PATH
}

/// Final segment of a normalized path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Hidden entries have a basename starting with [`HIDDEN_MARKER`].
pub fn is_hidden(path: &str) -> bool {
    basename(path).starts_with(HIDDEN_MARKER)
}

/// Joins a child name onto a folder path.
pub fn join(folder: &str, name: &str) -> String {
    if is_root(folder) {
        normalize_path(name)
    } else {
        normalize_path(&format!("{folder}/{name}"))
    }
}

/// Parent folder of a normalized path, the root for top-level entries.
pub fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => ROOT_PATH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separators_and_dots() {
        assert_eq!(normalize_path("/notes//daily/"), "notes/daily");
        assert_eq!(normalize_path("notes\\daily\\a.md"), "notes/daily/a.md");
        assert_eq!(normalize_path("./notes/./a.md"), "notes/a.md");
        assert_eq!(normalize_path(""), ROOT_PATH);
        assert_eq!(normalize_path("/"), ROOT_PATH);
    }

    #[test]
    fn cache_key_is_case_folded() {
        assert_eq!(cache_key("Notes/A.md"), "notes/a.md");
    }

    #[test]
    fn hidden_is_decided_by_basename() {
        assert!(is_hidden(".obsidian"));
        assert!(is_hidden("notes/.trash"));
        assert!(!is_hidden(".notes/visible.md"));
    }

    #[test]
    fn join_and_parent_are_inverse() {
        let child = join(ROOT_PATH, "notes");
        assert_eq!(child, "notes");
        let nested = join(&child, "a.md");
        assert_eq!(nested, "notes/a.md");
        assert_eq!(parent(&nested), "notes");
        assert_eq!(parent(&child), ROOT_PATH);
    }
}
