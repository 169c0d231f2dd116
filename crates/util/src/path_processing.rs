use std::path::{Path, PathBuf};

use dirs_next::home_dir;

/// Expands a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if trimmed == "~" {
        return home();
    }
    match trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        Some(rest) => home().join(rest),
        None => PathBuf::from(trimmed),
    }
}

/// Removes trailing separators so `/p/a/` and `/p/a` compare equal.
pub fn normalize_directory(directory: &str) -> String {
    let trimmed = directory.trim();
    if trimmed.len() > 1 {
        trimmed.trim_end_matches(['/', '\\']).to_string()
    } else {
        trimmed.to_string()
    }
}

/// Final path component, if any.
pub fn directory_basename(directory: &str) -> Option<&str> {
    Path::new(directory).file_name().and_then(|name| name.to_str())
}

/// Parent directory, if any.
pub fn parent_directory(directory: &str) -> Option<&str> {
    Path::new(directory)
        .parent()
        .and_then(|parent| parent.to_str())
        .filter(|parent| !parent.is_empty())
}

/// Number of normal components below the root.
pub fn directory_depth(directory: &str) -> usize {
    Path::new(directory)
        .components()
        .filter(|component| matches!(component, std::path::Component::Normal(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_separators_but_keeps_root() {
        assert_eq!(normalize_directory("/p/a/"), "/p/a");
        assert_eq!(normalize_directory("/"), "/");
        assert_eq!(normalize_directory(" /srv/webapp "), "/srv/webapp");
    }

    #[test]
    fn extracts_basename_parent_and_depth() {
        assert_eq!(directory_basename("/home/alice/webapp"), Some("webapp"));
        assert_eq!(parent_directory("/home/alice/webapp"), Some("/home/alice"));
        assert_eq!(directory_depth("/home/alice/webapp"), 3);
        assert_eq!(directory_basename("/"), None);
    }

    #[test]
    fn expands_home_prefix() {
        let expanded = expand_tilde("~/projects");
        assert!(expanded.ends_with("projects"));
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
