//! Path utilities.
//!
//! Lexical helpers used by the diagnostic parser and the build context
//! resolver. None of them touch the filesystem except `find_vcs_root`.

use std::path::{Component, Path, PathBuf};

/// Directory names that mark a repository root.
pub const VCS_MARKERS: &[&str] = &[".git", ".hg", ".svn", ".bzr"];

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                let climbing = matches!(result.components().next_back(), Some(Component::ParentDir));
                if climbing || (!result.pop() && !path.is_absolute()) {
                    result.push("..");
                }
            }
            Component::CurDir => {}
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Check if a path is within a base directory (lexically).
pub fn is_within(path: &Path, base: &Path) -> bool {
    normalize(path).starts_with(normalize(base))
}

/// Make `path` relative to `base`, climbing with `..` where needed.
///
/// Both paths must be absolute; returns `None` otherwise.
pub fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    if !path.is_absolute() || !base.is_absolute() {
        return None;
    }

    let path = normalize(path);
    let base = normalize(base);
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_parts.len() {
        result.push("..");
    }
    for part in &path_parts[common..] {
        result.push(part);
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }

    Some(result)
}

/// Display form of `path` for an editor whose working directory is `cwd`:
/// the relative form when it is shorter, the absolute form otherwise.
///
/// The relative form may start with `../`.
pub fn shortest(path: &Path, cwd: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    };

    match relative_path(&absolute, cwd) {
        Some(relative) if relative.as_os_str().len() < absolute.as_os_str().len() => relative,
        _ => absolute,
    }
}

/// Find the nearest ancestor (including `start`) carrying a VCS marker.
pub fn find_vcs_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if VCS_MARKERS.iter().any(|m| current.join(m).exists()) {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Replace the extension-bearing suffix `from` of a file name with `to`.
///
/// Returns `None` if the file name does not end with `from`.
pub fn replace_suffix(path: &Path, from: &str, to: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(from)?;
    Some(path.with_file_name(format!("{stem}{to}")))
}
