//! Path resolution — filesystem sandboxing to a single root directory.
//!
//! Every filesystem-kind tool path goes through [`resolve_in_sandbox`]
//! before any I/O on the target. Traversal sequences are rejected
//! outright; symlinks are caught by canonicalizing the deepest existing
//! ancestor and checking it is still under the root. Dangling links are
//! followed hop by hop so a write cannot create their target elsewhere.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is outside the sandbox root")]
    OutsideSandbox { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Create the sandbox root if needed and return its canonical form.
pub fn prepare_root(root: &Path) -> Result<PathBuf, PathValidationError> {
    std::fs::create_dir_all(root).map_err(|e| PathValidationError::CanonicalizeFailed {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;
    root.canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })
}

/// Resolve `target` against the canonical sandbox `root`.
///
/// Checks:
/// 1. No `..` component anywhere in the raw input (either separator)
/// 2. Absolute inputs must already point inside the root
/// 3. The deepest existing ancestor, once symlinks are resolved, is
///    still inside the root (dangling links included)
///
/// Returns the resolved path; it may not exist yet (writes).
pub fn resolve_in_sandbox(root: &Path, target: &str) -> Result<PathBuf, PathValidationError> {
    let target = target.trim();
    let target = if target.is_empty() { "." } else { target };

    let normalized = target.replace('\\', "/");
    if normalized.split('/').any(|part| part == "..") {
        return Err(PathValidationError::PathTraversal { path: target.into() });
    }

    let input = Path::new(target);
    let joined = if input.is_absolute() || normalized.starts_with('/') {
        input.to_path_buf()
    } else {
        root.join(input)
    };

    // Drop `.` components; `..` was rejected above.
    let lexical: PathBuf = joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if !lexical.starts_with(root) {
        return Err(PathValidationError::OutsideSandbox { path: target.into() });
    }

    let mut candidate = lexical;
    for _ in 0..MAX_LINK_HOPS {
        let (existing, remainder) = split_existing(&candidate);

        // A dangling link cannot be canonicalized; follow it one hop and
        // check where it lands.
        let is_link = std::fs::symlink_metadata(existing).is_ok_and(|m| m.file_type().is_symlink());
        if is_link && existing.canonicalize().is_err() {
            candidate = follow_link(root, existing, target)?;
            for name in remainder.iter().rev() {
                candidate.push(name);
            }
            if !candidate.starts_with(root) {
                return Err(PathValidationError::OutsideSandbox { path: target.into() });
            }
            continue;
        }

        let mut resolved = existing
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: target.into(),
                reason: e.to_string(),
            })?;
        if !resolved.starts_with(root) {
            return Err(PathValidationError::OutsideSandbox { path: target.into() });
        }
        for name in remainder.into_iter().rev() {
            resolved.push(name);
        }
        return Ok(resolved);
    }

    Err(PathValidationError::CanonicalizeFailed {
        path: target.into(),
        reason: "too many levels of symbolic links".into(),
    })
}

/// Symlink hops followed before giving up.
const MAX_LINK_HOPS: usize = 40;

/// Split `path` into its deepest entry that exists on disk (links are
/// not followed) and the missing names below it, innermost first.
fn split_existing(path: &Path) -> (&Path, Vec<OsString>) {
    let mut existing = path;
    let mut remainder = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    (existing, remainder)
}

/// Where the dangling link `link` points, lexically normalized against
/// its canonical parent directory.
fn follow_link(root: &Path, link: &Path, target: &str) -> Result<PathBuf, PathValidationError> {
    let failed = |reason: String| PathValidationError::CanonicalizeFailed {
        path: target.into(),
        reason,
    };
    let parent = link
        .parent()
        .ok_or_else(|| failed("symlink has no parent".into()))?
        .canonicalize()
        .map_err(|e| failed(e.to_string()))?;
    if !parent.starts_with(root) {
        return Err(PathValidationError::OutsideSandbox { path: target.into() });
    }
    let dest = std::fs::read_link(link).map_err(|e| failed(e.to_string()))?;

    let mut out = PathBuf::new();
    for component in parent.join(dest).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = prepare_root(&dir.path().join("ws")).unwrap();
        (dir, root)
    }

    #[test]
    fn traversal_rejected() {
        let (_dir, root) = sandbox();
        for bad in ["../etc/passwd", "a/../../b", "..", "sub\\..\\..\\x", "a/.."] {
            let err = resolve_in_sandbox(&root, bad).unwrap_err();
            assert!(matches!(err, PathValidationError::PathTraversal { .. }), "{bad}");
        }
    }

    #[test]
    fn relative_paths_resolve_under_root() {
        let (_dir, root) = sandbox();
        std::fs::write(root.join("notes.txt"), "hi").unwrap();
        assert_eq!(resolve_in_sandbox(&root, "notes.txt").unwrap(), root.join("notes.txt"));
        assert_eq!(resolve_in_sandbox(&root, "./notes.txt").unwrap(), root.join("notes.txt"));
        assert_eq!(resolve_in_sandbox(&root, ".").unwrap(), root);
        assert_eq!(resolve_in_sandbox(&root, "").unwrap(), root);
    }

    #[test]
    fn missing_paths_resolve_for_writes() {
        let (_dir, root) = sandbox();
        let resolved = resolve_in_sandbox(&root, "new/dir/file.txt").unwrap();
        assert_eq!(resolved, root.join("new").join("dir").join("file.txt"));
    }

    #[test]
    fn absolute_outside_root_rejected() {
        let (_dir, root) = sandbox();
        let err = resolve_in_sandbox(&root, "/etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideSandbox { .. }));
    }

    #[test]
    fn absolute_inside_root_allowed() {
        let (_dir, root) = sandbox();
        let inside = root.join("a.txt");
        let resolved = resolve_in_sandbox(&root, &inside.to_string_lossy()).unwrap();
        assert_eq!(resolved, inside);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let (dir, root) = sandbox();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let err = resolve_in_sandbox(&root, "link/secret.txt").unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideSandbox { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_escape_rejected() {
        let (dir, root) = sandbox();
        let outside = dir.path().join("outside.txt");
        std::os::unix::fs::symlink(&outside, root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), root.join("dirlink")).unwrap();

        for path in ["link.txt", "dirlink/new.txt"] {
            let err = resolve_in_sandbox(&root, path).unwrap_err();
            assert!(matches!(err, PathValidationError::OutsideSandbox { .. }), "{path}");
        }
        assert!(!outside.exists());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_inside_root_resolves_to_target() {
        let (_dir, root) = sandbox();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::os::unix::fs::symlink("../later.txt", root.join("sub/link.txt")).unwrap();
        std::os::unix::fs::symlink("chain.txt", root.join("hop.txt")).unwrap();
        std::os::unix::fs::symlink("sub/link.txt", root.join("chain.txt")).unwrap();

        assert_eq!(resolve_in_sandbox(&root, "sub/link.txt").unwrap(), root.join("later.txt"));
        assert_eq!(resolve_in_sandbox(&root, "hop.txt").unwrap(), root.join("later.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_fails() {
        let (_dir, root) = sandbox();
        std::os::unix::fs::symlink("b", root.join("a")).unwrap();
        std::os::unix::fs::symlink("a", root.join("b")).unwrap();
        assert!(resolve_in_sandbox(&root, "a").is_err());
    }
}
