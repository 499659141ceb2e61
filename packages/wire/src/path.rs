//! Resolution of caller supplied paths against a working directory.

use crate::error::{Error, Result};

/// Resolve `path` against `cwd`, collapsing `.` and `..` components.
///
/// Absolute paths ignore `cwd`. Climbing above the root or embedding a NUL
/// byte is an invalid argument. A trailing slash is dropped except for the
/// root itself.
pub fn build_path(cwd: &str, path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(Error::invalid("empty path"));
    }
    if path.contains('\0') || cwd.contains('\0') {
        return Err(Error::invalid("path contains a NUL byte"));
    }

    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        if !cwd.starts_with('/') {
            return Err(Error::invalid(format!(
                "working directory '{}' is not absolute",
                cwd
            )));
        }
        format!("{}/{}", cwd, path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::invalid(format!(
                        "path '{}' climbs above the root",
                        path
                    )));
                }
            }
            other => parts.push(other),
        }
    }

    Ok(format!("/{}", parts.join("/")))
}
