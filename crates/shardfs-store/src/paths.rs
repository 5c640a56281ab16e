//! Root path normalization: `~` and `$VAR` expansion, absolutization and
//! lexical cleanup.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::error::StoreResult;

/// Expand `~`, `$NAME` and `${NAME}`, make the path absolute against the
/// current directory and drop `.`/`..` components lexically.
///
/// Symlinks are resolved later with `canonicalize`, once the root exists.
pub fn normalize_root(raw: &Path) -> StoreResult<PathBuf> {
    let expanded = match raw.to_str() {
        Some(s) => PathBuf::from(expand_vars(&expand_user(s))),
        None => raw.to_path_buf(),
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()?.join(expanded)
    };
    Ok(clean(&absolute))
}

/// Replace a leading `~` with the home directory, if known. Without `HOME`
/// the password database entry of the current user is used.
fn expand_user(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    dirs::home_dir()
        .and_then(|home| home.to_str().map(|home| format!("{home}{rest}")))
        .unwrap_or_else(|| path.to_string())
}

/// Substitute `$NAME` and `${NAME}`. Unknown variables are left as written.
fn expand_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        let value = if name.is_empty() {
            None
        } else {
            env::var(name).ok()
        };
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Lexically remove `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
