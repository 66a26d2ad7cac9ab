//! Read-only `.env` lookup for the provider API key.
//!
//! Values found in the file are returned to the caller; the process
//! environment is never modified.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, eyre};
use tracing::debug;

const FILE_NAME: &str = ".env";
const EXPORT: &str = "export ";

/// Resolve `key` from the process environment, then from a `.env` file.
///
/// The file is `explicit` when given, otherwise the nearest `.env` found
/// walking up from the working directory.
pub(crate) fn lookup(key: &str, explicit: Option<&Path>) -> Result<Option<String>> {
    if let Some(value) = std::env::var(key).ok().filter(|v| !v.is_empty()) {
        return Ok(Some(value));
    }

    let path = match explicit {
        Some(path) if path.is_file() => path.to_path_buf(),
        Some(path) => return Err(eyre!("env file not found: {}", path.display())),
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
            match find_env_file(&cwd) {
                Some(path) => path,
                None => return Ok(None),
            }
        }
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| eyre!("failed to read {}: {e}", path.display()))?;
    debug!(path = %path.display(), "read env file");

    Ok(value_in(&content, key))
}

/// Nearest `.env` in `start` or one of its ancestors.
fn find_env_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Value of `key` in `.env` content; later assignments win.
fn value_in(content: &str, key: &str) -> Option<String> {
    content
        .lines()
        .filter_map(parse_line)
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v)
        .last()
        .filter(|v| !v.is_empty())
}

/// Parse `KEY=value`, `export KEY=value`, or a quoted value. Comments and
/// lines without `=` are ignored.
fn parse_line(line: &str) -> Option<(&str, String)> {
    let mut line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let exported = line
        .get(..EXPORT.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(EXPORT));
    if exported {
        line = line[EXPORT.len()..].trim_start();
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"').trim_matches('\'');
    Some((key, value.to_string()))
}
