//! The media directory: where uploaded files live and how track identifiers
//! map onto it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Names of the files in `dir` whose extension is in `extensions`
/// (case-insensitive), sorted. Subdirectories are not descended into.
pub fn list_media(dir: &Path, extensions: &[String]) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| has_extension(name, extensions))
        .collect();
    names.sort_by_key(|n| n.to_lowercase());
    Ok(names)
}

pub fn has_extension(name: &str, extensions: &[String]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// Map a track identifier to a path. Absolute identifiers are used as-is;
/// relative ones are looked up in `media_dir` when one is configured.
pub fn resolve_path(media_dir: Option<&Path>, file: &str) -> PathBuf {
    let path = Path::new(file);
    match media_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
