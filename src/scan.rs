//! Input discovery.
//!
//! Turns the paths given on the command line into the ordered list of source
//! videos a batch works on:
//!
//! - **Files** are taken as-is, whatever their extension. Naming a file is an
//!   explicit request; the probe decides whether it is readable media.
//! - **Directories** are walked recursively and contribute every file with a
//!   known video extension ([`VIDEO_EXTENSIONS`]), sorted by name.
//!
//! Hidden entries (dot-prefixed) and in-flight `.part` outputs are skipped
//! during directory walks, as is the batch's own output directory so earlier
//! results are never shrunk again. A file reachable twice is listed once, at
//! its first position.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// File extensions (lowercase) recognised as video during directory walks.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "mkv", "avi", "webm", "mts"];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("No videos found in the given inputs")]
    NoVideos,
}

/// Whether a path has a video extension. Case-insensitive.
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn is_hidden(entry: &DirEntry) -> bool {
    // Depth 0 is the directory the user named; never filter it.
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Whether a walked directory is `excluded` (already canonicalized).
fn is_excluded(entry: &DirEntry, excluded: Option<&Path>) -> bool {
    let Some(excluded) = excluded else {
        return false;
    };
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .path()
            .canonicalize()
            .is_ok_and(|path| path == excluded)
}

/// Expand `inputs` into a deduplicated, ordered list of video files.
///
/// Directory walks never descend into `output_dir`. Fails with
/// [`ScanError::NotFound`] for a missing input and with
/// [`ScanError::NoVideos`] when nothing is left to process.
pub fn collect_inputs(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, ScanError> {
    // Not created yet means nothing to skip
    let excluded = output_dir.and_then(|dir| dir.canonicalize().ok());
    let mut seen = HashSet::new();
    let mut videos = Vec::new();

    for input in inputs {
        if !input.exists() {
            return Err(ScanError::NotFound(input.clone()));
        }

        if input.is_file() {
            push_unique(&mut videos, &mut seen, input.clone())?;
            continue;
        }

        let walker = WalkDir::new(input)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e) && !is_excluded(e, excluded.as_deref()));

        let before = videos.len();
        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file() && is_video(path) {
                push_unique(&mut videos, &mut seen, path.to_path_buf())?;
            }
        }
        debug!(
            dir = %input.display(),
            found = videos.len() - before,
            "scanned input directory"
        );
    }

    if videos.is_empty() {
        return Err(ScanError::NoVideos);
    }
    Ok(videos)
}

fn push_unique(
    videos: &mut Vec<PathBuf>,
    seen: &mut HashSet<PathBuf>,
    path: PathBuf,
) -> Result<(), ScanError> {
    let key = path.canonicalize()?;
    if seen.insert(key) {
        videos.push(path);
    }
    Ok(())
}
