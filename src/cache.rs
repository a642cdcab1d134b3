//! Export cache for incremental batches.
//!
//! Transcoding dominates a batch: a few minutes of 4K footage can take longer
//! to re-encode than the clip lasts. This module lets the batch runner skip
//! the transcoder when the source file and the transcode parameters have not
//! changed since the last run into the same output directory.
//!
//! Probing and planning always run, so a changed config (reduction,
//! efficiency, preset) is noticed immediately.
//!
//! ## Cache keys
//!
//! Lookups are **content-addressed** by `source_hash` + `params_hash`, never
//! by output path:
//!
//! - **`source_hash`**: SHA-256 of the source file contents, streamed so
//!   multi-gigabyte clips are never held in memory. Content-based rather
//!   than mtime-based so it survives copies and checkouts.
//! - **`params_hash`**: SHA-256 of every [`TranscodeParams`] field that
//!   affects the encoded bytes (canvas, placement, transform, timing,
//!   preset). Source and output paths are excluded.
//!
//! A hit requires a matching entry **and** the recorded output still on
//! disk. When the expected output name differs from the recorded one (for
//! example after the suffix changed) the cached file is copied instead of
//! re-encoded.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<output_dir>/.clipshrink-cache.json`.
//! `--no-cache` starts from an empty manifest; every clip is transcoded and
//! the manifest is rewritten.

use crate::planner::TranscodeParams;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the cache manifest file within the output directory.
const MANIFEST_FILENAME: &str = ".clipshrink-cache.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// A single cached output file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk manifest mapping output file names to their cache entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// `"{source_hash}:{params_hash}"` → output name. Rebuilt on load.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{source_hash}:{params_hash}")
}

impl CacheManifest {
    /// Create an empty manifest (used for `--no-cache` or a first run).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from the output directory. A missing, corrupt or outdated
    /// manifest yields an empty one.
    pub fn load(output_dir: &Path) -> Self {
        let path = manifest_path(output_dir);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::empty();
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable cache manifest");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = manifest
            .entries
            .iter()
            .map(|(name, e)| (content_key(&e.source_hash, &e.params_hash), name.clone()))
            .collect();
        manifest
    }

    /// Save to the output directory.
    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(output_dir), json)
    }

    /// Output name recorded for this content, if that file still exists in
    /// `output_dir`.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        output_dir: &Path,
    ) -> Option<String> {
        let stored = self
            .content_index
            .get(&content_key(source_hash, params_hash))?;
        output_dir.join(stored).is_file().then(|| stored.clone())
    }

    /// Record a cache entry for an output file.
    ///
    /// An older entry for the same content under another name is dropped,
    /// unless that name has since been given other content. Content that
    /// `output_name` held before is forgotten.
    pub fn insert(&mut self, output_name: String, source_hash: String, params_hash: String) {
        let key = content_key(&source_hash, &params_hash);

        if let Some(old) = self.content_index.get(&key)
            && *old != output_name
            && self
                .entries
                .get(old.as_str())
                .is_some_and(|e| content_key(&e.source_hash, &e.params_hash) == key)
        {
            self.entries.remove(old.as_str());
        }

        if let Some(previous) = self.entries.get(&output_name) {
            let previous_key = content_key(&previous.source_hash, &previous.params_hash);
            if previous_key != key && self.content_index.get(&previous_key) == Some(&output_name) {
                self.content_index.remove(&previous_key);
            }
        }

        self.content_index.insert(key, output_name.clone());
        self.entries.insert(
            output_name,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of a file's contents as hex, read in chunks.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of the encoding-relevant transcode parameters.
pub fn hash_transcode_params(params: &TranscodeParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"transcode\0");
    hasher.update(params.width.to_le_bytes());
    hasher.update(params.height.to_le_bytes());
    let p = &params.placement;
    for v in [p.width, p.height, p.x, p.y] {
        hasher.update(v.to_le_bytes());
    }
    let t = &params.transform;
    for v in [t.a, t.b, t.c, t.d, t.tx, t.ty] {
        hasher.update(v.to_le_bytes());
    }
    hasher.update(params.frame_duration.value.to_le_bytes());
    hasher.update(params.frame_duration.timescale.to_le_bytes());
    hasher.update(params.time_range.start.to_le_bytes());
    hasher.update(params.time_range.end.to_le_bytes());
    hasher.update(params.preset.encoder_preset().as_bytes());
    hasher.update(params.preset.crf().to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache outcome counts for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u32,
    pub copies: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn copy(&mut self) {
        self.copies += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.copies + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.hits, self.copies) {
            (0, 0) => write!(f, "{} transcoded", self.misses),
            (_, 0) => write!(
                f,
                "{} cached, {} transcoded ({} total)",
                self.hits,
                self.misses,
                self.total()
            ),
            _ => write!(
                f,
                "{} cached, {} copied, {} transcoded ({} total)",
                self.hits,
                self.copies,
                self.misses,
                self.total()
            ),
        }
    }
}

/// Path of the cache manifest for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}
