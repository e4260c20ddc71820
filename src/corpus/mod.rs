//! Source corpus: file discovery, decoding and fixed-window chunking.
pub mod chunker;
pub mod decode;

use std::path::Path;

use anyhow::{Result, bail};
use ignore::WalkBuilder;
use serde::Serialize;
use tracing::{info, warn};

pub use chunker::{CodeChunk, DEFAULT_WINDOW, chunk_lines};
pub use decode::Decoder;

/// One decoded source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// Whether `path` ends with one of `extensions` (compared without the dot,
/// case-insensitively).
fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Walk `root` and decode every file whose extension is in `extensions`.
///
/// Files are returned sorted by path so repeated runs over the same
/// snapshot produce the same chunk order. Files that cannot be read or
/// decoded are skipped with a warning. A missing root is an error.
pub fn load_sources(
    root: &Path,
    extensions: &[String],
    decoder: &Decoder,
) -> Result<(Vec<SourceFile>, LoadStats)> {
    if !root.is_dir() {
        bail!("source directory not found: {}", root.display());
    }

    let mut files = Vec::new();
    let mut stats = LoadStats::default();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                stats.skipped += 1;
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !has_extension(path, extensions) {
            continue;
        }

        let path_str = path.to_string_lossy().replace('\\', "/");
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to read {path_str}: {e}");
                stats.skipped += 1;
                continue;
            }
        };
        match decoder.decode(&bytes) {
            Ok(text) => {
                files.push(SourceFile::new(path_str, text));
                stats.loaded += 1;
            }
            Err(e) => {
                warn!("Failed to decode {path_str}: {e}");
                stats.skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} source files from {} ({} skipped)",
        stats.loaded,
        root.display(),
        stats.skipped
    );
    Ok((files, stats))
}

/// Chunk every file in order.
pub fn chunk_sources(files: &[SourceFile], window: usize) -> Vec<CodeChunk> {
    let chunks: Vec<CodeChunk> = files
        .iter()
        .flat_map(|f| chunk_lines(&f.path, &f.text, window))
        .collect();
    info!("Created {} chunks from {} files", chunks.len(), files.len());
    chunks
}
