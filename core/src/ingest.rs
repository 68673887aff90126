use crate::engine::Engine;
use crate::index::ArticleId;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: Vec<(PathBuf, ArticleId)>,
}

/// Add every regular file directly inside `dir` as one article, in directory
/// enumeration order. Non-UTF-8 bytes are replaced rather than rejected.
///
/// Stops at the first failure; files added before it stay added.
pub fn ingest_dir<P: AsRef<Path>>(engine: &Engine, dir: P) -> Result<IngestReport> {
    let dir = dir.as_ref();
    let mut report = IngestReport::default();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("reading {}", dir.display()))?;
        if !entry.file_type().is_file() { continue; }
        let path = entry.into_path();
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);
        let id = engine
            .add_entry(&content)
            .with_context(|| format!("adding {}", path.display()))?;
        tracing::debug!(path = %path.display(), id, "ingested");
        report.added.push((path, id));
    }
    tracing::info!(dir = %dir.display(), added = report.added.len(), "batch ingestion complete");
    Ok(report)
}
