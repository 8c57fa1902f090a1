use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::error::Result;
use crate::extract::{FileBundle, extract_source};
use crate::ir::FileRecord;
use crate::languages::detect_language;
use crate::project::Config;
use crate::resolve::{ResolveReport, Resolver, frameworks::FrameworkResolver};
use crate::scan::{self, GlobFilter, hash_bytes};
use crate::store::{Store, now_ts};

/// Files per store transaction; also the cancellation checkpoint
/// granularity of the extraction pipeline.
const FILE_BATCH: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Scanning,
    Parsing,
    Storing,
    Resolving,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

/// Cooperative cancellation, checked between files/batches. In-flight
/// extraction completes and the current batch commits normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct IndexReport {
    pub files_added: usize,
    pub files_modified: usize,
    pub files_removed: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub nodes: usize,
    pub edges: usize,
    pub resolve: Option<ResolveReport>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Drives Scan -> Extract -> Store -> Resolve. Callers hold the write
/// locks; the indexer only sequences the pipeline.
pub(crate) struct Indexer<'a> {
    pub store: &'a mut Store,
    pub config: &'a Config,
    pub frameworks: &'a [Box<dyn FrameworkResolver>],
}

impl Indexer<'_> {
    /// Delta-only refresh: act on the scanner's added/modified/removed.
    pub fn sync(
        &mut self,
        progress: Option<&dyn Fn(IndexProgress)>,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        emit(progress, IndexPhase::Scanning, 0, 0, None);
        let filter = GlobFilter::new(&self.config.include, &self.config.exclude)?;
        let known = self.store.list_files()?;
        let delta = scan::scan_delta(
            &self.config.root,
            &filter,
            self.config.max_file_size,
            &known,
        );
        log::info!(
            "sync: {} added, {} modified, {} removed",
            delta.added.len(),
            delta.modified.len(),
            delta.removed.len()
        );

        let mut report = IndexReport {
            files_added: delta.added.len(),
            files_modified: delta.modified.len(),
            files_removed: delta.removed.len(),
            ..Default::default()
        };
        for path in &delta.removed {
            self.store.remove_file(path)?;
        }
        let mut to_extract = delta.added;
        to_extract.extend(delta.modified);
        self.run_pipeline(to_extract, &mut report, progress, cancel)?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Full re-scan: every matching file is re-extracted; records for
    /// files gone from disk are deleted.
    pub fn index_all(
        &mut self,
        progress: Option<&dyn Fn(IndexProgress)>,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        emit(progress, IndexPhase::Scanning, 0, 0, None);
        let filter = GlobFilter::new(&self.config.include, &self.config.exclude)?;
        let files = scan::enumerate_files(
            &self.config.root,
            &filter,
            self.config.max_file_size,
        );
        let present: HashSet<&str> = files.iter().map(|f| f.rel.as_str()).collect();
        let known: HashSet<String> = self
            .store
            .list_files()?
            .into_iter()
            .map(|r| r.path)
            .collect();

        let mut report = IndexReport::default();
        for gone in known.iter().filter(|p| !present.contains(p.as_str())) {
            self.store.remove_file(gone)?;
            report.files_removed += 1;
        }
        let to_extract: Vec<String> = files.iter().map(|f| f.rel.clone()).collect();
        report.files_added = to_extract
            .iter()
            .filter(|p| !known.contains(p.as_str()))
            .count();
        report.files_modified = to_extract.len() - report.files_added;
        self.run_pipeline(to_extract, &mut report, progress, cancel)?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Re-extract an explicit subset of repo-relative paths.
    pub fn index_files(
        &mut self,
        paths: &[String],
        progress: Option<&dyn Fn(IndexProgress)>,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport::default();
        let mut to_extract = Vec::new();
        for p in paths {
            let rel = p.replace('\\', "/");
            if self.config.root.join(&rel).is_file() {
                to_extract.push(rel);
            } else {
                self.store.remove_file(&rel)?;
                report.files_removed += 1;
            }
        }
        report.files_modified = to_extract.len();
        self.run_pipeline(to_extract, &mut report, progress, cancel)?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Extract in parallel per batch, commit each batch in one
    /// transaction, then run the resolver pass. Per-file failures are
    /// recorded on the file record and never abort the run.
    fn run_pipeline(
        &mut self,
        to_extract: Vec<String>,
        report: &mut IndexReport,
        progress: Option<&dyn Fn(IndexProgress)>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let total = to_extract.len();
        let root = self.config.root.clone();
        let mut done = 0usize;

        for chunk in to_extract.chunks(FILE_BATCH) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            emit(
                progress,
                IndexPhase::Parsing,
                done,
                total,
                chunk.first().cloned(),
            );
            let bundles: Vec<FileBundle> = chunk
                .par_iter()
                .map(|rel| extract_one(&root, rel))
                .collect();

            emit(progress, IndexPhase::Storing, done, total, None);
            match self.store.apply_file_batch(&bundles) {
                Ok(()) => {
                    report.files_indexed += bundles.len();
                    report.files_failed +=
                        bundles.iter().filter(|b| b.record.error.is_some()).count();
                    report.nodes += bundles.iter().map(|b| b.nodes.len()).sum::<usize>();
                    report.edges += bundles.iter().map(|b| b.edges.len()).sum::<usize>();
                }
                Err(e) => {
                    log::error!("batch of {} files failed: {e}", bundles.len());
                    report.files_failed += bundles.len();
                }
            }
            done += chunk.len();
        }

        if !report.cancelled {
            emit(progress, IndexPhase::Resolving, 0, 0, None);
            let resolver = Resolver::new(
                root,
                self.frameworks,
                self.config.frameworks.clone(),
            );
            let resolve_progress = |current: usize, total: usize| {
                emit(progress, IndexPhase::Resolving, current, total, None);
            };
            let rr = resolver.run(self.store, Some(&resolve_progress), cancel)?;
            if rr.cancelled {
                report.cancelled = true;
            }
            report.resolve = Some(rr);
        }
        Ok(())
    }
}

fn emit(
    progress: Option<&dyn Fn(IndexProgress)>,
    phase: IndexPhase,
    current: usize,
    total: usize,
    current_file: Option<String>,
) {
    if let Some(cb) = progress {
        cb(IndexProgress {
            phase,
            current,
            total,
            current_file,
        });
    }
}

/// Read, hash and extract one file. I/O failures are captured on the
/// record; the file still gets a (node-less) record so the failure is
/// visible.
fn extract_one(root: &Path, rel: &str) -> FileBundle {
    let abs = root.join(rel);
    let language = detect_language(rel).unwrap_or("unknown").to_string();
    let (size, mtime) = match std::fs::metadata(&abs) {
        Ok(m) => (
            m.len(),
            m.modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default(),
        ),
        Err(_) => (0, 0),
    };
    match std::fs::read(&abs) {
        Ok(bytes) => {
            let source = String::from_utf8_lossy(&bytes);
            let extraction = extract_source(rel, &source, &language);
            FileBundle {
                record: FileRecord {
                    path: rel.to_string(),
                    hash: hash_bytes(&bytes),
                    language,
                    size,
                    mtime,
                    indexed_at: now_ts(),
                    node_count: extraction.nodes.len() as i64,
                    error: None,
                },
                nodes: extraction.nodes,
                edges: extraction.edges,
                unresolved: extraction.unresolved,
            }
        }
        Err(e) => {
            log::warn!("unreadable file {rel}: {e}");
            FileBundle {
                record: FileRecord {
                    path: rel.to_string(),
                    hash: String::new(),
                    language,
                    size,
                    mtime,
                    indexed_at: now_ts(),
                    node_count: 0,
                    error: Some(format!("unreadable: {e}")),
                },
                nodes: Vec::new(),
                edges: Vec::new(),
                unresolved: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_flips_once() {
        let t = CancelToken::new();
        assert!(!t.is_cancelled());
        let clone = t.clone();
        clone.cancel();
        assert!(t.is_cancelled());
    }
}
