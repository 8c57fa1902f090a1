use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;
use crate::ir::FileRecord;
use crate::project::GRAPH_DIR;

/// File-level difference between the working tree and the last-indexed
/// state. Paths are repo-relative with forward slashes.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Delta {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Compiled include/exclude sets. Excludes win; includes are a
/// disjunction. `**` crosses segments, `*` stays within one, `?` matches
/// a single character.
pub struct GlobFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl GlobFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn matches(&self, rel: &str) -> bool {
        if self.exclude.is_match(rel) {
            return false;
        }
        self.include.is_match(rel)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        let glob = GlobBuilder::new(p)
            .literal_separator(true)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid glob {p:?}: {e}"))?;
        b.add(glob);
    }
    b.build()
        .map_err(|e| anyhow::anyhow!("glob set: {e}").into())
}

/// Enumerate candidate files under `root`. Symlinks are not followed, so
/// the walk cannot escape the project root; the `.codegraph` state
/// directory is always skipped. Files over `max_file_size` are skipped
/// with a warning.
pub fn enumerate_files(root: &Path, filter: &GlobFilter, max_file_size: u64) -> Vec<ScannedFile> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_str().unwrap_or("");
            !(e.file_type().is_dir() && (name == GRAPH_DIR || name == ".git"))
        })
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_path(root, entry.path()) else {
            continue;
        };
        if !filter.matches(&rel) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() > max_file_size {
            log::warn!(
                "skipping {rel}: {} bytes exceeds limit {max_file_size}",
                meta.len()
            );
            continue;
        }
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        out.push(ScannedFile {
            rel,
            abs: entry.path().to_path_buf(),
            size: meta.len(),
            mtime,
        });
    }
    out.sort_by(|a, b| a.rel.cmp(&b.rel));
    out
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel: String,
    pub abs: PathBuf,
    pub size: u64,
    pub mtime: i64,
}

/// Diff the enumerated files against the last-indexed records. Content
/// identity is the blake3 digest of the file bytes; mtime+size only
/// decide which files get re-digested.
pub fn scan_delta(
    root: &Path,
    filter: &GlobFilter,
    max_file_size: u64,
    known: &[FileRecord],
) -> Delta {
    let known_by_path: HashMap<&str, &FileRecord> =
        known.iter().map(|r| (r.path.as_str(), r)).collect();
    let files = enumerate_files(root, filter, max_file_size);

    let mut delta = Delta::default();
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for f in &files {
        match known_by_path.get(f.rel.as_str()) {
            None => delta.added.push(f.rel.clone()),
            Some(rec) => {
                let unchanged_meta = rec.mtime == f.mtime && rec.size == f.size;
                if !unchanged_meta {
                    match hash_file(&f.abs) {
                        Some(h) if h == rec.hash => {}
                        Some(_) => delta.modified.push(f.rel.clone()),
                        // Unreadable now; let extraction record the error.
                        None => delta.modified.push(f.rel.clone()),
                    }
                }
            }
        }
    }
    for f in &files {
        seen.insert(f.rel.as_str());
    }
    for rec in known {
        if !seen.contains(rec.path.as_str()) {
            delta.removed.push(rec.path.clone());
        }
    }
    delta
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(bytes);
    hasher.finalize().to_hex().to_string()
}

pub fn hash_file(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|b| hash_bytes(&b))
}

/// Repo-relative, forward-slash normalized.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn filter(include: &[&str], exclude: &[&str]) -> GlobFilter {
        GlobFilter::new(
            &include.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &exclude.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn glob_semantics() {
        let f = filter(&["**/*.ts", "*.ts"], &["**/node_modules/**"]);
        assert!(f.matches("src/a.ts"));
        assert!(f.matches("a.ts"));
        assert!(f.matches("src/deep/nested/b.ts"));
        assert!(!f.matches("src/a.js"));
        assert!(!f.matches("node_modules/pkg/a.ts"));
        assert!(!f.matches("src/node_modules/pkg/a.ts"));

        let q = filter(&["src/?.ts"], &[]);
        assert!(q.matches("src/a.ts"));
        assert!(!q.matches("src/ab.ts"));
    }

    #[test]
    fn star_does_not_cross_segments() {
        let f = filter(&["src/*.ts"], &[]);
        assert!(f.matches("src/a.ts"));
        assert!(!f.matches("src/sub/a.ts"));
    }

    #[test]
    fn delta_detects_add_modify_remove() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/a.ts"), "export function a() {}\n").unwrap();
        fs::write(root.join("src/b.ts"), "export function b() {}\n").unwrap();

        let f = filter(&["**/*.ts"], &[]);
        let d0 = scan_delta(root, &f, 1 << 20, &[]);
        assert_eq!(d0.added, vec!["src/a.ts".to_string(), "src/b.ts".to_string()]);
        assert!(d0.modified.is_empty() && d0.removed.is_empty());

        // Simulate the post-index state, then modify a and remove b.
        let known: Vec<FileRecord> = ["src/a.ts", "src/b.ts"]
            .iter()
            .map(|p| {
                let abs = root.join(p);
                let meta = fs::metadata(&abs).unwrap();
                FileRecord {
                    path: p.to_string(),
                    hash: hash_file(&abs).unwrap(),
                    language: "typescript".into(),
                    size: meta.len(),
                    mtime: meta
                        .modified()
                        .unwrap()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_secs() as i64,
                    indexed_at: 0,
                    node_count: 0,
                    error: None,
                }
            })
            .collect();

        fs::write(root.join("src/a.ts"), "export function a2() {}\n").unwrap();
        // Force an mtime difference so the digest path runs.
        let known2: Vec<FileRecord> = known
            .iter()
            .map(|r| FileRecord {
                mtime: r.mtime - 10,
                ..r.clone()
            })
            .collect();
        fs::remove_file(root.join("src/b.ts")).unwrap();

        let d1 = scan_delta(root, &f, 1 << 20, &known2);
        assert_eq!(d1.added, Vec::<String>::new());
        assert_eq!(d1.modified, vec!["src/a.ts".to_string()]);
        assert_eq!(d1.removed, vec!["src/b.ts".to_string()]);
    }

    #[test]
    fn unchanged_content_with_new_mtime_is_not_modified() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("a.ts"), "const x = 1;\n").unwrap();
        let f = filter(&["**/*.ts", "*.ts"], &[]);
        let abs = root.join("a.ts");
        let meta = fs::metadata(&abs).unwrap();
        let rec = FileRecord {
            path: "a.ts".into(),
            hash: hash_file(&abs).unwrap(),
            language: "typescript".into(),
            size: meta.len(),
            mtime: 1, // stale mtime forces re-hash
            indexed_at: 0,
            node_count: 0,
            error: None,
        };
        let d = scan_delta(root, &f, 1 << 20, &[rec]);
        assert!(d.is_empty());
    }

    #[test]
    fn oversize_files_are_skipped_and_boundary_included() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("small.ts"), vec![b'x'; 64]).unwrap();
        fs::write(root.join("big.ts"), vec![b'x'; 65]).unwrap();
        let f = filter(&["*.ts"], &[]);
        let files = enumerate_files(root, &f, 64);
        let names: Vec<_> = files.iter().map(|s| s.rel.as_str()).collect();
        assert_eq!(names, vec!["small.ts"]);
    }

    #[test]
    fn rename_with_same_content_is_remove_plus_add() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("old.ts"), "export const k = 1;\n").unwrap();
        let f = filter(&["*.ts"], &[]);
        let abs = root.join("old.ts");
        let meta = fs::metadata(&abs).unwrap();
        let rec = FileRecord {
            path: "old.ts".into(),
            hash: hash_file(&abs).unwrap(),
            language: "typescript".into(),
            size: meta.len(),
            mtime: 0,
            indexed_at: 0,
            node_count: 0,
            error: None,
        };
        fs::rename(root.join("old.ts"), root.join("new.ts")).unwrap();
        let d = scan_delta(root, &f, 1 << 20, &[rec]);
        assert_eq!(d.added, vec!["new.ts".to_string()]);
        assert_eq!(d.removed, vec!["old.ts".to_string()]);
        assert!(d.modified.is_empty());
    }
}
