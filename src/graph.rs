use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{GraphError, Result};
use crate::index::{CancelToken, IndexProgress, IndexReport, Indexer};
use crate::ir::NodeKind;
use crate::lock::{FileLock, LOCK_WAIT, process_lock};
use crate::project::{Config, ProjectLayout, write_gitignore};
use crate::resolve::frameworks::{FrameworkResolver, default_frameworks};
use crate::store::{GraphStats, SearchHit, Store};
use crate::traverse::Traverser;
use crate::vector::VectorManager;

/// A project's code graph: exclusive owner of the store handle, the
/// framework registry and (during writes) the locks. Multiple read-only
/// instances over the same store are fine; writers coordinate through
/// the in-process mutex and the advisory file lock.
pub struct CodeGraph {
    layout: ProjectLayout,
    config: Config,
    store: Store,
    frameworks: Vec<Box<dyn FrameworkResolver>>,
    vectors: Option<Box<dyn VectorManager>>,
    proc_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CodeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeGraph")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CodeGraph {
    /// Create `.codegraph/` under `root` and open an empty store.
    pub fn init(root: &Path, mut config: Config) -> Result<Self> {
        let layout = ProjectLayout::at(root);
        if layout.is_initialized() {
            return Err(GraphError::AlreadyInitialized(layout.dir));
        }
        std::fs::create_dir_all(&layout.dir)?;
        config.root = layout.root.clone();
        config.save(&layout.config)?;
        write_gitignore(&layout.dir)?;
        let store = Store::open(&layout.db)?;
        log::info!("initialized {}", layout.dir.display());
        Ok(Self {
            proc_lock: process_lock(&layout.db),
            layout,
            config,
            store,
            frameworks: default_frameworks(),
            vectors: None,
        })
    }

    /// Open an initialized project; applies pending schema migrations.
    /// The config's root is always derived from `root`, never from the
    /// persisted file.
    pub fn open(root: &Path) -> Result<Self> {
        let layout = ProjectLayout::at(root);
        if !layout.is_initialized() {
            return Err(GraphError::NotInitialized(layout.db));
        }
        let config = if layout.config.is_file() {
            Config::load(&layout.config, &layout.root)?
        } else {
            Config {
                root: layout.root.clone(),
                ..Config::default()
            }
        };
        let store = Store::open(&layout.db)?;
        Ok(Self {
            proc_lock: process_lock(&layout.db),
            layout,
            config,
            store,
            frameworks: default_frameworks(),
            vectors: None,
        })
    }

    /// Remove `.codegraph/` entirely.
    pub fn uninit(root: &Path) -> Result<()> {
        let layout = ProjectLayout::at(root);
        if !layout.dir.is_dir() {
            return Err(GraphError::NotInitialized(layout.dir));
        }
        std::fs::remove_dir_all(&layout.dir)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn traverser(&self) -> Traverser<'_> {
        Traverser::new(&self.store)
    }

    pub fn set_vector_manager(&mut self, v: Box<dyn VectorManager>) {
        self.vectors = Some(v);
    }

    pub fn has_semantic_search(&self) -> bool {
        self.config.semantic_search && self.vectors.is_some()
    }

    /// Delta sync: scan, extract changed files, resolve references.
    /// Holds the in-process mutex (blocks until free) and the advisory
    /// file lock (bounded wait, `LockBusy` on expiry).
    pub fn sync(
        &mut self,
        progress: Option<&dyn Fn(IndexProgress)>,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let mutex = self.proc_lock.clone();
        let _guard = mutex.lock().unwrap_or_else(|p| p.into_inner());
        let _file_lock = FileLock::acquire(&self.layout.lock, LOCK_WAIT)?;
        let mut indexer = Indexer {
            store: &mut self.store,
            config: &self.config,
            frameworks: &self.frameworks,
        };
        indexer.sync(progress, cancel)
    }

    /// Full re-index of every matching file.
    pub fn index_all(
        &mut self,
        progress: Option<&dyn Fn(IndexProgress)>,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        let mutex = self.proc_lock.clone();
        let _guard = mutex.lock().unwrap_or_else(|p| p.into_inner());
        let _file_lock = FileLock::acquire(&self.layout.lock, LOCK_WAIT)?;
        let mut indexer = Indexer {
            store: &mut self.store,
            config: &self.config,
            frameworks: &self.frameworks,
        };
        indexer.index_all(progress, cancel)
    }

    /// Re-extract an explicit set of repo-relative paths.
    pub fn index_files(&mut self, paths: &[String]) -> Result<IndexReport> {
        let mutex = self.proc_lock.clone();
        let _guard = mutex.lock().unwrap_or_else(|p| p.into_inner());
        let _file_lock = FileLock::acquire(&self.layout.lock, LOCK_WAIT)?;
        let mut indexer = Indexer {
            store: &mut self.store,
            config: &self.config,
            frameworks: &self.frameworks,
        };
        indexer.index_files(paths, None, &CancelToken::new())
    }

    /// Full-text search, optionally augmented by the vector collaborator
    /// when semantic search is enabled.
    pub fn search(
        &self,
        query: &str,
        kinds: Option<&[NodeKind]>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = self.store.search(query, kinds, limit)?;
        if self.config.semantic_search {
            match &self.vectors {
                Some(v) => match v.search_similar(query, limit) {
                    Ok(similar) => {
                        for (id, score) in similar {
                            if hits.iter().any(|h| h.node.id == id) {
                                continue;
                            }
                            if let Some(node) = self.store.get_node(&id)? {
                                if kinds.map(|ks| ks.contains(&node.kind)).unwrap_or(true) {
                                    hits.push(SearchHit { node, score });
                                }
                            }
                        }
                        hits.sort_by(|a, b| {
                            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
                        });
                        hits.truncate(limit);
                    }
                    Err(e) => log::warn!("vector search failed, using FTS only: {e}"),
                },
                None => {
                    log::debug!("semantic search enabled but no vector manager attached");
                }
            }
        }
        Ok(hits)
    }

    pub fn stats(&self) -> Result<GraphStats> {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeId;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn init_open_uninit_lifecycle() {
        let td = tempdir().unwrap();
        let root = td.path();
        let g = CodeGraph::init(root, Config::default()).unwrap();
        drop(g);
        assert!(root.join(".codegraph/codegraph.db").is_file());
        assert!(root.join(".codegraph/.gitignore").is_file());

        let err = CodeGraph::init(root, Config::default()).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyInitialized(_)));

        let g = CodeGraph::open(root).unwrap();
        assert_eq!(g.config().root, root);
        drop(g);

        CodeGraph::uninit(root).unwrap();
        assert!(!root.join(".codegraph").exists());
        let err = CodeGraph::open(root).unwrap_err();
        assert!(matches!(err, GraphError::NotInitialized(_)));
    }

    #[test]
    fn sync_indexes_single_file_scenario() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/a.ts"),
            "export function add(x:number,y:number){return x+y;}\n",
        )
        .unwrap();

        let mut g = CodeGraph::init(root, Config::default()).unwrap();
        let report = g.sync(None, &CancelToken::new()).unwrap();
        assert_eq!(report.files_added, 1);
        assert!(!report.cancelled);

        let stats = g.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.nodes_by_kind.get("file"), Some(&1));
        assert_eq!(stats.nodes_by_kind.get("function"), Some(&1));
        assert_eq!(stats.edges_by_kind.get("contains"), Some(&1));

        // Node count matches the file record.
        let rec = g.store().get_file("src/a.ts").unwrap().unwrap();
        assert_eq!(rec.node_count, 2);

        // Second sync with no change is a no-op.
        let second = g.sync(None, &CancelToken::new()).unwrap();
        assert_eq!(
            (second.files_added, second.files_modified, second.files_removed),
            (0, 0, 0)
        );
    }

    #[test]
    fn search_after_sync_finds_function() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("util.ts"), "export function formatDate(d: string) { return d; }\n")
            .unwrap();
        let mut g = CodeGraph::init(root, Config::default()).unwrap();
        g.sync(None, &CancelToken::new()).unwrap();
        let hits = g.search("formatDate", None, 10).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].node.name, "formatDate");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
    }

    #[test]
    fn vector_absence_is_non_fatal() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("a.ts"), "export function go() {}\n").unwrap();
        let mut cfg = Config::default();
        cfg.semantic_search = true;
        let mut g = CodeGraph::init(root, cfg).unwrap();
        g.sync(None, &CancelToken::new()).unwrap();
        assert!(!g.has_semantic_search());
        assert!(!g.search("go", None, 5).unwrap().is_empty());
    }

    struct FakeVectors(NodeId);
    impl crate::vector::VectorManager for FakeVectors {
        fn search_similar(
            &self,
            _query: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<(NodeId, f64)>> {
            Ok(vec![(self.0.clone(), 0.99)])
        }
    }

    #[test]
    fn vector_hits_merge_into_search() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("a.ts"), "export function alpha() {}\nexport function beta() {}\n")
            .unwrap();
        let mut cfg = Config::default();
        cfg.semantic_search = true;
        let mut g = CodeGraph::init(root, cfg).unwrap();
        g.sync(None, &CancelToken::new()).unwrap();
        let beta = NodeId::derive("a.ts::beta");
        g.set_vector_manager(Box::new(FakeVectors(beta.clone())));
        assert!(g.has_semantic_search());
        let hits = g.search("alpha", None, 10).unwrap();
        assert!(hits.iter().any(|h| h.node.id == beta));
    }
}
