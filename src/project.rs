use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Name of the hidden state directory at the project root.
pub const GRAPH_DIR: &str = ".codegraph";
pub const DB_FILE: &str = "codegraph.db";
pub const CONFIG_FILE: &str = "config.json";
pub const LOCK_FILE: &str = ".lock";

/// Filesystem layout of a project's graph state.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub db: PathBuf,
    pub config: PathBuf,
    pub lock: PathBuf,
}

impl ProjectLayout {
    pub fn at(root: &Path) -> Self {
        let dir = root.join(GRAPH_DIR);
        Self {
            root: root.to_path_buf(),
            db: dir.join(DB_FILE),
            config: dir.join(CONFIG_FILE),
            lock: dir.join(LOCK_FILE),
            dir,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.db.is_file()
    }
}

/// Persisted configuration. The project root is always derived from the
/// directory the config was loaded from and never written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[serde(skip)]
    pub root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Explicit framework enable list; `None` means auto-detect.
    pub frameworks: Option<Vec<String>>,
    pub max_file_size: u64,
    pub semantic_search: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            include: [
                "**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx", "**/*.mjs", "**/*.cjs",
                "**/*.py", "**/*.rs", "**/*.svelte",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude: [
                "**/node_modules/**",
                "**/.git/**",
                "**/target/**",
                "**/dist/**",
                "**/build/**",
                "**/.venv/**",
                "**/__pycache__/**",
                "**/.codegraph/**",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            frameworks: None,
            max_file_size: 1024 * 1024,
            semantic_search: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path, root: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let mut cfg: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parse config: {}", path.display()))?;
        cfg.root = root.to_path_buf();
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("write config: {}", path.display()))?;
        Ok(())
    }
}

/// Keep the database and its WAL artifacts out of version control.
pub fn write_gitignore(dir: &Path) -> Result<()> {
    let path = dir.join(".gitignore");
    std::fs::write(&path, "codegraph.db\ncodegraph.db-wal\ncodegraph.db-shm\n.lock\n")
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_paths() {
        let l = ProjectLayout::at(Path::new("/tmp/proj"));
        assert_eq!(l.dir, Path::new("/tmp/proj/.codegraph"));
        assert_eq!(l.db, Path::new("/tmp/proj/.codegraph/codegraph.db"));
        assert!(!l.is_initialized());
    }

    #[test]
    fn config_round_trips_without_root() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.json");
        let mut cfg = Config::default();
        cfg.root = PathBuf::from("/somewhere/else");
        cfg.max_file_size = 42;
        cfg.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("somewhere"), "rootDir must never be persisted");

        let loaded = Config::load(&path, Path::new("/actual/root")).unwrap();
        assert_eq!(loaded.root, PathBuf::from("/actual/root"));
        assert_eq!(loaded.max_file_size, 42);
        assert_eq!(loaded.include, cfg.include);
    }

    #[test]
    fn config_tolerates_missing_fields() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.json");
        std::fs::write(&path, r#"{"maxFileSize": 7}"#).unwrap();
        let cfg = Config::load(&path, Path::new("/r")).unwrap();
        assert_eq!(cfg.max_file_size, 7);
        assert!(!cfg.include.is_empty());
    }
}
