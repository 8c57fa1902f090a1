use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GraphError, Result};
use crate::extract::FileBundle;
use crate::ir::reference::{Edge, EdgeKind, Provenance, UnresolvedRef};
use crate::ir::{FileRecord, Node, NodeId, NodeKind, Span};

pub mod migrations;

const BUSY_TIMEOUT_MS: i64 = 120_000;

const NODE_COLS: &str = "id, kind, name, qualified_name, file, language, \
     start_line, start_col, end_line, end_col, doc, signature, visibility, \
     exported, is_async, is_static, is_abstract, decorators, type_params, updated_at";

/// Transactional persistence for nodes, edges, file records and
/// unresolved references, plus the FTS secondary index.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub node: Node,
    /// Relevance in [0, 1], derived from the FTS rank.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct GraphStats {
    pub files: i64,
    pub nodes: i64,
    pub edges: i64,
    pub unresolved: i64,
    pub nodes_by_kind: BTreeMap<String, i64>,
    pub nodes_by_language: BTreeMap<String, i64>,
    pub edges_by_kind: BTreeMap<String, i64>,
    pub db_bytes: u64,
}

pub(crate) fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl Store {
    /// Open (creating if absent) the database at `path` and bring it up
    /// to the current schema. Refuses to open a file that is not a
    /// usable database or carries a newer schema than this build.
    pub fn open(path: &Path) -> Result<Store> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create store dir: {}", dir.display()))?;
        }
        let mut conn = Connection::open(path)
            .map_err(|e| GraphError::StoreCorrupt(format!("{}: {e}", path.display())))?;
        tune(&conn).map_err(|e| GraphError::StoreCorrupt(format!("{}: {e}", path.display())))?;
        migrations::apply(&mut conn)?;
        Ok(Store {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Store> {
        let mut conn = Connection::open_in_memory()?;
        tune(&conn)?;
        migrations::apply(&mut conn)?;
        Ok(Store {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── nodes ──────────────────────────────────────────────────────

    pub fn upsert_nodes(&mut self, nodes: &[Node]) -> Result<usize> {
        let now = now_ts();
        let tx = self.conn.transaction()?;
        let n = insert_nodes_in(&tx, nodes, now)?;
        tx.commit()?;
        Ok(n)
    }

    pub fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id.as_str()], node_from_row)
            .optional()?)
    }

    pub fn nodes_in_file(&self, path: &str) -> Result<Vec<Node>> {
        let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE file = ?1 ORDER BY start_line");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([path], node_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_node_by_qualified(&self, qualified: &str) -> Result<Option<Node>> {
        let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE qualified_name = ?1 LIMIT 1");
        Ok(self
            .conn
            .query_row(&sql, [qualified], node_from_row)
            .optional()?)
    }

    pub fn nodes_by_name(&self, name: &str) -> Result<Vec<Node>> {
        let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE name = ?1 ORDER BY file, start_line");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([name], node_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<Node>> {
        let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE kind = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([kind.as_str()], node_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn all_nodes(&self) -> Result<Vec<Node>> {
        let sql = format!("SELECT {NODE_COLS} FROM nodes");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], node_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Delete a file's nodes; edges and unresolved refs cascade.
    pub fn delete_file_nodes(&mut self, path: &str) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM nodes WHERE file = ?1", [path])?)
    }

    // ── edges ──────────────────────────────────────────────────────

    /// Batch insert, deduplicated on (source, target, kind, line, col).
    /// `contains` edges are checked against the single-parent and
    /// acyclicity invariants before insertion.
    pub fn insert_edges(&mut self, edges: &[Edge]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let n = insert_edges_in(&tx, edges)?;
        tx.commit()?;
        Ok(n)
    }

    pub fn outgoing(&self, id: &NodeId, kinds: Option<&[EdgeKind]>) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, target, kind, line, col, metadata, provenance \
             FROM edges WHERE source = ?1",
        )?;
        let rows = stmt.query_map([id.as_str()], edge_from_row)?;
        collect_edges(rows, kinds)
    }

    pub fn incoming(&self, id: &NodeId, kinds: Option<&[EdgeKind]>) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, target, kind, line, col, metadata, provenance \
             FROM edges WHERE target = ?1",
        )?;
        let rows = stmt.query_map([id.as_str()], edge_from_row)?;
        collect_edges(rows, kinds)
    }

    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, target, kind, line, col, metadata, provenance FROM edges",
        )?;
        let rows = stmt.query_map([], edge_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// (source file, target file) pairs of the file-level import graph.
    pub fn import_file_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT s.file, t.file FROM edges e \
             JOIN nodes s ON s.id = e.source \
             JOIN nodes t ON t.id = e.target \
             WHERE e.kind = 'imports' AND s.file <> t.file",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Nodes of the given kinds with no incoming edges of any kind.
    pub fn nodes_without_incoming(&self, kinds: &[NodeKind]) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        for kind in kinds {
            let sql = format!(
                "SELECT {NODE_COLS} FROM nodes n WHERE n.kind = ?1 \
                 AND NOT EXISTS (SELECT 1 FROM edges e WHERE e.target = n.id)"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([kind.as_str()], node_from_row)?;
            for r in rows {
                out.push(r?);
            }
        }
        out.sort_by(|a, b| (&a.file, a.span.start_line).cmp(&(&b.file, b.span.start_line)));
        Ok(out)
    }

    // ── files ──────────────────────────────────────────────────────

    pub fn upsert_file(&mut self, rec: &FileRecord) -> Result<()> {
        upsert_file_in(&self.conn, rec)?;
        Ok(())
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT path, hash, language, size, mtime, indexed_at, node_count, error \
                 FROM files WHERE path = ?1",
                [path],
                file_from_row,
            )
            .optional()?)
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, hash, language, size, mtime, indexed_at, node_count, error \
             FROM files ORDER BY path",
        )?;
        let rows = stmt.query_map([], file_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Remove a file record together with its nodes (cascading edges and
    /// unresolved refs) in one transaction.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM nodes WHERE file = ?1", [path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", [path])?;
        tx.commit()?;
        Ok(())
    }

    /// Rewrite a set of files as a unit: per file, previous nodes (and
    /// their incident edges and refs) are deleted, then the new bundle is
    /// inserted, all inside a single transaction.
    pub fn apply_file_batch(&mut self, bundles: &[FileBundle]) -> Result<()> {
        let now = now_ts();
        let tx = self.conn.transaction()?;
        for b in bundles {
            tx.execute("DELETE FROM nodes WHERE file = ?1", [b.record.path.as_str()])?;
            insert_nodes_in(&tx, &b.nodes, now)?;
            insert_edges_in(&tx, &b.edges)?;
            insert_urefs_in(&tx, &b.unresolved)?;
            upsert_file_in(&tx, &b.record)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── unresolved refs ────────────────────────────────────────────

    pub fn insert_unresolved(&mut self, refs: &[UnresolvedRef]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let n = insert_urefs_in(&tx, refs)?;
        tx.commit()?;
        Ok(n)
    }

    pub fn list_unresolved(&self) -> Result<Vec<UnresolvedRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, name, kind, line, col, file, language, candidates \
             FROM unresolved_refs ORDER BY id",
        )?;
        let rows = stmt.query_map([], uref_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn delete_unresolved_by_source(&mut self, id: &NodeId) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM unresolved_refs WHERE source = ?1", [id.as_str()])?)
    }

    // ── search ─────────────────────────────────────────────────────

    /// Full-text search over name, qualified name, docstring and
    /// signature. Scores are mapped from the FTS rank into [0, 1].
    pub fn search(
        &self,
        query: &str,
        kinds: Option<&[NodeKind]>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        // Over-fetch when a kind filter applies, then trim.
        let fetch = if kinds.is_some() { limit * 4 } else { limit };
        let sql = format!(
            "SELECT {cols}, bm25(nodes_fts) AS rank \
             FROM nodes_fts JOIN nodes n ON n.rowid = nodes_fts.rowid \
             WHERE nodes_fts MATCH ?1 ORDER BY rank LIMIT ?2",
            cols = NODE_COLS
                .split(", ")
                .map(|c| format!("n.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![match_expr, fetch as i64], |row| {
            let node = node_from_row(row)?;
            let rank: f64 = row.get(20)?;
            Ok((node, rank))
        })?;
        let mut hits = Vec::new();
        for r in rows {
            let (node, rank) = r?;
            if let Some(ks) = kinds {
                if !ks.contains(&node.kind) {
                    continue;
                }
            }
            let r = (-rank).max(0.0);
            hits.push(SearchHit {
                node,
                score: r / (r + 1.0),
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    // ── statistics ─────────────────────────────────────────────────

    pub fn stats(&self) -> Result<GraphStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |r| r.get(0))?)
        };
        let group = |sql: &str| -> Result<BTreeMap<String, i64>> {
            let mut stmt = self.conn.prepare(sql)?;
            let rows =
                stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            let mut m = BTreeMap::new();
            for r in rows {
                let (k, v) = r?;
                m.insert(k, v);
            }
            Ok(m)
        };
        let db_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(GraphStats {
            files: count("SELECT COUNT(*) FROM files")?,
            nodes: count("SELECT COUNT(*) FROM nodes")?,
            edges: count("SELECT COUNT(*) FROM edges")?,
            unresolved: count("SELECT COUNT(*) FROM unresolved_refs")?,
            nodes_by_kind: group("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?,
            nodes_by_language: group("SELECT language, COUNT(*) FROM nodes GROUP BY language")?,
            edges_by_kind: group("SELECT kind, COUNT(*) FROM edges GROUP BY kind")?,
            db_bytes,
        })
    }
}

fn tune(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "cache_size", -8192)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
    Ok(())
}

fn insert_nodes_in(conn: &Connection, nodes: &[Node], now: i64) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO nodes (id, kind, name, qualified_name, file, language, \
            start_line, start_col, end_line, end_col, doc, signature, visibility, \
            exported, is_async, is_static, is_abstract, decorators, type_params, updated_at) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20) \
         ON CONFLICT(id) DO UPDATE SET \
            kind=excluded.kind, name=excluded.name, qualified_name=excluded.qualified_name, \
            file=excluded.file, language=excluded.language, \
            start_line=excluded.start_line, start_col=excluded.start_col, \
            end_line=excluded.end_line, end_col=excluded.end_col, \
            doc=excluded.doc, signature=excluded.signature, visibility=excluded.visibility, \
            exported=excluded.exported, is_async=excluded.is_async, \
            is_static=excluded.is_static, is_abstract=excluded.is_abstract, \
            decorators=excluded.decorators, type_params=excluded.type_params, \
            updated_at=excluded.updated_at",
    )?;
    for n in nodes {
        let decorators = if n.decorators.is_empty() {
            None
        } else {
            serde_json::to_string(&n.decorators).ok()
        };
        let type_params = if n.type_params.is_empty() {
            None
        } else {
            serde_json::to_string(&n.type_params).ok()
        };
        stmt.execute(params![
            n.id.as_str(),
            n.kind.as_str(),
            n.name,
            n.qualified_name,
            n.file,
            n.language,
            n.span.start_line,
            n.span.start_col,
            n.span.end_line,
            n.span.end_col,
            n.doc,
            n.signature,
            n.visibility,
            n.exported,
            n.is_async,
            n.is_static,
            n.is_abstract,
            decorators,
            type_params,
            now,
        ])?;
    }
    Ok(nodes.len())
}

fn insert_edges_in(conn: &Connection, edges: &[Edge]) -> Result<usize> {
    let mut inserted = 0usize;
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO edges (source, target, kind, line, col, metadata, provenance) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for e in edges {
        if e.kind == EdgeKind::Contains {
            check_contains(conn, e)?;
        }
        let metadata = e.metadata.as_ref().and_then(|m| serde_json::to_string(m).ok());
        inserted += stmt.execute(params![
            e.source.as_str(),
            e.target.as_str(),
            e.kind.as_str(),
            e.line,
            e.column,
            metadata,
            e.provenance.as_str(),
        ])?;
    }
    Ok(inserted)
}

/// Reject `contains` edges that would break the single-parent or
/// acyclicity invariants. Walks the parent chain upward from the source.
fn check_contains(conn: &Connection, e: &Edge) -> Result<()> {
    if e.source == e.target {
        return Err(GraphError::Other(anyhow::anyhow!(
            "contains self-edge rejected: {}",
            e.source
        )));
    }
    let existing: Option<String> = conn
        .query_row(
            "SELECT source FROM edges WHERE target = ?1 AND kind = 'contains' LIMIT 1",
            [e.target.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(parent) = existing {
        if parent != e.source.0 {
            return Err(GraphError::Other(anyhow::anyhow!(
                "second contains parent rejected for {}",
                e.target
            )));
        }
        return Ok(());
    }
    // Walk upward from the new parent; reaching the child means a cycle.
    let mut cur = e.source.0.clone();
    let mut hops = 0u32;
    loop {
        let up: Option<String> = conn
            .query_row(
                "SELECT source FROM edges WHERE target = ?1 AND kind = 'contains' LIMIT 1",
                [cur.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        match up {
            Some(p) => {
                if p == e.target.0 {
                    return Err(GraphError::Other(anyhow::anyhow!(
                        "contains cycle rejected: {} -> {}",
                        e.source,
                        e.target
                    )));
                }
                cur = p;
            }
            None => return Ok(()),
        }
        hops += 1;
        if hops > 10_000 {
            return Err(GraphError::StoreCorrupt(
                "contains chain exceeds plausible depth".into(),
            ));
        }
    }
}

fn insert_urefs_in(conn: &Connection, refs: &[UnresolvedRef]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO unresolved_refs (source, name, kind, line, col, file, language, candidates) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for r in refs {
        let candidates = if r.candidates.is_empty() {
            None
        } else {
            serde_json::to_string(&r.candidates).ok()
        };
        stmt.execute(params![
            r.source.as_str(),
            r.name,
            r.kind.as_str(),
            r.line,
            r.column,
            r.file,
            r.language,
            candidates,
        ])?;
    }
    Ok(refs.len())
}

fn upsert_file_in(conn: &Connection, rec: &FileRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO files (path, hash, language, size, mtime, indexed_at, node_count, error) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(path) DO UPDATE SET \
            hash=excluded.hash, language=excluded.language, size=excluded.size, \
            mtime=excluded.mtime, indexed_at=excluded.indexed_at, \
            node_count=excluded.node_count, error=excluded.error",
        params![
            rec.path,
            rec.hash,
            rec.language,
            rec.size as i64,
            rec.mtime,
            rec.indexed_at,
            rec.node_count,
            rec.error,
        ],
    )?;
    Ok(())
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        hash: row.get(1)?,
        language: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        mtime: row.get(4)?,
        indexed_at: row.get(5)?,
        node_count: row.get(6)?,
        error: row.get(7)?,
    })
}

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let kind_s: String = row.get(1)?;
    let decorators: Option<String> = row.get(17)?;
    let type_params: Option<String> = row.get(18)?;
    Ok(Node {
        id: NodeId(row.get(0)?),
        kind: NodeKind::parse(&kind_s).unwrap_or(NodeKind::Variable),
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        file: row.get(4)?,
        language: row.get(5)?,
        span: Span {
            start_line: row.get(6)?,
            start_col: row.get(7)?,
            end_line: row.get(8)?,
            end_col: row.get(9)?,
        },
        doc: row.get(10)?,
        signature: row.get(11)?,
        visibility: row.get(12)?,
        exported: row.get(13)?,
        is_async: row.get(14)?,
        is_static: row.get(15)?,
        is_abstract: row.get(16)?,
        decorators: decorators
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        type_params: type_params
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        updated_at: row.get(19)?,
    })
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let kind_s: String = row.get(2)?;
    let metadata: Option<String> = row.get(5)?;
    let prov_s: String = row.get(6)?;
    Ok(Edge {
        source: NodeId(row.get(0)?),
        target: NodeId(row.get(1)?),
        kind: EdgeKind::parse(&kind_s).unwrap_or(EdgeKind::References),
        line: row.get(3)?,
        column: row.get(4)?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        provenance: Provenance::parse(&prov_s).unwrap_or_default(),
    })
}

fn uref_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UnresolvedRef> {
    let kind_s: String = row.get(2)?;
    let candidates: Option<String> = row.get(7)?;
    Ok(UnresolvedRef {
        source: NodeId(row.get(0)?),
        name: row.get(1)?,
        kind: EdgeKind::parse(&kind_s).unwrap_or(EdgeKind::References),
        line: row.get(3)?,
        column: row.get(4)?,
        file: row.get(5)?,
        language: row.get(6)?,
        candidates: candidates
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
    })
}

fn collect_edges(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<Edge>>,
    kinds: Option<&[EdgeKind]>,
) -> Result<Vec<Edge>> {
    let mut out = Vec::new();
    for r in rows {
        let e = r?;
        if let Some(ks) = kinds {
            if !ks.contains(&e.kind) {
                continue;
            }
        }
        out.push(e);
    }
    Ok(out)
}

/// Turn free text into an FTS5 prefix query, one quoted token per word.
fn fts_query(q: &str) -> Option<String> {
    let tokens: Vec<String> = q
        .split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.'))
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\"*"))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Span;
    use pretty_assertions::assert_eq;

    fn node(qname: &str, kind: NodeKind, file: &str) -> Node {
        let name = qname.rsplit(['.', ':']).next().unwrap().to_string();
        Node::new(kind, name, qname, file, "typescript", Span::lines(1, 3))
    }

    #[test]
    fn node_round_trip() {
        let mut store = Store::open_in_memory().unwrap();
        let mut n = node("src/a.ts::add", NodeKind::Function, "src/a.ts");
        n.doc = Some("adds two numbers".into());
        n.decorators = vec!["memo".into()];
        n.exported = true;
        store.upsert_nodes(std::slice::from_ref(&n)).unwrap();

        let got = store.get_node(&n.id).unwrap().unwrap();
        assert_eq!(got.qualified_name, n.qualified_name);
        assert_eq!(got.decorators, n.decorators);
        assert!(got.exported);
        assert!(got.updated_at > 0);
    }

    #[test]
    fn edges_dedupe_on_site() {
        let mut store = Store::open_in_memory().unwrap();
        let a = node("a.ts::f", NodeKind::Function, "a.ts");
        let b = node("b.ts::g", NodeKind::Function, "b.ts");
        store.upsert_nodes(&[a.clone(), b.clone()]).unwrap();

        let e = Edge::new(a.id.clone(), b.id.clone(), EdgeKind::Calls).at(3, 4);
        let n1 = store.insert_edges(&[e.clone(), e.clone()]).unwrap();
        assert_eq!(n1, 1);
        // Same endpoints, different site: kept as a distinct edge.
        let e2 = Edge::new(a.id.clone(), b.id.clone(), EdgeKind::Calls).at(9, 0);
        assert_eq!(store.insert_edges(&[e2]).unwrap(), 1);
        assert_eq!(store.outgoing(&a.id, None).unwrap().len(), 2);
    }

    #[test]
    fn deleting_file_nodes_cascades_edges_and_refs() {
        let mut store = Store::open_in_memory().unwrap();
        let a = node("a.ts::f", NodeKind::Function, "a.ts");
        let b = node("b.ts::g", NodeKind::Function, "b.ts");
        store.upsert_nodes(&[a.clone(), b.clone()]).unwrap();
        store
            .insert_edges(&[Edge::new(a.id.clone(), b.id.clone(), EdgeKind::Calls)])
            .unwrap();
        store
            .insert_unresolved(&[UnresolvedRef {
                source: a.id.clone(),
                name: "g".into(),
                kind: EdgeKind::Calls,
                line: 1,
                column: 0,
                file: "a.ts".into(),
                language: "typescript".into(),
                candidates: vec![],
            }])
            .unwrap();

        store.delete_file_nodes("a.ts").unwrap();
        assert!(store.get_node(&a.id).unwrap().is_none());
        assert!(store.incoming(&b.id, None).unwrap().is_empty());
        assert!(store.list_unresolved().unwrap().is_empty());
    }

    #[test]
    fn contains_invariants_enforced() {
        let mut store = Store::open_in_memory().unwrap();
        let f = node("a.ts", NodeKind::File, "a.ts");
        let c = node("a.ts::C", NodeKind::Class, "a.ts");
        let m = node("a.ts::C.m", NodeKind::Method, "a.ts");
        store.upsert_nodes(&[f.clone(), c.clone(), m.clone()]).unwrap();

        store
            .insert_edges(&[
                Edge::new(f.id.clone(), c.id.clone(), EdgeKind::Contains),
                Edge::new(c.id.clone(), m.id.clone(), EdgeKind::Contains),
            ])
            .unwrap();
        // A second parent for m is rejected.
        let err = store
            .insert_edges(&[Edge::new(f.id.clone(), m.id.clone(), EdgeKind::Contains)])
            .unwrap_err();
        assert!(err.to_string().contains("second contains parent"));
        // A cycle back to the root is rejected.
        let err = store
            .insert_edges(&[Edge::new(m.id.clone(), f.id.clone(), EdgeKind::Contains)])
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn fts_search_scores_in_unit_interval() {
        let mut store = Store::open_in_memory().unwrap();
        let mut n1 = node("src/util.ts::formatDate", NodeKind::Function, "src/util.ts");
        n1.doc = Some("format a date for display".into());
        let n2 = node("src/util.ts::parseDate", NodeKind::Function, "src/util.ts");
        store.upsert_nodes(&[n1, n2]).unwrap();

        let hits = store.search("format", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.name, "formatDate");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);

        let none = store
            .search("format", Some(&[NodeKind::Class]), 10)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn fts_stays_in_lockstep_after_delete() {
        let mut store = Store::open_in_memory().unwrap();
        let n = node("src/a.ts::zebra", NodeKind::Function, "src/a.ts");
        store.upsert_nodes(std::slice::from_ref(&n)).unwrap();
        assert_eq!(store.search("zebra", None, 10).unwrap().len(), 1);
        store.delete_file_nodes("src/a.ts").unwrap();
        assert!(store.search("zebra", None, 10).unwrap().is_empty());
    }

    #[test]
    fn stats_counts_by_kind() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .upsert_nodes(&[
                node("a.ts", NodeKind::File, "a.ts"),
                node("a.ts::f", NodeKind::Function, "a.ts"),
                node("a.ts::g", NodeKind::Function, "a.ts"),
            ])
            .unwrap();
        let st = store.stats().unwrap();
        assert_eq!(st.nodes, 3);
        assert_eq!(st.nodes_by_kind.get("function"), Some(&2));
        assert_eq!(st.nodes_by_kind.get("file"), Some(&1));
    }

    #[test]
    fn file_records_round_trip() {
        let mut store = Store::open_in_memory().unwrap();
        let rec = FileRecord {
            path: "src/a.ts".into(),
            hash: "abc".into(),
            language: "typescript".into(),
            size: 10,
            mtime: 111,
            indexed_at: 222,
            node_count: 2,
            error: None,
        };
        store.upsert_file(&rec).unwrap();
        assert_eq!(store.get_file("src/a.ts").unwrap().unwrap(), rec);
        store.remove_file("src/a.ts").unwrap();
        assert!(store.get_file("src/a.ts").unwrap().is_none());
    }
}
