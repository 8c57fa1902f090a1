use rusqlite::Connection;

use crate::error::{GraphError, Result};

/// One schema migration. Migrations are append-only; `sql` must be
/// idempotent for its version (guarded DDL).
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "base_schema",
        sql: r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            language TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            mtime INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL DEFAULT 0,
            node_count INTEGER NOT NULL DEFAULT 0,
            error TEXT
        );

        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            file TEXT NOT NULL,
            language TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            start_col INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            end_col INTEGER NOT NULL,
            doc TEXT,
            signature TEXT,
            visibility TEXT,
            exported INTEGER NOT NULL DEFAULT 0,
            is_async INTEGER NOT NULL DEFAULT 0,
            is_static INTEGER NOT NULL DEFAULT 0,
            is_abstract INTEGER NOT NULL DEFAULT 0,
            decorators TEXT,
            type_params TEXT,
            updated_at INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file);
        CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
        CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);
        CREATE INDEX IF NOT EXISTS idx_nodes_qualified ON nodes(qualified_name);

        CREATE TABLE IF NOT EXISTS edges (
            source TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            target TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            line INTEGER,
            col INTEGER,
            metadata TEXT,
            provenance TEXT NOT NULL DEFAULT 'parser'
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_unique
            ON edges(source, target, kind, ifnull(line, -1), ifnull(col, -1));
        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);

        CREATE TABLE IF NOT EXISTS unresolved_refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            line INTEGER NOT NULL,
            col INTEGER NOT NULL,
            file TEXT NOT NULL,
            language TEXT NOT NULL,
            candidates TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_urefs_source ON unresolved_refs(source);
        CREATE INDEX IF NOT EXISTS idx_urefs_file ON unresolved_refs(file);
        "#,
    },
    Migration {
        version: 2,
        name: "fts_index",
        sql: r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
            name, qualified_name, doc, signature,
            content='nodes', content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS nodes_fts_ai AFTER INSERT ON nodes BEGIN
            INSERT INTO nodes_fts(rowid, name, qualified_name, doc, signature)
            VALUES (new.rowid, new.name, new.qualified_name, new.doc, new.signature);
        END;

        CREATE TRIGGER IF NOT EXISTS nodes_fts_ad AFTER DELETE ON nodes BEGIN
            INSERT INTO nodes_fts(nodes_fts, rowid, name, qualified_name, doc, signature)
            VALUES ('delete', old.rowid, old.name, old.qualified_name, old.doc, old.signature);
        END;

        CREATE TRIGGER IF NOT EXISTS nodes_fts_au AFTER UPDATE ON nodes BEGIN
            INSERT INTO nodes_fts(nodes_fts, rowid, name, qualified_name, doc, signature)
            VALUES ('delete', old.rowid, old.name, old.qualified_name, old.doc, old.signature);
            INSERT INTO nodes_fts(rowid, name, qualified_name, doc, signature)
            VALUES (new.rowid, new.name, new.qualified_name, new.doc, new.signature);
        END;
        "#,
    },
    Migration {
        version: 3,
        name: "edge_kind_and_uref_name_indexes",
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_edges_kind ON edges(kind);
        CREATE INDEX IF NOT EXISTS idx_urefs_name ON unresolved_refs(name);
        "#,
    },
];

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

fn recorded_version(conn: &Connection) -> Result<i64> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(v.and_then(|s| s.parse().ok()).unwrap_or(0))
}

/// Bring the database up to the latest schema. Each pending migration
/// runs in its own transaction which also records the new version, so a
/// failure rolls back both the DDL and the bookkeeping.
pub fn apply(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
    )?;

    let current = recorded_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(GraphError::StoreCorrupt(format!(
            "schema version {current} is newer than supported version {latest}"
        )));
    }

    for m in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!("applying schema migration v{} ({})", m.version, m.name);
        let apply_one = |conn: &mut Connection| -> rusqlite::Result<()> {
            let tx = conn.transaction()?;
            tx.execute_batch(m.sql)?;
            tx.execute(
                "INSERT OR REPLACE INTO meta(key, value) VALUES('schema_version', ?1)",
                [m.version.to_string()],
            )?;
            tx.commit()
        };
        apply_one(conn).map_err(|e| GraphError::MigrationFailed {
            version: m.version,
            source: e,
        })?;
    }
    Ok(())
}
