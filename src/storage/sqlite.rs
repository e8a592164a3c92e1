//! SQLite persistence backend

use super::traits::{OpenStore, PersistentStore, StorageError, StorageResult};
use crate::graph::{CentralityScores, ChangeSet, Edge, EdgeKey, EdgeType, Node, NodeId, NodeKind};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed persistence
///
/// One database file with a `nodes` and an `edges` table. Edges are keyed by
/// `(source, target, edge_type)` and cascade when their endpoint is deleted.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const NODE_COLUMNS: &str = "id, kind, title, domain, layer, narrative, external_refs_json, \
     community_id, pagerank, betweenness, created_at, updated_at, date";

const DATE_FORMAT: &str = "%Y-%m-%d";

const EDGE_COLUMNS: &str = "source_id, target_id, edge_type, weight, created_at";

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                domain TEXT NOT NULL DEFAULT '',
                layer TEXT,
                narrative TEXT NOT NULL DEFAULT '',
                external_refs_json TEXT NOT NULL DEFAULT '[]',
                community_id INTEGER,
                pagerank REAL,
                betweenness REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                date TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_community ON nodes(community_id);

            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id, edge_type),
                FOREIGN KEY (source_id) REFERENCES nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES nodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);

            PRAGMA foreign_keys = ON;

            -- Concurrent readers while the single writer flushes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection mutex poisoned".to_string()))
    }

    fn write_node(conn: &Connection, node: &Node) -> StorageResult<()> {
        let refs = serde_json::to_string(&node.external_refs)?;
        let (pagerank, betweenness) = match node.centrality {
            Some(scores) => (Some(scores.pagerank), Some(scores.betweenness)),
            None => (None, None),
        };
        conn.execute(
            r#"
            INSERT INTO nodes (id, kind, title, domain, layer, narrative, external_refs_json,
                               community_id, pagerank, betweenness, created_at, updated_at, date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                domain = excluded.domain,
                layer = excluded.layer,
                narrative = excluded.narrative,
                external_refs_json = excluded.external_refs_json,
                community_id = excluded.community_id,
                pagerank = excluded.pagerank,
                betweenness = excluded.betweenness,
                updated_at = excluded.updated_at,
                date = excluded.date
            "#,
            params![
                node.id.as_str(),
                node.kind.as_str(),
                node.title,
                node.domain,
                node.layer,
                node.narrative,
                refs,
                node.community_id,
                pagerank,
                betweenness,
                node.created_at.to_rfc3339(),
                node.updated_at.to_rfc3339(),
                node.date.map(|d| d.format(DATE_FORMAT).to_string()),
            ],
        )?;
        Ok(())
    }

    fn write_edge(conn: &Connection, edge: &Edge) -> StorageResult<bool> {
        let existed = conn
            .query_row(
                "SELECT 1 FROM edges WHERE source_id = ?1 AND target_id = ?2 AND edge_type = ?3",
                params![edge.source.as_str(), edge.target.as_str(), edge.edge_type.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        conn.execute(
            r#"
            INSERT INTO edges (source_id, target_id, edge_type, weight, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
                weight = excluded.weight
            "#,
            params![
                edge.source.as_str(),
                edge.target.as_str(),
                edge.edge_type.as_str(),
                edge.weight,
                edge.created_at.to_rfc3339(),
            ],
        )?;
        Ok(!existed)
    }

    fn erase_node(conn: &Connection, id: &NodeId) -> StorageResult<bool> {
        // Explicit so stores opened without the pragma still cascade
        conn.execute(
            "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
            params![id.as_str()],
        )?;
        let rows = conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn erase_edge(conn: &Connection, key: &EdgeKey) -> StorageResult<bool> {
        let rows = conn.execute(
            "DELETE FROM edges WHERE source_id = ?1 AND target_id = ?2 AND edge_type = ?3",
            params![key.source.as_str(), key.target.as_str(), key.edge_type.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn parse_date(raw: &str) -> StorageResult<NaiveDate> {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StorageError::DateParse(e.to_string()))
    }

    /// Deserialize a node from a `NODE_COLUMNS` row
    fn row_to_node(row: &Row<'_>) -> StorageResult<Node> {
        let kind: String = row.get(1)?;
        let refs: String = row.get(6)?;
        let pagerank: Option<f64> = row.get(8)?;
        let betweenness: Option<f64> = row.get(9)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;
        let date: Option<String> = row.get(12)?;

        Ok(Node {
            id: NodeId::from_string(row.get::<_, String>(0)?),
            kind: kind.parse::<NodeKind>().map_err(StorageError::CorruptRow)?,
            title: row.get(2)?,
            domain: row.get(3)?,
            layer: row.get(4)?,
            narrative: row.get(5)?,
            external_refs: serde_json::from_str(&refs)?,
            date: date.as_deref().map(Self::parse_date).transpose()?,
            community_id: row.get(7)?,
            centrality: match (pagerank, betweenness) {
                (Some(pagerank), Some(betweenness)) => Some(CentralityScores { pagerank, betweenness }),
                _ => None,
            },
            created_at: Self::parse_time(&created_at)?,
            updated_at: Self::parse_time(&updated_at)?,
        })
    }

    /// Deserialize an edge from an `EDGE_COLUMNS` row
    fn row_to_edge(row: &Row<'_>) -> StorageResult<Edge> {
        let edge_type: String = row.get(2)?;
        let created_at: String = row.get(4)?;
        Ok(Edge {
            source: NodeId::from_string(row.get::<_, String>(0)?),
            target: NodeId::from_string(row.get::<_, String>(1)?),
            edge_type: edge_type.parse::<EdgeType>().map_err(StorageError::CorruptRow)?,
            weight: row.get(3)?,
            created_at: Self::parse_time(&created_at)?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PersistentStore for SqliteStore {
    fn upsert_node(&self, node: &Node) -> StorageResult<()> {
        let conn = self.lock()?;
        Self::write_node(&conn, node)
    }

    fn upsert_edge(&self, edge: &Edge) -> StorageResult<bool> {
        let conn = self.lock()?;
        Self::write_edge(&conn, edge)
    }

    fn delete_node(&self, id: &NodeId) -> StorageResult<bool> {
        let conn = self.lock()?;
        Self::erase_node(&conn, id)
    }

    fn delete_edge(&self, key: &EdgeKey) -> StorageResult<bool> {
        let conn = self.lock()?;
        Self::erase_edge(&conn, key)
    }

    fn all_nodes(&self) -> StorageResult<Vec<Node>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM nodes ORDER BY id", NODE_COLUMNS))?;
        let mut rows = stmt.query([])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(Self::row_to_node(row)?);
        }
        Ok(nodes)
    }

    fn all_edges(&self) -> StorageResult<Vec<Edge>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM edges ORDER BY source_id, target_id, edge_type",
            EDGE_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(Self::row_to_edge(row)?);
        }
        Ok(edges)
    }

    /// One SQLite transaction per change set: all of it lands or none of it.
    fn flush(&self, changes: &ChangeSet) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for key in &changes.removed_edges {
            Self::erase_edge(&tx, key)?;
        }
        for id in &changes.removed_nodes {
            Self::erase_node(&tx, id)?;
        }
        for node in changes.upserted_nodes.values() {
            Self::write_node(&tx, node)?;
        }
        for edge in changes.upserted_edges.values() {
            Self::write_edge(&tx, edge)?;
        }
        tx.commit()?;
        Ok(())
    }
}
