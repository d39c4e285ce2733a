//! SQLite storage backend for the concept graph

use super::records::{
    domain_from_row, field_from_row, fmt_ts, task_column, CheckpointRecord, ClusterRecord,
    EdgeRecord, EntryRecord, NodeRecord, CHECKPOINT_COLUMNS, CLUSTER_COLUMNS, EDGE_COLUMNS,
    ENTRY_COLUMNS, NODE_COLUMNS,
};
use super::traits::{
    sort_for_listing, GraphStore, NodeFilter, OpenStore, Sighting, StorageError, StorageResult,
};
use crate::graph::{
    normalize_key, Checkpoint, Cluster, ClusterId, ClusterType, Domain, Edge, EdgeKey, Field,
    MasterEntry, Node, NodeId, NodeType, OwnerId, TaskId, Taxonomy,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// How long a writer waits on another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed graph store
///
/// One database file holds nodes, edges, clusters, checkpoints and the
/// taxonomy. Thread-safe via an internal mutex on the connection; several
/// processes may open the same file, and every upsert runs inside an
/// `IMMEDIATE` transaction so the find-or-create step is serialized by SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                label TEXT NOT NULL,
                normalized_key TEXT NOT NULL,
                frequency INTEGER NOT NULL,
                understanding_level TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                master_entry_id TEXT,
                domain_id TEXT,
                field_id TEXT,
                contact_id TEXT,
                confirmed INTEGER NOT NULL DEFAULT 0,
                source_contexts_json TEXT NOT NULL,
                UNIQUE (owner_id, node_type, normalized_key)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_owner_frequency
                ON nodes(owner_id, frequency DESC);

            -- task_id '' is the unscoped edge set
            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                task_id TEXT NOT NULL DEFAULT '',
                edge_type TEXT NOT NULL,
                weight INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (source_id, target_id, task_id),
                CHECK (source_id < target_id),
                CHECK (weight >= 1)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_owner_task
                ON edges(owner_id, task_id);

            CREATE TABLE IF NOT EXISTS clusters (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                cluster_type TEXT NOT NULL,
                summary TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (task_id, owner_id, cluster_type)
            );

            CREATE TABLE IF NOT EXISTS cluster_members (
                cluster_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                PRIMARY KEY (cluster_id, node_id),
                FOREIGN KEY (cluster_id) REFERENCES clusters(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                node_ids_json TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL,
                summary TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoints_task
                ON checkpoints(task_id, timestamp);

            CREATE TABLE IF NOT EXISTS domains (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                color TEXT
            );

            CREATE TABLE IF NOT EXISTS fields (
                id TEXT PRIMARY KEY,
                domain_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS master_entries (
                id TEXT PRIMARY KEY,
                field_id TEXT NOT NULL,
                label TEXT NOT NULL,
                normalized_label TEXT NOT NULL,
                synonyms_json TEXT NOT NULL,
                UNIQUE (field_id, normalized_label)
            );

            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    fn query_nodes(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<Node>> {
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, NodeRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        records.into_iter().map(NodeRecord::into_node).collect()
    }

    fn select_node(
        conn: &Connection,
        owner_id: &OwnerId,
        node_type: NodeType,
        normalized_key: &str,
    ) -> StorageResult<Option<Node>> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE owner_id = ?1 AND node_type = ?2 AND normalized_key = ?3"
        );
        let record = conn
            .query_row(
                &sql,
                params![owner_id.as_str(), node_type.as_str(), normalized_key],
                NodeRecord::from_row,
            )
            .optional()?;
        record.map(NodeRecord::into_node).transpose()
    }

    fn insert_node(conn: &Connection, node: &Node) -> StorageResult<()> {
        let r = NodeRecord::from_node(node)?;
        conn.execute(
            &format!(
                "INSERT INTO nodes ({NODE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                r.id,
                r.owner_id,
                r.node_type,
                r.label,
                r.normalized_key,
                r.frequency,
                r.understanding_level,
                r.first_seen_at,
                r.last_seen_at,
                r.master_entry_id,
                r.domain_id,
                r.field_id,
                r.contact_id,
                r.confirmed,
                r.source_contexts_json,
            ],
        )?;
        Ok(())
    }

    /// Write the history and the fields derived from it
    fn update_history(conn: &Connection, node: &Node) -> StorageResult<()> {
        let r = NodeRecord::from_node(node)?;
        conn.execute(
            r#"
            UPDATE nodes SET
                frequency = ?2,
                understanding_level = ?3,
                first_seen_at = ?4,
                last_seen_at = ?5,
                source_contexts_json = ?6
            WHERE id = ?1
            "#,
            params![
                r.id,
                r.frequency,
                r.understanding_level,
                r.first_seen_at,
                r.last_seen_at,
                r.source_contexts_json,
            ],
        )?;
        Ok(())
    }

    fn select_cluster(
        conn: &Connection,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
    ) -> StorageResult<Option<Cluster>> {
        let sql = format!(
            "SELECT {CLUSTER_COLUMNS} FROM clusters \
             WHERE task_id = ?1 AND owner_id = ?2 AND cluster_type = ?3"
        );
        let record = conn
            .query_row(
                &sql,
                params![task_id.as_str(), owner_id.as_str(), cluster_type.as_str()],
                ClusterRecord::from_row,
            )
            .optional()?;
        let Some(record) = record else {
            return Ok(None);
        };

        let cluster_id = record.id.clone();
        let mut stmt = conn
            .prepare("SELECT node_id FROM cluster_members WHERE cluster_id = ?1 ORDER BY node_id")?;
        let members = stmt
            .query_map(params![cluster_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        record.into_cluster(members).map(Some)
    }

    fn select_entry(
        conn: &Connection,
        entry: &MasterEntry,
        normalized_label: &str,
    ) -> StorageResult<Option<MasterEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM master_entries \
             WHERE field_id = ?1 AND normalized_label = ?2"
        );
        let record = conn
            .query_row(
                &sql,
                params![entry.field_id.as_str(), normalized_label],
                EntryRecord::from_row,
            )
            .optional()?;
        record.map(EntryRecord::into_entry).transpose()
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

impl GraphStore for SqliteStore {
    // === Node Operations ===

    fn record_sighting(&self, sighting: &Sighting) -> StorageResult<Node> {
        let key = normalize_key(&sighting.label);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let node = match Self::select_node(&tx, &sighting.owner_id, sighting.node_type, &key)? {
            Some(mut node) => {
                node.record_sighting(sighting.context.clone());
                Self::update_history(&tx, &node)?;
                node
            }
            None => {
                let node = Node::new(
                    sighting.label.clone(),
                    sighting.node_type,
                    sighting.owner_id.clone(),
                    sighting.context.clone(),
                );
                Self::insert_node(&tx, &node)?;
                node
            }
        };

        tx.commit()?;
        Ok(node)
    }

    fn load_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE owner_id = ?1 AND id = ?2");
        let nodes = Self::query_nodes(&conn, &sql, &[&owner_id.as_str(), &node_id.as_str()])?;
        Ok(nodes.into_iter().next())
    }

    fn find_node(
        &self,
        owner_id: &OwnerId,
        node_type: NodeType,
        normalized_key: &str,
    ) -> StorageResult<Option<Node>> {
        let conn = self.conn.lock().unwrap();
        Self::select_node(&conn, owner_id, node_type, normalized_key)
    }

    fn find_nodes(&self, owner_id: &OwnerId, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE owner_id = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(owner_id.as_str().to_string())];

        if let Some(node_type) = filter.node_type {
            sql.push_str(" AND node_type = ?");
            params_vec.push(Box::new(node_type.as_str()));
        }

        if let Some(confirmed) = filter.confirmed {
            sql.push_str(" AND confirmed = ?");
            params_vec.push(Box::new(confirmed));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let mut nodes = Self::query_nodes(&conn, &sql, params_refs.as_slice())?;

        // Level and ordering use the recomputed fields, not the stored columns
        nodes.retain(|n| filter.matches(n));
        sort_for_listing(&mut nodes);
        if let Some(limit) = filter.limit {
            nodes.truncate(limit);
        }
        Ok(nodes)
    }

    fn update_node_links(&self, node: &Node) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE nodes SET
                master_entry_id = ?3,
                domain_id = ?4,
                field_id = ?5,
                contact_id = ?6,
                confirmed = ?7
            WHERE id = ?1 AND owner_id = ?2
            "#,
            params![
                node.id.as_str(),
                node.owner_id.as_str(),
                node.master_entry_id.as_ref().map(|id| id.as_str()),
                node.domain_id.as_ref().map(|id| id.as_str()),
                node.field_id.as_ref().map(|id| id.as_str()),
                node.contact_id.as_ref().map(|id| id.as_str()),
                node.confirmed,
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::NodeNotFound(node.id.to_string()));
        }
        Ok(())
    }

    // === Edge Operations ===

    fn bump_edge(&self, key: &EdgeKey, owner_id: &OwnerId) -> StorageResult<Edge> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let fresh = Edge::new(key.clone(), owner_id.clone());
        let task = task_column(key.task_id.as_ref());
        tx.execute(
            r#"
            INSERT INTO edges (id, owner_id, source_id, target_id, task_id, edge_type, weight,
                               created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            ON CONFLICT(source_id, target_id, task_id) DO UPDATE SET
                weight = edges.weight + 1,
                updated_at = excluded.updated_at
            "#,
            params![
                fresh.id.as_str(),
                owner_id.as_str(),
                key.source.as_str(),
                key.target.as_str(),
                task,
                fresh.edge_type.as_str(),
                fmt_ts(&fresh.created_at),
            ],
        )?;

        let record = tx.query_row(
            &format!(
                "SELECT {EDGE_COLUMNS} FROM edges \
                 WHERE source_id = ?1 AND target_id = ?2 AND task_id = ?3"
            ),
            params![key.source.as_str(), key.target.as_str(), task],
            EdgeRecord::from_row,
        )?;
        tx.commit()?;
        record.into_edge()
    }

    fn list_edges(&self, owner_id: &OwnerId, task_id: Option<&TaskId>) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT {EDGE_COLUMNS} FROM edges WHERE owner_id = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(owner_id.as_str().to_string())];
        if let Some(task_id) = task_id {
            sql.push_str(" AND task_id = ?");
            params_vec.push(Box::new(task_id.as_str().to_string()));
        }
        sql.push_str(" ORDER BY weight DESC, id ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_refs.as_slice(), EdgeRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        records.into_iter().map(EdgeRecord::into_edge).collect()
    }

    // === Cluster Operations ===

    fn merge_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
        node_ids: &BTreeSet<NodeId>,
        summary: Option<&str>,
    ) -> StorageResult<Cluster> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = fmt_ts(&Utc::now());
        tx.execute(
            r#"
            INSERT INTO clusters (id, task_id, owner_id, cluster_type, summary, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(task_id, owner_id, cluster_type) DO UPDATE SET
                summary = COALESCE(excluded.summary, clusters.summary),
                updated_at = excluded.updated_at
            "#,
            params![
                ClusterId::new().as_str(),
                task_id.as_str(),
                owner_id.as_str(),
                cluster_type.as_str(),
                summary,
                now,
            ],
        )?;

        let cluster_id: String = tx.query_row(
            "SELECT id FROM clusters WHERE task_id = ?1 AND owner_id = ?2 AND cluster_type = ?3",
            params![task_id.as_str(), owner_id.as_str(), cluster_type.as_str()],
            |row| row.get(0),
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO cluster_members (cluster_id, node_id) VALUES (?1, ?2)",
            )?;
            for node_id in node_ids {
                insert.execute(params![cluster_id, node_id.as_str()])?;
            }
        }

        let cluster = Self::select_cluster(&tx, task_id, owner_id, cluster_type)?.ok_or_else(|| {
            StorageError::InvalidRecord {
                table: "clusters",
                reason: format!("cluster {} vanished during merge", cluster_id),
            }
        })?;
        tx.commit()?;
        Ok(cluster)
    }

    fn load_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
    ) -> StorageResult<Option<Cluster>> {
        let conn = self.conn.lock().unwrap();
        Self::select_cluster(&conn, task_id, owner_id, cluster_type)
    }

    // === Checkpoint Operations ===

    fn append_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let r = CheckpointRecord::from_checkpoint(checkpoint)?;
        conn.execute(
            &format!("INSERT INTO checkpoints ({CHECKPOINT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![r.id, r.task_id, r.owner_id, r.node_ids_json, r.timestamp, r.source, r.summary],
        )?;
        Ok(())
    }

    fn list_checkpoints(
        &self,
        task_id: Option<&TaskId>,
        owner_id: Option<&OwnerId>,
    ) -> StorageResult<Vec<Checkpoint>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(task_id) = task_id {
            sql.push_str(" AND task_id = ?");
            params_vec.push(Box::new(task_id.as_str().to_string()));
        }
        if let Some(owner_id) = owner_id {
            sql.push_str(" AND owner_id = ?");
            params_vec.push(Box::new(owner_id.as_str().to_string()));
        }
        // rowid keeps insertion order among equal timestamps
        sql.push_str(" ORDER BY timestamp ASC, rowid ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_refs.as_slice(), CheckpointRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        records.into_iter().map(CheckpointRecord::into_checkpoint).collect()
    }

    // === Taxonomy Operations ===

    fn save_domain(&self, domain: &Domain) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO domains (id, name, color) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, color = excluded.color
            "#,
            params![domain.id.as_str(), domain.name, domain.color],
        )?;
        Ok(())
    }

    fn save_field(&self, field: &Field) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO fields (id, domain_id, name, description) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                domain_id = excluded.domain_id,
                name = excluded.name,
                description = excluded.description
            "#,
            params![field.id.as_str(), field.domain_id.as_str(), field.name, field.description],
        )?;
        Ok(())
    }

    fn upsert_master_entry(&self, entry: &MasterEntry) -> StorageResult<MasterEntry> {
        let normalized_label = normalize_key(&entry.label);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = match Self::select_entry(&tx, entry, &normalized_label)? {
            Some(mut existing) => {
                existing.synonyms.extend(entry.synonyms.iter().cloned());
                tx.execute(
                    "UPDATE master_entries SET synonyms_json = ?2 WHERE id = ?1",
                    params![existing.id.as_str(), serde_json::to_string(&existing.synonyms)?],
                )?;
                existing
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO master_entries ({ENTRY_COLUMNS}, normalized_label) \
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ),
                    params![
                        entry.id.as_str(),
                        entry.field_id.as_str(),
                        entry.label,
                        serde_json::to_string(&entry.synonyms)?,
                        normalized_label,
                    ],
                )?;
                entry.clone()
            }
        };

        tx.commit()?;
        Ok(stored)
    }

    fn load_taxonomy(&self) -> StorageResult<Taxonomy> {
        let conn = self.conn.lock().unwrap();

        let domains = conn
            .prepare("SELECT id, name, color FROM domains ORDER BY id")?
            .query_map([], domain_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let fields = conn
            .prepare("SELECT id, domain_id, name, description FROM fields ORDER BY id")?
            .query_map([], field_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let entries = conn
            .prepare(&format!("SELECT {ENTRY_COLUMNS} FROM master_entries ORDER BY id"))?
            .query_map([], EntryRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(EntryRecord::into_entry)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Taxonomy {
            domains,
            fields,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CheckpointSource, Direction, DomainId, FieldId, SourceContext};
    use chrono::Duration as ChronoDuration;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn sighting(label: &str, node_type: NodeType, direction: Direction) -> Sighting {
        Sighting {
            label: label.to_string(),
            node_type,
            owner_id: OwnerId::from("u1"),
            context: SourceContext::new("message", "m1", direction),
        }
    }

    #[test]
    fn test_record_sighting_merges_by_normalized_key() {
        let store = create_test_store();
        let a = store
            .record_sighting(&sighting("Machine Learning", NodeType::Keyword, Direction::Sent))
            .unwrap();
        let b = store
            .record_sighting(&sighting("machine  learning", NodeType::Keyword, Direction::Sent))
            .unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(b.frequency, 2);
        assert_eq!(b.label, "Machine Learning");
    }

    #[test]
    fn test_same_key_different_type_is_distinct() {
        let store = create_test_store();
        let keyword = store
            .record_sighting(&sighting("Phoenix", NodeType::Keyword, Direction::Received))
            .unwrap();
        let project = store
            .record_sighting(&sighting("Phoenix", NodeType::Project, Direction::Received))
            .unwrap();
        assert_ne!(keyword.id, project.id);
    }

    #[test]
    fn test_find_nodes_filters_and_orders() {
        let store = create_test_store();
        for _ in 0..3 {
            store
                .record_sighting(&sighting("Rust", NodeType::Keyword, Direction::Sent))
                .unwrap();
        }
        store
            .record_sighting(&sighting("Tanaka", NodeType::Person, Direction::Received))
            .unwrap();
        store
            .record_sighting(&sighting("Go", NodeType::Keyword, Direction::Received))
            .unwrap();

        let owner = OwnerId::from("u1");
        let all = store.find_nodes(&owner, &NodeFilter::new()).unwrap();
        assert_eq!(all[0].label, "Rust");
        assert_eq!(all.len(), 3);

        let keywords = store
            .find_nodes(&owner, &NodeFilter::new().with_type(NodeType::Keyword))
            .unwrap();
        assert_eq!(keywords.len(), 2);

        let understood = store
            .find_nodes(
                &owner,
                &NodeFilter::new().with_min_level(crate::graph::UnderstandingLevel::Understanding),
            )
            .unwrap();
        assert_eq!(understood.len(), 1);
        assert_eq!(understood[0].label, "Rust");
    }

    #[test]
    fn test_update_node_links_missing_node() {
        let store = create_test_store();
        let node = Node::new(
            "ghost",
            NodeType::Keyword,
            OwnerId::from("u1"),
            SourceContext::new("message", "m", Direction::Sent),
        );
        assert!(matches!(
            store.update_node_links(&node),
            Err(StorageError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_bump_edge_increments_weight() {
        let store = create_test_store();
        let owner = OwnerId::from("u1");
        let task = TaskId::from("t1");
        let key = EdgeKey::canonical(&NodeId::from("b"), &NodeId::from("a"), Some(&task)).unwrap();

        let first = store.bump_edge(&key, &owner).unwrap();
        let second = store.bump_edge(&key, &owner).unwrap();

        assert_eq!(first.weight, 1);
        assert_eq!(second.weight, 2);
        assert_eq!(first.id, second.id);
        assert_eq!(second.source, NodeId::from("a"));

        let unscoped = EdgeKey::canonical(&NodeId::from("a"), &NodeId::from("b"), None).unwrap();
        store.bump_edge(&unscoped, &owner).unwrap();

        assert_eq!(store.list_edges(&owner, None).unwrap().len(), 2);
        let scoped = store.list_edges(&owner, Some(&task)).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].weight, 2);
    }

    #[test]
    fn test_merge_cluster_unions_and_keeps_summary() {
        let store = create_test_store();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");
        let first: BTreeSet<NodeId> = ["a", "b"].into_iter().map(NodeId::from).collect();
        let second: BTreeSet<NodeId> = ["b", "c"].into_iter().map(NodeId::from).collect();

        let created = store
            .merge_cluster(&task, &owner, ClusterType::Ideation, &first, Some("plan"))
            .unwrap();
        let merged = store
            .merge_cluster(&task, &owner, ClusterType::Ideation, &second, None)
            .unwrap();

        assert_eq!(created.id, merged.id);
        assert_eq!(merged.node_ids.len(), 3);
        assert_eq!(merged.summary.as_deref(), Some("plan"));
        assert!(store
            .load_cluster(&task, &owner, ClusterType::Result)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_checkpoints_ordered_by_timestamp_then_insertion() {
        let store = create_test_store();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");

        let mut late = Checkpoint::new(task.clone(), owner.clone(), vec![], CheckpointSource::Manual, None);
        let mut first_tie =
            Checkpoint::new(task.clone(), owner.clone(), vec![], CheckpointSource::Auto, None);
        let mut second_tie =
            Checkpoint::new(task.clone(), owner.clone(), vec![], CheckpointSource::Manual, None);
        let base = Utc::now();
        late.timestamp = base + ChronoDuration::seconds(10);
        first_tie.timestamp = base;
        second_tie.timestamp = base;

        store.append_checkpoint(&late).unwrap();
        store.append_checkpoint(&first_tie).unwrap();
        store.append_checkpoint(&second_tie).unwrap();

        let listed = store.list_checkpoints(Some(&task), None).unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![first_tie.id, second_tie.id, late.id]);
        assert!(store
            .list_checkpoints(Some(&TaskId::from("other")), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_master_entry_upsert_reuses_existing() {
        let store = create_test_store();
        let domain = Domain::new(DomainId::from("d1"), "Marketing");
        let field = Field::new(FieldId::from("f1"), domain.id.clone(), "Search");
        store.save_domain(&domain).unwrap();
        store.save_field(&field).unwrap();

        let first = store
            .upsert_master_entry(&MasterEntry::new(field.id.clone(), "SEO"))
            .unwrap();
        let second = store
            .upsert_master_entry(&MasterEntry::new(field.id.clone(), "seo").with_synonym("search optimization"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.synonyms.contains("search optimization"));

        let taxonomy = store.load_taxonomy().unwrap();
        assert_eq!(taxonomy.domains.len(), 1);
        assert_eq!(taxonomy.fields.len(), 1);
        assert_eq!(taxonomy.entries.len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("graph.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store
                .record_sighting(&sighting("Kubernetes", NodeType::Keyword, Direction::Sent))
                .unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        let node = store
            .find_node(&OwnerId::from("u1"), NodeType::Keyword, "kubernetes")
            .unwrap()
            .unwrap();
        assert_eq!(node.frequency, 1);
        assert_eq!(node.source_contexts.len(), 1);
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_concurrent_connections_share_one_node() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-concurrent.db");

        let stores: Vec<SqliteStore> = (0..4).map(|_| SqliteStore::open(&db_path).unwrap()).collect();
        let handles: Vec<_> = stores
            .into_iter()
            .map(|store| {
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .record_sighting(&sighting("GraphQL", NodeType::Keyword, Direction::Received))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        let nodes = store
            .find_nodes(&OwnerId::from("u1"), &NodeFilter::new())
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].frequency, 40);
    }
}
