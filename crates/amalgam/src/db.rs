//! `SQLite` storage layer for the packer.
//!
//! The store owns every persistent entity: files, symbols, dependencies,
//! autoload rules, the AST projection, and the work queue. Every other
//! component goes through this API; nothing else holds a connection.
//!
//! Multi-row writes run inside savepoints so they are atomic even when the
//! orchestrator has an outer transaction open around the whole `pack` run.
//! `begin` / `commit` / `rollback` expose that outer transaction so a failed
//! run can be discarded wholesale.

// SQLite uses i64 for all integer storage. These casts are intentional and
// safe for practical values (line numbers, priorities, row counts).
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::trace;

use crate::error::Result;
use crate::php::extract::{AstProjection, ExtractedDependency, ExtractedSymbol};
use crate::types::{
    AnalysisStatus, AstNodeRecord, AutoloadKind, AutoloadRule, Dependency, DependencyId,
    DependencyKind, FileId, FileType, StoredFile, Symbol, SymbolId, SymbolKind, Visibility,
    WorkItem, WorkStatus,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    file_type TEXT NOT NULL DEFAULT 'unknown',
    class_name TEXT,
    namespace TEXT,
    is_entry INTEGER NOT NULL DEFAULT 0,
    is_external INTEGER NOT NULL DEFAULT 0,
    skip_ast INTEGER NOT NULL DEFAULT 0,
    ast_root_id INTEGER,
    analysis_status TEXT NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    local_name TEXT NOT NULL,
    fully_qualified_name TEXT NOT NULL,
    namespace TEXT,
    visibility TEXT NOT NULL DEFAULT 'public',
    is_abstract INTEGER NOT NULL DEFAULT 0,
    is_final INTEGER NOT NULL DEFAULT 0,
    UNIQUE (kind, fully_qualified_name)
);
CREATE INDEX IF NOT EXISTS idx_symbols_fqn ON symbols(fully_qualified_name);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);

CREATE TABLE IF NOT EXISTS dependencies (
    id INTEGER PRIMARY KEY,
    source_file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    target_file_id INTEGER REFERENCES files(id),
    dependency_type TEXT NOT NULL,
    target_symbol TEXT,
    line INTEGER NOT NULL DEFAULT 0,
    is_conditional INTEGER NOT NULL DEFAULT 0,
    is_resolved INTEGER NOT NULL DEFAULT 0,
    context TEXT
);
CREATE INDEX IF NOT EXISTS idx_dependencies_source ON dependencies(source_file_id);
CREATE INDEX IF NOT EXISTS idx_dependencies_unresolved ON dependencies(is_resolved);

CREATE TABLE IF NOT EXISTS autoload_rules (
    id INTEGER PRIMARY KEY,
    rule_type TEXT NOT NULL,
    prefix TEXT,
    path TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS ast_nodes (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    parent_id INTEGER REFERENCES ast_nodes(id),
    node_type TEXT NOT NULL,
    node_name TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    start_line INTEGER NOT NULL DEFAULT 0,
    end_line INTEGER NOT NULL DEFAULT 0,
    fqcn TEXT,
    attributes TEXT
);
CREATE INDEX IF NOT EXISTS idx_ast_nodes_file ON ast_nodes(file_id);

CREATE TABLE IF NOT EXISTS work_queue (
    id INTEGER PRIMARY KEY,
    file_path TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending'
);
CREATE INDEX IF NOT EXISTS idx_work_queue_status ON work_queue(status, priority);
";

/// Outcome of inserting a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolInsert {
    /// The symbol was new.
    Inserted(SymbolId),
    /// `(kind, fully_qualified_name)` already exists in another file.
    Duplicate,
}

/// `SQLite` database wrapper for the packer's persistent state.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn })
    }

    // === Transactions ===

    /// Start the run-level transaction.
    pub fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commit the run-level transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Discard the run-level transaction. A no-op outside a transaction.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    // === File Operations ===

    /// Insert or update a file, returning its id and whether the stored
    /// analysis is stale.
    ///
    /// Re-adding the same path replaces the content atomically and preserves
    /// `is_entry` unless an override is given. When the content hash matches
    /// a completed analysis the file is reused as-is (`changed = false`).
    pub fn upsert_file(
        &mut self,
        path: &str,
        content: &str,
        is_entry: Option<bool>,
        is_external: bool,
        skip_ast: bool,
    ) -> Result<(FileId, bool)> {
        let hash = content_hash(content);
        let sp = self.conn.savepoint()?;

        let existing: Option<(i64, String, String)> = sp
            .query_row(
                "SELECT id, content_hash, analysis_status FROM files WHERE path = ?1",
                [path],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let result = if let Some((id, old_hash, status)) = existing {
            if let Some(entry) = is_entry {
                sp.execute(
                    "UPDATE files SET is_entry = ?2 WHERE id = ?1",
                    params![id, entry],
                )?;
            }

            if old_hash == hash && status == AnalysisStatus::Completed.as_str() {
                trace!(path, "file unchanged, reusing stored analysis");
                (FileId::from(id), false)
            } else {
                sp.execute(
                    "UPDATE files SET content = ?2, content_hash = ?3, is_external = ?4,
                     skip_ast = ?5, ast_root_id = NULL, analysis_status = 'pending'
                     WHERE id = ?1",
                    params![id, content, hash, is_external, skip_ast],
                )?;
                sp.execute("DELETE FROM symbols WHERE file_id = ?1", [id])?;
                sp.execute("DELETE FROM dependencies WHERE source_file_id = ?1", [id])?;
                sp.execute("DELETE FROM ast_nodes WHERE file_id = ?1", [id])?;
                (FileId::from(id), true)
            }
        } else {
            sp.execute(
                "INSERT INTO files (path, content, content_hash, is_entry, is_external, skip_ast)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![path, content, hash, is_entry.unwrap_or(false), is_external, skip_ast],
            )?;
            (FileId::from(sp.last_insert_rowid()), true)
        };

        sp.commit()?;
        Ok(result)
    }

    /// Record the classification discovered during analysis.
    pub fn set_file_details(
        &mut self,
        id: FileId,
        file_type: FileType,
        class_name: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET file_type = ?2, class_name = ?3, namespace = ?4 WHERE id = ?1",
            params![id.as_i64(), file_type.as_str(), class_name, namespace],
        )?;
        Ok(())
    }

    /// Update the analysis outcome for a file.
    pub fn set_analysis_status(&mut self, id: FileId, status: AnalysisStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET analysis_status = ?2 WHERE id = ?1",
            params![id.as_i64(), status.as_str()],
        )?;
        Ok(())
    }

    /// Get a file by its root-relative path.
    pub fn file_by_path(&self, path: &str) -> Result<Option<StoredFile>> {
        self.conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
                [path],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a file id by its root-relative path.
    pub fn file_id_by_path(&self, path: &str) -> Result<Option<FileId>> {
        self.conn
            .query_row("SELECT id FROM files WHERE path = ?1", [path], |row| {
                row.get::<_, i64>(0).map(FileId::from)
            })
            .optional()
            .map_err(Into::into)
    }

    /// Get a file by its database id.
    pub fn file_by_id(&self, id: FileId) -> Result<Option<StoredFile>> {
        self.conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                [id.as_i64()],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All stored files, ordered by id.
    pub fn all_files(&self) -> Result<Vec<StoredFile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY id"))?;
        let files = stmt
            .query_map([], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // === Symbol Operations ===

    /// Insert a symbol extracted from a file.
    ///
    /// `(kind, fully_qualified_name)` is unique across all files; a second
    /// definition reports [`SymbolInsert::Duplicate`] instead of failing.
    pub fn insert_symbol(
        &mut self,
        file_id: FileId,
        symbol: &ExtractedSymbol,
    ) -> Result<SymbolInsert> {
        let outcome = self.conn.execute(
            "INSERT INTO symbols (file_id, kind, local_name, fully_qualified_name, namespace,
             visibility, is_abstract, is_final)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                file_id.as_i64(),
                symbol.kind.as_str(),
                symbol.local_name,
                symbol.fqn,
                symbol.namespace,
                symbol.visibility.as_str(),
                symbol.is_abstract,
                symbol.is_final
            ],
        );

        match outcome {
            Ok(_) => Ok(SymbolInsert::Inserted(SymbolId::from(
                self.conn.last_insert_rowid(),
            ))),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(SymbolInsert::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find the file that defines a fully-qualified name.
    pub fn find_file_by_symbol(&self, fqn: &str) -> Result<Option<StoredFile>> {
        trace!(fqn, "looking up symbol definition");
        self.conn
            .query_row(
                &format!(
                    "SELECT {FILE_COLUMNS_F} FROM files f
                     JOIN symbols s ON s.file_id = f.id
                     WHERE s.fully_qualified_name = ?1
                     ORDER BY s.id LIMIT 1"
                ),
                [fqn],
                row_to_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Symbols defined in a file, in declaration order.
    pub fn symbols_by_file(&self, file_id: FileId) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, kind, local_name, fully_qualified_name, namespace,
             visibility, is_abstract, is_final
             FROM symbols WHERE file_id = ?1 ORDER BY id",
        )?;
        let symbols = stmt
            .query_map([file_id.as_i64()], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// All stored symbols ordered by fully-qualified name.
    pub fn all_symbols(&self) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, kind, local_name, fully_qualified_name, namespace,
             visibility, is_abstract, is_final
             FROM symbols ORDER BY fully_qualified_name, id",
        )?;
        let symbols = stmt
            .query_map([], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    // === Dependency Operations ===

    /// Insert a dependency extracted from a file.
    pub fn insert_dependency(
        &mut self,
        source: FileId,
        dep: &ExtractedDependency,
    ) -> Result<DependencyId> {
        self.conn.execute(
            "INSERT INTO dependencies (source_file_id, dependency_type, target_symbol, line,
             is_conditional, is_resolved, context)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                source.as_i64(),
                dep.kind.as_str(),
                dep.target_symbol,
                dep.line,
                dep.is_conditional,
                dep.context
            ],
        )?;
        Ok(DependencyId::from(self.conn.last_insert_rowid()))
    }

    /// Insert an already-resolved edge (used for manifest `files` entries).
    pub fn insert_resolved_dependency(
        &mut self,
        source: FileId,
        target: FileId,
        kind: DependencyKind,
        context: Option<&str>,
    ) -> Result<DependencyId> {
        self.conn.execute(
            "INSERT INTO dependencies (source_file_id, target_file_id, dependency_type,
             line, is_conditional, is_resolved, context)
             VALUES (?1, ?2, ?3, 0, 0, 1, ?4)",
            params![source.as_i64(), target.as_i64(), kind.as_str(), context],
        )?;
        Ok(DependencyId::from(self.conn.last_insert_rowid()))
    }

    /// Whether a resolved edge between two files already exists.
    pub fn has_resolved_edge(&self, source: FileId, target: FileId) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dependencies
             WHERE source_file_id = ?1 AND target_file_id = ?2 AND is_resolved = 1",
            params![source.as_i64(), target.as_i64()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Mark a dependency as resolved to a stored file.
    pub fn mark_dependency_resolved(&mut self, dep: DependencyId, target: FileId) -> Result<()> {
        self.conn.execute(
            "UPDATE dependencies SET is_resolved = 1, target_file_id = ?2 WHERE id = ?1",
            params![dep.as_i64(), target.as_i64()],
        )?;
        Ok(())
    }

    /// All dependencies with `is_resolved = false`, ordered by id.
    pub fn unresolved_dependencies(&self) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEP_COLUMNS} FROM dependencies WHERE is_resolved = 0 ORDER BY id"
        ))?;
        let deps = stmt
            .query_map([], row_to_dependency)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Unresolved dependencies of one source file, ordered by id.
    pub fn unresolved_dependencies_for(&self, source: FileId) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEP_COLUMNS} FROM dependencies
             WHERE is_resolved = 0 AND source_file_id = ?1 ORDER BY id"
        ))?;
        let deps = stmt
            .query_map([source.as_i64()], row_to_dependency)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Dependencies of one source file with their target paths joined in.
    pub fn dependencies_by_source(
        &self,
        source: FileId,
    ) -> Result<Vec<(Dependency, Option<String>)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEP_COLUMNS_D}, f.path FROM dependencies d
             LEFT JOIN files f ON f.id = d.target_file_id
             WHERE d.source_file_id = ?1 ORDER BY d.id"
        ))?;
        let deps = stmt
            .query_map([source.as_i64()], |row| {
                Ok((row_to_dependency(row)?, row.get::<_, Option<String>>(9)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Every resolved edge as `(source_file_id, target_file_id, kind)`.
    pub fn resolved_edges(&self) -> Result<Vec<(i64, i64, DependencyKind)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_file_id, target_file_id, dependency_type FROM dependencies
             WHERE is_resolved = 1 AND target_file_id IS NOT NULL ORDER BY id",
        )?;
        let edges = stmt
            .query_map([], |row| {
                let kind: String = row.get(2)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    DependencyKind::parse(&kind)
                        .ok_or_else(|| invalid_enum("dependency_type", &kind))?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Transitive closure of resolved edges from the entry file, bounded at
    /// depth 100 to bound pathological graphs. Returns files ordered by id.
    pub fn all_required_files(&self, entry: FileId) -> Result<Vec<StoredFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "WITH RECURSIVE closure(file_id, depth) AS (
                 SELECT ?1, 0
                 UNION
                 SELECT d.target_file_id, c.depth + 1
                 FROM dependencies d
                 JOIN closure c ON d.source_file_id = c.file_id
                 WHERE d.is_resolved = 1 AND d.target_file_id IS NOT NULL AND c.depth < 100
             )
             SELECT DISTINCT {FILE_COLUMNS_F} FROM files f
             JOIN closure c ON f.id = c.file_id
             ORDER BY f.id"
        ))?;
        let files = stmt
            .query_map([entry.as_i64()], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // === Autoload Rules ===

    /// Persist one autoload rule from the manifest.
    pub fn insert_autoload_rule(&mut self, rule: &AutoloadRule) -> Result<()> {
        self.conn.execute(
            "INSERT INTO autoload_rules (rule_type, prefix, path, priority)
             VALUES (?1, ?2, ?3, ?4)",
            params![rule.kind.as_str(), rule.prefix, rule.path, rule.priority],
        )?;
        Ok(())
    }

    /// All stored autoload rules, priority descending.
    pub fn autoload_rules(&self) -> Result<Vec<AutoloadRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT rule_type, prefix, path, priority FROM autoload_rules
             ORDER BY priority DESC, id",
        )?;
        let rules = stmt
            .query_map([], |row| {
                let kind: String = row.get(0)?;
                Ok(AutoloadRule {
                    kind: AutoloadKind::parse(&kind)
                        .ok_or_else(|| invalid_enum("rule_type", &kind))?,
                    prefix: row.get(1)?,
                    path: row.get(2)?,
                    priority: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Drop previously stored autoload rules (a new run re-ingests them).
    pub fn clear_autoload_rules(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM autoload_rules", [])?;
        Ok(())
    }

    // === AST Projection ===

    /// Store the AST projection for a file, wiring parent links, and set
    /// the file's `ast_root_id` to the first node.
    pub fn store_ast(&mut self, file_id: FileId, nodes: &[AstProjection]) -> Result<Option<i64>> {
        let sp = self.conn.savepoint()?;

        let mut ids: Vec<i64> = Vec::with_capacity(nodes.len());
        for node in nodes {
            let parent_id = node.parent.map(|index| ids[index]);
            sp.execute(
                "INSERT INTO ast_nodes (file_id, parent_id, node_type, node_name, position,
                 start_line, end_line, fqcn, attributes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    file_id.as_i64(),
                    parent_id,
                    node.node_type,
                    node.node_name,
                    node.position,
                    node.start_line,
                    node.end_line,
                    node.fqcn,
                    node.attributes
                ],
            )?;
            ids.push(sp.last_insert_rowid());
        }

        let root = ids.first().copied();
        if let Some(root) = root {
            sp.execute(
                "UPDATE files SET ast_root_id = ?2 WHERE id = ?1",
                params![file_id.as_i64(), root],
            )?;
        }

        sp.commit()?;
        Ok(root)
    }

    /// AST projection rows for a file, in insertion order.
    pub fn ast_nodes_by_file(&self, file_id: FileId) -> Result<Vec<AstNodeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, parent_id, node_type, node_name, position, start_line,
             end_line, fqcn, attributes
             FROM ast_nodes WHERE file_id = ?1 ORDER BY id",
        )?;
        let nodes = stmt
            .query_map([file_id.as_i64()], |row| {
                Ok(AstNodeRecord {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    parent_id: row.get(2)?,
                    node_type: row.get(3)?,
                    node_name: row.get(4)?,
                    position: row.get(5)?,
                    start_line: row.get(6)?,
                    end_line: row.get(7)?,
                    fqcn: row.get(8)?,
                    attributes: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    // === Work Queue ===

    /// Add a path to the work queue unless it is already queued.
    ///
    /// Returns `true` when a new item was added.
    pub fn enqueue(&mut self, path: &str, priority: i32) -> Result<bool> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM work_queue WHERE file_path = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO work_queue (file_path, priority, status) VALUES (?1, ?2, 'pending')",
            params![path, priority],
        )?;
        trace!(path, priority, "enqueued for analysis");
        Ok(true)
    }

    /// Atomically pop the highest-priority pending item (FIFO within a
    /// priority) and mark it in progress.
    pub fn next_work_item(&mut self) -> Result<Option<WorkItem>> {
        let sp = self.conn.savepoint()?;

        let item = sp
            .query_row(
                "SELECT id, file_path, priority, status FROM work_queue
                 WHERE status = 'pending'
                 ORDER BY priority DESC, id ASC LIMIT 1",
                [],
                row_to_work_item,
            )
            .optional()?;

        if let Some(item) = &item {
            sp.execute(
                "UPDATE work_queue SET status = 'in_progress' WHERE id = ?1",
                [item.id],
            )?;
        }

        sp.commit()?;
        Ok(item.map(|mut item| {
            item.status = WorkStatus::InProgress;
            item
        }))
    }

    /// Record the final state of a work item.
    pub fn finish_work_item(&mut self, id: i64, status: WorkStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE work_queue SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(())
    }

    /// Clear the queue at the start of a run.
    pub fn reset_work_queue(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM work_queue", [])?;
        Ok(())
    }

    // === Stats ===

    /// Total counts of files, symbols, and dependencies.
    pub fn counts(&self) -> Result<(usize, usize, usize)> {
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let symbols: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let deps: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))?;
        Ok((files as usize, symbols as usize, deps as usize))
    }
}

/// xxh3-64 hex digest used for content change detection.
#[must_use]
pub fn content_hash(content: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(content.as_bytes()))
}

const FILE_COLUMNS: &str = "id, path, content, content_hash, file_type, class_name, namespace, \
                            is_entry, is_external, skip_ast, ast_root_id, analysis_status";
const FILE_COLUMNS_F: &str = "f.id, f.path, f.content, f.content_hash, f.file_type, f.class_name, \
                              f.namespace, f.is_entry, f.is_external, f.skip_ast, f.ast_root_id, \
                              f.analysis_status";
const DEP_COLUMNS: &str = "id, source_file_id, target_file_id, dependency_type, target_symbol, \
                           line, is_conditional, is_resolved, context";
const DEP_COLUMNS_D: &str = "d.id, d.source_file_id, d.target_file_id, d.dependency_type, \
                             d.target_symbol, d.line, d.is_conditional, d.is_resolved, d.context";

fn invalid_enum(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unknown {column} value: {value}").into(),
    )
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredFile> {
    let file_type: String = row.get(4)?;
    let status: String = row.get(11)?;
    Ok(StoredFile {
        id: row.get(0)?,
        path: row.get(1)?,
        content: row.get(2)?,
        content_hash: row.get(3)?,
        file_type: FileType::parse(&file_type)
            .ok_or_else(|| invalid_enum("file_type", &file_type))?,
        class_name: row.get(5)?,
        namespace: row.get(6)?,
        is_entry: row.get(7)?,
        is_external: row.get(8)?,
        skip_ast: row.get(9)?,
        ast_root_id: row.get(10)?,
        analysis_status: AnalysisStatus::parse(&status)
            .ok_or_else(|| invalid_enum("analysis_status", &status))?,
    })
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(2)?;
    let visibility: String = row.get(6)?;
    Ok(Symbol {
        id: row.get(0)?,
        file_id: row.get(1)?,
        kind: SymbolKind::parse(&kind).ok_or_else(|| invalid_enum("kind", &kind))?,
        local_name: row.get(3)?,
        fully_qualified_name: row.get(4)?,
        namespace: row.get(5)?,
        visibility: Visibility::parse(&visibility)
            .ok_or_else(|| invalid_enum("visibility", &visibility))?,
        is_abstract: row.get(7)?,
        is_final: row.get(8)?,
    })
}

fn row_to_dependency(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dependency> {
    let kind: String = row.get(3)?;
    Ok(Dependency {
        id: row.get(0)?,
        source_file_id: row.get(1)?,
        target_file_id: row.get(2)?,
        dependency_type: DependencyKind::parse(&kind)
            .ok_or_else(|| invalid_enum("dependency_type", &kind))?,
        target_symbol: row.get(4)?,
        line: row.get(5)?,
        is_conditional: row.get(6)?,
        is_resolved: row.get(7)?,
        context: row.get(8)?,
    })
}

fn row_to_work_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkItem> {
    let status: String = row.get(3)?;
    Ok(WorkItem {
        id: row.get(0)?,
        file_path: row.get(1)?,
        priority: row.get(2)?,
        status: WorkStatus::parse(&status).ok_or_else(|| invalid_enum("status", &status))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Store::open(&dir.path().join("pack.db")).expect("open store");
        (dir, store)
    }

    fn symbol(fqn: &str, kind: SymbolKind) -> ExtractedSymbol {
        ExtractedSymbol {
            kind,
            local_name: fqn.rsplit('\\').next().unwrap_or(fqn).to_string(),
            fqn: fqn.to_string(),
            namespace: fqn.rsplit_once('\\').map(|(ns, _)| ns.to_string()),
            visibility: Visibility::Public,
            is_abstract: false,
            is_final: false,
            line: 1,
        }
    }

    #[test]
    fn upsert_preserves_is_entry_on_replace() {
        let (_dir, mut store) = store();
        let (id, changed) = store
            .upsert_file("entry.php", "<?php new A();", Some(true), false, false)
            .expect("insert");
        assert!(changed);

        let (id2, _) = store
            .upsert_file("entry.php", "<?php new B();", None, false, false)
            .expect("replace");
        assert_eq!(id, id2);

        let file = store
            .file_by_path("entry.php")
            .expect("query")
            .expect("exists");
        assert!(file.is_entry);
        assert_eq!(file.content, "<?php new B();");
    }

    #[test]
    fn unchanged_completed_file_is_reused() {
        let (_dir, mut store) = store();
        let (id, _) = store
            .upsert_file("src/A.php", "<?php class A {}", None, false, false)
            .expect("insert");
        store
            .set_analysis_status(id, AnalysisStatus::Completed)
            .expect("status");

        let (_, changed) = store
            .upsert_file("src/A.php", "<?php class A {}", None, false, false)
            .expect("reinsert");
        assert!(!changed);
    }

    #[test]
    fn duplicate_symbol_insertion_is_reported_not_fatal() {
        let (_dir, mut store) = store();
        let (a, _) = store
            .upsert_file("a.php", "<?php class X {}", None, false, false)
            .expect("insert a");
        let (b, _) = store
            .upsert_file("b.php", "<?php class X {}", None, false, false)
            .expect("insert b");

        let first = store
            .insert_symbol(a, &symbol("App\\X", SymbolKind::Class))
            .expect("first insert");
        assert!(matches!(first, SymbolInsert::Inserted(_)));

        let second = store
            .insert_symbol(b, &symbol("App\\X", SymbolKind::Class))
            .expect("second insert");
        assert_eq!(second, SymbolInsert::Duplicate);
    }

    #[test]
    fn find_file_by_symbol_joins_on_fqn() {
        let (_dir, mut store) = store();
        let (id, _) = store
            .upsert_file("src/X.php", "<?php class X {}", None, false, false)
            .expect("insert");
        store
            .insert_symbol(id, &symbol("App\\X", SymbolKind::Class))
            .expect("symbol");

        let found = store
            .find_file_by_symbol("App\\X")
            .expect("query")
            .expect("found");
        assert_eq!(found.path, "src/X.php");
        assert!(store.find_file_by_symbol("App\\Y").expect("query").is_none());
    }

    #[test]
    fn work_queue_pops_by_priority_then_fifo() {
        let (_dir, mut store) = store();
        assert!(store.enqueue("low1.php", 100).expect("enqueue"));
        assert!(store.enqueue("low2.php", 100).expect("enqueue"));
        assert!(store.enqueue("entry.php", 1000).expect("enqueue"));
        // Duplicate path is not queued twice.
        assert!(!store.enqueue("low1.php", 100).expect("enqueue"));

        let order: Vec<String> = std::iter::from_fn(|| {
            store
                .next_work_item()
                .expect("pop")
                .map(|item| item.file_path)
        })
        .collect();
        assert_eq!(order, vec!["entry.php", "low1.php", "low2.php"]);
    }

    #[test]
    fn required_files_closure_follows_resolved_edges() {
        let (_dir, mut store) = store();
        let (entry, _) = store
            .upsert_file("entry.php", "e", Some(true), false, false)
            .expect("entry");
        let (a, _) = store.upsert_file("a.php", "a", None, false, false).expect("a");
        let (b, _) = store.upsert_file("b.php", "b", None, false, false).expect("b");
        let (_unrelated, _) = store
            .upsert_file("c.php", "c", None, false, false)
            .expect("c");

        store
            .insert_resolved_dependency(entry, a, DependencyKind::Require, None)
            .expect("edge");
        store
            .insert_resolved_dependency(a, b, DependencyKind::Extends, None)
            .expect("edge");

        let closure = store.all_required_files(entry).expect("closure");
        let paths: Vec<_> = closure.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["entry.php", "a.php", "b.php"]);
    }

    #[test]
    fn closure_survives_dependency_cycles() {
        let (_dir, mut store) = store();
        let (a, _) = store.upsert_file("a.php", "a", None, false, false).expect("a");
        let (b, _) = store.upsert_file("b.php", "b", None, false, false).expect("b");
        store
            .insert_resolved_dependency(a, b, DependencyKind::UseClass, None)
            .expect("edge");
        store
            .insert_resolved_dependency(b, a, DependencyKind::UseClass, None)
            .expect("edge");

        let closure = store.all_required_files(a).expect("closure");
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn rollback_discards_partial_run() {
        let (_dir, mut store) = store();
        store.begin().expect("begin");
        store
            .upsert_file("a.php", "a", None, false, false)
            .expect("insert");
        store.rollback().expect("rollback");

        assert!(store.file_by_path("a.php").expect("query").is_none());
    }

    #[test]
    fn ast_nodes_store_parent_links() {
        let (_dir, mut store) = store();
        let (id, _) = store
            .upsert_file("a.php", "<?php class A {}", None, false, false)
            .expect("insert");

        let nodes = vec![
            AstProjection {
                node_type: "program".to_string(),
                node_name: None,
                fqcn: None,
                position: 0,
                start_line: 1,
                end_line: 1,
                parent: None,
                attributes: None,
            },
            AstProjection {
                node_type: "class_declaration".to_string(),
                node_name: Some("A".to_string()),
                fqcn: Some("A".to_string()),
                position: 6,
                start_line: 1,
                end_line: 1,
                parent: Some(0),
                attributes: None,
            },
        ];
        let root = store.store_ast(id, &nodes).expect("store ast");
        assert!(root.is_some());

        let stored = store.ast_nodes_by_file(id).expect("nodes");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].parent_id, Some(stored[0].id));

        let file = store.file_by_id(id).expect("file").expect("exists");
        assert_eq!(file.ast_root_id, Some(stored[0].id));
    }
}
