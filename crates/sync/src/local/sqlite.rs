// SQLite-backed local cache: one `documents` row per cache key.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::{LocalCache, LocalCacheError};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE documents (
    cache_key   TEXT PRIMARY KEY,
    body        TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache db at `{}`", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("failed to configure sqlite pragmas for cache db")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory cache db")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }

    /// All cache keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cache_key FROM documents ORDER BY cache_key ASC")
            .context("failed to prepare cache key listing")?;
        let rows = stmt.query_map([], |row| row.get(0)).context("failed to list cache keys")?;
        rows.collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to collect cache keys")
    }

    fn get_row(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT body FROM documents WHERE cache_key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read cache entry `{key}`"))
    }

    fn upsert_row(&self, key: &str, body: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO documents (cache_key, body, updated_at) \
                 VALUES (?1, ?2, datetime('now')) \
                 ON CONFLICT(cache_key) DO UPDATE SET \
                     body = excluded.body, updated_at = excluded.updated_at",
                params![key, body],
            )
            .with_context(|| format!("failed to write cache entry `{key}`"))?;
        Ok(())
    }

    fn delete_row(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM documents WHERE cache_key = ?1", params![key])
            .with_context(|| format!("failed to delete cache entry `{key}`"))?;
        Ok(())
    }
}

impl LocalCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<String>, LocalCacheError> {
        Ok(self.get_row(key)?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalCacheError> {
        Ok(self.upsert_row(key, value)?)
    }

    fn remove(&mut self, key: &str) -> Result<(), LocalCacheError> {
        Ok(self.delete_row(key)?)
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;
    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }
        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply cache db migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }
    Ok(())
}
