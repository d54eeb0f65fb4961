//! `SQLite` connection pool with WAL mode.
//!
//! Uses `r2d2` pooling over `r2d2_sqlite`. The [`PragmaCustomizer`] runs on
//! every new connection so each one gets the busy timeout, WAL journal and
//! sync settings before it is handed out. [`open_file`] and
//! [`open_in_memory`] also run the schema migrations.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::errors::{Result, StoreError};
use crate::migrations;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 16). Ignored for in-memory pools.
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 30000).
    pub busy_timeout_ms: u32,
    /// Cache size in KiB (default: 8192 = 8 MB).
    pub cache_size_kib: i64,
    /// How long `pool.get()` waits for a free connection.
    pub checkout_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
            checkout_timeout: Duration::from_secs(5),
        }
    }
}

/// `SQLite` pragma customizer that runs on each new connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        // busy_timeout first: switching to WAL needs a lock other fresh
        // connections may be holding.
        conn.busy_timeout(Duration::from_millis(u64::from(self.busy_timeout_ms)))?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.cache_size_kib
        ))?;
        Ok(())
    }
}

/// Open (creating if needed) a file-backed database and migrate it.
pub fn open_file(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(config.checkout_timeout)
        .connection_customizer(Box::new(customizer(config)))
        .build(manager)?;

    let applied = migrations::run_migrations(&*pool.get()?)?;
    info!(path = %path.display(), pool_size = config.pool_size, applied, "database opened");
    Ok(pool)
}

/// Open a private in-memory database and migrate it.
///
/// Every `SQLite` in-memory connection is its own database, so the pool is
/// pinned to a single connection that is never recycled. Tests that need
/// real concurrent writers should use [`open_file`] on a temp directory.
pub fn open_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .min_idle(Some(1))
        .idle_timeout(None)
        .max_lifetime(None)
        .connection_timeout(config.checkout_timeout)
        .connection_customizer(Box::new(customizer(config)))
        .build(manager)?;

    let _ = migrations::run_migrations(&*pool.get()?)?;
    Ok(pool)
}

fn customizer(config: &ConnectionConfig) -> PragmaCustomizer {
    PragmaCustomizer {
        busy_timeout_ms: config.busy_timeout_ms,
        cache_size_kib: config.cache_size_kib,
    }
}

/// Journal mode of a connection, for diagnostics and tests.
pub fn journal_mode(conn: &Connection) -> Result<String> {
    conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .map_err(StoreError::Sqlite)
}
