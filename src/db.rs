use crate::config::Config;
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

/// One libsql connection shared by every request.
///
/// The connection is only reachable through [`Database::connection`], which
/// locks it. A transaction holds the guard from `BEGIN` to `COMMIT`, so no
/// other statement (read or write) runs inside it.
pub struct Database {
    _db: LibsqlDatabase,
    conn: Mutex<Connection>,
}

impl Database {
    pub async fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        Self::open(&path.to_string_lossy()).await
    }

    /// Open (or create) a local database and bring its schema up to date.
    /// `":memory:"` gives a throwaway database.
    pub async fn open(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;

        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::auth::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::reader::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn: Mutex::new(conn),
        })
    }

    pub async fn begin(conn: &Connection) -> Result<()> {
        conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the result through.
    pub async fn finish<T>(conn: &Connection, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                conn.execute("COMMIT", ()).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                    tracing::error!("rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}
