/// Database abstraction layer
///
/// Monitors and the append-only check log, stored in LibSQL (SQLite).
pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{Monitor, MonitorLog};
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

use crate::pool::LibsqlPool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the pool's database, migrate it and wrap it in a [`DatabaseImpl`]
pub async fn connect(pool: LibsqlPool) -> Result<DatabaseImpl> {
    let conn = pool.get().await?;
    initialize_database(&conn).await?;
    drop(conn);
    Ok(DatabaseImpl::new_from_pool(pool))
}

/// Open the database file at `path`, migrating it as needed
pub async fn open(path: &str, max_connections: usize) -> Result<DatabaseImpl> {
    let pool = crate::pool::open_local(path, max_connections).await?;
    connect(pool).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::DatabaseImpl;

    /// Fresh migrated database in a temporary directory; keep the dir alive
    pub async fn create_test_database() -> Result<(DatabaseImpl, TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let db_path = temp_dir.path().join("test.db");
        let pool = crate::pool::open_local(&db_path.to_string_lossy(), 4).await?;
        let database = super::connect(pool).await?;
        Ok((database, temp_dir))
    }
}
