use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// Applies every migration newer than the recorded schema version, in order.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors and monitor logs").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Rename ssl_expired log status to ssl_issue").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors and the append-only check log
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            name TEXT,
            url TEXT NOT NULL,
            monitor_type TEXT,
            frequency_minutes INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_check_at INTEGER,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // status keeps the historical spelling set; v2 normalises old rows
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            monitor_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'up',
            response_time_ms REAL,
            error_message TEXT,
            metadata TEXT,
            checked_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (monitor_id) REFERENCES monitors(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_uuid ON monitors(uuid)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_is_active ON monitors(is_active)", ())
        .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_logs_monitor_checked ON monitors_logs(monitor_id, checked_at)",
        (),
    )
    .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_logs_status ON monitors_logs(status)", ())
        .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_logs_checked_at ON monitors_logs(checked_at)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: standardise on `ssl_issue`
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    let updated = conn
        .execute("UPDATE monitors_logs SET status = 'ssl_issue' WHERE status = 'ssl_expired'", ())
        .await?;

    if updated > 0 {
        tracing::info!("Rewrote {} legacy ssl_expired log rows", updated);
    }

    Ok(())
}
