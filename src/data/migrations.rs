//! Versioned schema migrations.
//!
//! Each migration runs exactly once and is tracked in the `schema_migrations` table.
//! Migrations are applied in order by version number.

use std::collections::HashSet;

use rusqlite::{params, Connection};

/// A database migration with a version number, name, and SQL to execute.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    /// SQL to execute (can be multiple statements)
    pub sql: &'static str,
}

/// All migrations in order. New migrations go at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_run_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS run (
                id TEXT PRIMARY KEY NOT NULL,
                cwd TEXT NOT NULL,
                description TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                error_message TEXT,
                traceback TEXT,
                stats BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_run_start_time ON run(start_time);
        "#,
    },
    Migration {
        version: 2,
        name: "create_trace_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS trace (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                call_id TEXT,
                event TEXT NOT NULL,
                func_name TEXT NOT NULL,
                line_no INTEGER NOT NULL,
                filename TEXT NOT NULL,
                trace_arg TEXT NOT NULL,
                local_vars TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES run(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_trace_run_thread ON trace(run_id, thread_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_file_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS file (
                signature TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                body TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_run_file_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS run_file (
                run_id TEXT NOT NULL,
                signature TEXT NOT NULL,
                PRIMARY KEY (run_id, signature),
                FOREIGN KEY (run_id) REFERENCES run(id) ON DELETE CASCADE,
                FOREIGN KEY (signature) REFERENCES file(signature)
            );
            CREATE INDEX IF NOT EXISTS idx_run_file_signature ON run_file(signature);
        "#,
    },
];

fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the set of already-applied migration versions.
pub(crate) fn get_applied_versions(conn: &Connection) -> rusqlite::Result<HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<HashSet<i64>>>()?;
    Ok(versions)
}

/// Run all pending migrations, each in its own transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        let result = tx.execute_batch(migration.sql).and_then(|_| {
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, now],
            )
        });
        if let Err(e) = result.and_then(|_| tx.commit()) {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }
    }

    Ok(())
}
