//! Database module for SQLite persistence.
//!
//! SQLite holds the append-only revision logs for documents and attachments.

mod attachments;
mod rollback;
mod store;
mod transfer;

pub use store::Store;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // One row per document identity. AUTOINCREMENT keeps row ids from being
    // reused after a delete, so a recreated identity starts a fresh chain.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            wiki TEXT NOT NULL,
            space TEXT NOT NULL,
            page TEXT NOT NULL,
            language TEXT NOT NULL DEFAULT '',
            UNIQUE (wiki, space, page, language)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only document revision log; current = highest (major, minor).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revisions (
            document_id INTEGER NOT NULL,
            major INTEGER NOT NULL,
            minor INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            parent TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            syntax TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            modified TEXT NOT NULL,
            objects TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (document_id, major, minor)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only attachment revision log, stamped with the document revision
    // current when each attachment state was committed.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachment_revisions (
            document_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            major INTEGER NOT NULL,
            minor INTEGER NOT NULL,
            content BLOB NOT NULL,
            doc_major INTEGER NOT NULL,
            doc_minor INTEGER NOT NULL,
            modified TEXT NOT NULL,
            PRIMARY KEY (document_id, filename, major, minor)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Deletion events, also stamped with the document revision at which the
    // attachment became absent. History is never erased by a delete.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachment_deletions (
            document_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            doc_major INTEGER NOT NULL,
            doc_minor INTEGER NOT NULL,
            deleted_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Present/absent flag at the current document revision.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachment_current (
            document_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            present INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (document_id, filename)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for common queries
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_documents_identity ON documents(wiki, space, page)",
        "CREATE INDEX IF NOT EXISTS idx_revisions_document ON revisions(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_attachment_revisions_file ON attachment_revisions(document_id, filename)",
        "CREATE INDEX IF NOT EXISTS idx_attachment_deletions_file ON attachment_deletions(document_id, filename)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
