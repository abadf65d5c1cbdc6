//! Document store: append-only revision logs keyed by document identity.
//!
//! All writes to one identity are linearized through a per-identity async
//! lock and committed in a transaction, so concurrent saves can never
//! interleave into duplicate or out-of-order version numbers. Writers to
//! unrelated identities proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::errors::AppError;
use crate::models::{
    DocumentId, EditKind, ObjectInstance, Revision, RevisionSummary, SavePageRequest, Version,
    DEFAULT_SYNTAX,
};

/// Persistent store for documents and their attachments.
pub struct Store {
    pub(super) pool: SqlitePool,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the writer lock for one identity. The registry itself is only
    /// held long enough to hand out the identity's mutex.
    pub(super) async fn lock_identity(
        &self,
        id: &DocumentId,
    ) -> Result<OwnedMutexGuard<()>, AppError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AppError::Internal("identity lock registry poisoned".to_string()))?;
            locks
                .entry(id.lock_key())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Whether the identity has at least one revision.
    pub async fn exists(&self, id: &DocumentId) -> Result<bool, AppError> {
        Ok(find_doc_id(&self.pool, id).await?.is_some())
    }

    /// Get a revision; `version` omitted returns the current one.
    pub async fn get(&self, id: &DocumentId, version: Option<Version>) -> Result<Revision, AppError> {
        let doc_id = find_doc_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        match version {
            None => current_revision(&self.pool, doc_id, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id))),
            Some(v) => revision_at(&self.pool, doc_id, id, v)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Page {} has no revision {}", id, v))
                }),
        }
    }

    /// Append a new revision built from the current one plus the patch.
    ///
    /// Returns the new revision and whether this save created the identity.
    /// Unspecified patch fields are preserved from the current revision;
    /// the object collection is full-replace when present.
    pub async fn save(
        &self,
        id: &DocumentId,
        patch: &SavePageRequest,
        kind: EditKind,
        author: &str,
    ) -> Result<(Revision, bool), AppError> {
        if let Some(objects) = &patch.objects {
            for object in objects {
                object.validate().map_err(AppError::InvalidRequest)?;
            }
        }

        let _guard = self.lock_identity(id).await?;
        let mut tx = self.pool.begin().await?;

        let (doc_id, base) = match find_doc_id(&mut *tx, id).await? {
            Some(doc_id) => {
                let base = current_revision(&mut *tx, doc_id, id).await?;
                (doc_id, base)
            }
            None => (insert_document(&mut *tx, id).await?, None),
        };
        let created = base.is_none();

        let revision = merge_revision(id, base.as_ref(), patch, kind, author);
        insert_revision(&mut *tx, doc_id, &revision).await?;
        tx.commit().await?;

        tracing::debug!(page = %id, version = %revision.version, created, "saved revision");
        Ok((revision, created))
    }

    /// Remove the identity and its entire revision log, cascading to its
    /// attachment logs. Translations are separate identities and survive.
    pub async fn delete(&self, id: &DocumentId) -> Result<(), AppError> {
        let _guard = self.lock_identity(id).await?;
        let mut tx = self.pool.begin().await?;

        let doc_id = find_doc_id(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        delete_document_rows(&mut tx, doc_id).await?;
        tx.commit().await?;

        tracing::debug!(page = %id, "deleted document");
        Ok(())
    }

    /// Revision summaries ascending by version. `start`/`number` allow a
    /// client to restart a listing partway through.
    pub async fn history(
        &self,
        id: &DocumentId,
        start: i64,
        number: Option<i64>,
    ) -> Result<Vec<RevisionSummary>, AppError> {
        let doc_id = find_doc_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        let limit = number.unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"SELECT major, minor, comment, author, modified
               FROM revisions WHERE document_id = ?
               ORDER BY major ASC, minor ASC LIMIT ? OFFSET ?"#,
        )
        .bind(doc_id)
        .bind(limit)
        .bind(start)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RevisionSummary {
                version: Version::new(row.get("major"), row.get("minor")),
                comment: row.get("comment"),
                author: row.get("author"),
                modified: row.get("modified"),
            })
            .collect())
    }

    /// Languages for which this (wiki, space, page) has translation variants.
    pub async fn translations(&self, id: &DocumentId) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            r#"SELECT language FROM documents
               WHERE wiki = ? AND space = ? AND page = ? AND language != ''
               ORDER BY language"#,
        )
        .bind(&id.wiki)
        .bind(&id.space)
        .bind(&id.page)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("language")).collect())
    }

    /// Default-language pages whose current parent reference is this page.
    pub async fn children(&self, id: &DocumentId) -> Result<Vec<(DocumentId, String)>, AppError> {
        if find_doc_id(&self.pool, id).await?.is_none() {
            return Err(AppError::NotFound(format!("Page {} not found", id)));
        }

        let parent_ref = id.page_ref();
        let rows = sqlx::query(
            r#"SELECT d.wiki, d.space, d.page,
                      (SELECT title FROM revisions r WHERE r.document_id = d.id
                       ORDER BY r.major DESC, r.minor DESC LIMIT 1) AS title,
                      (SELECT parent FROM revisions r WHERE r.document_id = d.id
                       ORDER BY r.major DESC, r.minor DESC LIMIT 1) AS parent
               FROM documents d
               WHERE d.wiki = ? AND d.language = ''
               ORDER BY d.space, d.page"#,
        )
        .bind(&id.wiki)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.get::<Option<String>, _>("parent").as_deref() == Some(&parent_ref))
            .map(|row| {
                let child = DocumentId::new(
                    row.get::<String, _>("wiki"),
                    row.get::<String, _>("space"),
                    row.get::<String, _>("page"),
                );
                let title: Option<String> = row.get("title");
                (child, title.unwrap_or_default())
            })
            .collect())
    }
}

/// Build the next revision from a base revision and a patch.
fn merge_revision(
    id: &DocumentId,
    base: Option<&Revision>,
    patch: &SavePageRequest,
    kind: EditKind,
    author: &str,
) -> Revision {
    let version = match base {
        Some(base) => base.version.next(kind),
        None => Version::FIRST,
    };

    let (title, content, parent, tags, syntax, objects) = match base {
        Some(base) => (
            patch.title.clone().unwrap_or_else(|| base.title.clone()),
            patch.content.clone().unwrap_or_else(|| base.content.clone()),
            patch.parent.clone().or_else(|| base.parent.clone()),
            patch.tags.clone().unwrap_or_else(|| base.tags.clone()),
            patch.syntax.clone().unwrap_or_else(|| base.syntax.clone()),
            // Full-replace: an explicitly empty collection clears all objects.
            patch.objects.clone().unwrap_or_else(|| base.objects.clone()),
        ),
        None => (
            patch.title.clone().unwrap_or_default(),
            patch.content.clone().unwrap_or_default(),
            patch.parent.clone(),
            patch.tags.clone().unwrap_or_default(),
            patch
                .syntax
                .clone()
                .unwrap_or_else(|| DEFAULT_SYNTAX.to_string()),
            patch.objects.clone().unwrap_or_default(),
        ),
    };

    Revision {
        id: id.clone(),
        version,
        title,
        content,
        parent,
        tags,
        syntax,
        comment: patch.comment.clone().unwrap_or_default(),
        author: author.to_string(),
        modified: Utc::now().to_rfc3339(),
        objects,
    }
}

// ==================== SHARED ROW-LEVEL HELPERS ====================
//
// These take any executor so they work against the pool or inside an open
// transaction (`&mut *tx`).

pub(super) async fn find_doc_id<'e, E>(ex: E, id: &DocumentId) -> Result<Option<i64>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        "SELECT id FROM documents WHERE wiki = ? AND space = ? AND page = ? AND language = ?",
    )
    .bind(&id.wiki)
    .bind(&id.space)
    .bind(&id.page)
    .bind(id.language_key())
    .fetch_optional(ex)
    .await?;

    Ok(row.map(|r| r.get("id")))
}

pub(super) async fn insert_document<'e, E>(ex: E, id: &DocumentId) -> Result<i64, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query("INSERT INTO documents (wiki, space, page, language) VALUES (?, ?, ?, ?)")
        .bind(&id.wiki)
        .bind(&id.space)
        .bind(&id.page)
        .bind(id.language_key())
        .execute(ex)
        .await?;

    Ok(result.last_insert_rowid())
}

pub(super) async fn current_revision<'e, E>(
    ex: E,
    doc_id: i64,
    id: &DocumentId,
) -> Result<Option<Revision>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT major, minor, title, content, parent, tags, syntax, comment, author, modified, objects
           FROM revisions WHERE document_id = ?
           ORDER BY major DESC, minor DESC LIMIT 1"#,
    )
    .bind(doc_id)
    .fetch_optional(ex)
    .await?;

    Ok(row.as_ref().map(|row| revision_from_row(id, row)))
}

pub(super) async fn revision_at<'e, E>(
    ex: E,
    doc_id: i64,
    id: &DocumentId,
    version: Version,
) -> Result<Option<Revision>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT major, minor, title, content, parent, tags, syntax, comment, author, modified, objects
           FROM revisions WHERE document_id = ? AND major = ? AND minor = ?"#,
    )
    .bind(doc_id)
    .bind(version.major)
    .bind(version.minor)
    .fetch_optional(ex)
    .await?;

    Ok(row.as_ref().map(|row| revision_from_row(id, row)))
}

pub(super) async fn insert_revision<'e, E>(
    ex: E,
    doc_id: i64,
    revision: &Revision,
) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let tags_json = serde_json::to_string(&revision.tags).unwrap_or_else(|_| "[]".to_string());
    let objects_json = serde_json::to_string(&revision.objects).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        r#"INSERT INTO revisions (
            document_id, major, minor, title, content, parent, tags, syntax,
            comment, author, modified, objects
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(doc_id)
    .bind(revision.version.major)
    .bind(revision.version.minor)
    .bind(&revision.title)
    .bind(&revision.content)
    .bind(&revision.parent)
    .bind(&tags_json)
    .bind(&revision.syntax)
    .bind(&revision.comment)
    .bind(&revision.author)
    .bind(&revision.modified)
    .bind(&objects_json)
    .execute(ex)
    .await?;

    Ok(())
}

/// Append a revision derived from `base`: same content and metadata, new
/// version, comment and author. Used when an attachment change or rollback
/// advances the document's log.
pub(super) async fn append_derived_revision<'e, E>(
    ex: E,
    doc_id: i64,
    base: &Revision,
    kind: EditKind,
    comment: &str,
    author: &str,
) -> Result<Revision, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let revision = Revision {
        version: base.version.next(kind),
        comment: comment.to_string(),
        author: author.to_string(),
        modified: Utc::now().to_rfc3339(),
        ..base.clone()
    };
    insert_revision(ex, doc_id, &revision).await?;
    Ok(revision)
}

/// Remove every row belonging to one document identity.
pub(super) async fn delete_document_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc_id: i64,
) -> Result<(), AppError> {
    for statement in [
        "DELETE FROM revisions WHERE document_id = ?",
        "DELETE FROM attachment_revisions WHERE document_id = ?",
        "DELETE FROM attachment_deletions WHERE document_id = ?",
        "DELETE FROM attachment_current WHERE document_id = ?",
        "DELETE FROM documents WHERE id = ?",
    ] {
        sqlx::query(statement).bind(doc_id).execute(&mut **tx).await?;
    }
    Ok(())
}

fn revision_from_row(id: &DocumentId, row: &sqlx::sqlite::SqliteRow) -> Revision {
    let tags_str: String = row.get("tags");
    let objects_str: String = row.get("objects");
    let tags: Vec<String> = serde_json::from_str(&tags_str).unwrap_or_default();
    let objects: Vec<ObjectInstance> = serde_json::from_str(&objects_str).unwrap_or_default();

    Revision {
        id: id.clone(),
        version: Version::new(row.get("major"), row.get("minor")),
        title: row.get("title"),
        content: row.get("content"),
        parent: row.get("parent"),
        tags,
        syntax: row.get("syntax"),
        comment: row.get("comment"),
        author: row.get("author"),
        modified: row.get("modified"),
        objects,
    }
}
