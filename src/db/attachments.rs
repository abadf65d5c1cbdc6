//! Attachment revision store.
//!
//! Attachment versions advance only when the binary content actually
//! changes; re-saving the owning document never touches them. Every content
//! change and every delete also appends a major document revision, which
//! stamps the attachment log with the causal link rollback walks.

use chrono::Utc;
use sqlx::Row;

use super::store::{append_derived_revision, current_revision, find_doc_id, Store};
use crate::errors::AppError;
use crate::models::{AttachmentRevision, DocumentId, EditKind, Version};

impl Store {
    /// Store attachment bytes, appending a new attachment revision only if
    /// the content differs from the current one.
    ///
    /// Returns the revision plus whether content actually changed. On an
    /// identical re-upload the existing current revision is returned
    /// unchanged and the document log is not advanced.
    pub async fn put_attachment(
        &self,
        id: &DocumentId,
        filename: &str,
        bytes: Vec<u8>,
        author: &str,
    ) -> Result<(AttachmentRevision, bool), AppError> {
        if filename.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Attachment filename is required".to_string(),
            ));
        }

        let _guard = self.lock_identity(id).await?;
        let mut tx = self.pool.begin().await?;

        let doc_id = find_doc_id(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;
        let base_doc = current_revision(&mut *tx, doc_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        let latest = latest_attachment(&mut *tx, doc_id, filename).await?;
        let present = attachment_present(&mut *tx, doc_id, filename).await?;

        if present {
            if let Some(current) = &latest {
                if current.content == bytes {
                    // Nothing written; the open transaction is simply dropped.
                    return Ok((current.clone(), false));
                }
            }
        }

        let comment = format!("Uploaded attachment \"{}\"", filename);
        let doc_revision =
            append_derived_revision(&mut *tx, doc_id, &base_doc, EditKind::Major, &comment, author)
                .await?;

        // Versions keep climbing across delete/re-add cycles: never reused,
        // never decreasing.
        let version = match &latest {
            Some(latest) => latest.version.next(EditKind::Major),
            None => Version::FIRST,
        };

        let revision = AttachmentRevision {
            filename: filename.to_string(),
            version,
            content: bytes,
            content_dirty: true,
            doc_version: doc_revision.version,
            modified: Utc::now().to_rfc3339(),
        };
        insert_attachment_revision(&mut *tx, doc_id, &revision).await?;
        set_attachment_present(&mut *tx, doc_id, filename, true).await?;
        tx.commit().await?;

        tracing::debug!(
            page = %id,
            filename,
            version = %revision.version,
            doc_version = %revision.doc_version,
            "stored attachment revision"
        );
        Ok((revision, true))
    }

    /// Get an attachment revision; `version` omitted returns the current one
    /// and fails `NotFound` when the attachment is absent at the current
    /// document revision. Versioned reads go straight to the log, so history
    /// stays reachable after a delete.
    pub async fn get_attachment(
        &self,
        id: &DocumentId,
        filename: &str,
        version: Option<Version>,
    ) -> Result<AttachmentRevision, AppError> {
        let doc_id = find_doc_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        match version {
            None => {
                if !attachment_present(&self.pool, doc_id, filename).await? {
                    return Err(AppError::NotFound(format!(
                        "Attachment {} not found on page {}",
                        filename, id
                    )));
                }
                latest_attachment(&self.pool, doc_id, filename)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Attachment {} not found on page {}",
                            filename, id
                        ))
                    })
            }
            Some(v) => attachment_revision(&self.pool, doc_id, filename, v)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "Attachment {} on page {} has no revision {}",
                        filename, id, v
                    ))
                }),
        }
    }

    /// Mark the attachment absent at the current document revision. The
    /// revision log is kept so a later rollback can restore the content.
    pub async fn delete_attachment(
        &self,
        id: &DocumentId,
        filename: &str,
        author: &str,
    ) -> Result<(), AppError> {
        let _guard = self.lock_identity(id).await?;
        let mut tx = self.pool.begin().await?;

        let doc_id = find_doc_id(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        if !attachment_present(&mut *tx, doc_id, filename).await? {
            return Err(AppError::NotFound(format!(
                "Attachment {} not found on page {}",
                filename, id
            )));
        }

        let base_doc = current_revision(&mut *tx, doc_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        let comment = format!("Deleted attachment \"{}\"", filename);
        let doc_revision =
            append_derived_revision(&mut *tx, doc_id, &base_doc, EditKind::Major, &comment, author)
                .await?;

        insert_attachment_deletion(&mut *tx, doc_id, filename, doc_revision.version).await?;
        set_attachment_present(&mut *tx, doc_id, filename, false).await?;
        tx.commit().await?;

        tracing::debug!(page = %id, filename, "deleted attachment");
        Ok(())
    }

    /// Attachments present at the current document revision, with their
    /// current revision content.
    pub async fn list_attachments(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<AttachmentRevision>, AppError> {
        let doc_id = find_doc_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        let rows = sqlx::query(
            "SELECT filename FROM attachment_current WHERE document_id = ? AND present = 1 ORDER BY filename",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;

        let mut attachments = Vec::with_capacity(rows.len());
        for row in rows {
            let filename: String = row.get("filename");
            if let Some(revision) = latest_attachment(&self.pool, doc_id, &filename).await? {
                attachments.push(revision);
            }
        }
        Ok(attachments)
    }
}

// ==================== ROW-LEVEL HELPERS ====================

pub(super) async fn latest_attachment<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
) -> Result<Option<AttachmentRevision>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT filename, major, minor, content, doc_major, doc_minor, modified
           FROM attachment_revisions WHERE document_id = ? AND filename = ?
           ORDER BY major DESC, minor DESC LIMIT 1"#,
    )
    .bind(doc_id)
    .bind(filename)
    .fetch_optional(ex)
    .await?;

    Ok(row.as_ref().map(attachment_from_row))
}

pub(super) async fn attachment_revision<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
    version: Version,
) -> Result<Option<AttachmentRevision>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT filename, major, minor, content, doc_major, doc_minor, modified
           FROM attachment_revisions
           WHERE document_id = ? AND filename = ? AND major = ? AND minor = ?"#,
    )
    .bind(doc_id)
    .bind(filename)
    .bind(version.major)
    .bind(version.minor)
    .fetch_optional(ex)
    .await?;

    Ok(row.as_ref().map(attachment_from_row))
}

/// Latest attachment revision committed at or before the given document
/// version, following the causal stamps in the log.
pub(super) async fn attachment_at_doc_version<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
    target: Version,
) -> Result<Option<AttachmentRevision>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT filename, major, minor, content, doc_major, doc_minor, modified
           FROM attachment_revisions
           WHERE document_id = ? AND filename = ?
             AND (doc_major < ? OR (doc_major = ? AND doc_minor <= ?))
           ORDER BY major DESC, minor DESC LIMIT 1"#,
    )
    .bind(doc_id)
    .bind(filename)
    .bind(target.major)
    .bind(target.major)
    .bind(target.minor)
    .fetch_optional(ex)
    .await?;

    Ok(row.as_ref().map(attachment_from_row))
}

/// Whether a deletion event sits between the given attachment revision and
/// the target document version, making the attachment absent at that point.
pub(super) async fn deleted_between<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
    after: Version,
    target: Version,
) -> Result<bool, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS n FROM attachment_deletions
           WHERE document_id = ? AND filename = ?
             AND (doc_major < ? OR (doc_major = ? AND doc_minor <= ?))
             AND (doc_major > ? OR (doc_major = ? AND doc_minor > ?))"#,
    )
    .bind(doc_id)
    .bind(filename)
    .bind(target.major)
    .bind(target.major)
    .bind(target.minor)
    .bind(after.major)
    .bind(after.major)
    .bind(after.minor)
    .fetch_one(ex)
    .await?;

    Ok(row.get::<i64, _>("n") > 0)
}

pub(super) async fn attachment_present<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
) -> Result<bool, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        "SELECT present FROM attachment_current WHERE document_id = ? AND filename = ?",
    )
    .bind(doc_id)
    .bind(filename)
    .fetch_optional(ex)
    .await?;

    Ok(row.map(|r| r.get::<i64, _>("present") != 0).unwrap_or(false))
}

pub(super) async fn set_attachment_present<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
    present: bool,
) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO attachment_current (document_id, filename, present) VALUES (?, ?, ?)
           ON CONFLICT (document_id, filename) DO UPDATE SET present = excluded.present"#,
    )
    .bind(doc_id)
    .bind(filename)
    .bind(present as i64)
    .execute(ex)
    .await?;

    Ok(())
}

pub(super) async fn insert_attachment_revision<'e, E>(
    ex: E,
    doc_id: i64,
    revision: &AttachmentRevision,
) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO attachment_revisions (
            document_id, filename, major, minor, content, doc_major, doc_minor, modified
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(doc_id)
    .bind(&revision.filename)
    .bind(revision.version.major)
    .bind(revision.version.minor)
    .bind(&revision.content)
    .bind(revision.doc_version.major)
    .bind(revision.doc_version.minor)
    .bind(&revision.modified)
    .execute(ex)
    .await?;

    Ok(())
}

pub(super) async fn insert_attachment_deletion<'e, E>(
    ex: E,
    doc_id: i64,
    filename: &str,
    doc_version: Version,
) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO attachment_deletions (document_id, filename, doc_major, doc_minor, deleted_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(doc_id)
    .bind(filename)
    .bind(doc_version.major)
    .bind(doc_version.minor)
    .bind(Utc::now().to_rfc3339())
    .execute(ex)
    .await?;

    Ok(())
}

fn attachment_from_row(row: &sqlx::sqlite::SqliteRow) -> AttachmentRevision {
    AttachmentRevision {
        filename: row.get("filename"),
        version: Version::new(row.get("major"), row.get("minor")),
        content: row.get("content"),
        // Stored revisions are committed; dirty is transient by definition.
        content_dirty: false,
        doc_version: Version::new(row.get("doc_major"), row.get("doc_minor")),
        modified: row.get("modified"),
    }
}
