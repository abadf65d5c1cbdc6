//! Rollback engine.
//!
//! A rollback never mutates history: it appends a new current document
//! revision equal to the target revision, then reconciles the attachment
//! store so the current attachment set matches what was visible at the
//! target. Restored bytes count as new content arriving (new attachment
//! revisions); every step commits in one transaction or not at all.

use chrono::Utc;
use sqlx::Row;

use super::attachments::{
    attachment_at_doc_version, deleted_between, insert_attachment_deletion,
    insert_attachment_revision, latest_attachment, set_attachment_present, attachment_present,
};
use super::store::{current_revision, find_doc_id, insert_revision, revision_at, Store};
use crate::errors::AppError;
use crate::models::{AttachmentRevision, DocumentId, EditKind, Revision, Version};

/// What an attachment looked like at the rollback target.
enum TargetState {
    Present(AttachmentRevision),
    Absent,
}

impl Store {
    /// Restore the document (and its attachment set) to the state it had at
    /// `target`, committed as a brand-new current revision.
    pub async fn rollback(
        &self,
        id: &DocumentId,
        target: Version,
        author: &str,
    ) -> Result<Revision, AppError> {
        let _guard = self.lock_identity(id).await?;
        let mut tx = self.pool.begin().await?;

        // Step 1: resolve the target revision.
        let doc_id = find_doc_id(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;
        let target_revision = revision_at(&mut *tx, doc_id, id, target)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} has no revision {}", id, target)))?;
        let current = current_revision(&mut *tx, doc_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;

        // The rollback itself is a new revision; history stays intact.
        let new_revision = Revision {
            version: current.version.next(EditKind::Major),
            comment: format!("Rolled back to version {}", target),
            author: author.to_string(),
            modified: Utc::now().to_rfc3339(),
            ..target_revision
        };
        insert_revision(&mut *tx, doc_id, &new_revision).await?;

        // Step 2: reconstruct the attachment set as of the target version.
        let filenames: Vec<String> = sqlx::query(
            "SELECT DISTINCT filename FROM attachment_revisions WHERE document_id = ? ORDER BY filename",
        )
        .bind(doc_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|row| row.get("filename"))
        .collect();

        // Step 3: reconcile, appending only - historical rows are untouched.
        for filename in filenames {
            let state = match attachment_at_doc_version(&mut *tx, doc_id, &filename, target).await? {
                None => TargetState::Absent,
                Some(revision) => {
                    if deleted_between(&mut *tx, doc_id, &filename, revision.doc_version, target)
                        .await?
                    {
                        TargetState::Absent
                    } else {
                        TargetState::Present(revision)
                    }
                }
            };

            let present_now = attachment_present(&mut *tx, doc_id, &filename).await?;
            let latest = latest_attachment(&mut *tx, doc_id, &filename).await?;

            match state {
                TargetState::Present(at_target) => {
                    let unchanged = present_now
                        && latest
                            .as_ref()
                            .map(|l| l.content == at_target.content)
                            .unwrap_or(false);
                    if unchanged {
                        continue;
                    }
                    let version = match &latest {
                        Some(latest) => latest.version.next(EditKind::Major),
                        None => Version::FIRST,
                    };
                    let restored = AttachmentRevision {
                        filename: filename.clone(),
                        version,
                        content: at_target.content,
                        content_dirty: true,
                        doc_version: new_revision.version,
                        modified: Utc::now().to_rfc3339(),
                    };
                    insert_attachment_revision(&mut *tx, doc_id, &restored).await?;
                    set_attachment_present(&mut *tx, doc_id, &filename, true).await?;
                }
                TargetState::Absent => {
                    if present_now {
                        insert_attachment_deletion(&mut *tx, doc_id, &filename, new_revision.version)
                            .await?;
                        set_attachment_present(&mut *tx, doc_id, &filename, false).await?;
                    }
                }
            }
        }

        tx.commit().await?;

        tracing::info!(page = %id, target = %target, version = %new_revision.version, "rolled back");
        Ok(new_revision)
    }
}
