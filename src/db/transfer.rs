//! Conflict-aware copy/move operator.
//!
//! The destination-existence check and the create commit under the
//! destination identity's writer lock in one transaction, so two racing
//! requests for the same destination cannot both succeed as "created"; the
//! loser observes `Conflict` and the first writer's content stands. Move
//! additionally deletes the source inside the same transaction, so a
//! conflict leaves the source untouched.

use chrono::Utc;

use super::store::{
    current_revision, delete_document_rows, find_doc_id, insert_document, insert_revision, Store,
};
use crate::errors::AppError;
use crate::models::{DocumentId, Revision, Version};

impl Store {
    /// Create `destination` from the current state of `source`. The copy
    /// starts a fresh revision chain at 1.1 with independent history.
    pub async fn copy(
        &self,
        source: &DocumentId,
        destination: &DocumentId,
        author: &str,
    ) -> Result<Revision, AppError> {
        self.transfer(source, destination, author, false).await
    }

    /// Create `destination` from `source`, then delete `source`.
    /// All-or-nothing: on conflict the source is left untouched.
    pub async fn move_page(
        &self,
        source: &DocumentId,
        destination: &DocumentId,
        author: &str,
    ) -> Result<Revision, AppError> {
        self.transfer(source, destination, author, true).await
    }

    async fn transfer(
        &self,
        source: &DocumentId,
        destination: &DocumentId,
        author: &str,
        delete_source: bool,
    ) -> Result<Revision, AppError> {
        if source == destination {
            return Err(AppError::InvalidRequest(format!(
                "Source and destination are the same page: {}",
                source
            )));
        }

        // Destination-identity exclusivity only; the store is never locked
        // as a whole.
        let _guard = self.lock_identity(destination).await?;
        let mut tx = self.pool.begin().await?;

        let source_doc_id = find_doc_id(&mut *tx, source)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source page {} not found", source)))?;
        let source_revision = current_revision(&mut *tx, source_doc_id, source)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source page {} not found", source)))?;

        if find_doc_id(&mut *tx, destination).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Page {} already exists",
                destination
            )));
        }

        let doc_id = insert_document(&mut *tx, destination).await?;
        let comment = if delete_source {
            format!("Moved from {}", source.full_id())
        } else {
            format!("Copied from {}", source.full_id())
        };
        let revision = Revision {
            id: destination.clone(),
            version: Version::FIRST,
            title: source_revision.title,
            content: source_revision.content,
            parent: source_revision.parent,
            tags: source_revision.tags,
            syntax: source_revision.syntax,
            comment,
            author: author.to_string(),
            modified: Utc::now().to_rfc3339(),
            objects: source_revision.objects,
        };
        insert_revision(&mut *tx, doc_id, &revision).await?;

        if delete_source {
            delete_document_rows(&mut tx, source_doc_id).await?;
        }
        tx.commit().await?;

        tracing::info!(
            source = %source,
            destination = %destination,
            moved = delete_source,
            "transferred page"
        );
        Ok(revision)
    }
}
