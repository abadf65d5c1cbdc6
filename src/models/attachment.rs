//! Attachment revision models.
//!
//! Each (document, filename) pair owns an ordered revision log independent of
//! the document's log, but causally stamped with the document revision that
//! was current when the attachment state was committed.

use serde::Serialize;

use super::document::Link;
use super::version::Version;

/// One immutable stored state of an attachment.
#[derive(Debug, Clone)]
pub struct AttachmentRevision {
    pub filename: String,
    pub version: Version,
    pub content: Vec<u8>,
    /// True only for the in-memory state right after a content mutation,
    /// before the mutation is committed to a stored revision. Stored
    /// revisions always read back false.
    pub content_dirty: bool,
    /// Document revision current when this attachment revision was created.
    pub doc_version: Version,
    pub modified: String,
}

/// Attachment resource representation (metadata, not bytes).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub version: String,
    pub page_version: String,
    pub content_dirty: bool,
    pub modified: String,
    pub links: Vec<Link>,
}

/// Attachment listing resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachments {
    pub attachments: Vec<AttachmentInfo>,
}
