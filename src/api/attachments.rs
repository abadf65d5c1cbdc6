//! Attachment API endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{page_uri, parse_rev};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{AttachmentInfo, AttachmentRevision, Attachments, DocumentId, Link};
use crate::AppState;

/// Query parameters for attachment reads.
#[derive(Debug, Default, Deserialize)]
pub struct GetAttachmentQuery {
    pub rev: Option<String>,
}

/// GET /wikis/{wiki}/spaces/{space}/pages/{page}/attachments
pub async fn list_attachments(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    _caller: Caller,
) -> Result<Json<Attachments>, AppError> {
    let id = DocumentId::new(wiki, space, page);
    let revisions = state.store.list_attachments(&id).await?;

    let attachments = revisions
        .iter()
        .map(|revision| attachment_info(&id, revision))
        .collect();
    Ok(Json(Attachments { attachments }))
}

/// GET .../attachments/{filename} - Raw attachment bytes.
///
/// `rev=M.m` reads a historical revision straight from the log, which works
/// even after the attachment was deleted from the current page.
pub async fn get_attachment(
    State(state): State<AppState>,
    Path((wiki, space, page, filename)): Path<(String, String, String, String)>,
    Query(query): Query<GetAttachmentQuery>,
    _caller: Caller,
) -> Result<Response, AppError> {
    let id = DocumentId::new(wiki, space, page);
    let version = query.rev.as_deref().map(parse_rev).transpose()?;
    let revision = state.store.get_attachment(&id, &filename, version).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        revision.content,
    )
        .into_response())
}

/// PUT .../attachments/{filename} - Store attachment bytes.
///
/// 201 when the upload changed the stored content (new page or new bytes),
/// 202 when the bytes were identical and nothing advanced.
pub async fn put_attachment(
    State(state): State<AppState>,
    Path((wiki, space, page, filename)): Path<(String, String, String, String)>,
    caller: Caller,
    body: Bytes,
) -> Result<(StatusCode, Json<AttachmentInfo>), AppError> {
    caller.require_write()?;

    let id = DocumentId::new(wiki, space, page);
    let (revision, changed) = state
        .store
        .put_attachment(&id, &filename, body.to_vec(), &caller.name)
        .await?;

    let status = if changed {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(attachment_info(&id, &revision))))
}

/// DELETE .../attachments/{filename} - Remove the attachment from the page.
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((wiki, space, page, filename)): Path<(String, String, String, String)>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require_write()?;

    let id = DocumentId::new(wiki, space, page);
    state
        .store
        .delete_attachment(&id, &filename, &caller.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn attachment_info(id: &DocumentId, revision: &AttachmentRevision) -> AttachmentInfo {
    let uri = format!("{}/attachments/{}", page_uri(id), revision.filename);
    AttachmentInfo {
        id: format!("{}@{}", id.full_id(), revision.filename),
        name: revision.filename.clone(),
        size: revision.content.len() as i64,
        version: revision.version.to_string(),
        page_version: revision.doc_version.to_string(),
        content_dirty: revision.content_dirty,
        modified: revision.modified.clone(),
        links: vec![Link::new("attachment", uri)],
    }
}
