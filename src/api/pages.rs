//! Page API endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::{build_page, page_uri, parse_rev};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    DocumentId, EditKind, Link, Page, SavePageRequest, TranslationSummary, Translations,
};
use crate::AppState;

/// Query parameters accepted by page reads.
#[derive(Debug, Default, Deserialize)]
pub struct GetPageQuery {
    pub rev: Option<String>,
    pub objects: Option<bool>,
}

/// Query parameters accepted by page saves.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePageQuery {
    pub copy_from: Option<String>,
    pub move_from: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub parent: Option<String>,
    /// Pipe-delimited tag list, e.g. `tags=foo|bar`.
    pub tags: Option<String>,
    pub comment: Option<String>,
    pub minor: Option<bool>,
    /// Administrative (non-authorial) save: bumps the minor component like a
    /// minor edit but labels the save as housekeeping.
    pub admin: Option<bool>,
    /// Verb override for HTML-form POSTs: `method=PUT`.
    pub method: Option<String>,
}

/// Form body accepted by POST with `method=PUT`.
#[derive(Debug, Default, Deserialize)]
pub struct SavePageForm {
    pub method: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub parent: Option<String>,
    pub tags: Option<String>,
    pub syntax: Option<String>,
    pub comment: Option<String>,
    pub minor: Option<String>,
}

/// GET /wikis/{wiki}/spaces/{space}/pages/{page} - Current or historical page.
pub async fn get_page(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    Query(query): Query<GetPageQuery>,
    _caller: Caller,
) -> Result<Json<Page>, AppError> {
    read_page(&state, DocumentId::new(wiki, space, page), query).await
}

/// GET /wikis/{wiki}/spaces/{space}/pages/{page}/translations/{language}
pub async fn get_translation(
    State(state): State<AppState>,
    Path((wiki, space, page, language)): Path<(String, String, String, String)>,
    Query(query): Query<GetPageQuery>,
    _caller: Caller,
) -> Result<Json<Page>, AppError> {
    let id = DocumentId::new(wiki, space, page).translation(language);
    read_page(&state, id, query).await
}

/// PUT /wikis/{wiki}/spaces/{space}/pages/{page} - Create or update a page.
///
/// 201 when the save creates the page, 202 when it updates it.
pub async fn put_page(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    Query(query): Query<SavePageQuery>,
    caller: Caller,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Page>), AppError> {
    let patch = parse_save_body(&headers, &body)?;
    save_page(&state, DocumentId::new(wiki, space, page), query, patch, caller).await
}

/// PUT .../translations/{language} - Create or update a translation.
pub async fn put_translation(
    State(state): State<AppState>,
    Path((wiki, space, page, language)): Path<(String, String, String, String)>,
    Query(query): Query<SavePageQuery>,
    caller: Caller,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Page>), AppError> {
    let id = DocumentId::new(wiki, space, page).translation(language);
    let patch = parse_save_body(&headers, &body)?;
    save_page(&state, id, query, patch, caller).await
}

/// POST /wikis/{wiki}/spaces/{space}/pages/{page} - Form save.
///
/// Only honored as a save when `method=PUT` is present in the query string
/// or the form body; any other method value is rejected.
pub async fn post_page(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    Query(query): Query<SavePageQuery>,
    caller: Caller,
    axum::Form(form): axum::Form<SavePageForm>,
) -> Result<(StatusCode, Json<Page>), AppError> {
    let method = query
        .method
        .as_deref()
        .or(form.method.as_deref())
        .unwrap_or("");
    if !method.eq_ignore_ascii_case("PUT") {
        return Err(AppError::InvalidRequest(
            "POST requires method=PUT to act as a save".to_string(),
        ));
    }

    let patch = SavePageRequest {
        title: form.title,
        content: form.content,
        parent: form.parent,
        tags: form.tags.as_deref().map(split_tags),
        syntax: form.syntax,
        comment: form.comment,
        objects: None,
    };
    let minor = form
        .minor
        .as_deref()
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    let query = SavePageQuery {
        minor: Some(query.minor.unwrap_or(minor)),
        ..query
    };
    save_page(&state, DocumentId::new(wiki, space, page), query, patch, caller).await
}

/// DELETE /wikis/{wiki}/spaces/{space}/pages/{page} - Delete a page.
pub async fn delete_page(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require_write()?;
    state.store.delete(&DocumentId::new(wiki, space, page)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE .../translations/{language} - Delete one translation variant.
pub async fn delete_translation(
    State(state): State<AppState>,
    Path((wiki, space, page, language)): Path<(String, String, String, String)>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require_write()?;
    let id = DocumentId::new(wiki, space, page).translation(language);
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_page(
    state: &AppState,
    id: DocumentId,
    query: GetPageQuery,
) -> Result<Json<Page>, AppError> {
    let version = query.rev.as_deref().map(parse_rev).transpose()?;
    let revision = state.store.get(&id, version).await?;
    let page = build_page(&state.store, &revision, query.objects.unwrap_or(false)).await?;
    Ok(Json(page))
}

async fn save_page(
    state: &AppState,
    id: DocumentId,
    query: SavePageQuery,
    mut patch: SavePageRequest,
    caller: Caller,
) -> Result<(StatusCode, Json<Page>), AppError> {
    caller.require_write()?;

    if query.copy_from.is_some() || query.move_from.is_some() {
        return transfer_page(state, id, &query, &caller).await;
    }

    // Query parameters override the body representation field by field.
    if query.title.is_some() {
        patch.title = query.title;
    }
    if query.content.is_some() {
        patch.content = query.content;
    }
    if query.parent.is_some() {
        patch.parent = query.parent;
    }
    if let Some(tags) = query.tags.as_deref() {
        patch.tags = Some(split_tags(tags));
    }
    if query.comment.is_some() {
        patch.comment = query.comment;
    }

    let include_objects = patch.objects.is_some();
    let kind = if query.admin.unwrap_or(false) {
        EditKind::Admin
    } else if query.minor.unwrap_or(false) {
        EditKind::Minor
    } else {
        EditKind::Major
    };
    let (revision, created) = state.store.save(&id, &patch, kind, &caller.name).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    let page = build_page(&state.store, &revision, include_objects).await?;
    Ok((status, Json(page)))
}

async fn transfer_page(
    state: &AppState,
    id: DocumentId,
    query: &SavePageQuery,
    caller: &Caller,
) -> Result<(StatusCode, Json<Page>), AppError> {
    if id.language.is_some() {
        return Err(AppError::InvalidRequest(
            "copyFrom/moveFrom are not supported on translations".to_string(),
        ));
    }

    let revision = match (&query.copy_from, &query.move_from) {
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidRequest(
                "copyFrom and moveFrom are mutually exclusive".to_string(),
            ))
        }
        (Some(source), None) => {
            let source = DocumentId::parse(source)?;
            state.store.copy(&source, &id, &caller.name).await?
        }
        (None, Some(source)) => {
            let source = DocumentId::parse(source)?;
            state.store.move_page(&source, &id, &caller.name).await?
        }
        (None, None) => unreachable!("checked by caller"),
    };

    let page = build_page(&state.store, &revision, false).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

/// Parse a PUT body into a save patch based on its content type.
///
/// JSON carries the full representation; text/plain carries content only;
/// an empty body is an empty patch (touch save).
fn parse_save_body(headers: &HeaderMap, body: &Bytes) -> Result<SavePageRequest, AppError> {
    if body.is_empty() {
        return Ok(SavePageRequest::default());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/json") || content_type.is_empty() {
        let patch: SavePageRequest = serde_json::from_slice(body)?;
        Ok(patch)
    } else if content_type.starts_with("text/plain") {
        let content = std::str::from_utf8(body)
            .map_err(|_| AppError::InvalidRequest("Page content must be valid UTF-8".to_string()))?;
        Ok(SavePageRequest {
            content: Some(content.to_string()),
            ..SavePageRequest::default()
        })
    } else {
        Err(AppError::InvalidRequest(format!(
            "Unsupported content type: {}",
            content_type
        )))
    }
}

/// Split a pipe-delimited tag parameter, dropping empty segments.
fn split_tags(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// GET .../translations - Languages this page has translation variants for.
pub async fn get_translations(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    _caller: Caller,
) -> Result<Json<Translations>, AppError> {
    let id = DocumentId::new(wiki, space, page);
    if !state.store.exists(&id).await? {
        return Err(AppError::NotFound(format!("Page {} not found", id)));
    }

    let base = page_uri(&id);
    let translations = state
        .store
        .translations(&id)
        .await?
        .into_iter()
        .map(|language| {
            let uri = format!("{}/translations/{}", base, language);
            TranslationSummary {
                language,
                links: vec![
                    Link::new("page", uri.clone()),
                    Link::new("history", format!("{}/history", uri)),
                ],
            }
        })
        .collect();

    Ok(Json(crate::models::Translations { translations }))
}
