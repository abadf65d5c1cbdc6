//! History, children and rollback endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{build_page, page_uri, parse_rev};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    DocumentId, History, HistorySummary, Link, Page, PageSummary, Pages,
};
use crate::AppState;

/// Query parameters for history listings.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Offset into the ascending listing, for restarting partway through.
    pub start: Option<i64>,
    /// Maximum number of summaries to return.
    pub number: Option<i64>,
}

/// Query parameters for rollback.
#[derive(Debug, Default, Deserialize)]
pub struct RollbackQuery {
    pub rev: Option<String>,
    pub confirm: Option<String>,
}

/// GET /wikis/{wiki}/spaces/{space}/pages/{page}/history
pub async fn get_history(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    Query(query): Query<HistoryQuery>,
    _caller: Caller,
) -> Result<Json<History>, AppError> {
    read_history(&state, DocumentId::new(wiki, space, page), query).await
}

/// GET .../translations/{language}/history
pub async fn get_translation_history(
    State(state): State<AppState>,
    Path((wiki, space, page, language)): Path<(String, String, String, String)>,
    Query(query): Query<HistoryQuery>,
    _caller: Caller,
) -> Result<Json<History>, AppError> {
    let id = DocumentId::new(wiki, space, page).translation(language);
    read_history(&state, id, query).await
}

/// GET /wikis/{wiki}/spaces/{space}/pages/{page}/children
///
/// Default-language pages whose current parent reference is this page.
pub async fn get_children(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    _caller: Caller,
) -> Result<Json<Pages>, AppError> {
    let id = DocumentId::new(wiki, space, page);
    let children = state.store.children(&id).await?;

    let page_summaries = children
        .into_iter()
        .map(|(child, title)| {
            let uri = page_uri(&child);
            PageSummary {
                id: child.to_string(),
                wiki: child.wiki.clone(),
                space: child.space.clone(),
                name: child.page.clone(),
                title,
                links: vec![Link::new("page", uri)],
            }
        })
        .collect();

    Ok(Json(Pages { page_summaries }))
}

/// POST /wikis/{wiki}/spaces/{space}/pages/{page}/rollback
///
/// Requires `rev` (the target revision) and `confirm=1`; the rollback lands
/// as a new current revision and the response carries it.
pub async fn rollback_page(
    State(state): State<AppState>,
    Path((wiki, space, page)): Path<(String, String, String)>,
    Query(query): Query<RollbackQuery>,
    caller: Caller,
) -> Result<Json<Page>, AppError> {
    caller.require_write()?;

    let confirmed = matches!(query.confirm.as_deref(), Some("1") | Some("true"));
    if !confirmed {
        return Err(AppError::InvalidRequest(
            "Rollback requires confirm=1".to_string(),
        ));
    }
    let target = query
        .rev
        .as_deref()
        .map(parse_rev)
        .transpose()?
        .ok_or_else(|| AppError::InvalidRequest("rev parameter is required".to_string()))?;

    let id = DocumentId::new(wiki, space, page);
    let revision = state.store.rollback(&id, target, &caller.name).await?;
    let page = build_page(&state.store, &revision, false).await?;
    Ok(Json(page))
}

async fn read_history(
    state: &AppState,
    id: DocumentId,
    query: HistoryQuery,
) -> Result<Json<History>, AppError> {
    let summaries = state
        .store
        .history(&id, query.start.unwrap_or(0), query.number)
        .await?;

    let uri = page_uri(&id);
    let history_summaries = summaries
        .into_iter()
        .map(|summary| HistorySummary {
            version: summary.version.to_string(),
            comment: summary.comment,
            author: summary.author,
            modified: summary.modified,
            links: vec![Link::new("page", format!("{}?rev={}", uri, summary.version))],
        })
        .collect();

    Ok(Json(History { history_summaries }))
}
