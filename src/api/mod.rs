//! REST resource layer.
//!
//! Thin translation from HTTP verbs and query parameters onto the stores.
//! Status codes are normative: 200 read, 201 created, 202 updated,
//! 204 deleted, 400 malformed, 401 unauthorized, 404 absent, 409 conflict.

mod attachments;
mod history;
mod pages;

pub use attachments::*;
pub use history::*;
pub use pages::*;

use crate::db::Store;
use crate::errors::AppError;
use crate::models::{DocumentId, Link, Page, Revision, TranslationSummary, Version};

/// URI of a page resource (or of a translation resource when the identity
/// carries a language).
pub fn page_uri(id: &DocumentId) -> String {
    let base = format!(
        "/wikis/{}/spaces/{}/pages/{}",
        id.wiki, id.space, id.page
    );
    match &id.language {
        None => base,
        Some(language) => format!("{}/translations/{}", base, language),
    }
}

/// Parse a `rev=M.m` query value.
pub fn parse_rev(s: &str) -> Result<Version, AppError> {
    s.parse()
        .map_err(|_| AppError::InvalidRequest(format!("Invalid revision: {}", s)))
}

/// Build the page representation for a revision, with navigation links and
/// the translation listing resolved from the store.
pub async fn build_page(
    store: &Store,
    revision: &Revision,
    include_objects: bool,
) -> Result<Page, AppError> {
    let id = &revision.id;
    let uri = page_uri(id);
    let default_uri = page_uri(&DocumentId::new(
        id.wiki.clone(),
        id.space.clone(),
        id.page.clone(),
    ));

    let translations = store
        .translations(id)
        .await?
        .into_iter()
        .map(|language| {
            let translation_uri = format!("{}/translations/{}", default_uri, language);
            TranslationSummary {
                language,
                links: vec![
                    Link::new("page", translation_uri.clone()),
                    Link::new("history", format!("{}/history", translation_uri)),
                ],
            }
        })
        .collect();

    Ok(Page {
        id: id.to_string(),
        wiki: id.wiki.clone(),
        space: id.space.clone(),
        name: id.page.clone(),
        language: id.language.clone(),
        title: revision.title.clone(),
        content: revision.content.clone(),
        comment: revision.comment.clone(),
        parent: revision.parent.clone(),
        syntax: revision.syntax.clone(),
        version: revision.version.to_string(),
        author: revision.author.clone(),
        modified: revision.modified.clone(),
        tags: revision.tags.clone(),
        objects: include_objects.then(|| revision.objects.clone()),
        translations,
        links: vec![
            Link::new("self", uri.clone()),
            Link::new("history", format!("{}/history", uri)),
            Link::new("translations", format!("{}/translations", default_uri)),
            Link::new("children", format!("{}/children", default_uri)),
            Link::new("attachments", format!("{}/attachments", uri)),
        ],
    })
}
