//! Revision history models.

use serde::Serialize;

use super::document::Link;
use super::version::Version;

/// Store-level summary of one revision, before link decoration.
#[derive(Debug, Clone)]
pub struct RevisionSummary {
    pub version: Version,
    pub comment: String,
    pub author: String,
    pub modified: String,
}

/// Summary of one revision in a document's history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub version: String,
    pub comment: String,
    pub author: String,
    pub modified: String,
    pub links: Vec<Link>,
}

/// History resource: revision summaries ascending by version.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub history_summaries: Vec<HistorySummary>,
}
