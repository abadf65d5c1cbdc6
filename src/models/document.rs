//! Document identity, revisions and page representations.

use serde::{Deserialize, Serialize};

use super::object::ObjectInstance;
use super::version::Version;
use crate::errors::AppError;

/// Default wiki syntax identifier for new documents.
pub const DEFAULT_SYNTAX: &str = "xwiki/2.1";

/// Addresses one revision chain: (wiki, space, page, optional language).
///
/// Language absent means the default/original document; present means a
/// translation variant with its own independent revision log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    pub wiki: String,
    pub space: String,
    pub page: String,
    pub language: Option<String>,
}

impl DocumentId {
    pub fn new(wiki: impl Into<String>, space: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            wiki: wiki.into(),
            space: space.into(),
            page: page.into(),
            language: None,
        }
    }

    /// The same page in a specific language.
    pub fn translation(&self, language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..self.clone()
        }
    }

    /// "Space.Page" reference, as used in parent fields.
    pub fn page_ref(&self) -> String {
        format!("{}.{}", self.space, self.page)
    }

    /// "wiki:Space.Page" identifier, as used in copyFrom/moveFrom parameters.
    pub fn full_id(&self) -> String {
        format!("{}:{}.{}", self.wiki, self.space, self.page)
    }

    /// Language column value; translations never share a chain with the default.
    pub fn language_key(&self) -> &str {
        self.language.as_deref().unwrap_or("")
    }

    /// Key for the per-identity writer lock.
    pub fn lock_key(&self) -> String {
        format!("{}:{}.{};{}", self.wiki, self.space, self.page, self.language_key())
    }

    /// Parse a "wiki:Space.Page" identifier.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let (wiki, rest) = s
            .split_once(':')
            .ok_or_else(|| AppError::InvalidRequest(format!("Invalid page id: {}", s)))?;
        let (space, page) = rest
            .split_once('.')
            .ok_or_else(|| AppError::InvalidRequest(format!("Invalid page id: {}", s)))?;
        if wiki.is_empty() || space.is_empty() || page.is_empty() {
            return Err(AppError::InvalidRequest(format!("Invalid page id: {}", s)));
        }
        Ok(Self::new(wiki, space, page))
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}.{}", self.wiki, self.space, self.page)?;
        if let Some(language) = &self.language {
            write!(f, ";{}", language)?;
        }
        Ok(())
    }
}

/// One immutable stored state of a document.
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: DocumentId,
    pub version: Version,
    pub title: String,
    pub content: String,
    pub parent: Option<String>,
    pub tags: Vec<String>,
    pub syntax: String,
    pub comment: String,
    pub author: String,
    pub modified: String,
    pub objects: Vec<ObjectInstance>,
}

/// Patch carried by a save: only fields the caller intends to set.
///
/// Unspecified fields are preserved from the current revision, except the
/// object collection which fully replaces the prior one when present
/// (an explicitly empty list clears all objects).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePageRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub syntax: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub objects: Option<Vec<ObjectInstance>>,
}

impl SavePageRequest {
    /// True when the patch sets nothing at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.parent.is_none()
            && self.tags.is_none()
            && self.syntax.is_none()
            && self.comment.is_none()
            && self.objects.is_none()
    }
}

/// A hyperlink in a resource representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
        }
    }
}

/// A translation entry on a page representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationSummary {
    pub language: String,
    pub links: Vec<Link>,
}

/// Translation listing resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translations {
    pub translations: Vec<TranslationSummary>,
}

/// Page resource representation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub wiki: String,
    pub space: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub title: String,
    pub content: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub syntax: String,
    pub version: String,
    pub author: String,
    pub modified: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectInstance>>,
    pub translations: Vec<TranslationSummary>,
    pub links: Vec<Link>,
}

/// Short page form used in children listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: String,
    pub wiki: String,
    pub space: String,
    pub name: String,
    pub title: String,
    pub links: Vec<Link>,
}

/// Children listing resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pages {
    pub page_summaries: Vec<PageSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_id() {
        let id = DocumentId::parse("xwiki:Main.WebHome").unwrap();
        assert_eq!(id.wiki, "xwiki");
        assert_eq!(id.space, "Main");
        assert_eq!(id.page, "WebHome");
        assert_eq!(id.language, None);
        assert_eq!(id.full_id(), "xwiki:Main.WebHome");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(DocumentId::parse("Main.WebHome").is_err());
        assert!(DocumentId::parse("xwiki:WebHome").is_err());
        assert!(DocumentId::parse(":Main.WebHome").is_err());
    }

    #[test]
    fn test_translation_identity_is_distinct() {
        let id = DocumentId::new("xwiki", "Main", "WebHome");
        let fr = id.translation("fr");
        assert_ne!(id.lock_key(), fr.lock_key());
        assert_eq!(fr.language_key(), "fr");
        assert_eq!(id.language_key(), "");
    }
}
