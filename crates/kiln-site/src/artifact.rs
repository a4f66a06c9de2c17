//! Per-page editable artifacts.

use crate::frontmatter::parse_frontmatter;
use crate::page::{PageNode, Record};

/// Default JSON-LD document.
pub(crate) const DEFAULT_JSONLD: &str = "{\n    \"@context\": \"https://schema.org\"\n}";

/// Default markdown document.
const DEFAULT_MARKDOWN: &str = "---
title: Title
meta:
  - name: description
    content: Description
attrs:
  class:
    - prose
    - max-w-none
joint: true
hidden: false
---
";

/// Kind of per-page artifact backed by an editor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    /// Page component markup, `pages/{id}.vue`.
    Markup,
    /// Structured data, `pages/{id}.jsonld`.
    JsonLd,
    /// Markdown document with front matter, `docs/{id}.md`.
    Markdown,
}

/// Result of parsing a structured buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parsed {
    pub record: Record,
    /// Parse diagnostic; `None` when the buffer parsed cleanly.
    pub message: Option<String>,
}

impl ArtifactKind {
    /// All kinds, in deletion order.
    pub const ALL: [ArtifactKind; 3] = [Self::Markup, Self::JsonLd, Self::Markdown];

    /// Object key of this artifact for page `id`.
    #[must_use]
    pub fn key(self, id: &str) -> String {
        match self {
            Self::Markup => format!("pages/{id}.vue"),
            Self::JsonLd => format!("pages/{id}.jsonld"),
            Self::Markdown => format!("docs/{id}.md"),
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Markup => "text/plain",
            Self::JsonLd => "application/ld+json",
            Self::Markdown => "text/markdown",
        }
    }

    /// Content seeded into a new buffer when nothing is stored yet.
    #[must_use]
    pub fn default_content(self) -> &'static str {
        match self {
            Self::Markup => "<template></template>",
            Self::JsonLd => DEFAULT_JSONLD,
            Self::Markdown => DEFAULT_MARKDOWN,
        }
    }

    /// True for kinds whose content is mirrored onto the page node.
    #[must_use]
    pub fn is_structured(self) -> bool {
        !matches!(self, Self::Markup)
    }

    /// Parse buffer content into a record.
    ///
    /// Never fails: invalid content yields an empty record and a message.
    /// Markup has no structure and always yields an empty record.
    #[must_use]
    pub fn parse(self, content: &str) -> Parsed {
        let result = match self {
            Self::Markup => return Parsed::default(),
            Self::JsonLd => match serde_json::from_str::<serde_json::Value>(content) {
                Ok(serde_json::Value::Object(record)) => Ok(record),
                Ok(_) => Err("JSON-LD must be an object".to_owned()),
                Err(e) => Err(e.to_string()),
            },
            Self::Markdown => parse_frontmatter(content).map_err(|e| e.to_string()),
        };
        match result {
            Ok(record) => Parsed {
                record,
                message: None,
            },
            Err(message) => Parsed {
                record: Record::new(),
                message: Some(message),
            },
        }
    }

    /// The node field mirrored from this artifact.
    pub fn record_mut(self, node: &mut PageNode) -> Option<&mut Record> {
        match self {
            Self::Markup => None,
            Self::JsonLd => Some(&mut node.jsonld),
            Self::Markdown => Some(&mut node.frontmatter),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(ArtifactKind::Markup.key("a1"), "pages/a1.vue");
        assert_eq!(ArtifactKind::JsonLd.key("a1"), "pages/a1.jsonld");
        assert_eq!(ArtifactKind::Markdown.key("a1"), "docs/a1.md");
    }

    #[test]
    fn test_defaults_parse_cleanly() {
        let jsonld = ArtifactKind::JsonLd.parse(ArtifactKind::JsonLd.default_content());
        assert_eq!(jsonld.message, None);
        assert_eq!(jsonld.record.get("@context"), Some(&json!("https://schema.org")));

        let md = ArtifactKind::Markdown.parse(ArtifactKind::Markdown.default_content());
        assert_eq!(md.message, None);
        assert_eq!(md.record.get("title"), Some(&json!("Title")));
    }

    #[test]
    fn test_invalid_jsonld_degrades() {
        let parsed = ArtifactKind::JsonLd.parse("{ nope");

        assert!(parsed.record.is_empty());
        assert!(parsed.message.is_some());
    }

    #[test]
    fn test_jsonld_array_degrades() {
        let parsed = ArtifactKind::JsonLd.parse("[]");

        assert!(parsed.record.is_empty());
        assert_eq!(parsed.message.as_deref(), Some("JSON-LD must be an object"));
    }

    #[test]
    fn test_markup_is_not_structured() {
        assert!(!ArtifactKind::Markup.is_structured());
        assert_eq!(ArtifactKind::Markup.parse("<template>"), Parsed::default());
        assert!(ArtifactKind::Markup.record_mut(&mut PageNode::default()).is_none());
    }

    #[test]
    fn test_record_mut() {
        let mut node = PageNode::new("a");

        ArtifactKind::Markdown
            .record_mut(&mut node)
            .unwrap()
            .insert("title".to_owned(), json!("T"));

        assert_eq!(node.frontmatter.get("title"), Some(&json!("T")));
    }
}
