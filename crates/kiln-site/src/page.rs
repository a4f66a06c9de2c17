//! Page tree nodes as persisted in `index.json`.

use serde::{Deserialize, Serialize};

/// Structured metadata record (front matter, JSON-LD).
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Image attached to a page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Object key of the image in the active store.
    #[serde(default)]
    pub url: String,
    /// Alternative text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alt: String,
}

impl Image {
    /// Create an image without alternative text.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt: String::new(),
        }
    }
}

/// A node of the page tree.
///
/// Only persisted fields live here. Tree-derived values (`branch`, `path`, `to`)
/// are computed by [`ContentTree::pages`](crate::ContentTree::pages). Unknown
/// fields are kept in `extra` so round-tripping `index.json` loses nothing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageNode {
    #[serde(default)]
    pub id: String,

    /// URL segment of this node below its parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub children: Vec<PageNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Open Graph type (e.g. "website", "article").
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,

    #[serde(default)]
    pub images: Vec<Image>,

    /// Alternate publish location, independent of the tree position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,

    /// Include in `sitemap.xml`.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,

    /// Front matter parsed from `docs/{id}.md`.
    #[serde(default, skip_serializing_if = "Record::is_empty")]
    pub frontmatter: Record,

    /// Structured data mirrored from `pages/{id}.jsonld`. Not part of `index.json`.
    #[serde(skip)]
    pub jsonld: Record,

    #[serde(flatten)]
    pub extra: Record,
}

impl PageNode {
    /// Create a node with an id and no name.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the URL segment.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a child node.
    #[must_use]
    pub fn with_child(mut self, child: PageNode) -> Self {
        self.children.push(child);
        self
    }

    /// Visit this node and all descendants depth-first, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PageNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Find a node by id in this subtree.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&PageNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Find a node by id in this subtree, mutably.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut PageNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Non-empty image keys of this node, in order.
    #[must_use]
    pub fn image_keys(&self) -> Vec<String> {
        self.images
            .iter()
            .filter(|i| !i.url.is_empty())
            .map(|i| i.url.clone())
            .collect()
    }
}
