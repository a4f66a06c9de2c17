//! Site model and published artifacts for kiln.
//!
//! This crate provides:
//! - [`PageNode`] and [`ContentTree`]: the editable page tree and its flattened
//!   [`Page`] view with derived `branch`, `path` and `to`
//! - [`ArtifactKind`]: per-page editable artifacts (`pages/{id}.vue`,
//!   `pages/{id}.jsonld`, `docs/{id}.md`)
//! - [`Manifest`] and [`Importmap`]: the runtime build manifest and the import
//!   bindings derived from it
//! - Renderers for every published artifact: page HTML ([`PageTemplate`]),
//!   `sitemap.xml` ([`render_sitemap`]) and the JSON, Atom and RSS feeds
//!   ([`FeedState`])
//!
//! Everything here is pure: no I/O, no async. The sync engine decides when to
//! render and where to write.

mod artifact;
mod error;
mod feed;
mod frontmatter;
mod html;
mod importmap;
mod manifest;
mod page;
mod sitemap;
mod tree;
mod xml;

pub use artifact::{ArtifactKind, Parsed};
pub use error::SiteError;
pub use feed::{FeedItem, FeedState, JsonFeed};
pub use frontmatter::parse_frontmatter;
pub use html::PageTemplate;
pub use importmap::Importmap;
pub use manifest::{MANIFEST_KEY, Manifest, ManifestEntry};
pub use page::{Image, PageNode, Record};
pub use sitemap::{encode_uri, render_sitemap};
pub use tree::{ContentTree, Page, loc_html_key, path_html_key};
