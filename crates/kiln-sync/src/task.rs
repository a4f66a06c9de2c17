//! Units of debounced sync work.

use std::fmt;

use kiln_site::ArtifactKind;

/// A debounced write family.
///
/// Variants are ordered so that tasks becoming ready together run in a useful
/// sequence: the tree and importmap land before the pages that depend on them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncTask {
    /// `index.json`.
    Index,
    /// `fonts.json`.
    Fonts,
    /// `index.importmap`.
    Importmap,
    /// `CNAME`.
    Cname,
    /// Editor buffer write for one page artifact.
    Buffer { id: String, kind: ArtifactKind },
    /// Per-page HTML.
    Pages,
    /// `sitemap.xml`.
    Sitemap,
    /// `feed.json`, `feed.xml` and `feed-rss.xml`.
    Feed,
    /// Orphaned image cleanup for the selected page.
    Images,
}

impl SyncTask {
    /// Families regenerated when the page tree changes.
    pub const TREE: [SyncTask; 5] = [
        Self::Index,
        Self::Pages,
        Self::Sitemap,
        Self::Feed,
        Self::Images,
    ];

    /// Families regenerated when the public domain changes.
    pub const DOMAIN: [SyncTask; 4] = [Self::Cname, Self::Pages, Self::Sitemap, Self::Feed];

    /// Editor buffer write task.
    #[must_use]
    pub fn buffer(id: impl Into<String>, kind: ArtifactKind) -> Self {
        Self::Buffer {
            id: id.into(),
            kind,
        }
    }
}

impl fmt::Display for SyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => f.write_str("index"),
            Self::Fonts => f.write_str("fonts"),
            Self::Importmap => f.write_str("importmap"),
            Self::Cname => f.write_str("cname"),
            Self::Buffer { id, kind } => f.write_str(&kind.key(id)),
            Self::Pages => f.write_str("pages"),
            Self::Sitemap => f.write_str("sitemap"),
            Self::Feed => f.write_str("feed"),
            Self::Images => f.write_str("images"),
        }
    }
}
