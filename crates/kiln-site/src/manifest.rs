//! Runtime build manifest (`.vite/manifest.json`).
//!
//! Maps each build entry to the file it was emitted as. Entries flagged
//! `isStaticEntry` are addressed by name through the importmap; every `file` and
//! `css` value forms the set of build assets that must exist in a published site.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::SiteError;

/// Object key of the build manifest, locally and in published sites.
pub const MANIFEST_KEY: &str = ".vite/manifest.json";

/// One build entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub is_static_entry: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css: Vec<String>,
}

/// Build manifest keyed by entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Parse manifest JSON. Empty content is an empty manifest.
    pub fn parse(content: &str) -> Result<Self, SiteError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(content)?)
    }

    /// Parse manifest JSON, treating invalid content as empty.
    #[must_use]
    pub fn parse_lenient(content: &str) -> Self {
        Self::parse(content).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring invalid build manifest");
            Self::default()
        })
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, ManifestEntry> {
        &self.entries
    }

    /// Add an entry.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, entry: ManifestEntry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, file)` of every static entry.
    #[must_use]
    pub fn static_entries(&self) -> Vec<(String, String)> {
        self.entries
            .values()
            .filter(|e| e.is_static_entry)
            .filter_map(|e| Some((e.name.clone()?, e.file.clone()?)))
            .collect()
    }

    /// Every emitted asset: `file` and `css` values of all entries.
    #[must_use]
    pub fn files(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .flat_map(|e| e.file.iter().chain(e.css.iter()))
            .filter(|f| !f.is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MANIFEST: &str = r#"{
        "index.html": {
            "file": "assets/index-abc.js",
            "name": "index",
            "src": "index.html",
            "isEntry": true,
            "css": ["assets/index-def.css"]
        },
        "node_modules/vue/dist/vue.runtime.esm-browser.prod.js": {
            "file": "assets/vue.js",
            "name": "vue",
            "isStaticEntry": true
        },
        "_chunk.js": {
            "file": "assets/chunk-123.js",
            "css": ["assets/chunk-456.css"]
        }
    }"#;

    #[test]
    fn test_parse_entries() {
        let manifest = Manifest::parse(MANIFEST).unwrap();

        let index = &manifest.entries()["index.html"];
        assert!(index.is_entry);
        assert!(!index.is_static_entry);
        assert_eq!(index.css, vec!["assets/index-def.css"]);
    }

    #[test]
    fn test_static_entries() {
        let manifest = Manifest::parse(MANIFEST).unwrap();

        assert_eq!(
            manifest.static_entries(),
            vec![("vue".to_owned(), "assets/vue.js".to_owned())]
        );
    }

    #[test]
    fn test_files_include_css_of_all_entries() {
        let manifest = Manifest::parse(MANIFEST).unwrap();

        let files: Vec<_> = manifest.files().into_iter().collect();
        assert_eq!(
            files,
            vec![
                "assets/chunk-123.js",
                "assets/chunk-456.css",
                "assets/index-abc.js",
                "assets/index-def.css",
                "assets/vue.js",
            ]
        );
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(Manifest::parse("").unwrap().is_empty());
        assert!(Manifest::parse("not json").is_err());
        assert!(Manifest::parse_lenient("not json").is_empty());
    }
}
