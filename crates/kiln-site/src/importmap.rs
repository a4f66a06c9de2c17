//! Import bindings published as `index.importmap`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SiteError;
use crate::page::Record;

/// Import map document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Importmap {
    #[serde(default)]
    pub imports: BTreeMap<String, String>,
    /// Other top-level members (`scopes`, `integrity`), kept as-is.
    #[serde(flatten)]
    pub extra: Record,
}

impl Importmap {
    /// Parse `index.importmap`. Empty content is an empty map.
    pub fn parse(content: &str) -> Result<Self, SiteError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(content)?)
    }

    /// Compact JSON as persisted.
    pub fn to_json(&self) -> Result<String, SiteError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Bind every static entry `name` to `./file`.
    ///
    /// Returns `true` if any binding changed.
    pub fn reconcile(&mut self, static_entries: &[(String, String)]) -> bool {
        let mut changed = false;
        for (name, file) in static_entries {
            let target = format!("./{file}");
            if self.imports.get(name) != Some(&target) {
                self.imports.insert(name.clone(), target);
                changed = true;
            }
        }
        changed
    }

    /// Targets worth preloading: every binding that is not a prefix mapping.
    #[must_use]
    pub fn module_preloads(&self) -> Vec<&str> {
        self.imports
            .values()
            .filter(|href| !href.ends_with('/'))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entries() -> Vec<(String, String)> {
        vec![("vue".to_owned(), "assets/vue.js".to_owned())]
    }

    #[test]
    fn test_reconcile_adds_missing_binding() {
        let mut map = Importmap::default();

        assert!(map.reconcile(&entries()));
        assert_eq!(map.imports["vue"], "./assets/vue.js");
    }

    #[test]
    fn test_reconcile_fixes_drift() {
        let mut map = Importmap::parse(r#"{"imports":{"vue":"./assets/vue-old.js"}}"#).unwrap();

        assert!(map.reconcile(&entries()));
        assert_eq!(map.imports["vue"], "./assets/vue.js");
    }

    #[test]
    fn test_reconcile_unchanged() {
        let mut map = Importmap::default();
        map.reconcile(&entries());

        assert!(!map.reconcile(&entries()));
    }

    #[test]
    fn test_module_preloads_skip_prefixes() {
        let map = Importmap::parse(
            r#"{"imports":{"lib/":"https://cdn.example.com/lib/","vue":"./assets/vue.js"}}"#,
        )
        .unwrap();

        assert_eq!(map.module_preloads(), vec!["./assets/vue.js"]);
    }

    #[test]
    fn test_keeps_scopes() {
        let content = r#"{"imports":{},"scopes":{"/a/":{"x":"./x.js"}}}"#;

        let map = Importmap::parse(content).unwrap();

        assert_eq!(map.to_json().unwrap(), content);
    }
}
