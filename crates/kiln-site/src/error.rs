//! Error type for site model operations.

/// Error from parsing or rendering site artifacts.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Front matter must be a mapping")]
    FrontmatterNotMapping,
    #[error("Failed to write XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Failed to write XML: {0}")]
    Io(#[from] std::io::Error),
}
