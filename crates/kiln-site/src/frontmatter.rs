//! YAML front matter of markdown documents.

use crate::error::SiteError;
use crate::page::Record;

/// Front matter fence.
const FENCE: &str = "---";

/// Parse the YAML front matter at the top of `markdown`.
///
/// A document without a leading `---` fence, or with an empty block, has an
/// empty record. The markdown body is not part of the result.
pub fn parse_frontmatter(markdown: &str) -> Result<Record, SiteError> {
    let Some(yaml) = frontmatter_block(markdown) else {
        return Ok(Record::new());
    };
    if yaml.trim().is_empty() {
        return Ok(Record::new());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    match value {
        serde_yaml::Value::Null => Ok(Record::new()),
        serde_yaml::Value::Mapping(_) => match serde_json::to_value(value)? {
            serde_json::Value::Object(record) => Ok(record),
            _ => Err(SiteError::FrontmatterNotMapping),
        },
        _ => Err(SiteError::FrontmatterNotMapping),
    }
}

/// The text between the opening and closing fences.
fn frontmatter_block(markdown: &str) -> Option<&str> {
    let markdown = markdown.strip_prefix('\u{feff}').unwrap_or(markdown);
    let mut lines = markdown.split_inclusive('\n');
    if lines.next()?.trim_end() != FENCE {
        return None;
    }
    let start = markdown.find('\n')? + 1;
    let mut offset = start;
    for line in lines {
        if line.trim_end() == FENCE {
            return Some(&markdown[start..offset]);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_frontmatter() {
        let md = "---\ntitle: Title\nmeta:\n  - name: description\n    content: Description\nhidden: false\n---\n# Body\n";

        let record = parse_frontmatter(md).unwrap();

        assert_eq!(
            serde_json::Value::Object(record),
            json!({
                "title": "Title",
                "meta": [{"name": "description", "content": "Description"}],
                "hidden": false
            })
        );
    }

    #[test]
    fn test_no_frontmatter_is_empty() {
        assert!(parse_frontmatter("# Just markdown").unwrap().is_empty());
        assert!(parse_frontmatter("").unwrap().is_empty());
    }

    #[test]
    fn test_empty_block_is_empty() {
        assert!(parse_frontmatter("---\n---\nbody").unwrap().is_empty());
    }

    #[test]
    fn test_unclosed_block_is_empty() {
        assert!(parse_frontmatter("---\ntitle: x\n").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_yaml_fails() {
        assert!(matches!(
            parse_frontmatter("---\ntitle: [oops\n---\n"),
            Err(SiteError::Yaml(_))
        ));
    }

    #[test]
    fn test_scalar_fails() {
        assert!(matches!(
            parse_frontmatter("---\njust text\n---\n"),
            Err(SiteError::FrontmatterNotMapping)
        ));
    }

    #[test]
    fn test_crlf_fences() {
        let record = parse_frontmatter("---\r\ntitle: x\r\n---\r\n").unwrap();

        assert_eq!(record.get("title"), Some(&json!("x")));
    }
}
