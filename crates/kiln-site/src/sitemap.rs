//! `sitemap.xml` rendering.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::error::SiteError;
use crate::tree::Page;
use crate::xml::XmlWriter;

/// Characters left alone by JavaScript's `encodeURI`.
const URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

const SITEMAP_NS: &str = "https://www.sitemaps.org/schemas/sitemap/0.9";

/// Percent-encode a URL path the way `encodeURI` does.
#[must_use]
pub fn encode_uri(path: &str) -> String {
    utf8_percent_encode(path, URI).to_string()
}

/// Render the sitemap for `domain`.
///
/// Lists every enabled page with a tree path, then every enabled page with an
/// alternate location.
pub fn render_sitemap(pages: &[Page], domain: &str) -> Result<String, SiteError> {
    let mut xml = XmlWriter::new()?;
    xml.open("urlset", &[("xmlns", SITEMAP_NS)])?;

    for page in pages.iter().filter(|p| p.enabled) {
        if let Some(to) = &page.to {
            let path = if to == "/" { String::new() } else { encode_uri(to) };
            write_url(&mut xml, page, &format!("https://{domain}{path}"))?;
        }
    }
    for page in pages.iter().filter(|p| p.enabled) {
        if let Some(loc) = page.loc.as_deref().filter(|l| !l.is_empty()) {
            let path = match loc.trim_matches('/') {
                "" => "/".to_owned(),
                trimmed => format!("/{trimmed}/"),
            };
            write_url(&mut xml, page, &format!("https://{domain}{}", encode_uri(&path)))?;
        }
    }

    xml.close("urlset")?;
    Ok(xml.finish())
}

fn write_url(xml: &mut XmlWriter, page: &Page, loc: &str) -> Result<(), SiteError> {
    xml.open("url", &[])?;
    xml.text_element("loc", &[], loc)?;
    if let Some(lastmod) = page.lastmod.as_deref().filter(|v| !v.is_empty()) {
        xml.text_element("lastmod", &[], lastmod)?;
    }
    if let Some(changefreq) = page.changefreq.as_deref().filter(|v| !v.is_empty()) {
        xml.text_element("changefreq", &[], changefreq)?;
    }
    if let Some(priority) = page.priority {
        xml.text_element("priority", &[], &priority.to_string())?;
    }
    xml.close("url")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::page::PageNode;
    use crate::tree::ContentTree;

    fn enabled(node: PageNode) -> PageNode {
        PageNode {
            enabled: true,
            ..node
        }
    }

    #[test]
    fn test_encode_uri() {
        assert_eq!(encode_uri("/a b/é?x=1#f"), "/a%20b/%C3%A9?x=1#f");
        assert_eq!(encode_uri("/100%"), "/100%25");
    }

    #[test]
    fn test_render_sitemap() {
        let mut about = enabled(PageNode::new("about").with_name("about us"));
        about.changefreq = Some("weekly".to_owned());
        about.lastmod = Some("2024-01-02".to_owned());
        about.priority = Some(0.8);
        about.loc = Some("old".to_owned());
        let tree = ContentTree::with_root(
            enabled(PageNode::new("root"))
                .with_child(about)
                .with_child(PageNode::new("hidden").with_name("hidden")),
        );

        let xml = render_sitemap(&tree.pages(), "example.com").unwrap();

        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="https://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com</loc>
  </url>
  <url>
    <loc>https://example.com/about%20us</loc>
    <lastmod>2024-01-02</lastmod>
    <changefreq>weekly</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc>https://example.com/old/</loc>
    <lastmod>2024-01-02</lastmod>
    <changefreq>weekly</changefreq>
    <priority>0.8</priority>
  </url>
</urlset>
"#
        );
    }

    #[test]
    fn test_render_sitemap_escapes_text() {
        let tree = ContentTree::with_root(
            enabled(PageNode::new("root")).with_child(enabled(PageNode::new("q").with_name("a&b"))),
        );

        let xml = render_sitemap(&tree.pages(), "example.com").unwrap();

        assert!(xml.contains("<loc>https://example.com/a&amp;b</loc>"));
    }

    #[test]
    fn test_render_sitemap_root_loc() {
        let mut root = enabled(PageNode::new("root"));
        root.loc = Some("/".to_owned());
        let tree = ContentTree::with_root(root);

        let xml = render_sitemap(&tree.pages(), "example.com").unwrap();

        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(!xml.contains("https://example.com//"));
    }
}
