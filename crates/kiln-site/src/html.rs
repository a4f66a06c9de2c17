//! Page HTML rendering from the runtime `index.html` template.
//!
//! The template must contain a `<base href="" />` placeholder and a `</head>`
//! tag. Rendering happens in two steps: [`PageTemplate::new`] injects what every
//! page shares (importmap, feed links, module preloads) and
//! [`PageTemplate::render`] adds the per-page head (base, title, SEO, Open Graph,
//! JSON-LD).

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::artifact::DEFAULT_JSONLD;
use crate::error::SiteError;
use crate::importmap::Importmap;
use crate::page::Record;
use crate::tree::Page;

const BASE_PLACEHOLDER: &str = r#"<base href="" />"#;
const HEAD_END: &str = "</head>";

/// Template with the shared head already injected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageTemplate {
    body: String,
}

impl PageTemplate {
    /// Inject the importmap, feed alternates and module preloads into `index_html`.
    pub fn new(
        index_html: &str,
        importmap: &Importmap,
        site_title: &str,
    ) -> Result<Self, SiteError> {
        let title = escape_attr(site_title);
        let shared = format!(
            r#"{BASE_PLACEHOLDER}
    <script type="importmap">
{importmap}
    </script>
    <link rel="alternate" title="{title}" type="application/feed+json" href="./feed.json" />
    <link rel="alternate" title="{title}" type="application/atom+xml" href="./feed.xml" />
    <link rel="alternate" title="{title}" type="application/rss+xml" href="./feed-rss.xml" />"#,
            importmap = to_json_indented(importmap)?,
        );
        let preloads = importmap
            .module_preloads()
            .into_iter()
            .map(|href| {
                format!(
                    r#"<link rel="modulepreload" crossorigin href="{}">"#,
                    escape_attr(href)
                )
            })
            .collect::<Vec<_>>()
            .join("\n    ");

        let body = index_html
            .replacen(BASE_PLACEHOLDER, &shared, 1)
            .replacen(HEAD_END, &format!("  {preloads}\n  {HEAD_END}"), 1);
        Ok(Self { body })
    }

    /// Shared body before per-page injection.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Render the HTML of `page`. Canonical and image URLs need a `domain`.
    pub fn render(&self, page: &Page, domain: &str) -> Result<String, SiteError> {
        let title = page.title.as_deref().unwrap_or_default();
        let description = page.description.as_deref().unwrap_or_default();
        let canonical = if domain.is_empty() {
            String::new()
        } else {
            let to = page.to.as_deref().unwrap_or_default();
            format!("https://{domain}{}", if to == "/" { "" } else { to })
        };

        let mut head = vec![format!("<title>{}</title>", escape_text(title))];
        if !canonical.is_empty() {
            head.push(format!(
                r#"<link rel="canonical" href="{}">"#,
                escape_attr(&canonical)
            ));
        }

        let keywords = page.keywords.join(",");
        for (content, name) in [(description, "description"), (keywords.as_str(), "keywords")] {
            if !content.is_empty() {
                head.push(format!(
                    r#"<meta name="{name}" content="{}">"#,
                    escape_attr(content)
                ));
            }
        }

        let mut og = vec![
            (canonical.clone(), "url"),
            (description.to_owned(), "description"),
            (title.to_owned(), "title"),
            (page.page_type.clone().unwrap_or_default(), "type"),
        ];
        if !domain.is_empty() {
            for image in &page.images {
                let url = if image.url.is_empty() {
                    String::new()
                } else {
                    format!("https://{domain}/{}", image.url)
                };
                og.push((url, "image"));
                og.push((image.alt.clone(), "image:alt"));
            }
        }
        for (content, property) in og.iter().filter(|(c, _)| !c.is_empty()) {
            head.push(format!(
                r#"<meta property="og:{property}" content="{}">"#,
                escape_attr(content)
            ));
        }

        head.push(format!(
            "<script type=\"application/ld+json\" id=\"application/ld+json\">\n{}\n    </script>",
            jsonld(&page.jsonld)?
        ));

        let html = self
            .body
            .replacen(
                BASE_PLACEHOLDER,
                &format!(r#"<base href="{}" />"#, page.base_href()),
                1,
            )
            .replacen(
                HEAD_END,
                &format!("  {}\n  {HEAD_END}", head.join("\n    ")),
                1,
            );
        Ok(html)
    }
}

/// JSON-LD of a page, falling back to the bare schema.org context.
fn jsonld(record: &Record) -> Result<String, SiteError> {
    if record.is_empty() {
        let default: serde_json::Value = serde_json::from_str(DEFAULT_JSONLD)?;
        return to_json_indented(&default);
    }
    to_json_indented(record)
}

/// JSON with one-space indentation.
fn to_json_indented(value: &impl Serialize) -> Result<String, SiteError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b" "));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::page::{Image, PageNode};
    use crate::tree::ContentTree;

    const INDEX: &str = "<html>\n  <head>\n    <base href=\"\" />\n  </head>\n  <body></body>\n</html>\n";

    fn importmap() -> Importmap {
        Importmap::parse(r#"{"imports":{"lib/":"./lib/","vue":"./assets/vue.js"}}"#).unwrap()
    }

    fn pages() -> Vec<Page> {
        let mut post = PageNode::new("post").with_name("post");
        post.title = Some("Hello \"world\"".to_owned());
        post.description = Some("About things".to_owned());
        post.keywords = vec!["a".to_owned(), "b".to_owned()];
        post.page_type = Some("article".to_owned());
        post.images = vec![Image {
            url: "images/p.png".to_owned(),
            alt: "Picture".to_owned(),
        }];
        post.jsonld = json!({"@context": "https://schema.org", "@type": "Article"})
            .as_object()
            .cloned()
            .unwrap();
        ContentTree::with_root(PageNode::new("root").with_child(post)).pages()
    }

    #[test]
    fn test_shared_body() {
        let template = PageTemplate::new(INDEX, &importmap(), "Site").unwrap();

        assert_eq!(
            template.body(),
            r#"<html>
  <head>
    <base href="" />
    <script type="importmap">
{
 "imports": {
  "lib/": "./lib/",
  "vue": "./assets/vue.js"
 }
}
    </script>
    <link rel="alternate" title="Site" type="application/feed+json" href="./feed.json" />
    <link rel="alternate" title="Site" type="application/atom+xml" href="./feed.xml" />
    <link rel="alternate" title="Site" type="application/rss+xml" href="./feed-rss.xml" />
    <link rel="modulepreload" crossorigin href="./assets/vue.js">
  </head>
  <body></body>
</html>
"#
        );
    }

    #[test]
    fn test_render_root_without_domain() {
        let template = PageTemplate::new(INDEX, &Importmap::default(), "").unwrap();

        let html = template.render(&pages()[0], "").unwrap();

        assert!(html.contains(r#"<base href="./" />"#));
        assert!(html.contains("<title></title>"));
        assert!(!html.contains("canonical"));
        assert!(!html.contains("og:"));
        assert!(html.contains("\"@context\": \"https://schema.org\""));
    }

    #[test]
    fn test_render_page_with_domain() {
        let template = PageTemplate::new(INDEX, &Importmap::default(), "Site").unwrap();

        let html = template.render(&pages()[1], "example.com").unwrap();

        assert!(html.contains(r#"<base href=".." />"#));
        assert!(html.contains("<title>Hello \"world\"</title>"));
        assert!(html.contains(r#"<link rel="canonical" href="https://example.com/post">"#));
        assert!(html.contains(r#"<meta name="description" content="About things">"#));
        assert!(html.contains(r#"<meta name="keywords" content="a,b">"#));
        assert!(html.contains(r#"<meta property="og:title" content="Hello &quot;world&quot;">"#));
        assert!(html.contains(r#"<meta property="og:type" content="article">"#));
        assert!(html.contains(
            r#"<meta property="og:image" content="https://example.com/images/p.png">"#
        ));
        assert!(html.contains(r#"<meta property="og:image:alt" content="Picture">"#));
        assert!(html.contains("\"@type\": \"Article\""));
    }

    #[test]
    fn test_render_root_canonical_has_no_trailing_slash() {
        let template = PageTemplate::new(INDEX, &Importmap::default(), "").unwrap();

        let html = template.render(&pages()[0], "example.com").unwrap();

        assert!(html.contains(r#"<link rel="canonical" href="https://example.com">"#));
    }

    #[test]
    fn test_images_need_domain() {
        let template = PageTemplate::new(INDEX, &Importmap::default(), "").unwrap();

        let html = template.render(&pages()[1], "").unwrap();

        assert!(!html.contains("og:image"));
        assert!(html.contains(r#"<meta property="og:title""#));
    }
}
