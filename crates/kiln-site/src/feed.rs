//! Site feeds: `feed.json` (JSON Feed 1), `feed.xml` (Atom) and
//! `feed-rss.xml` (RSS 2.0).
//!
//! Feed items are edited by the user and persisted inside `feed.json`. The feed
//! envelope (title, URLs) is derived from the site on every write.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SiteError;
use crate::page::Record;
use crate::xml::XmlWriter;

/// JSON Feed version URL.
const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// One feed entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<String>,
    #[serde(flatten)]
    pub extra: Record,
}

impl FeedItem {
    /// Most recent of the modified and published dates.
    fn updated(&self) -> Option<DateTime<FixedOffset>> {
        [&self.date_modified, &self.date_published]
            .into_iter()
            .flatten()
            .filter_map(|d| DateTime::parse_from_rfc3339(d).ok())
            .max()
    }

    fn body(&self) -> Option<&str> {
        self.content_html
            .as_deref()
            .or(self.summary.as_deref())
            .or(self.content_text.as_deref())
    }
}

/// Published JSON Feed document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonFeed {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub items: Vec<FeedItem>,
}

/// Feed items of the site.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedState {
    pub items: Vec<FeedItem>,
}

impl FeedState {
    /// Read items from a stored `feed.json`. Empty content has no items.
    pub fn parse(content: &str) -> Result<Self, SiteError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let feed: JsonFeed = serde_json::from_str(content)?;
        Ok(Self { items: feed.items })
    }

    /// Build the JSON Feed envelope.
    #[must_use]
    pub fn json_feed(&self, title: Option<&str>, domain: &str) -> JsonFeed {
        let has_domain = !domain.is_empty();
        JsonFeed {
            version: JSON_FEED_VERSION.to_owned(),
            title: title.map(str::to_owned),
            home_page_url: has_domain.then(|| format!("https://{domain}")),
            feed_url: has_domain.then(|| format!("https://{domain}/feed.json")),
            items: self.items.clone(),
        }
    }

    /// Render `feed.json`.
    pub fn render_json(&self, title: Option<&str>, domain: &str) -> Result<String, SiteError> {
        Ok(serde_json::to_string(&self.json_feed(title, domain))?)
    }

    /// Render `feed.xml`.
    pub fn render_atom(&self, title: &str, domain: &str) -> Result<String, SiteError> {
        self.render_atom_at(title, domain, Utc::now())
    }

    /// Render `feed-rss.xml`.
    pub fn render_rss(&self, title: &str, domain: &str) -> Result<String, SiteError> {
        self.render_rss_at(title, domain, Utc::now())
    }

    fn last_updated(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        self.items
            .iter()
            .filter_map(FeedItem::updated)
            .max()
            .unwrap_or_else(|| now.fixed_offset())
    }

    fn render_atom_at(
        &self,
        title: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SiteError> {
        let home = format!("https://{domain}");
        let updated = self
            .last_updated(now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut xml = XmlWriter::new()?;
        xml.open("feed", &[("xmlns", ATOM_NS)])?;
        xml.text_element("id", &[], &home)?;
        xml.text_element("title", &[], title)?;
        xml.text_element("updated", &[], &updated)?;
        xml.empty("link", &[("rel", "alternate"), ("href", &home)])?;
        xml.empty(
            "link",
            &[("rel", "self"), ("href", &format!("{home}/feed.xml"))],
        )?;

        for item in &self.items {
            xml.open("entry", &[])?;
            xml.text_element("id", &[], &item.id)?;
            xml.text_element("title", &[], item.title.as_deref().unwrap_or_default())?;
            let item_updated = item.updated().map_or_else(
                || updated.clone(),
                |d| d.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
            xml.text_element("updated", &[], &item_updated)?;
            if let Some(published) = item
                .date_published
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            {
                xml.text_element(
                    "published",
                    &[],
                    &published.to_rfc3339_opts(SecondsFormat::Secs, true),
                )?;
            }
            if let Some(url) = &item.url {
                xml.empty("link", &[("rel", "alternate"), ("href", url)])?;
            }
            if let Some(summary) = &item.summary {
                xml.text_element("summary", &[], summary)?;
            }
            if let Some(html) = &item.content_html {
                xml.text_element("content", &[("type", "html")], html)?;
            } else if let Some(text) = &item.content_text {
                xml.text_element("content", &[("type", "text")], text)?;
            }
            xml.close("entry")?;
        }

        xml.close("feed")?;
        Ok(xml.finish())
    }

    fn render_rss_at(
        &self,
        title: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SiteError> {
        let home = format!("https://{domain}");

        let mut xml = XmlWriter::new()?;
        xml.open("rss", &[("version", "2.0"), ("xmlns:atom", ATOM_NS)])?;
        xml.open("channel", &[])?;
        xml.text_element("title", &[], title)?;
        xml.text_element("link", &[], &home)?;
        xml.text_element("description", &[], title)?;
        xml.empty(
            "atom:link",
            &[
                ("href", &format!("{home}/feed-rss.xml")),
                ("rel", "self"),
                ("type", "application/rss+xml"),
            ],
        )?;
        xml.text_element("lastBuildDate", &[], &self.last_updated(now).to_rfc2822())?;

        for item in &self.items {
            xml.open("item", &[])?;
            if let Some(title) = &item.title {
                xml.text_element("title", &[], title)?;
            }
            if let Some(url) = &item.url {
                xml.text_element("link", &[], url)?;
            }
            xml.text_element("guid", &[("isPermaLink", "false")], &item.id)?;
            if let Some(date) = item.date_published.as_deref() {
                let date = DateTime::parse_from_rfc3339(date)
                    .map_or_else(|_| date.to_owned(), |d| d.to_rfc2822());
                xml.text_element("pubDate", &[], &date)?;
            }
            if let Some(body) = item.body() {
                xml.text_element("description", &[], body)?;
            }
            xml.close("item")?;
        }

        xml.close("channel")?;
        xml.close("rss")?;
        Ok(xml.finish())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn state() -> FeedState {
        FeedState {
            items: vec![FeedItem {
                id: "1".to_owned(),
                url: Some("https://example.com/post".to_owned()),
                title: Some("Post".to_owned()),
                content_html: Some("<p>Hi & bye</p>".to_owned()),
                date_published: Some("2024-03-01T10:00:00Z".to_owned()),
                ..FeedItem::default()
            }],
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn test_parse_items() {
        let state = FeedState::parse(
            r#"{"version":"https://jsonfeed.org/version/1","items":[{"id":"a","tags":["x"]}]}"#,
        )
        .unwrap();

        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].extra.get("tags"), Some(&json!(["x"])));
        assert!(FeedState::parse("").unwrap().items.is_empty());
    }

    #[test]
    fn test_render_json_without_domain() {
        let json = FeedState::default().render_json(Some("Site"), "").unwrap();

        assert_eq!(
            json,
            r#"{"version":"https://jsonfeed.org/version/1","title":"Site","items":[]}"#
        );
    }

    #[test]
    fn test_render_json_with_domain() {
        let feed = state().json_feed(Some("Site"), "example.com");

        assert_eq!(feed.home_page_url.as_deref(), Some("https://example.com"));
        assert_eq!(
            feed.feed_url.as_deref(),
            Some("https://example.com/feed.json")
        );
        assert_eq!(feed.items.len(), 1);
    }

    #[test]
    fn test_render_atom() {
        let xml = state().render_atom_at("Site", "example.com", epoch()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#));
        assert!(xml.contains("<id>https://example.com</id>"));
        assert!(xml.contains("<updated>2024-03-01T10:00:00Z</updated>"));
        assert!(xml.contains(r#"<link rel="self" href="https://example.com/feed.xml"/>"#));
        assert!(xml.contains(r#"<content type="html">&lt;p&gt;Hi &amp; bye&lt;/p&gt;</content>"#));
    }

    #[test]
    fn test_render_atom_without_items_uses_now() {
        let xml = FeedState::default()
            .render_atom_at("Site", "example.com", epoch())
            .unwrap();

        assert!(xml.contains("<updated>1970-01-01T00:00:00Z</updated>"));
        assert!(!xml.contains("<entry>"));
    }

    #[test]
    fn test_render_rss() {
        let xml = state().render_rss_at("Site", "example.com", epoch()).unwrap();

        assert!(xml.contains(r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">"#));
        assert!(xml.contains("<link>https://example.com</link>"));
        assert!(xml.contains("<pubDate>Fri, 1 Mar 2024 10:00:00 +0000</pubDate>"));
        assert!(xml.contains(r#"<guid isPermaLink="false">1</guid>"#));
        assert!(xml.contains("<description>&lt;p&gt;Hi &amp; bye&lt;/p&gt;</description>"));
    }
}
