//! Content type guessing for uploaded assets.

/// Guess a MIME type from the key's extension.
///
/// Used when an asset comes from a source that does not report its own type.
#[must_use]
pub fn guess_content_type(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    if name == "CNAME" {
        return "text/plain";
    }
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("jsonld") => "application/ld+json",
        Some("importmap") => "application/importmap+json",
        Some("xml") => "application/xml",
        Some("txt" | "vue") => "text/plain",
        Some("md") => "text/markdown",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
