//! Discovery of the service's current build id from a public reader page.
//! The page embeds its Next.js state in `<script id="__NEXT_DATA__">`.

use crate::transport::Transport;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildIdError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("no __NEXT_DATA__ script in page")]
    NoNextData,

    #[error("__NEXT_DATA__ is not JSON: {0}")]
    BadJson(#[from] serde_json::Error),

    #[error("no buildId in __NEXT_DATA__")]
    Missing,
}

/// Pull the build id out of a reader page's HTML. Uses the top-level
/// `buildId`, falling back to the first `buildId` string found anywhere in
/// the embedded state.
pub fn build_id_from_page(html: &str) -> Result<String, BuildIdError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").unwrap();
    let script = document.select(&selector).next().ok_or(BuildIdError::NoNextData)?;
    let text: String = script.text().collect();
    if text.trim().is_empty() {
        return Err(BuildIdError::NoNextData);
    }

    let data: Value = serde_json::from_str(text.trim())?;
    if let Some(id) = data.get("buildId").and_then(non_empty) {
        return Ok(id.to_string());
    }
    find_build_id(&data).map(str::to_string).ok_or(BuildIdError::Missing)
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// Depth-first search for a `buildId` string key.
fn find_build_id(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.iter().find_map(|(key, v)| {
            if key == "buildId" {
                if let Some(id) = non_empty(v) {
                    return Some(id);
                }
            }
            find_build_id(v)
        }),
        Value::Array(items) => items.iter().find_map(find_build_id),
        _ => None,
    }
}

/// Fetch `page_url` and extract its build id.
pub async fn discover_build_id<T: Transport>(
    transport: &T,
    page_url: &str,
    timeout: Duration,
) -> Result<String, BuildIdError> {
    let fetch_error = |message: String| BuildIdError::Fetch { url: page_url.to_string(), message };
    let response = transport
        .get(page_url, timeout)
        .await
        .map_err(|e| fetch_error(e.to_string()))?;
    if !(200..300).contains(&response.status) {
        return Err(fetch_error(format!("HTTP {}", response.status)));
    }

    let id = build_id_from_page(&response.body)?;
    tracing::info!(url = %page_url, build_id = %id, "Discovered build id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedTransport};

    fn page(next_data: &str) -> String {
        format!(
            r#"<html><head><title>Genesis 1</title></head><body><div id="__next"></div>
<script id="__NEXT_DATA__" type="application/json">{next_data}</script></body></html>"#
        )
    }

    #[test]
    fn test_top_level_build_id() {
        let html = page(r#"{"props":{"pageProps":{}},"page":"/bible","buildId":"abc123XYZ"}"#);
        assert_eq!(build_id_from_page(&html).unwrap(), "abc123XYZ");
    }

    #[test]
    fn test_nested_build_id() {
        let html = page(r#"{"buildId":"","props":{"rt":[{"other":1},{"buildId":"deep-42"}]}}"#);
        assert_eq!(build_id_from_page(&html).unwrap(), "deep-42");
    }

    #[test]
    fn test_page_without_next_data() {
        let html = "<html><body><script>var x = 1;</script></body></html>";
        assert!(matches!(build_id_from_page(html), Err(BuildIdError::NoNextData)));

        let html = page("not json");
        assert!(matches!(build_id_from_page(&html), Err(BuildIdError::BadJson(_))));

        let html = page(r#"{"props":{"buildId":7}}"#);
        assert!(matches!(build_id_from_page(&html), Err(BuildIdError::Missing)));
    }

    #[tokio::test]
    async fn test_discover_over_transport() {
        let transport = ScriptedTransport::default()
            .route("GEN.1.KJV", vec![Scripted::Ok(page(r#"{"buildId":"live-build"}"#))])
            .route("GEN.1.NIV", vec![Scripted::Status(503)]);
        let timeout = Duration::from_secs(1);

        let id = discover_build_id(&transport, "https://example.test/bible/1/GEN.1.KJV", timeout)
            .await
            .unwrap();
        assert_eq!(id, "live-build");

        let err = discover_build_id(&transport, "https://example.test/bible/111/GEN.1.NIV", timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildIdError::Fetch { .. }));
    }
}
