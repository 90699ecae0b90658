//! Page description files.
//!
//! A page file is JSON holding engine overrides and the element list:
//!
//! ```json
//! {
//!   "base_url": "http://localhost:3000",
//!   "default_interval_ms": 2000,
//!   "elements": [
//!     { "tag": "div", "attributes": { "sync": "true", "endpoint": "/api/time.json" } }
//!   ]
//! }
//! ```

use livebind_core::{Document, Element, ModeStrategy};
use livebind_engine::{EngineConfig, RetryConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors while loading a page file.
#[derive(Debug, Error)]
pub enum PageError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Page file path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not a valid page description.
    #[error("invalid page file {path}: {source}")]
    Parse {
        /// Page file path.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The base url does not parse.
    #[error("invalid base_url {url:?}: {source}")]
    BaseUrl {
        /// The offending value.
        url: String,
        /// Underlying error.
        source: url::ParseError,
    },
}

/// One element of a page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageElement {
    /// Tag name.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Attributes, including the sync configuration.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Initial content.
    #[serde(default)]
    pub content: String,
}

fn default_tag() -> String {
    "div".to_owned()
}

/// Contents of a page file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageFile {
    /// Base url relative endpoints are resolved against.
    pub base_url: Option<String>,
    /// Discovery selector.
    pub selector: Option<String>,
    /// Default polling interval in milliseconds.
    pub default_interval_ms: Option<u64>,
    /// Fetch timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Trigger signal name for `event` targets.
    pub trigger_signal: Option<String>,
    /// Reconnect budget for streams.
    pub max_retries: Option<u32>,
    /// Resolve `auto` against the transports listed here instead of by
    /// endpoint shape. Accepts `sse` and `websocket`.
    pub capabilities: Option<Vec<String>>,
    /// Elements to bind.
    pub elements: Vec<PageElement>,
}

impl PageFile {
    /// Reads and parses a page file.
    pub fn load(path: &Path) -> Result<Self, PageError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| PageError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PageError::Parse {
            path: display,
            source,
        })
    }

    /// Builds the engine configuration from the overrides.
    pub fn engine_config(&self) -> Result<EngineConfig, PageError> {
        let mut config = EngineConfig::new();
        if let Some(base) = &self.base_url {
            let url = Url::parse(base).map_err(|source| PageError::BaseUrl {
                url: base.clone(),
                source,
            })?;
            config = config.with_base_url(url);
        }
        if let Some(selector) = &self.selector {
            config = config.with_selector(selector.clone());
        }
        if let Some(ms) = self.default_interval_ms.filter(|ms| *ms > 0) {
            config = config.with_default_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.request_timeout_ms.filter(|ms| *ms > 0) {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(signal) = &self.trigger_signal {
            config = config.with_trigger_signal(signal.clone());
        }
        if let Some(max) = self.max_retries {
            config = config.with_retry(RetryConfig::new(max));
        }
        if let Some(caps) = &self.capabilities {
            let has = |name: &str| caps.iter().any(|c| c.eq_ignore_ascii_case(name));
            config = config.with_mode_strategy(ModeStrategy::Capabilities {
                sse: has("sse"),
                websocket: has("websocket"),
            });
        }
        Ok(config)
    }

    /// Builds the document.
    pub fn document(&self) -> Arc<Document> {
        let document = Arc::new(Document::new());
        for item in &self.elements {
            let element = item
                .attributes
                .iter()
                .fold(Element::new(item.tag.clone()), |el, (name, value)| {
                    el.with_attribute(name.clone(), value.clone())
                });
            if !item.content.is_empty() {
                element.set_inner_html(item.content.clone());
            }
            document.append(element);
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn page(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_overrides_and_elements() {
        let file = page(
            r#"{
                "base_url": "http://localhost:3000",
                "default_interval_ms": 2000,
                "max_retries": 3,
                "capabilities": ["SSE"],
                "elements": [
                    { "tag": "span", "attributes": { "sync": "true", "endpoint": "/a.json" } },
                    { "attributes": { "endpoint": "/b" }, "content": "loading" }
                ]
            }"#,
        );

        let page = PageFile::load(file.path()).unwrap();
        let config = page.engine_config().unwrap();
        assert_eq!(config.base_url.unwrap().as_str(), "http://localhost:3000/");
        assert_eq!(config.default_interval, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(
            config.mode_strategy,
            ModeStrategy::Capabilities {
                sse: true,
                websocket: false
            }
        );

        let document = page.document();
        assert_eq!(document.len(), 2);
        let matched = document.query_selector_all(r#"[sync="true"]"#).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].tag(), "span");
        let all = document.query_selector_all("div").unwrap();
        assert_eq!(all[0].inner_html(), "loading");
    }

    #[test]
    fn empty_object_uses_defaults() {
        let file = page("{}");
        let page = PageFile::load(file.path()).unwrap();
        let config = page.engine_config().unwrap();
        assert!(config.base_url.is_none());
        assert_eq!(config.retry, RetryConfig::default());
        assert!(page.document().is_empty());
    }

    #[test]
    fn reports_bad_files() {
        let file = page("{ not json");
        assert!(matches!(
            PageFile::load(file.path()),
            Err(PageError::Parse { .. })
        ));

        let missing = file.path().with_extension("missing");
        assert!(matches!(PageFile::load(&missing), Err(PageError::Io { .. })));

        let file = page(r#"{ "base_url": "not a url" }"#);
        let page = PageFile::load(file.path()).unwrap();
        assert!(matches!(
            page.engine_config(),
            Err(PageError::BaseUrl { .. })
        ));
    }
}
