//! Per-target configuration derived from element attributes.

use crate::element::Element;
use crate::error::{SyncError, SyncResult};
use crate::mode::SyncMode;
use crate::payload::Format;
use std::time::Duration;
use url::Url;

/// Default polling interval when the element does not declare one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

/// Attribute names read from a bound element.
pub mod attr {
    /// Data source URL (required).
    pub const ENDPOINT: &str = "endpoint";
    /// Payload format.
    pub const FORMAT: &str = "format";
    /// Transport mode.
    pub const MODE: &str = "mode";
    /// Polling interval in milliseconds.
    pub const INTERVAL: &str = "interval";
    /// Skip unchanged renders.
    pub const DIFF: &str = "diff";
    /// Cache flag (stored only).
    pub const CACHE: &str = "cache";
    /// Renderer name.
    pub const RENDER: &str = "render";
}

/// Configuration of one sync target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Endpoint as written on the element.
    pub raw_endpoint: String,
    /// Absolute endpoint after resolution against the base url.
    pub endpoint: String,
    /// Payload format.
    pub format: Format,
    /// Declared mode.
    pub mode: SyncMode,
    /// Polling interval.
    pub interval: Duration,
    /// Skip the mutation when the rendered output is unchanged.
    pub diff: bool,
    /// Cache flag. Stored, not acted on.
    pub cache: bool,
    /// Name of a registered renderer.
    pub renderer: Option<String>,
}

impl TargetConfig {
    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            raw_endpoint: endpoint.clone(),
            endpoint,
            format: Format::Auto,
            mode: SyncMode::Auto,
            interval: DEFAULT_INTERVAL,
            diff: false,
            cache: false,
            renderer: None,
        }
    }

    /// Reads the configuration from an element's attributes.
    pub fn from_element(
        element: &Element,
        base: Option<&Url>,
        default_interval: Duration,
    ) -> SyncResult<Self> {
        let raw_endpoint = element
            .attribute(attr::ENDPOINT)
            .map(|e| e.trim().to_owned())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SyncError::Config("missing endpoint attribute".into()))?;

        let format = match element.attribute(attr::FORMAT) {
            Some(value) => value.parse()?,
            None => Format::Auto,
        };
        let mode = match element.attribute(attr::MODE) {
            Some(value) => value.parse()?,
            None => SyncMode::Auto,
        };
        let interval = match element.attribute(attr::INTERVAL) {
            Some(value) => parse_interval(&value)?,
            None => default_interval,
        };

        Ok(Self {
            endpoint: resolve_url(base, &raw_endpoint),
            raw_endpoint,
            format,
            mode,
            interval,
            diff: is_true(element.attribute(attr::DIFF)),
            cache: is_true(element.attribute(attr::CACHE)),
            renderer: element
                .attribute(attr::RENDER)
                .map(|r| r.trim().to_owned())
                .filter(|r| !r.is_empty()),
        })
    }

    /// Sets the declared mode.
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the payload format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enables or disables diff rendering.
    pub fn with_diff(mut self, diff: bool) -> Self {
        self.diff = diff;
        self
    }

    /// Sets the renderer name.
    pub fn with_renderer(mut self, name: impl Into<String>) -> Self {
        self.renderer = Some(name.into());
        self
    }
}

fn is_true(value: Option<String>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn parse_interval(value: &str) -> SyncResult<Duration> {
    let millis: u64 = value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("invalid interval {value:?}")))?;
    if millis == 0 {
        return Err(SyncError::Config("interval must be greater than zero".into()));
    }
    Ok(Duration::from_millis(millis))
}

/// Resolves an endpoint against a base url.
///
/// Absolute `http(s)` endpoints are returned unchanged. When resolution is
/// impossible the endpoint is returned as written and the failure surfaces
/// later as a transport error.
pub fn resolve_url(base: Option<&Url>, endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return endpoint.to_owned();
    }
    let resolved = match base {
        Some(base) => base.join(endpoint),
        None => Url::parse(endpoint),
    };
    match resolved {
        Ok(url) => url.to_string(),
        Err(err) => {
            tracing::debug!(endpoint, error = %err, "endpoint left unresolved");
            endpoint.to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:3000/app/").unwrap()
    }

    #[test]
    fn defaults_from_bare_element() {
        let el = Element::new("div").with_attribute("endpoint", "/api/time.json");
        let config = TargetConfig::from_element(&el, Some(&base()), DEFAULT_INTERVAL).unwrap();

        assert_eq!(config.raw_endpoint, "/api/time.json");
        assert_eq!(config.endpoint, "http://localhost:3000/api/time.json");
        assert_eq!(config.format, Format::Auto);
        assert_eq!(config.mode, SyncMode::Auto);
        assert_eq!(config.interval, Duration::from_millis(5000));
        assert!(!config.diff);
        assert!(!config.cache);
        assert!(config.renderer.is_none());
    }

    #[test]
    fn reads_every_attribute() {
        let el = Element::new("div")
            .with_attribute("data-endpoint", "stream/clock")
            .with_attribute("format", "TEXT")
            .with_attribute("mode", "sse")
            .with_attribute("interval", "1000")
            .with_attribute("diff", "true")
            .with_attribute("cache", "true")
            .with_attribute("render", "renderClock");
        let config = TargetConfig::from_element(&el, Some(&base()), DEFAULT_INTERVAL).unwrap();

        assert_eq!(config.endpoint, "http://localhost:3000/app/stream/clock");
        assert_eq!(config.format, Format::Text);
        assert_eq!(config.mode, SyncMode::Sse);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert!(config.diff);
        assert!(config.cache);
        assert_eq!(config.renderer.as_deref(), Some("renderClock"));
    }

    #[test]
    fn diff_requires_literal_true() {
        let el = Element::new("div")
            .with_attribute("endpoint", "http://x.test/a")
            .with_attribute("diff", "yes");
        let config = TargetConfig::from_element(&el, None, DEFAULT_INTERVAL).unwrap();
        assert!(!config.diff);
    }

    #[test]
    fn rejects_invalid_attributes() {
        let missing = Element::new("div");
        assert!(matches!(
            TargetConfig::from_element(&missing, None, DEFAULT_INTERVAL),
            Err(SyncError::Config(_))
        ));

        for (name, value) in [("mode", "fax"), ("interval", "soon"), ("interval", "0")] {
            let el = Element::new("div")
                .with_attribute("endpoint", "/a")
                .with_attribute(name, value);
            assert!(TargetConfig::from_element(&el, None, DEFAULT_INTERVAL).is_err());
        }
    }

    #[test]
    fn url_resolution() {
        assert_eq!(
            resolve_url(Some(&base()), "https://other.test/x"),
            "https://other.test/x"
        );
        assert_eq!(
            resolve_url(Some(&base()), "ws://socket.test/feed"),
            "ws://socket.test/feed"
        );
        assert_eq!(resolve_url(None, "/relative/only"), "/relative/only");
    }
}
