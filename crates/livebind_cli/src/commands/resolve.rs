//! Resolve command implementation.

use livebind_core::{resolve_mode, resolve_url, ModeStrategy, SyncMode, Transport, DEFAULT_INTERVAL};
use livebind_engine::{websocket_url, DEFAULT_TRIGGER_SIGNAL};
use serde::Serialize;
use url::Url;

/// How an endpoint would be bound.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Resolution {
    /// Endpoint as given.
    pub endpoint: String,
    /// Endpoint after base url resolution.
    pub url: String,
    /// Concrete mode.
    pub mode: String,
    /// Url actually connected to.
    pub connect_url: String,
}

/// Computes the resolution of `endpoint`.
pub fn resolve(
    endpoint: &str,
    base: Option<&str>,
    mode: &str,
) -> Result<Resolution, Box<dyn std::error::Error>> {
    let base = base.map(Url::parse).transpose()?;
    let declared: SyncMode = mode.parse()?;
    let url = resolve_url(base.as_ref(), endpoint);
    let mode = resolve_mode(declared, &url, ModeStrategy::EndpointHeuristic);
    let transport = Transport::for_mode(mode, DEFAULT_INTERVAL, DEFAULT_TRIGGER_SIGNAL)
        .ok_or("mode did not resolve")?;
    let connect_url = match transport {
        Transport::WebSocket => websocket_url(&url),
        _ => url.clone(),
    };
    Ok(Resolution {
        endpoint: endpoint.to_owned(),
        url,
        mode: mode.to_string(),
        connect_url,
    })
}

/// Runs the resolve command.
pub fn run(
    endpoint: &str,
    base: Option<&str>,
    mode: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolution = resolve(endpoint, base, mode)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        println!("Endpoint: {}", resolution.endpoint);
        println!("URL:      {}", resolution.url);
        println!("Mode:     {}", resolution.mode);
        println!("Connect:  {}", resolution.connect_url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_json_endpoint_polls() {
        let r = resolve("/api/data.json", Some("http://localhost:3000"), "auto").unwrap();
        assert_eq!(r.url, "http://localhost:3000/api/data.json");
        assert_eq!(r.mode, "polling");
        assert_eq!(r.connect_url, r.url);
    }

    #[test]
    fn explicit_websocket_rewrites_scheme() {
        let r = resolve("https://example.com/live", None, "websocket").unwrap();
        assert_eq!(r.mode, "websocket");
        assert_eq!(r.connect_url, "wss://example.com/live");
    }

    #[test]
    fn stream_paths_use_sse() {
        let r = resolve("http://example.com/events/stream", None, "auto").unwrap();
        assert_eq!(r.mode, "sse");
    }

    #[test]
    fn rejects_unknown_modes() {
        assert!(resolve("/x", None, "telepathy").is_err());
        assert!(resolve("/x", Some("::"), "auto").is_err());
    }
}
