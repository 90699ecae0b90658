//! Transport modes and their resolution.

use crate::error::SyncError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Path suffix that marks a discrete document, fetched by polling.
const STRUCTURED_EXTENSION: &str = ".json";

/// Path marker that identifies an event stream.
const STREAM_MARKER: &str = "/stream";

/// Declared or resolved mode of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncMode {
    /// Resolve on start.
    #[default]
    Auto,
    /// Fetch on an interval.
    Polling,
    /// Server-Sent Events stream.
    Sse,
    /// WebSocket connection.
    WebSocket,
    /// Fetch whenever a signal is raised on the element.
    Event,
    /// Fetch exactly once.
    Local,
}

impl SyncMode {
    /// Returns the attribute spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Auto => "auto",
            SyncMode::Polling => "polling",
            SyncMode::Sse => "sse",
            SyncMode::WebSocket => "websocket",
            SyncMode::Event => "event",
            SyncMode::Local => "local",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(SyncMode::Auto),
            "polling" | "poll" => Ok(SyncMode::Polling),
            "sse" => Ok(SyncMode::Sse),
            "websocket" | "ws" => Ok(SyncMode::WebSocket),
            "event" => Ok(SyncMode::Event),
            "local" => Ok(SyncMode::Local),
            other => Err(SyncError::Config(format!("unknown sync mode {other:?}"))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `auto` is turned into a concrete mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeStrategy {
    /// Inspect the endpoint string.
    #[default]
    EndpointHeuristic,
    /// Pick the best transport the environment offers: SSE, then
    /// WebSocket, then polling.
    Capabilities {
        /// SSE is available.
        sse: bool,
        /// WebSocket is available.
        websocket: bool,
    },
}

/// Resolves a declared mode to a concrete one.
///
/// Explicit modes pass through unchanged.
pub fn resolve_mode(declared: SyncMode, endpoint: &str, strategy: ModeStrategy) -> SyncMode {
    if declared != SyncMode::Auto {
        return declared;
    }
    match strategy {
        ModeStrategy::EndpointHeuristic => mode_for_endpoint(endpoint),
        ModeStrategy::Capabilities { sse: true, .. } => SyncMode::Sse,
        ModeStrategy::Capabilities {
            websocket: true, ..
        } => SyncMode::WebSocket,
        ModeStrategy::Capabilities { .. } => SyncMode::Polling,
    }
}

/// Endpoint heuristic used for `auto`.
pub fn mode_for_endpoint(endpoint: &str) -> SyncMode {
    let (scheme, path) = match Url::parse(endpoint) {
        Ok(url) => (url.scheme().to_owned(), url.path().to_owned()),
        Err(_) => {
            let path = endpoint
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_owned();
            (String::new(), path)
        }
    };

    if scheme == "ws" || scheme == "wss" {
        SyncMode::WebSocket
    } else if path.to_ascii_lowercase().ends_with(STRUCTURED_EXTENSION) {
        SyncMode::Polling
    } else if path.contains(STREAM_MARKER) {
        SyncMode::Sse
    } else {
        SyncMode::Polling
    }
}

/// A concrete transport, selected once per start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Fetch now, then once per interval.
    Polling {
        /// Delay between cycles.
        interval: Duration,
    },
    /// Server-Sent Events.
    Sse,
    /// WebSocket.
    WebSocket,
    /// Fetch once per raised signal.
    Manual {
        /// Signal name to react to.
        signal: String,
    },
    /// Fetch once.
    OneShot,
}

impl Transport {
    /// Builds the transport for a resolved mode.
    ///
    /// Returns `None` for [`SyncMode::Auto`], which must be resolved first.
    pub fn for_mode(mode: SyncMode, interval: Duration, signal: &str) -> Option<Self> {
        match mode {
            SyncMode::Auto => None,
            SyncMode::Polling => Some(Transport::Polling { interval }),
            SyncMode::Sse => Some(Transport::Sse),
            SyncMode::WebSocket => Some(Transport::WebSocket),
            SyncMode::Event => Some(Transport::Manual {
                signal: signal.to_owned(),
            }),
            SyncMode::Local => Some(Transport::OneShot),
        }
    }

    /// The mode this transport implements.
    pub fn mode(&self) -> SyncMode {
        match self {
            Transport::Polling { .. } => SyncMode::Polling,
            Transport::Sse => SyncMode::Sse,
            Transport::WebSocket => SyncMode::WebSocket,
            Transport::Manual { .. } => SyncMode::Event,
            Transport::OneShot => SyncMode::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn endpoint_heuristic() {
        assert_eq!(
            mode_for_endpoint("https://api.example.com/data.json"),
            SyncMode::Polling
        );
        assert_eq!(
            mode_for_endpoint("https://api.example.com/data.JSON?x=1"),
            SyncMode::Polling
        );
        assert_eq!(
            mode_for_endpoint("http://localhost:3000/stream/time"),
            SyncMode::Sse
        );
        assert_eq!(
            mode_for_endpoint("wss://example.com/stream/feed.json"),
            SyncMode::WebSocket
        );
        assert_eq!(mode_for_endpoint("http://localhost/api/now"), SyncMode::Polling);
        assert_eq!(mode_for_endpoint("/stream"), SyncMode::Sse);
    }

    #[test]
    fn explicit_modes_pass_through() {
        assert_eq!(
            resolve_mode(
                SyncMode::Event,
                "ws://example.com",
                ModeStrategy::EndpointHeuristic
            ),
            SyncMode::Event
        );
    }

    #[test]
    fn capability_strategy_prefers_sse_then_websocket() {
        let caps = |sse, websocket| ModeStrategy::Capabilities { sse, websocket };
        assert_eq!(resolve_mode(SyncMode::Auto, "x", caps(true, true)), SyncMode::Sse);
        assert_eq!(
            resolve_mode(SyncMode::Auto, "x", caps(false, true)),
            SyncMode::WebSocket
        );
        assert_eq!(
            resolve_mode(SyncMode::Auto, "x", caps(false, false)),
            SyncMode::Polling
        );
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("WS".parse::<SyncMode>().unwrap(), SyncMode::WebSocket);
        assert_eq!("local".parse::<SyncMode>().unwrap(), SyncMode::Local);
        assert!("carrier-pigeon".parse::<SyncMode>().is_err());
    }

    #[test]
    fn transport_roundtrips_mode() {
        let interval = Duration::from_secs(1);
        for mode in [
            SyncMode::Polling,
            SyncMode::Sse,
            SyncMode::WebSocket,
            SyncMode::Event,
            SyncMode::Local,
        ] {
            let transport = Transport::for_mode(mode, interval, "sync:trigger").unwrap();
            assert_eq!(transport.mode(), mode);
        }
        assert!(Transport::for_mode(SyncMode::Auto, interval, "sync:trigger").is_none());
    }

    proptest! {
        #[test]
        fn json_paths_poll(host in "[a-z]{1,12}", segs in prop::collection::vec("[a-z0-9_]{1,8}", 0..4), name in "[a-z0-9]{1,10}") {
            let path = segs.iter().map(|s| format!("/{s}")).collect::<String>();
            let endpoint = format!("https://{host}.test{path}/{name}.json");
            prop_assert_eq!(
                resolve_mode(SyncMode::Auto, &endpoint, ModeStrategy::EndpointHeuristic),
                SyncMode::Polling
            );
        }

        #[test]
        fn ws_schemes_always_websocket(secure in any::<bool>(), host in "[a-z]{1,12}", path in "(/[a-z0-9.]{0,10}){0,4}") {
            let scheme = if secure { "wss" } else { "ws" };
            let endpoint = format!("{scheme}://{host}.test{path}");
            prop_assert_eq!(mode_for_endpoint(&endpoint), SyncMode::WebSocket);
        }
    }
}
