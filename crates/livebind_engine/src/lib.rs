//! # livebind engine
//!
//! Keeps document elements in sync with remote data sources.
//!
//! This crate provides:
//! - Transport adapters: HTTP polling, Server-Sent Events, WebSocket,
//!   manual trigger and one-shot fetch
//! - A network connector over `reqwest` and `tokio-tungstenite`, plus a
//!   scripted [`MockConnector`] for tests
//! - Reconnect with exponential backoff ([`RetryConfig`])
//! - The per-element [`SyncController`] and the discovering [`SyncManager`]
//! - The [`LiveBind`] context tying them together
//!
//! ## Architecture
//!
//! The manager scans the document, creates one controller per matching
//! unbound element, and starts it. Starting resolves the mode once and
//! spawns a single adapter task. The adapter feeds decoded payloads through
//! the hook bus and the render sink.
//!
//! ## Key Invariants
//!
//! - At most one adapter per target
//! - Polling cycles of one target never overlap
//! - Nothing renders or fires hooks for a target after its `stop()`
//! - A stream is abandoned after the retry budget is spent without a
//!   message in between

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod connector;
mod controller;
mod engine;
mod manager;
mod sse;

pub use config::{EngineConfig, RetryConfig, DEFAULT_TRIGGER_SIGNAL};
pub use connector::{
    websocket_url, Connector, MessageStream, MockCall, MockConnector, MockResponse, MockStream,
    NetworkConnector,
};
pub use controller::{SyncController, TargetState};
pub use engine::{LiveBind, TargetHandle};
pub use manager::SyncManager;
pub use sse::{SseDecoder, SseEvent};

pub(crate) use engine::SyncContext;
