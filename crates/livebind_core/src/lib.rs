//! # livebind core
//!
//! Runtime-free building blocks of the livebind engine.
//!
//! This crate provides:
//! - The element tree targets bind to ([`Document`], [`Element`])
//! - Selector-based discovery ([`Selector`])
//! - Target configuration read from element attributes ([`TargetConfig`])
//! - Mode resolution and the transport variants ([`SyncMode`], [`Transport`])
//! - Payload decoding with raw-text fallback ([`Payload`])
//! - The lifecycle hook bus and plugins ([`HookBus`], [`Plugin`])
//! - The render sink with diff suppression ([`render()`])
//!
//! ## Key Invariants
//!
//! - An element is bound to at most one target at a time
//! - Hook callbacks run in registration order and never fail the emitter
//! - Decode failures never surface as errors
//! - The last-rendered value is updated on every render call

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod element;
mod error;
mod hooks;
mod mode;
mod payload;
mod render;
mod selector;

pub use config::{attr, resolve_url, TargetConfig, DEFAULT_INTERVAL};
pub use element::{Document, Element, ElementId};
pub use error::{SyncError, SyncResult};
pub use hooks::{BoxError, Hook, HookBus, HookCallback, HookEvent, HookId, LoggerPlugin, Plugin};
pub use mode::{mode_for_endpoint, resolve_mode, ModeStrategy, SyncMode, Transport};
pub use payload::{Format, Payload};
pub use render::{
    escape_html, render, represent, RenderFn, RenderOptions, RenderOutcome, RendererRegistry,
};
pub use selector::{Selector, DEFAULT_SELECTOR};
