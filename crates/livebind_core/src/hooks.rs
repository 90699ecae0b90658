//! Lifecycle hook bus.
//!
//! Callbacks are registered per hook name and invoked in registration order.
//! A callback that returns an error or panics is contained at the bus
//! boundary: it is logged as a [`SyncError::Plugin`] and the remaining
//! callbacks still run. Nothing propagates back to the emitter.
//!
//! Any name is accepted on registration; names outside the [`Hook`] set are
//! stored but never emitted by the engine.

use crate::element::Element;
use crate::error::SyncError;
use crate::mode::SyncMode;
use crate::payload::Payload;
use crate::render::RenderOutcome;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boxed error returned by callbacks and plugins.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A hook callback.
pub type HookCallback = Arc<dyn Fn(&HookEvent) -> Result<(), BoxError> + Send + Sync>;

/// Lifecycle hooks emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// A target was created for an element.
    Onload,
    /// A payload is about to be rendered.
    BeforeUpdate,
    /// A payload was rendered.
    AfterUpdate,
    /// A fetch, transport or render failure.
    Error,
    /// A target resolved its mode and is connecting.
    Connect,
    /// A target was stopped.
    Disconnect,
    /// The manager finished a discovery pass.
    ManagerStart,
    /// The manager stopped every target.
    ManagerStop,
}

impl Hook {
    /// Hooks a plugin can implement.
    pub const PLUGIN_HOOKS: [Hook; 6] = [
        Hook::Onload,
        Hook::BeforeUpdate,
        Hook::AfterUpdate,
        Hook::Error,
        Hook::Connect,
        Hook::Disconnect,
    ];

    /// Canonical hook name.
    pub fn name(&self) -> &'static str {
        match self {
            Hook::Onload => "sync:onload",
            Hook::BeforeUpdate => "sync:beforeUpdate",
            Hook::AfterUpdate => "sync:afterUpdate",
            Hook::Error => "sync:error",
            Hook::Connect => "sync:connect",
            Hook::Disconnect => "sync:disconnect",
            Hook::ManagerStart => "sync:manager:start",
            Hook::ManagerStop => "sync:manager:stop",
        }
    }

    /// Parses a canonical name or its short form (`onload`, `error`, ...).
    pub fn parse(name: &str) -> Option<Hook> {
        let short = name.strip_prefix("sync:").unwrap_or(name);
        match short {
            "onload" => Some(Hook::Onload),
            "beforeUpdate" => Some(Hook::BeforeUpdate),
            "afterUpdate" => Some(Hook::AfterUpdate),
            "error" => Some(Hook::Error),
            "connect" => Some(Hook::Connect),
            "disconnect" => Some(Hook::Disconnect),
            "manager:start" => Some(Hook::ManagerStart),
            "manager:stop" => Some(Hook::ManagerStop),
            _ => None,
        }
    }
}

fn canonical_name(name: &str) -> String {
    Hook::parse(name)
        .map(|h| h.name().to_owned())
        .unwrap_or_else(|| name.to_owned())
}

/// Payload delivered to hook callbacks.
#[derive(Debug, Clone)]
pub enum HookEvent {
    /// See [`Hook::Onload`].
    Load {
        /// Bound element.
        element: Arc<Element>,
        /// Resolved endpoint.
        endpoint: String,
    },
    /// See [`Hook::Connect`].
    Connect {
        /// Bound element.
        element: Arc<Element>,
        /// Resolved endpoint.
        endpoint: String,
        /// Concrete mode in use.
        mode: SyncMode,
    },
    /// See [`Hook::BeforeUpdate`].
    BeforeUpdate {
        /// Bound element.
        element: Arc<Element>,
        /// Resolved endpoint.
        endpoint: String,
        /// Decoded payload.
        data: Payload,
    },
    /// See [`Hook::AfterUpdate`].
    AfterUpdate {
        /// Bound element.
        element: Arc<Element>,
        /// Resolved endpoint.
        endpoint: String,
        /// Decoded payload.
        data: Payload,
        /// Whether the element was mutated.
        outcome: RenderOutcome,
    },
    /// See [`Hook::Error`].
    Error {
        /// Element involved, if any.
        element: Option<Arc<Element>>,
        /// Endpoint involved, if any.
        endpoint: Option<String>,
        /// Underlying error.
        error: Arc<SyncError>,
    },
    /// See [`Hook::Disconnect`].
    Disconnect {
        /// Bound element.
        element: Arc<Element>,
        /// Resolved endpoint.
        endpoint: String,
    },
    /// See [`Hook::ManagerStart`].
    ManagerStart {
        /// Number of tracked targets.
        count: usize,
    },
    /// See [`Hook::ManagerStop`].
    ManagerStop,
}

impl HookEvent {
    /// The hook this event is emitted on.
    pub fn hook(&self) -> Hook {
        match self {
            HookEvent::Load { .. } => Hook::Onload,
            HookEvent::Connect { .. } => Hook::Connect,
            HookEvent::BeforeUpdate { .. } => Hook::BeforeUpdate,
            HookEvent::AfterUpdate { .. } => Hook::AfterUpdate,
            HookEvent::Error { .. } => Hook::Error,
            HookEvent::Disconnect { .. } => Hook::Disconnect,
            HookEvent::ManagerStart { .. } => Hook::ManagerStart,
            HookEvent::ManagerStop => Hook::ManagerStop,
        }
    }

    /// The element the event concerns, if any.
    pub fn element(&self) -> Option<&Arc<Element>> {
        match self {
            HookEvent::Load { element, .. }
            | HookEvent::Connect { element, .. }
            | HookEvent::BeforeUpdate { element, .. }
            | HookEvent::AfterUpdate { element, .. }
            | HookEvent::Disconnect { element, .. } => Some(element),
            HookEvent::Error { element, .. } => element.as_ref(),
            HookEvent::ManagerStart { .. } | HookEvent::ManagerStop => None,
        }
    }
}

/// Handle to a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// An object that observes lifecycle hooks.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Hooks this plugin implements. Only [`Hook::PLUGIN_HOOKS`] are wired.
    fn hooks(&self) -> Vec<Hook>;

    /// Called for every event on an implemented hook.
    fn on_event(&self, event: &HookEvent) -> Result<(), BoxError>;
}

/// Named-event registry.
#[derive(Default)]
pub struct HookBus {
    hooks: RwLock<HashMap<String, Vec<(HookId, HookCallback)>>>,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    next_id: AtomicU64,
}

impl HookBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback to the list for `name`.
    pub fn register<F>(&self, name: &str, callback: F) -> HookId
    where
        F: Fn(&HookEvent) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.hooks
            .write()
            .entry(canonical_name(name))
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Wires every recognized hook the plugin implements.
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Vec<HookId> {
        let mut ids = Vec::new();
        let mut wired = Vec::new();
        for hook in plugin.hooks() {
            if !Hook::PLUGIN_HOOKS.contains(&hook) || wired.contains(&hook) {
                continue;
            }
            wired.push(hook);
            let p = Arc::clone(&plugin);
            ids.push(self.register(hook.name(), move |event| p.on_event(event)));
        }
        tracing::debug!(plugin = plugin.name(), hooks = ids.len(), "plugin registered");
        self.plugins.write().push(plugin);
        ids
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn unregister(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        for callbacks in hooks.values_mut() {
            if let Some(index) = callbacks.iter().position(|(cid, _)| *cid == id) {
                callbacks.remove(index);
                return true;
            }
        }
        false
    }

    /// Emits an event on its own hook.
    pub fn emit(&self, event: &HookEvent) -> usize {
        self.emit_named(event.hook().name(), event)
    }

    /// Emits an event under an explicit name.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit_named(&self, name: &str, event: &HookEvent) -> usize {
        let name = canonical_name(name);
        // Snapshot so callbacks may register or unregister while running.
        let callbacks: Vec<HookCallback> = match self.hooks.read().get(&name) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };

        for callback in &callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            let err = SyncError::Plugin {
                hook: name.clone(),
                message,
            };
            tracing::warn!(error = %err, "hook callback failed");
        }
        callbacks.len()
    }

    /// Number of callbacks registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.hooks
            .read()
            .get(&canonical_name(name))
            .map_or(0, Vec::len)
    }

    /// Number of registered plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.read().len()
    }
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooks = self.hooks.read();
        let mut names: Vec<_> = hooks.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        names.sort();
        f.debug_struct("HookBus")
            .field("hooks", &names)
            .field("plugins", &self.plugin_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_owned()
    }
}

/// Logs every plugin hook through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggerPlugin;

impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        "logger"
    }

    fn hooks(&self) -> Vec<Hook> {
        Hook::PLUGIN_HOOKS.to_vec()
    }

    fn on_event(&self, event: &HookEvent) -> Result<(), BoxError> {
        match event {
            HookEvent::Load { endpoint, .. } => tracing::info!(endpoint, "sync onload"),
            HookEvent::Connect { endpoint, mode, .. } => {
                tracing::info!(endpoint, %mode, "connection open")
            }
            HookEvent::BeforeUpdate { endpoint, .. } => {
                tracing::info!(endpoint, "sync beforeUpdate")
            }
            HookEvent::AfterUpdate {
                endpoint, outcome, ..
            } => tracing::info!(endpoint, ?outcome, "sync afterUpdate"),
            HookEvent::Error {
                endpoint, error, ..
            } => tracing::error!(endpoint = endpoint.as_deref(), %error, "sync error"),
            HookEvent::Disconnect { endpoint, .. } => tracing::info!(endpoint, "connection closed"),
            HookEvent::ManagerStart { .. } | HookEvent::ManagerStop => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Fn(&HookEvent) -> Result<(), BoxError> {
        let log = Arc::clone(log);
        move |_event| {
            log.lock().push(tag.to_owned());
            Ok(())
        }
    }

    #[test]
    fn hook_names_parse_both_forms() {
        assert_eq!(Hook::parse("sync:afterUpdate"), Some(Hook::AfterUpdate));
        assert_eq!(Hook::parse("afterUpdate"), Some(Hook::AfterUpdate));
        assert_eq!(Hook::parse("manager:start"), Some(Hook::ManagerStart));
        assert_eq!(Hook::parse("sync:custom"), None);
    }

    #[test]
    fn callbacks_run_in_insertion_order() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("sync:manager:stop", recorder(&log, "a"));
        bus.register("manager:stop", recorder(&log, "b"));
        bus.register("sync:manager:stop", recorder(&log, "c"));

        assert_eq!(bus.emit(&HookEvent::ManagerStop), 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn failing_callbacks_are_contained() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("sync:manager:stop", |_| Err("nope".into()));
        bus.register("sync:manager:stop", |_| panic!("plugin exploded"));
        bus.register("sync:manager:stop", recorder(&log, "survivor"));

        assert_eq!(bus.emit(&HookEvent::ManagerStop), 3);
        assert_eq!(*log.lock(), vec!["survivor"]);
    }

    #[test]
    fn unknown_names_are_stored_but_silent() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("sync:whatever", recorder(&log, "x"));
        assert_eq!(bus.listener_count("sync:whatever"), 1);

        bus.emit(&HookEvent::ManagerStop);
        bus.emit(&HookEvent::ManagerStart { count: 0 });
        assert!(log.lock().is_empty());
    }

    #[test]
    fn unregister_removes_one_callback() {
        let bus = HookBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = bus.register("sync:manager:stop", recorder(&log, "a"));
        bus.register("sync:manager:stop", recorder(&log, "b"));

        assert!(bus.unregister(first));
        assert!(!bus.unregister(first));
        bus.emit(&HookEvent::ManagerStop);
        assert_eq!(*log.lock(), vec!["b"]);
    }

    struct ErrorOnly {
        seen: Mutex<usize>,
    }

    impl Plugin for ErrorOnly {
        fn name(&self) -> &str {
            "error-only"
        }

        fn hooks(&self) -> Vec<Hook> {
            vec![Hook::Error, Hook::ManagerStart]
        }

        fn on_event(&self, _event: &HookEvent) -> Result<(), BoxError> {
            *self.seen.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn plugins_wire_only_recognized_hooks() {
        let bus = HookBus::new();
        let plugin = Arc::new(ErrorOnly {
            seen: Mutex::new(0),
        });
        let ids = bus.register_plugin(plugin.clone());

        assert_eq!(ids.len(), 1);
        assert_eq!(bus.plugin_count(), 1);
        assert_eq!(bus.listener_count("error"), 1);
        assert_eq!(bus.listener_count("sync:manager:start"), 0);

        bus.emit(&HookEvent::Error {
            element: None,
            endpoint: None,
            error: Arc::new(SyncError::transport_retryable("down")),
        });
        assert_eq!(*plugin.seen.lock(), 1);
    }

    #[test]
    fn logger_plugin_covers_every_plugin_hook() {
        let bus = HookBus::new();
        bus.register_plugin(Arc::new(LoggerPlugin));
        for hook in Hook::PLUGIN_HOOKS {
            assert_eq!(bus.listener_count(hook.name()), 1);
        }
    }
}
