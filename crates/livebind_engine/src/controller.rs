//! Per-element controller.

use crate::adapter::{self, Pipeline};
use crate::SyncContext;
use livebind_core::{resolve_mode, Element, HookEvent, SyncError, SyncMode, TargetConfig, Transport};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Lifecycle state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// Not started, or stopped.
    Idle,
    /// Started, mode not yet resolved.
    ModePending,
    /// Mode resolved, adapter starting.
    ModeResolved,
    /// Data is flowing.
    Connected,
    /// The last operation failed; the adapter decides whether to retry.
    Error,
    /// The reconnect budget is spent; only a restart revives the target.
    Abandoned,
}

impl TargetState {
    /// Returns true for every state except [`TargetState::Idle`].
    pub fn is_started(&self) -> bool {
        !matches!(self, TargetState::Idle)
    }
}

struct ActiveRun {
    task: JoinHandle<()>,
    disposed: Arc<AtomicBool>,
    transport: Transport,
}

struct ControllerInner {
    element: Arc<Element>,
    config: RwLock<TargetConfig>,
    ctx: Arc<SyncContext>,
    state: Arc<RwLock<TargetState>>,
    attempts: Arc<AtomicU32>,
    run: Mutex<Option<ActiveRun>>,
}

/// Binds one element to one transport adapter and the render sink.
///
/// Cheap to clone; clones share the same target.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<ControllerInner>,
}

impl SyncController {
    /// Creates a controller and emits `sync:onload`. Does not start it.
    pub(crate) fn new(element: Arc<Element>, config: TargetConfig, ctx: Arc<SyncContext>) -> Self {
        ctx.hooks.emit(&HookEvent::Load {
            element: Arc::clone(&element),
            endpoint: config.endpoint.clone(),
        });
        Self {
            inner: Arc::new(ControllerInner {
                element,
                config: RwLock::new(config),
                ctx,
                state: Arc::new(RwLock::new(TargetState::Idle)),
                attempts: Arc::new(AtomicU32::new(0)),
                run: Mutex::new(None),
            }),
        }
    }

    /// The bound element.
    pub fn element(&self) -> &Arc<Element> {
        &self.inner.element
    }

    /// Snapshot of the target configuration.
    pub fn config(&self) -> TargetConfig {
        self.inner.config.read().clone()
    }

    /// Declared mode, or the resolved one once started.
    pub fn mode(&self) -> SyncMode {
        self.inner.config.read().mode
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TargetState {
        *self.inner.state.read()
    }

    /// Returns true while an adapter is active.
    pub fn is_started(&self) -> bool {
        self.inner.run.lock().is_some()
    }

    /// Transport of the active adapter.
    pub fn transport(&self) -> Option<Transport> {
        self.inner.run.lock().as_ref().map(|r| r.transport.clone())
    }

    /// Consecutive reconnect attempts since the last good message.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Raises the manual trigger signal on the bound element.
    pub fn trigger(&self) -> usize {
        self.inner
            .element
            .dispatch(self.inner.ctx.config.trigger_signal.clone())
    }

    /// Resolves the mode and starts the adapter. No-op if already started.
    pub fn start(&self) {
        let inner = &self.inner;
        let mut run = inner.run.lock();
        if run.is_some() {
            tracing::debug!(endpoint = %inner.config.read().endpoint, "target already started");
            return;
        }

        *inner.state.write() = TargetState::ModePending;
        let (mode, config) = {
            let mut config = inner.config.write();
            config.mode = resolve_mode(config.mode, &config.endpoint, inner.ctx.config.mode_strategy);
            (config.mode, config.clone())
        };

        let Some(transport) =
            Transport::for_mode(mode, config.interval, &inner.ctx.config.trigger_signal)
        else {
            drop(run);
            *inner.state.write() = TargetState::Error;
            inner.ctx.hooks.emit(&HookEvent::Error {
                element: Some(Arc::clone(&inner.element)),
                endpoint: Some(config.endpoint),
                error: Arc::new(SyncError::Config(format!("unresolved mode {mode}"))),
            });
            return;
        };
        *inner.state.write() = TargetState::ModeResolved;
        inner.attempts.store(0, Ordering::SeqCst);

        // Subscribe before spawning so no trigger raised after start() is lost.
        let signals = matches!(transport, Transport::Manual { .. })
            .then(|| inner.element.subscribe());

        let endpoint = config.endpoint.clone();
        let disposed = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline {
            element: Arc::clone(&inner.element),
            endpoint: config.endpoint,
            format: config.format,
            renderer: config.renderer,
            diff: config.diff,
            ctx: Arc::clone(&inner.ctx),
            disposed: Arc::clone(&disposed),
            state: Arc::clone(&inner.state),
            attempts: Arc::clone(&inner.attempts),
        };

        // The adapter waits until sync:connect has been emitted, which
        // happens outside the lock so callbacks may stop this target.
        let (ready, gate) = oneshot::channel::<()>();
        let adapter = adapter::run(transport.clone(), pipeline, signals);
        let task = inner.ctx.runtime.spawn(async move {
            if gate.await.is_ok() {
                adapter.await;
            }
        });
        *run = Some(ActiveRun {
            task,
            disposed,
            transport,
        });
        drop(run);

        tracing::info!(%endpoint, %mode, "target started");
        inner.ctx.hooks.emit(&HookEvent::Connect {
            element: Arc::clone(&inner.element),
            endpoint,
            mode,
        });
        let _ = ready.send(());
    }

    /// Tears down the adapter and emits `sync:disconnect`.
    ///
    /// Does nothing on a target that is not started.
    pub fn stop(&self) {
        let inner = &self.inner;
        let Some(run) = inner.run.lock().take() else {
            return;
        };
        run.disposed.store(true, Ordering::SeqCst);
        run.task.abort();
        *inner.state.write() = TargetState::Idle;

        let endpoint = inner.config.read().endpoint.clone();
        tracing::info!(%endpoint, "target stopped");
        inner.ctx.hooks.emit(&HookEvent::Disconnect {
            element: Arc::clone(&inner.element),
            endpoint,
        });
    }
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("element", &self.inner.element.id())
            .field("endpoint", &self.inner.config.read().endpoint)
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}
