//! The `LiveBind` context.

use crate::config::EngineConfig;
use crate::connector::{Connector, NetworkConnector};
use crate::controller::SyncController;
use crate::manager::SyncManager;
use livebind_core::{
    BoxError, Document, Element, HookBus, HookEvent, HookId, Payload, Plugin, RendererRegistry,
    SyncError, SyncResult,
};
use std::sync::Arc;
use tokio::runtime::Handle;

/// State shared by every controller of one [`LiveBind`].
pub(crate) struct SyncContext {
    pub(crate) config: EngineConfig,
    pub(crate) hooks: Arc<HookBus>,
    pub(crate) renderers: Arc<RendererRegistry>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) runtime: Handle,
}

/// A started target, as returned by [`LiveBind::start`].
pub type TargetHandle = SyncController;

/// Entry point: binds the elements of one document to their data sources.
///
/// Each `LiveBind` owns its hook bus, renderer registry and manager. Several
/// contexts can run side by side in one process.
///
/// Adapters run as tasks on the tokio runtime current at construction.
/// Dropping the context stops every target.
pub struct LiveBind {
    ctx: Arc<SyncContext>,
    manager: SyncManager,
    document: Arc<Document>,
}

impl LiveBind {
    /// Creates a context using the real network.
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` outside a tokio runtime, or a transport error if
    /// the HTTP client cannot be built.
    pub fn new(document: Arc<Document>, config: EngineConfig) -> SyncResult<Self> {
        let connector = NetworkConnector::new(config.connect_timeout, config.request_timeout)?;
        Self::with_connector(document, config, Arc::new(connector))
    }

    /// Creates a context with a custom connector.
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` outside a tokio runtime.
    pub fn with_connector(
        document: Arc<Document>,
        config: EngineConfig,
        connector: Arc<dyn Connector>,
    ) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let ctx = Arc::new(SyncContext {
            config,
            hooks: Arc::new(HookBus::new()),
            renderers: Arc::new(RendererRegistry::new()),
            connector,
            runtime,
        });
        Ok(Self {
            manager: SyncManager::new(Arc::clone(&document), Arc::clone(&ctx)),
            ctx,
            document,
        })
    }

    /// Discovers and starts targets, returning every active one. See
    /// [`SyncManager::start`].
    pub fn start(&self, selector: Option<&str>) -> Vec<TargetHandle> {
        self.manager.start(selector)
    }

    /// Stops every target.
    pub fn stop(&self) {
        self.manager.stop();
    }

    /// Registers a hook callback by name, e.g. `sync:afterUpdate`.
    pub fn on<F>(&self, name: &str, callback: F) -> HookId
    where
        F: Fn(&HookEvent) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.ctx.hooks.register(name, callback)
    }

    /// Removes a hook callback. Returns false if it was not registered.
    pub fn off(&self, id: HookId) -> bool {
        self.ctx.hooks.unregister(id)
    }

    /// Wires a plugin's hooks.
    pub fn use_plugin(&self, plugin: Arc<dyn Plugin>) -> Vec<HookId> {
        self.ctx.hooks.register_plugin(plugin)
    }

    /// Registers a renderer that elements select with the `render` attribute.
    pub fn register_renderer<F>(&self, name: impl Into<String>, render: F)
    where
        F: Fn(&Payload) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.ctx.renderers.register(name, render);
    }

    /// Raises a signal on an element.
    pub fn dispatch(&self, element: &Element, signal: impl Into<String>) -> usize {
        element.dispatch(signal)
    }

    /// Raises the configured trigger signal on an element.
    pub fn trigger(&self, element: &Element) -> usize {
        element.dispatch(self.ctx.config.trigger_signal.clone())
    }

    /// The bound document.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// The hook bus.
    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.ctx.hooks
    }

    /// The manager.
    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }
}

impl Drop for LiveBind {
    fn drop(&mut self) {
        if !self.manager.is_empty() {
            self.manager.stop();
        }
    }
}

impl std::fmt::Debug for LiveBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBind")
            .field("config", &self.ctx.config)
            .field("hooks", &self.ctx.hooks)
            .field("manager", &self.manager)
            .finish()
    }
}
