//! Discovery and bulk lifecycle of targets.

use crate::controller::SyncController;
use crate::SyncContext;
use livebind_core::{Document, HookEvent, Selector, SyncError, TargetConfig};
use parking_lot::Mutex;
use std::sync::Arc;

/// Scans a document for sync targets and owns their controllers.
pub struct SyncManager {
    document: Arc<Document>,
    ctx: Arc<SyncContext>,
    controllers: Mutex<Vec<SyncController>>,
}

impl SyncManager {
    pub(crate) fn new(document: Arc<Document>, ctx: Arc<SyncContext>) -> Self {
        Self {
            document,
            ctx,
            controllers: Mutex::new(Vec::new()),
        }
    }

    /// Discovers and starts every unbound element matching `selector`.
    ///
    /// Falls back to the configured selector when `selector` is `None`.
    /// Elements that are already bound are skipped, so calling this again
    /// only picks up elements added since. Returns every active controller,
    /// including those started by earlier passes.
    pub fn start(&self, selector: Option<&str>) -> Vec<SyncController> {
        let source = selector.unwrap_or(&self.ctx.config.selector);
        let selector = match Selector::parse(source) {
            Ok(selector) => selector,
            Err(err) => {
                tracing::warn!(selector = source, %err, "invalid selector");
                self.report(None, err);
                return self.controllers();
            }
        };

        self.prune_detached();

        let mut started = 0;
        for element in self.document.query_all(&selector) {
            if element.is_bound() {
                continue;
            }
            let config = match TargetConfig::from_element(
                &element,
                self.ctx.config.base_url.as_ref(),
                self.ctx.config.default_interval,
            ) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(element = %element.id(), %err, "skipping misconfigured element");
                    self.report(Some(Arc::clone(&element)), err);
                    continue;
                }
            };
            if !element.try_bind() {
                continue;
            }

            let controller = SyncController::new(element, config, Arc::clone(&self.ctx));
            controller.start();
            self.controllers.lock().push(controller);
            started += 1;
        }

        let active = self.controllers();
        let count = active.len();
        tracing::info!(started, tracked = count, "sync manager started");
        self.ctx.hooks.emit(&HookEvent::ManagerStart { count });
        active
    }

    /// Stops every controller and releases its element.
    pub fn stop(&self) {
        let controllers = std::mem::take(&mut *self.controllers.lock());
        for controller in &controllers {
            controller.stop();
            controller.element().release();
        }
        tracing::info!(stopped = controllers.len(), "sync manager stopped");
        self.ctx.hooks.emit(&HookEvent::ManagerStop);
    }

    /// Controllers currently owned by the manager.
    pub fn controllers(&self) -> Vec<SyncController> {
        self.controllers.lock().clone()
    }

    /// Number of owned controllers.
    pub fn len(&self) -> usize {
        self.controllers.lock().len()
    }

    /// Returns true if no controller is owned.
    pub fn is_empty(&self) -> bool {
        self.controllers.lock().is_empty()
    }

    /// Stops and drops controllers whose element left the document.
    fn prune_detached(&self) {
        let detached: Vec<SyncController> = {
            let mut controllers = self.controllers.lock();
            let (gone, kept) = std::mem::take(&mut *controllers)
                .into_iter()
                .partition(|c| !c.element().is_connected());
            *controllers = kept;
            gone
        };
        for controller in detached {
            tracing::debug!(element = %controller.element().id(), "pruning detached target");
            controller.stop();
            controller.element().release();
        }
    }

    fn report(&self, element: Option<Arc<livebind_core::Element>>, error: SyncError) {
        self.ctx.hooks.emit(&HookEvent::Error {
            element,
            endpoint: None,
            error: Arc::new(error),
        });
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("elements", &self.document.len())
            .field("controllers", &self.len())
            .finish()
    }
}
