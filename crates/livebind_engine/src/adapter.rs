//! Transport adapters.
//!
//! One adapter runs per started target, as a single task. Each variant of
//! [`Transport`] has its own handler; all of them funnel data into
//! [`Pipeline::deliver`] and failures into [`Pipeline::fail`].

use crate::connector::websocket_url;
use crate::controller::TargetState;
use crate::SyncContext;
use futures::StreamExt;
use livebind_core::{
    render, Element, Format, HookEvent, Payload, RenderOptions, SyncError, Transport,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Per-run link between an adapter and its target.
///
/// Every callback checks the disposed flag first, so results that arrive
/// after `stop()` are dropped. `deliver` checks again before rendering and
/// before `sync:afterUpdate`, since a hook or another thread may stop the
/// target mid-delivery.
pub(crate) struct Pipeline {
    pub(crate) element: Arc<Element>,
    pub(crate) endpoint: String,
    pub(crate) format: Format,
    pub(crate) renderer: Option<String>,
    pub(crate) diff: bool,
    pub(crate) ctx: Arc<SyncContext>,
    pub(crate) disposed: Arc<AtomicBool>,
    pub(crate) state: Arc<RwLock<TargetState>>,
    pub(crate) attempts: Arc<AtomicU32>,
}

impl Pipeline {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: TargetState) {
        if !self.is_disposed() {
            *self.state.write() = state;
        }
    }

    /// Runs one payload through beforeUpdate, render and afterUpdate.
    pub(crate) fn deliver(&self, data: Payload) {
        if self.is_disposed() {
            return;
        }
        if !self.element.is_connected() {
            tracing::debug!(endpoint = %self.endpoint, "element detached, dropping payload");
            return;
        }

        let hooks = &self.ctx.hooks;
        hooks.emit(&HookEvent::BeforeUpdate {
            element: Arc::clone(&self.element),
            endpoint: self.endpoint.clone(),
            data: data.clone(),
        });
        if self.is_disposed() {
            return;
        }

        let rendered = render(
            &self.element,
            &data,
            self.renderer.as_deref(),
            &self.ctx.renderers,
            RenderOptions { diff: self.diff },
        );
        match rendered {
            Ok(_) if self.is_disposed() => {}
            Ok(outcome) => {
                self.set_state(TargetState::Connected);
                hooks.emit(&HookEvent::AfterUpdate {
                    element: Arc::clone(&self.element),
                    endpoint: self.endpoint.clone(),
                    data,
                    outcome,
                });
            }
            Err(err) => self.fail(err),
        }
    }

    /// Reports a failure through the error hook. The adapter keeps running.
    pub(crate) fn fail(&self, error: SyncError) {
        if self.is_disposed() {
            return;
        }
        tracing::debug!(endpoint = %self.endpoint, %error, "target error");
        self.set_state(TargetState::Error);
        self.ctx.hooks.emit(&HookEvent::Error {
            element: Some(Arc::clone(&self.element)),
            endpoint: Some(self.endpoint.clone()),
            error: Arc::new(error),
        });
    }

    /// One fetch-and-render cycle.
    pub(crate) async fn fetch_cycle(&self) {
        let result = self.ctx.connector.fetch(&self.endpoint, self.format).await;
        match result {
            Ok(payload) => self.deliver(payload),
            Err(err) => self.fail(err),
        }
    }
}

/// Drives the adapter for `transport` until it finishes or is aborted.
pub(crate) async fn run(
    transport: Transport,
    pipeline: Pipeline,
    signals: Option<broadcast::Receiver<String>>,
) {
    match transport {
        Transport::Polling { interval } => run_polling(&pipeline, interval).await,
        Transport::Sse => run_stream(&pipeline, StreamKind::Sse).await,
        Transport::WebSocket => run_stream(&pipeline, StreamKind::WebSocket).await,
        Transport::Manual { signal } => {
            if let Some(signals) = signals {
                run_manual(&pipeline, &signal, signals).await;
            }
        }
        Transport::OneShot => pipeline.fetch_cycle().await,
    }
}

/// Fetches immediately, then once per tick.
///
/// Cycles run inside this one task, so they never overlap. A cycle that
/// outlasts the interval makes the missed ticks fire back to back.
async fn run_polling(pipeline: &Pipeline, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if pipeline.is_disposed() {
            break;
        }
        pipeline.fetch_cycle().await;
    }
}

async fn run_manual(pipeline: &Pipeline, signal: &str, mut signals: broadcast::Receiver<String>) {
    loop {
        match signals.recv().await {
            Ok(name) if name == signal => pipeline.fetch_cycle().await,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(endpoint = %pipeline.endpoint, skipped, "trigger signals dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
        if pipeline.is_disposed() {
            break;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Sse,
    WebSocket,
}

/// Errors a reconnect cannot fix. Status errors stay in the backoff loop
/// since the endpoint may come back.
fn is_fatal(error: &SyncError) -> bool {
    !error.is_retryable() && !matches!(error, SyncError::HttpStatus { .. })
}

/// Holds a persistent stream open, reconnecting with backoff.
async fn run_stream(pipeline: &Pipeline, kind: StreamKind) {
    let connector = &pipeline.ctx.connector;
    let retry = &pipeline.ctx.config.retry;

    loop {
        let mut fatal = false;
        let opened = match kind {
            StreamKind::Sse => connector.open_sse(&pipeline.endpoint).await,
            StreamKind::WebSocket => {
                connector
                    .open_websocket(&websocket_url(&pipeline.endpoint))
                    .await
            }
        };

        match opened {
            Ok(mut stream) => {
                pipeline.set_state(TargetState::Connected);
                tracing::debug!(endpoint = %pipeline.endpoint, ?kind, "stream open");
                while let Some(item) = stream.next().await {
                    if pipeline.is_disposed() {
                        return;
                    }
                    match item {
                        Ok(raw) => {
                            pipeline.attempts.store(0, Ordering::SeqCst);
                            pipeline.deliver(Payload::decode(&raw, pipeline.format));
                        }
                        Err(err) => {
                            fatal = is_fatal(&err);
                            pipeline.fail(err);
                            break;
                        }
                    }
                }
                tracing::debug!(endpoint = %pipeline.endpoint, ?kind, "stream closed");
            }
            Err(err) => {
                fatal = is_fatal(&err);
                pipeline.fail(err);
            }
        }

        if pipeline.is_disposed() {
            return;
        }
        if fatal {
            tracing::warn!(endpoint = %pipeline.endpoint, "unrecoverable stream error, target abandoned");
            pipeline.set_state(TargetState::Abandoned);
            return;
        }
        let attempt = pipeline.attempts.load(Ordering::SeqCst);
        if retry.is_exhausted(attempt) {
            tracing::warn!(
                endpoint = %pipeline.endpoint,
                attempts = attempt,
                "reconnect budget exhausted, target abandoned"
            );
            pipeline.set_state(TargetState::Abandoned);
            return;
        }

        let delay = retry.delay_for_attempt(attempt);
        pipeline.attempts.store(attempt + 1, Ordering::SeqCst);
        tracing::debug!(
            endpoint = %pipeline.endpoint,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        tokio::time::sleep(delay).await;
    }
}
