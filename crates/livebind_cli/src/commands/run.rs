//! Run command implementation.

use crate::page::PageFile;
use livebind_core::{HookEvent, LoggerPlugin, RenderOutcome};
use livebind_engine::LiveBind;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One line of `--format json` output.
#[derive(Debug, Serialize)]
struct RenderLine<'a> {
    element: String,
    tag: &'a str,
    endpoint: &'a str,
    content: String,
}

/// Binds the page and prints every render until interrupted or `duration`
/// elapses.
pub async fn run(
    path: &Path,
    duration: Option<Duration>,
    format: &str,
    log_hooks: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = PageFile::load(path)?;
    let live = LiveBind::new(page.document(), page.engine_config()?)?;

    if log_hooks {
        live.use_plugin(Arc::new(LoggerPlugin));
    }

    let json = format == "json";
    live.on("sync:afterUpdate", move |event| {
        let HookEvent::AfterUpdate {
            element,
            endpoint,
            outcome: RenderOutcome::Updated,
            ..
        } = event
        else {
            return Ok(());
        };
        if json {
            let line = RenderLine {
                element: element.id().to_string(),
                tag: element.tag(),
                endpoint,
                content: element.inner_html(),
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("[{} {}] {}", element.tag(), endpoint, element.inner_html());
        }
        Ok(())
    });
    live.on("sync:error", |event| {
        if let HookEvent::Error {
            endpoint, error, ..
        } = event
        {
            eprintln!(
                "error [{}]: {}",
                endpoint.as_deref().unwrap_or("-"),
                error
            );
        }
        Ok(())
    });

    let handles = live.start(None);
    if handles.is_empty() {
        return Err("no sync targets found in page".into());
    }
    tracing::info!(targets = handles.len(), "running, press Ctrl-C to stop");

    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    live.stop();
    Ok(())
}
