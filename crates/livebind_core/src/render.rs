//! Render sink: turns payloads into element content.

use crate::element::Element;
use crate::error::{SyncError, SyncResult};
use crate::hooks::BoxError;
use crate::payload::Payload;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A named render function producing markup from a payload.
pub type RenderFn = Arc<dyn Fn(&Payload) -> Result<String, BoxError> + Send + Sync>;

/// Options for a single render call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Skip the mutation when the output equals the previous render.
    pub diff: bool,
}

/// What a render call did to the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Content was replaced.
    Updated,
    /// Diffing found identical output; content left alone.
    Unchanged,
}

/// Registry of render functions, looked up by name.
#[derive(Default)]
pub struct RendererRegistry {
    renderers: RwLock<HashMap<String, RenderFn>>,
}

impl RendererRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a renderer.
    pub fn register<F>(&self, name: impl Into<String>, render: F)
    where
        F: Fn(&Payload) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.renderers.write().insert(name.into(), Arc::new(render));
    }

    /// Looks up a renderer.
    pub fn get(&self, name: &str) -> Option<RenderFn> {
        self.renderers.read().get(name).cloned()
    }

    /// Returns true if a renderer with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.renderers.read().contains_key(name)
    }

    /// Number of registered renderers.
    pub fn len(&self) -> usize {
        self.renderers.read().len()
    }

    /// Returns true if no renderer is registered.
    pub fn is_empty(&self) -> bool {
        self.renderers.read().is_empty()
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.renderers.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("RendererRegistry").field("names", &names).finish()
    }
}

/// Produces the representation of a payload without touching any element.
pub fn represent(
    payload: &Payload,
    renderer: Option<&str>,
    registry: &RendererRegistry,
) -> SyncResult<String> {
    if let Some(name) = renderer {
        match registry.get(name) {
            Some(render) => {
                return render(payload).map_err(|e| SyncError::Render(format!("{name}: {e}")))
            }
            None => tracing::debug!(renderer = name, "renderer not registered, using default"),
        }
    }

    if let (true, Some(value)) = (payload.is_structured(), payload.as_json()) {
        let pretty = serde_json::to_string_pretty(value)
            .map_err(|e| SyncError::Render(e.to_string()))?;
        Ok(format!("<pre>{}</pre>", escape_html(&pretty)))
    } else {
        Ok(escape_html(&payload.to_plain_text()))
    }
}

/// Renders a payload into an element.
///
/// The last-rendered value is overwritten on every call, whether or not
/// diffing suppressed the mutation.
pub fn render(
    element: &Element,
    payload: &Payload,
    renderer: Option<&str>,
    registry: &RendererRegistry,
    options: RenderOptions,
) -> SyncResult<RenderOutcome> {
    let output = represent(payload, renderer, registry)?;
    let unchanged = options.diff && element.last_rendered().as_deref() == Some(output.as_str());

    let outcome = if unchanged {
        RenderOutcome::Unchanged
    } else {
        element.set_inner_html(output.clone());
        RenderOutcome::Updated
    };
    element.set_last_rendered(output);
    Ok(outcome)
}

/// Escapes text for inclusion in markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
