//! In-process element tree that targets are bound to.
//!
//! An [`Element`] is the unit a sync target renders into: it carries
//! attributes (the declarative configuration), visible content, the
//! last-rendered representation used for diffing, and a signal channel for
//! custom events such as `sync:trigger`.
//!
//! A [`Document`] owns the set of elements discovery runs against.

use crate::error::SyncResult;
use crate::selector::Selector;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of each element's signal channel.
const SIGNAL_CAPACITY: usize = 64;

/// Stable identity of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Generates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Content {
    inner_html: String,
    last_rendered: Option<String>,
}

/// A bindable element.
pub struct Element {
    id: ElementId,
    tag: String,
    attributes: RwLock<BTreeMap<String, String>>,
    content: RwLock<Content>,
    mutations: AtomicU64,
    bound: AtomicBool,
    connected: AtomicBool,
    signals: broadcast::Sender<String>,
}

impl Element {
    /// Creates an element with the given tag name.
    pub fn new(tag: impl Into<String>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            id: ElementId::new(),
            tag: tag.into().to_ascii_lowercase(),
            attributes: RwLock::new(BTreeMap::new()),
            content: RwLock::new(Content::default()),
            mutations: AtomicU64::new(0),
            bound: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            signals,
        }
    }

    /// Adds an attribute (builder style).
    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Returns the element id.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Returns the lowercase tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns an attribute value. Names are case-insensitive.
    ///
    /// Falls back to the `data-` prefixed form, so `endpoint` also matches
    /// `data-endpoint`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let attributes = self.attributes.read();
        attributes
            .get(&name)
            .or_else(|| attributes.get(&format!("data-{name}")))
            .cloned()
    }

    /// Returns true if the attribute (or its `data-` form) is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Sets an attribute. Names are case-insensitive.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .write()
            .insert(name.into().to_ascii_lowercase(), value.into());
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.attributes.write().remove(&name.to_ascii_lowercase())
    }

    /// Returns a snapshot of every attribute.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.attributes.read().clone()
    }

    /// Returns the whitespace-separated class list.
    pub fn classes(&self) -> Vec<String> {
        self.attribute("class")
            .map(|c| c.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Returns the current visible content as markup.
    pub fn inner_html(&self) -> String {
        self.content.read().inner_html.clone()
    }

    /// Replaces the visible content.
    pub fn set_inner_html(&self, html: impl Into<String>) {
        self.content.write().inner_html = html.into();
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of times the visible content has been replaced.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// The representation produced by the most recent render call.
    pub fn last_rendered(&self) -> Option<String> {
        self.content.read().last_rendered.clone()
    }

    pub(crate) fn set_last_rendered(&self, rendered: String) {
        self.content.write().last_rendered = Some(rendered);
    }

    /// Marks the element as bound to a target.
    ///
    /// Returns false if it was already bound.
    pub fn try_bind(&self) -> bool {
        self.bound
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Clears the binding mark.
    pub fn release(&self) {
        self.bound.store(false, Ordering::SeqCst);
    }

    /// Returns true if a target is bound to this element.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    /// Returns false once the element has been removed from its document.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Raises a named signal on this element.
    ///
    /// Returns the number of listeners that received it.
    pub fn dispatch(&self, signal: impl Into<String>) -> usize {
        self.signals.send(signal.into()).unwrap_or(0)
    }

    /// Subscribes to signals raised on this element.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.signals.subscribe()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("attributes", &*self.attributes.read())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// An ordered collection of elements.
#[derive(Debug, Default)]
pub struct Document {
    elements: RwLock<Vec<Arc<Element>>>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an element, returning the shared handle.
    pub fn append(&self, element: Element) -> Arc<Element> {
        let element = Arc::new(element);
        self.elements.write().push(Arc::clone(&element));
        element
    }

    /// Removes an element. It stays alive for holders of its handle but is
    /// no longer connected.
    pub fn remove(&self, id: ElementId) -> Option<Arc<Element>> {
        let mut elements = self.elements.write();
        let index = elements.iter().position(|e| e.id() == id)?;
        let element = elements.remove(index);
        element.connected.store(false, Ordering::SeqCst);
        Some(element)
    }

    /// Looks up an element by id.
    pub fn get(&self, id: ElementId) -> Option<Arc<Element>> {
        self.elements.read().iter().find(|e| e.id() == id).cloned()
    }

    /// Returns every element matching the selector, in document order.
    pub fn query_all(&self, selector: &Selector) -> Vec<Arc<Element>> {
        self.elements
            .read()
            .iter()
            .filter(|e| selector.matches(e))
            .cloned()
            .collect()
    }

    /// Parses `selector` and returns every matching element.
    pub fn query_selector_all(&self, selector: &str) -> SyncResult<Vec<Arc<Element>>> {
        let selector = Selector::parse(selector)?;
        Ok(self.query_all(&selector))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    /// Returns true if the document has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }
}
