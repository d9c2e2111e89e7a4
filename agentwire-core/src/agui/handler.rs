//! Handlers for standardized events.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::events::{handler_name, AguiEvent};

/// Receives standardized events
pub trait AguiHandler: Send + Sync {
    fn on_event(&self, event: &AguiEvent);
}

/// Blanket implementation for closures
impl<F> AguiHandler for F
where
    F: Fn(&AguiEvent) + Send + Sync,
{
    fn on_event(&self, event: &AguiEvent) {
        self(event)
    }
}

/// Handlers keyed by camel-cased handler name (`onRunStarted`)
///
/// Events whose name has no registered handler are ignored. Handlers
/// registered with [`HandlerRegistry::on_any`] see every known event.
#[derive(Default)]
pub struct HandlerRegistry {
    named: RwLock<HashMap<String, Vec<Arc<dyn AguiHandler>>>>,
    any: RwLock<Vec<Arc<dyn AguiHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for one event type
    ///
    /// Accepts either the type tag (`run_started`) or the handler name
    /// (`onRunStarted`).
    pub fn on(&self, event: &str, handler: Arc<dyn AguiHandler>) {
        let key = if event.starts_with("on") && !event.contains('_') {
            event.to_string()
        } else {
            handler_name(event)
        };
        self.named.write().entry(key).or_default().push(handler);
    }

    /// Register for every event
    pub fn on_any(&self, handler: Arc<dyn AguiHandler>) {
        self.any.write().push(handler);
    }

    /// Handlers for `event`, in registration order, named ones first
    pub fn handlers_for(&self, event: &AguiEvent) -> Vec<Arc<dyn AguiHandler>> {
        if matches!(event, AguiEvent::Unknown) {
            return Vec::new();
        }
        let mut handlers = self
            .named
            .read()
            .get(&handler_name(event.event_type()))
            .cloned()
            .unwrap_or_default();
        handlers.extend(self.any.read().iter().cloned());
        handlers
    }

    /// Whether anything is registered
    pub fn is_empty(&self) -> bool {
        self.named.read().is_empty() && self.any.read().is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.named.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("named", &names)
            .field("any", &self.any.read().len())
            .finish()
    }
}
