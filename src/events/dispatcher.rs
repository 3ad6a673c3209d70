use std::collections::HashMap;

use super::envelope::EventEnvelope;

// ============================================================================
// In-Process Dispatcher
// ============================================================================
//
// Delivers local (non-relay) events to registered handlers synchronously,
// in registration order, after the originating transaction has committed.
// Handlers are isolated from each other: a failing handler is logged and
// the remaining handlers still run.
//
// ============================================================================

type LocalHandler = Box<dyn Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub struct LocalDispatcher {
    handlers: HashMap<String, Vec<(String, LocalHandler)>>,
}

impl LocalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type. Handlers for the same type run
    /// in the order they were registered.
    pub fn subscribe<F>(&mut self, event_type: &str, name: &str, handler: F)
    where
        F: Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push((name.to_string(), Box::new(handler)));
    }

    /// Deliver one envelope to every handler registered for its type.
    ///
    /// Runs strictly after commit; a handler failure cannot affect the
    /// already-committed transaction and does not stop later handlers.
    pub fn dispatch(&self, envelope: &EventEnvelope) {
        let Some(handlers) = self.handlers.get(&envelope.event_type) else {
            tracing::debug!(
                event_type = %envelope.event_type,
                "No local handlers registered for event"
            );
            return;
        };

        for (name, handler) in handlers {
            match handler(envelope) {
                Ok(()) => {
                    tracing::debug!(
                        handler = %name,
                        event_type = %envelope.event_type,
                        aggregate_id = %envelope.aggregate_id,
                        "Local handler applied event"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        handler = %name,
                        event_type = %envelope.event_type,
                        aggregate_id = %envelope.aggregate_id,
                        error = %e,
                        "Local handler failed; continuing with remaining handlers"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        f.debug_struct("LocalDispatcher")
            .field("event_types", &names)
            .finish()
    }
}
