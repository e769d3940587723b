//! Dispatch registry with pre-readiness buffering
//!
//! Events with a registered handler are held until readiness unless they are
//! needed to reach it (GUILD_CREATE). `flush` replays the backlog in arrival
//! order; everything after that is delivered immediately.

use crate::core::events::GatewayEvent;
use crate::core::handlers::default_handlers;
use crate::core::protocol::event;
use crate::core::store::snowflake;
use crate::traits::{EventHandler, Handled, HandlerContext, Rejection};
use crossbeam_channel::Sender;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// A registered handler and the extra names its results are published under
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn EventHandler>,
    pub aliases: Vec<String>,
}

/// What happened to a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered(Handled),
    /// Held until readiness
    Buffered,
    Rejected(Rejection),
    /// No handler registered
    Unhandled,
}

#[derive(Debug, Clone)]
struct PendingDispatch {
    event: String,
    data: Value,
}

pub struct Dispatcher {
    registry: HashMap<String, Registration>,
    passthrough: HashSet<String>,
    pending: VecDeque<PendingDispatch>,
    ready: bool,
    events: Sender<GatewayEvent>,
}

impl Dispatcher {
    /// Empty registry
    pub fn new(events: Sender<GatewayEvent>) -> Self {
        Self {
            registry: HashMap::new(),
            passthrough: HashSet::from([event::GUILD_CREATE.to_string()]),
            pending: VecDeque::new(),
            ready: false,
            events,
        }
    }

    /// Registry preloaded with the built-in handlers
    pub fn with_default_handlers(events: Sender<GatewayEvent>) -> Self {
        let mut dispatcher = Self::new(events);
        for (name, handler, aliases) in default_handlers() {
            dispatcher.register(name, handler, aliases);
        }
        dispatcher
    }

    /// Register (or replace) the handler for an event
    pub fn register(&mut self, event: impl Into<String>, handler: Arc<dyn EventHandler>, aliases: Vec<String>) {
        self.registry
            .insert(event.into(), Registration { handler, aliases });
    }

    pub fn unregister(&mut self, event: &str) -> bool {
        self.registry.remove(event).is_some()
    }

    pub fn handler_for(&self, event: &str) -> Option<&Registration> {
        self.registry.get(event)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Route a dispatch to its handler, buffering it before readiness
    pub fn dispatch(&mut self, event: &str, data: Value, ctx: &mut HandlerContext<'_>) -> DispatchOutcome {
        if !self.registry.contains_key(event) {
            return DispatchOutcome::Unhandled;
        }
        if !self.ready && !self.passthrough.contains(event) {
            debug!("Holding {} until ready ({} buffered)", event, self.pending.len() + 1);
            self.pending.push_back(PendingDispatch {
                event: event.to_string(),
                data,
            });
            return DispatchOutcome::Buffered;
        }
        self.deliver(event, &data, ctx)
    }

    /// Run a handler without publishing anything
    ///
    /// Used for guilds embedded in READY, which are not application events.
    pub fn apply(&self, event: &str, data: &Value, ctx: &mut HandlerContext<'_>) -> Option<Result<Handled, Rejection>> {
        self.registry
            .get(event)
            .map(|registration| registration.handler.handle(ctx, data))
    }

    /// Mark ready and replay the backlog in arrival order
    ///
    /// Returns the number of replayed dispatches. Later calls replay nothing.
    pub fn flush(&mut self, ctx: &mut HandlerContext<'_>) -> usize {
        self.ready = true;
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for item in pending {
            self.deliver(&item.event, &item.data, ctx);
        }
        count
    }

    fn deliver(&self, event: &str, data: &Value, ctx: &mut HandlerContext<'_>) -> DispatchOutcome {
        let Some(registration) = self.registry.get(event) else {
            return DispatchOutcome::Unhandled;
        };

        match registration.handler.handle(ctx, data) {
            Ok(handled) => {
                self.publish(event, &handled);
                for alias in &registration.aliases {
                    self.publish(alias, &handled);
                }
                if event == event::MESSAGE_CREATE && mentions(&handled.new, ctx.store.current_user_id().as_deref()) {
                    self.publish("mention", &handled);
                }
                DispatchOutcome::Delivered(handled)
            }
            Err(rejection @ Rejection::Unavailable(_)) => {
                debug!("{} rejected: {}", event, rejection);
                DispatchOutcome::Rejected(rejection)
            }
            Err(rejection) => {
                warn!("{} rejected: {}", event, rejection);
                DispatchOutcome::Rejected(rejection)
            }
        }
    }

    fn publish(&self, event: &str, handled: &Handled) {
        let _ = self.events.send(GatewayEvent::Dispatch {
            event: event.to_string(),
            new: handled.new.clone(),
            old: handled.old.clone(),
        });
    }
}

fn mentions(message: &Value, user_id: Option<&str>) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    message
        .get("mentions")
        .and_then(Value::as_array)
        .map(|list| list.iter().any(|m| snowflake(m.get("id")).as_deref() == Some(user_id)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::GatewayStore;
    use crossbeam_channel::{unbounded, Receiver};
    use serde_json::json;

    fn echo(_ctx: &mut HandlerContext<'_>, data: &Value) -> Result<Handled, Rejection> {
        Ok(Handled::new(data.clone()))
    }

    fn dispatch(dispatcher: &mut Dispatcher, store: &mut GatewayStore, event: &str, data: Value) -> DispatchOutcome {
        let mut large = Vec::new();
        let mut ctx = HandlerContext::new(store, &mut large);
        dispatcher.dispatch(event, data, &mut ctx)
    }

    fn flush(dispatcher: &mut Dispatcher, store: &mut GatewayStore) -> usize {
        let mut large = Vec::new();
        let mut ctx = HandlerContext::new(store, &mut large);
        dispatcher.flush(&mut ctx)
    }

    fn published(rx: &Receiver<GatewayEvent>) -> Vec<(String, Value)> {
        rx.try_iter()
            .filter_map(|e| match e {
                GatewayEvent::Dispatch { event, new, .. } => Some((event, new)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_buffers_until_ready_and_replays_in_order() {
        let (tx, rx) = unbounded();
        let mut dispatcher = Dispatcher::new(tx);
        let mut store = GatewayStore::new();
        dispatcher.register("TYPING_START", Arc::new(echo), Vec::new());
        dispatcher.register("MESSAGE_UPDATE", Arc::new(echo), Vec::new());

        for (i, name) in ["TYPING_START", "MESSAGE_UPDATE", "TYPING_START"].iter().enumerate() {
            let outcome = dispatch(&mut dispatcher, &mut store, name, json!({ "n": i }));
            assert_eq!(outcome, DispatchOutcome::Buffered);
        }
        assert!(published(&rx).is_empty());
        assert_eq!(dispatcher.pending_len(), 3);

        assert_eq!(flush(&mut dispatcher, &mut store), 3);
        assert_eq!(
            published(&rx),
            vec![
                ("TYPING_START".to_string(), json!({"n": 0})),
                ("MESSAGE_UPDATE".to_string(), json!({"n": 1})),
                ("TYPING_START".to_string(), json!({"n": 2})),
            ]
        );

        // Replayed once only; later dispatches go straight through
        assert_eq!(flush(&mut dispatcher, &mut store), 0);
        let outcome = dispatch(&mut dispatcher, &mut store, "TYPING_START", json!({"n": 3}));
        assert!(matches!(outcome, DispatchOutcome::Delivered(_)));
        assert_eq!(published(&rx).len(), 1);
    }

    #[test]
    fn test_guild_create_passes_through_before_ready() {
        let (tx, rx) = unbounded();
        let mut dispatcher = Dispatcher::with_default_handlers(tx);
        let mut store = GatewayStore::new();

        let outcome = dispatch(&mut dispatcher, &mut store, "GUILD_CREATE", json!({"id": "1", "name": "G"}));
        assert!(matches!(outcome, DispatchOutcome::Delivered(_)));
        assert!(store.guild("1").is_some());
        assert_eq!(published(&rx)[0].0, "GUILD_CREATE");
    }

    #[test]
    fn test_unhandled_events_are_dropped() {
        let (tx, rx) = unbounded();
        let mut dispatcher = Dispatcher::new(tx);
        let mut store = GatewayStore::new();

        assert_eq!(
            dispatch(&mut dispatcher, &mut store, "PRESENCE_UPDATE", json!({})),
            DispatchOutcome::Unhandled
        );
        assert_eq!(dispatcher.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_aliases_and_mentions() {
        let (tx, rx) = unbounded();
        let mut dispatcher = Dispatcher::with_default_handlers(tx);
        let mut store = GatewayStore::new();
        store.current_user = Some(json!({"id": "me"}));
        flush(&mut dispatcher, &mut store);

        let message = json!({"id": "m", "channel_id": "c", "mentions": [{"id": "me"}]});
        dispatch(&mut dispatcher, &mut store, "MESSAGE_CREATE", message);

        let names: Vec<String> = published(&rx).into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["MESSAGE_CREATE", "message", "mention"]);
    }

    #[test]
    fn test_rejection_publishes_nothing() {
        let (tx, rx) = unbounded();
        let mut dispatcher = Dispatcher::with_default_handlers(tx);
        let mut store = GatewayStore::new();

        let outcome = dispatch(&mut dispatcher, &mut store, "GUILD_CREATE", json!({"id": "1", "unavailable": true}));
        assert_eq!(outcome, DispatchOutcome::Rejected(Rejection::Unavailable("1".into())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_register_and_unregister() {
        let (tx, _rx) = unbounded();
        let mut dispatcher = Dispatcher::new(tx);
        dispatcher.register("X", Arc::new(echo), vec!["x".into()]);
        assert_eq!(dispatcher.handler_for("X").unwrap().aliases, vec!["x".to_string()]);
        assert!(dispatcher.unregister("X"));
        assert!(!dispatcher.unregister("X"));
        assert!(dispatcher.handler_for("X").is_none());
    }
}
