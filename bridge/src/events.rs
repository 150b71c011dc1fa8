//! Explicit event registry connecting the core to presentation collaborators.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::debug;
use moments::MomentCluster;
use tokio::sync::RwLock;

/// Everything the core announces to presentation collaborators.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// RCON session established.
    Connected,
    /// RCON session lost. Emitted at most once per disconnected period.
    Disconnected,
    /// Game chat line already formatted for the chat front end.
    ChatToDiscord { text: String },
    /// Rendered live status panel.
    StatusPanel { text: String },
    ClusterCreated {
        cluster: MomentCluster,
        summary: String,
    },
    ClusterUpdated {
        cluster: MomentCluster,
        summary: String,
    },
    SessionReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    ChatToDiscord,
    StatusPanel,
    ClusterCreated,
    ClusterUpdated,
    SessionReset,
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::Connected => EventKind::Connected,
            BridgeEvent::Disconnected => EventKind::Disconnected,
            BridgeEvent::ChatToDiscord { .. } => EventKind::ChatToDiscord,
            BridgeEvent::StatusPanel { .. } => EventKind::StatusPanel,
            BridgeEvent::ClusterCreated { .. } => EventKind::ClusterCreated,
            BridgeEvent::ClusterUpdated { .. } => EventKind::ClusterUpdated,
            BridgeEvent::SessionReset => EventKind::SessionReset,
        }
    }
}

type HandlerFn =
    dyn Fn(Arc<BridgeEvent>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// Ordered handler lists per event kind, populated at startup. `notify`
/// invokes the handlers for an event's kind in registration order.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<HandlerFn>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Arc<BridgeEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Arc<HandlerFn> = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(handler);
    }

    pub async fn notify(&self, event: BridgeEvent) {
        let kind = event.kind();
        let event = Arc::new(event);
        // handlers run outside the registry lock so they may notify in turn
        let handlers: Vec<Arc<HandlerFn>> = {
            let registry = self.handlers.read().await;
            match registry.get(&kind) {
                Some(list) => list.clone(),
                None => Vec::new(),
            }
        };
        if handlers.is_empty() {
            debug!("no handlers registered for {:?} event", kind);
            return;
        }
        for handler in &handlers {
            handler(Arc::clone(&event)).await;
        }
    }
}
