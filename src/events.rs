use crate::error::EventBusError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Lifecycle signals of a siren session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SirenEvent {
    /// A session has been requested and is starting up
    Opening,
    /// The session is active (alerts running)
    Open,
    /// The camera/torch confirmed it is live
    CameraReady,
    /// The session was torn down
    Closed,
}

impl SirenEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SirenEvent::Opening => "opening",
            SirenEvent::Open => "open",
            SirenEvent::CameraReady => "camera-ready",
            SirenEvent::Closed => "closed",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SirenEvent::Opening => "Siren opening".to_string(),
            SirenEvent::Open => "Siren open".to_string(),
            SirenEvent::CameraReady => "Camera ready".to_string(),
            SirenEvent::Closed => "Siren closed".to_string(),
        }
    }
}

type Listener = Arc<dyn Fn(SirenEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Synchronous publish/subscribe bus scoped to one screen.
///
/// Listeners run on the publishing thread in subscription order. Every event
/// is also forwarded to a broadcast channel for async consumers.
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    sender: broadcast::Sender<SirenEvent>,
}

impl EventBus {
    /// Create a new event bus; `capacity` bounds the async broadcast side
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            sender,
        }
    }

    /// Register a listener. It stays registered until the returned
    /// subscription is dropped or unsubscribed.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(SirenEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        debug!("Listener {} subscribed ({} total)", id, registry.listeners.len());

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every current listener, returning how many ran
    pub fn publish(&self, event: SirenEvent) -> usize {
        match event {
            SirenEvent::Opening | SirenEvent::Open | SirenEvent::Closed => {
                info!("{}", event.description());
            }
            SirenEvent::CameraReady => {
                debug!("{}", event.description());
            }
        }

        // Snapshot so listeners can (un)subscribe without deadlocking
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            listener(event);
        }

        if self.sender.send(event).is_err() {
            debug!("No async receivers for {}", event.event_type());
        }
        debug!(
            "Delivered {} to {} listeners",
            event.event_type(),
            listeners.len()
        );

        listeners.len()
    }

    /// Create an async receiver that only yields events passing `filter`
    pub fn receiver(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Get the number of registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sender: self.sender.clone(),
        }
    }
}

/// Handle for a registered listener; unsubscribes on drop
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock();
            registry.listeners.retain(|(id, _)| *id != self.id);
            debug!("Listener {} unsubscribed", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&SirenEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SirenEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Async event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SirenEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<SirenEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SirenEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!("Receiver '{}' received {}", self.name, event.event_type());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                    return Err(EventBusError::Lagged { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SirenEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                    return Err(EventBusError::Lagged { skipped });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn recorder(bus: &EventBus) -> (Arc<Mutex<Vec<SirenEvent>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = bus.subscribe(move |event| sink.lock().push(event));
        (seen, subscription)
    }

    #[test]
    fn test_publish_reaches_all_listeners() {
        let bus = EventBus::new(8);
        let (first, _a) = recorder(&bus);
        let (second, _b) = recorder(&bus);

        assert_eq!(bus.publish(SirenEvent::Opening), 2);
        assert_eq!(bus.publish(SirenEvent::Open), 2);

        assert_eq!(*first.lock(), vec![SirenEvent::Opening, SirenEvent::Open]);
        assert_eq!(*second.lock(), vec![SirenEvent::Opening, SirenEvent::Open]);
    }

    #[test]
    fn test_delivery_follows_subscription_order() {
        let bus = EventBus::new(8);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let _first = bus.subscribe(move |_| o1.lock().push(1));
        let o2 = Arc::clone(&order);
        let _second = bus.subscribe(move |_| o2.lock().push(2));

        bus.publish(SirenEvent::Closed);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new(8);
        let (seen, subscription) = recorder(&bus);
        assert_eq!(bus.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(SirenEvent::Open), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let bus = EventBus::new(8);
        let (seen, subscription) = recorder(&bus);
        bus.publish(SirenEvent::Opening);
        subscription.unsubscribe();
        bus.publish(SirenEvent::Closed);
        assert_eq!(*seen.lock(), vec![SirenEvent::Opening]);
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new(8);
        let (_seen, subscription) = recorder(&bus);
        drop(bus);
        drop(subscription);
    }

    #[test]
    fn test_listener_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new(8));
        let (seen, _recorder) = recorder(&bus);

        let inner = Arc::clone(&bus);
        let _chain = bus.subscribe(move |event| {
            if event == SirenEvent::Open {
                inner.publish(SirenEvent::CameraReady);
            }
        });

        bus.publish(SirenEvent::Open);
        assert_eq!(*seen.lock(), vec![SirenEvent::Open, SirenEvent::CameraReady]);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new(8);
        let mut receiver = bus.receiver(EventFilter::EventTypes(vec!["closed"]), "test");

        bus.publish(SirenEvent::Opening);
        bus.publish(SirenEvent::Closed);

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, SirenEvent::Closed);
        assert_eq!(receiver.try_recv().unwrap(), None);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SirenEvent::CameraReady.event_type(), "camera-ready");
        assert_eq!(
            serde_json::to_string(&SirenEvent::CameraReady).unwrap(),
            "\"camera-ready\""
        );
        assert!(EventFilter::Custom(|e| *e == SirenEvent::Open).matches(&SirenEvent::Open));
    }
}
