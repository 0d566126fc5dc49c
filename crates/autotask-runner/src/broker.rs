/*
[INPUT]:  (topic, observer) subscriptions and (topic, event) publications
[OUTPUT]: Fire-and-forget fan-out through one delivery thread per subscription
[POS]:    Observer layer - decouples progress producers from front-ends
[UPDATE]: When changing delivery guarantees or subscription semantics
*/

use crate::event::{Event, EventHandler};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use tracing::{debug, warn};

struct Subscription {
    observer: Arc<dyn EventHandler>,
    queue: Sender<Arc<Event>>,
}

/// Topic-keyed observer registry.
///
/// Built once at the composition root and shared as `Arc<EventBroker>`. Every subscription
/// owns a delivery thread, so observers run concurrently with each other and with the
/// publisher while each one still sees events in publication order. Delivery is best-effort
/// and at-most-once: no retry, no backpressure, and a failing observer never affects the
/// publisher or the other observers.
#[derive(Default)]
pub struct EventBroker {
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = topics
            .iter()
            .map(|(topic, subscriptions)| (topic.as_str(), subscriptions.len()))
            .collect();
        f.debug_struct("EventBroker").field("topics", &counts).finish()
    }
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `observer` to `topic`. Subscribing the same `Arc` twice has no effect.
    pub fn subscribe(&self, topic: &str, observer: Arc<dyn EventHandler>) {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let subscriptions = topics.entry(topic.to_string()).or_default();
        if subscriptions
            .iter()
            .any(|existing| same_observer(&existing.observer, &observer))
        {
            return;
        }

        let (queue, events) = mpsc::channel::<Arc<Event>>();
        let delivery_observer = observer.clone();
        let delivery_topic = topic.to_string();
        let spawned = thread::Builder::new()
            .name(format!("event-{topic}"))
            .spawn(move || {
                // Ends once the subscription (and with it the sender) is dropped.
                for event in events {
                    deliver(&delivery_topic, delivery_observer.as_ref(), &event);
                }
            });
        if let Err(err) = spawned {
            warn!(topic, error = %err, "failed to spawn event delivery thread");
            return;
        }

        subscriptions.push(Subscription { observer, queue });
    }

    /// Remove `observer` from `topic`; returns whether it was subscribed.
    pub fn unsubscribe(&self, topic: &str, observer: &Arc<dyn EventHandler>) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscriptions) = topics.get_mut(topic) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|existing| !same_observer(&existing.observer, observer));
        before != subscriptions.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Queue `event` for every observer of `topic`. Returns immediately.
    pub fn publish(&self, topic: &str, event: Event) {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let Some(subscriptions) = topics.get(topic) else {
            return;
        };

        let event = Arc::new(event);
        for subscription in subscriptions {
            if subscription.queue.send(event.clone()).is_err() {
                warn!(topic, "event delivery thread is gone; event dropped");
            }
        }
    }
}

fn deliver(topic: &str, observer: &dyn EventHandler, event: &Event) {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.handle_incoming_event(event))) {
        Ok(Ok(())) => debug!(topic, "event delivered"),
        Ok(Err(err)) => warn!(topic, error = %format!("{err:#}"), "observer failed to handle event"),
        Err(_) => warn!(topic, "observer panicked while handling event"),
    }
}

fn same_observer(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PercentChangedEvent;
    use std::sync::mpsc;
    use std::time::Duration;

    fn percent(value: f64) -> Event {
        PercentChangedEvent {
            task_name: "ExampleTask".to_string(),
            current_percent: value,
        }
        .into()
    }

    fn channel_observer() -> (Arc<dyn EventHandler>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let observer: Arc<dyn EventHandler> = Arc::new(move |event: &Event| -> anyhow::Result<()> {
            tx.lock().unwrap().send(event.clone())?;
            Ok(())
        });
        (observer, rx)
    }

    #[test]
    fn broker_subscribe_is_idempotent_by_identity() {
        let broker = EventBroker::new();
        let (observer, rx) = channel_observer();

        broker.subscribe(PercentChangedEvent::TOPIC, observer.clone());
        broker.subscribe(PercentChangedEvent::TOPIC, observer.clone());
        assert_eq!(broker.subscriber_count(PercentChangedEvent::TOPIC), 1);

        broker.publish(PercentChangedEvent::TOPIC, percent(10.0));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            percent(10.0)
        );
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn broker_publish_only_reaches_topic_subscribers() {
        let broker = EventBroker::new();
        let (observer, rx) = channel_observer();
        broker.subscribe("other", observer);

        broker.publish(PercentChangedEvent::TOPIC, percent(10.0));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn broker_failing_observer_does_not_block_others() {
        let broker = EventBroker::new();
        let failing: Arc<dyn EventHandler> =
            Arc::new(|_: &Event| -> anyhow::Result<()> { anyhow::bail!("observer exploded") });
        let panicking: Arc<dyn EventHandler> =
            Arc::new(|_: &Event| -> anyhow::Result<()> { panic!("observer panicked") });
        let (healthy, rx) = channel_observer();

        broker.subscribe(PercentChangedEvent::TOPIC, failing);
        broker.subscribe(PercentChangedEvent::TOPIC, panicking);
        broker.subscribe(PercentChangedEvent::TOPIC, healthy);

        broker.publish(PercentChangedEvent::TOPIC, percent(75.0));

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            percent(75.0)
        );
    }

    #[test]
    fn broker_publish_does_not_wait_for_slow_observers() {
        let broker = EventBroker::new();
        let slow: Arc<dyn EventHandler> = Arc::new(|_: &Event| -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        });
        broker.subscribe(PercentChangedEvent::TOPIC, slow);

        let started = std::time::Instant::now();
        broker.publish(PercentChangedEvent::TOPIC, percent(1.0));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn broker_preserves_publication_order_per_observer() {
        let broker = EventBroker::new();
        let (observer, rx) = channel_observer();
        broker.subscribe(PercentChangedEvent::TOPIC, observer);

        for value in [10.0, 20.0, 30.0, 40.0] {
            broker.publish(PercentChangedEvent::TOPIC, percent(value));
        }

        let received: Vec<Event> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(
            received,
            vec![percent(10.0), percent(20.0), percent(30.0), percent(40.0)]
        );
    }

    #[test]
    fn broker_unsubscribe_removes_observer() {
        let broker = EventBroker::new();
        let (observer, _rx) = channel_observer();
        broker.subscribe(PercentChangedEvent::TOPIC, observer.clone());

        assert!(broker.unsubscribe(PercentChangedEvent::TOPIC, &observer));
        assert!(!broker.unsubscribe(PercentChangedEvent::TOPIC, &observer));
        assert_eq!(broker.subscriber_count(PercentChangedEvent::TOPIC), 0);
    }
}
