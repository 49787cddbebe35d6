//! Real-time Fan-out (spec §4.7, component C7). A single-writer,
//! many-subscriber push channel: every connected UI subscriber gets a unique
//! handle and a `tokio::sync::broadcast::Receiver`. Delivery is best-effort
//! and at-most-once — a slow subscriber that falls behind the channel's
//! capacity loses the oldest events rather than blocking the writer or
//! buffering indefinitely (spec: "no server-side buffering beyond the
//! current event").

use crate::models::{Bill, CalendarEvent, Message, MessageReaction, Note, Task};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// One of the four event kinds named in spec §4.7, tagged for `Event::json`
/// serialization on the SSE route.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FanoutEvent {
    NewMessage(Message),
    NewReaction(MessageReaction),
    EntityCreated(EntityCreatedPayload),
    RuleExecuted(RuleExecutedPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityCreatedPayload {
    pub entity_type: String,
    pub entity: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleExecutedPayload {
    pub rule_id: String,
    pub result: serde_json::Value,
}

impl FanoutEvent {
    pub fn entity_created(entity_type: &str, entity: &impl Serialize) -> Self {
        FanoutEvent::EntityCreated(EntityCreatedPayload {
            entity_type: entity_type.to_string(),
            entity: serde_json::to_value(entity).unwrap_or(serde_json::Value::Null),
        })
    }

    pub fn task_created(task: &Task) -> Self {
        Self::entity_created("task", task)
    }

    pub fn calendar_event_created(event: &CalendarEvent) -> Self {
        Self::entity_created("calendar_event", event)
    }

    pub fn bill_created(bill: &Bill) -> Self {
        Self::entity_created("bill", bill)
    }

    pub fn note_created(note: &Note) -> Self {
        Self::entity_created("note", note)
    }

    pub fn rule_executed(rule_id: &str, result: serde_json::Value) -> Self {
        FanoutEvent::RuleExecuted(RuleExecutedPayload { rule_id: rule_id.to_string(), result })
    }
}

/// Distinguishes subscribers in logs; there is no registry to look a handle
/// up in (spec §9 "Global singletons avoided") — just a counter for
/// readable connect/disconnect log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(pub u64);

pub struct EventBus {
    sender: broadcast::Sender<FanoutEvent>,
    next_subscriber: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender, next_subscriber: AtomicU64::new(1) }
    }

    /// Best-effort push. Ignores the "no subscribers" error — the fan-out
    /// has nothing to deliver to and that is not a failure.
    pub fn publish(&self, event: FanoutEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> (SubscriberId, broadcast::Receiver<FanoutEvent>) {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        (id, self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_event_reaches_subscriber() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.subscribe();
        bus.publish(FanoutEvent::rule_executed("r1", serde_json::json!({"ok": true})));
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, FanoutEvent::RuleExecuted(_)));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(FanoutEvent::rule_executed("r1", serde_json::json!({})));
    }
}
