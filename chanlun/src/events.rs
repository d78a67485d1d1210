//! 结构变化通知：每次更新后按阶段广播最早变化的时间点。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::constant::{EventType, Timeframe};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPayload {
    pub symbol: String,
    /// Earliest timestamp whose derived rows changed.
    pub backtrack_dt: Option<DateTime<Utc>>,
    /// Rows held by the stage after the change.
    pub rows: usize,
}

pub type Subscriber = Arc<dyn Fn(Timeframe, EventType, &EventPayload) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventType>,
    callback: Subscriber,
}

/// Subscribers are called in registration order. A `None` filter receives
/// every event.
#[derive(Default)]
pub struct Observable {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl Observable {
    pub fn subscribe(&mut self, filter: Option<EventType>, callback: Subscriber) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription { id, filter, callback });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn notify(&self, timeframe: Timeframe, event_type: EventType, payload: &EventPayload) {
        self.subscriptions
            .iter()
            .filter(|s| s.filter.is_none_or(|wanted| wanted == event_type))
            .for_each(|s| (s.callback)(timeframe, event_type, payload));
    }
}
