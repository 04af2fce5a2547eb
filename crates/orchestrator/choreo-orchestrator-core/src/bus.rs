//! Named-channel event bus.
//!
//! Publish fans out synchronously to every subscriber of the channel, in
//! subscription order. Handlers may subscribe or unsubscribe (including
//! themselves) mid-publish: slots are checked out for the duration of a call,
//! so the bus never holds its borrow across handler code.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

type Handler = Box<dyn FnMut(&JsonValue)>;

#[derive(Default)]
struct BusInner {
    channels: HashMap<String, IndexMap<u64, Option<Handler>>>,
    next_id: u64,
}

/// Cheap-clone handle to one bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

/// Subscription receipt. Calling [`BusSubscription::unsubscribe`] removes the
/// handler; an empty channel is deleted outright.
pub struct BusSubscription {
    bus: EventBus,
    channel: String,
    id: u64,
}

impl BusSubscription {
    pub fn unsubscribe(self) {
        let mut inner = self.bus.inner.borrow_mut();
        if let Some(subs) = inner.channels.get_mut(&self.channel) {
            subs.shift_remove(&self.id);
            if subs.is_empty() {
                inner.channels.remove(&self.channel);
            }
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        channel: impl Into<String>,
        handler: impl FnMut(&JsonValue) + 'static,
    ) -> BusSubscription {
        let channel = channel.into();
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .channels
            .entry(channel.clone())
            .or_default()
            .insert(id, Some(Box::new(handler)));
        BusSubscription {
            bus: self.clone(),
            channel,
            id,
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .borrow()
            .channels
            .get(channel)
            .map_or(0, IndexMap::len)
    }

    /// Publish to every current subscriber of `channel`. Subscribers added by
    /// a handler during this publish do not receive this event.
    pub fn publish(&self, channel: &str, payload: &JsonValue) {
        let ids: Vec<u64> = match self.inner.borrow().channels.get(channel) {
            Some(subs) => subs.keys().copied().collect(),
            None => return,
        };
        for id in ids {
            let handler = {
                let mut inner = self.inner.borrow_mut();
                match inner.channels.get_mut(channel).and_then(|s| s.get_mut(&id)) {
                    Some(slot) => slot.take(),
                    // Removed by an earlier handler in this publish.
                    None => continue,
                }
            };
            let Some(mut handler) = handler else { continue };
            handler(payload);
            let mut inner = self.inner.borrow_mut();
            if let Some(slot) = inner.channels.get_mut(channel).and_then(|s| s.get_mut(&id)) {
                if slot.is_none() {
                    *slot = Some(handler);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn publish_reaches_subscribers_in_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());
        let _s1 = bus.subscribe("phase", move |v| a.borrow_mut().push(format!("a:{v}")));
        let _s2 = bus.subscribe("phase", move |v| b.borrow_mut().push(format!("b:{v}")));
        bus.publish("phase", &json!("intro"));
        bus.publish("other", &json!(0));
        assert_eq!(*log.borrow(), vec!["a:\"intro\"", "b:\"intro\""]);
    }

    #[test]
    fn unsubscribe_deletes_empty_channel() {
        let bus = EventBus::new();
        let sub = bus.subscribe("phase", |_| {});
        assert_eq!(bus.subscriber_count("phase"), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("phase"), 0);
    }

    #[test]
    fn handler_may_subscribe_during_publish_without_receiving_it() {
        let bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        let inner_hits = hits.clone();
        let bus2 = bus.clone();
        let _outer = bus.subscribe("phase", move |_| {
            let h = inner_hits.clone();
            // Receipt intentionally dropped; the handler stays registered.
            let _ = Box::leak(Box::new(bus2.subscribe("phase", move |_| {
                *h.borrow_mut() += 1;
            })));
        });
        bus.publish("phase", &json!(1));
        assert_eq!(*hits.borrow(), 0);
        bus.publish("phase", &json!(2));
        assert_eq!(*hits.borrow(), 1);
    }
}
