//! Push notifications from a controller to its subscribers.
//!
//! Each controller owns one emitter; there is no process-wide bus.
use crate::{
    bet_key::PartyId,
    evaluate::SpinOutcome,
    lifecycle::{
        SpinId,
        SpinStatus,
    },
    lock,
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::mpsc::{
    self,
    UnboundedReceiver,
    UnboundedSender,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpinEvent {
    StatusChanged {
        spin_id: SpinId,
        status: SpinStatus,
    },
    OutcomeCompleted {
        spin_id: SpinId,
        outcome: SpinOutcome,
    },
    BalanceChanged {
        party: PartyId,
        balance: u64,
    },
    /// `spin_id` is `None` when the wager was rejected before a record was created.
    Error {
        spin_id: Option<SpinId>,
        message: String,
        recoverable: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: BTreeMap<SubscriptionId, UnboundedSender<SpinEvent>>,
}

#[derive(Clone, Default)]
pub struct EventEmitter {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (SubscriptionId, UnboundedReceiver<SpinEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = lock(&self.subscribers);
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.senders.insert(id, tx);
        (id, rx)
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subscribers).senders.remove(&id).is_some()
    }

    /// Delivers to every live subscriber; subscribers whose receiver was dropped are removed.
    pub fn emit(&self, event: SpinEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers
            .senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).senders.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn balance(value: u64) -> SpinEvent {
        SpinEvent::BalanceChanged {
            party: PartyId::default(),
            balance: value,
        }
    }

    #[test]
    fn emit__every_subscriber__receives_the_event() {
        // given
        let emitter = EventEmitter::new();
        let (_, mut first) = emitter.subscribe();
        let (_, mut second) = emitter.subscribe();

        // when
        emitter.emit(balance(5));

        // then
        assert_eq!(first.try_recv().unwrap(), balance(5));
        assert_eq!(second.try_recv().unwrap(), balance(5));
    }

    #[test]
    fn unsubscribe__stops_delivery() {
        let emitter = EventEmitter::new();
        let (id, mut rx) = emitter.subscribe();

        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        emitter.emit(balance(1));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit__dropped_receiver__is_pruned() {
        let emitter = EventEmitter::new();
        let (_, rx) = emitter.subscribe();
        drop(rx);

        emitter.emit(balance(1));

        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn emitters__are_isolated_from_each_other() {
        let a = EventEmitter::new();
        let b = EventEmitter::new();
        let (_, mut rx_a) = a.subscribe();
        let (_, mut rx_b) = b.subscribe();

        a.emit(balance(7));

        assert_eq!(rx_a.try_recv().unwrap(), balance(7));
        assert!(rx_b.try_recv().is_err());
    }
}
