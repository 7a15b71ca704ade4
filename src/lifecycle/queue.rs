//! Arena of wager records addressed by id.
//!
//! Every non-terminal wager is kept. Of the terminal ones only the most recent
//! `retained_terminal` (by id) survive; older ones are evicted on insert and on update.
use crate::{
    bet_key::PartyId,
    lifecycle::{
        QueuedSpin,
        SpinId,
    },
};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct SpinQueue {
    spins: BTreeMap<SpinId, QueuedSpin>,
    next_id: u64,
    retained_terminal: usize,
}

impl SpinQueue {
    pub fn new(retained_terminal: usize) -> Self {
        Self {
            spins: BTreeMap::new(),
            next_id: 1,
            retained_terminal,
        }
    }

    pub fn next_id(&mut self) -> SpinId {
        let id = SpinId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, spin: QueuedSpin) {
        self.spins.insert(spin.id, spin);
        self.evict();
    }

    pub fn get(&self, id: SpinId) -> Option<&QueuedSpin> {
        self.spins.get(&id)
    }

    /// Applies `f` to a non-terminal record. Terminal and missing records are left untouched,
    /// so a late writer can never resurrect an aborted wager.
    pub fn update<F>(&mut self, id: SpinId, f: F) -> Option<QueuedSpin>
    where
        F: FnOnce(&mut QueuedSpin),
    {
        let spin = self.spins.get_mut(&id)?;
        if spin.status.is_terminal() {
            return None;
        }
        f(spin);
        let updated = spin.clone();
        if updated.status.is_terminal() {
            self.evict();
        }
        Some(updated)
    }

    /// Applies `f` to any retained record, terminal or not.
    pub fn annotate<F>(&mut self, id: SpinId, f: F) -> bool
    where
        F: FnOnce(&mut QueuedSpin),
    {
        match self.spins.get_mut(&id) {
            Some(spin) => {
                f(spin);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &QueuedSpin> {
        self.spins.values().filter(|spin| !spin.status.is_terminal())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedSpin> {
        self.spins.values()
    }

    /// Total bet held by `party`'s in-flight wagers.
    pub fn reserved_for(&self, party: &PartyId) -> u64 {
        self.pending()
            .filter(|spin| spin.party == *party)
            .fold(0u64, |total, spin| total.saturating_add(spin.total_bet))
    }

    /// Drops every terminal record, returning how many were removed.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.spins.len();
        self.spins.retain(|_, spin| !spin.status.is_terminal());
        before - self.spins.len()
    }

    pub fn len(&self) -> usize {
        self.spins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spins.is_empty()
    }

    fn evict(&mut self) {
        let terminal: Vec<SpinId> = self
            .spins
            .values()
            .filter(|spin| spin.status.is_terminal())
            .map(|spin| spin.id)
            .collect();
        let excess = terminal.len().saturating_sub(self.retained_terminal);
        for id in &terminal[..excess] {
            self.spins.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        config::MatchMode,
        lifecycle::SpinStatus,
    };

    fn spin(queue: &mut SpinQueue, status: SpinStatus, total_bet: u64) -> SpinId {
        let id = queue.next_id();
        let mut record =
            QueuedSpin::new(id, PartyId::default(), total_bet, 1, MatchMode::Paylines);
        record.status = status;
        queue.insert(record);
        id
    }

    #[test]
    fn insert__beyond_retention__evicts_oldest_terminal_only() {
        // given
        let mut queue = SpinQueue::new(2);
        let in_flight = spin(&mut queue, SpinStatus::Waiting, 10);
        let oldest = spin(&mut queue, SpinStatus::Completed, 1);
        let middle = spin(&mut queue, SpinStatus::Failed, 1);

        // when
        let newest = spin(&mut queue, SpinStatus::Completed, 1);

        // then
        assert!(queue.get(in_flight).is_some());
        assert!(queue.get(oldest).is_none());
        assert!(queue.get(middle).is_some());
        assert!(queue.get(newest).is_some());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn update__terminal_record__is_ignored() {
        let mut queue = SpinQueue::new(4);
        let id = spin(&mut queue, SpinStatus::Failed, 1);

        let updated = queue.update(id, |s| s.status = SpinStatus::Completed);

        assert!(updated.is_none());
        assert_eq!(queue.get(id).unwrap().status, SpinStatus::Failed);
    }

    #[test]
    fn update__to_terminal__triggers_eviction() {
        let mut queue = SpinQueue::new(0);
        let id = spin(&mut queue, SpinStatus::Claiming, 1);

        let updated = queue.update(id, |s| s.status = SpinStatus::Completed).unwrap();

        assert_eq!(updated.status, SpinStatus::Completed);
        assert!(queue.is_empty());
    }

    #[test]
    fn reserved_for__sums_non_terminal_bets_of_party() {
        let mut queue = SpinQueue::new(4);
        spin(&mut queue, SpinStatus::Pending, 20);
        spin(&mut queue, SpinStatus::Waiting, 30);
        spin(&mut queue, SpinStatus::Completed, 1_000);
        let other = queue.next_id();
        queue.insert(QueuedSpin::new(other, PartyId([9; 32]), 500, 1, MatchMode::Paylines));

        assert_eq!(queue.reserved_for(&PartyId::default()), 50);
    }

    #[test]
    fn clear_finished__keeps_in_flight_records() {
        let mut queue = SpinQueue::new(8);
        let live = spin(&mut queue, SpinStatus::Submitting, 1);
        spin(&mut queue, SpinStatus::Completed, 1);
        spin(&mut queue, SpinStatus::Failed, 1);

        assert_eq!(queue.clear_finished(), 2);
        assert_eq!(queue.pending().map(|s| s.id).collect::<Vec<_>>(), vec![live]);
    }
}
