use crate::{
    adapter::TxRef,
    bet_key::{
        BetKey,
        PartyId,
        encode,
    },
    lock,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

/// The wager parameters an indexer recorded for a spin transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub tx_ref: TxRef,
    pub amount: u64,
    pub max_payline_index: u64,
    pub index_value: u64,
}

impl BetRecord {
    /// Rebuilds the bet key the wager was submitted with.
    pub fn bet_key(&self, sender: &PartyId) -> BetKey {
        encode(sender, self.amount, self.max_payline_index, self.index_value)
    }
}

pub trait BetEventStore {
    fn bet_record(&self, tx_ref: &TxRef) -> anyhow::Result<Option<BetRecord>>;

    /// write or overwrite the record for its transaction
    fn record_bet(&mut self, record: &BetRecord) -> anyhow::Result<()>;

    fn all_bet_records(&self) -> anyhow::Result<Vec<BetRecord>>;
}

#[derive(Clone, Default)]
pub struct InMemoryBetEventStore {
    records: Arc<Mutex<HashMap<TxRef, BetRecord>>>,
}

impl InMemoryBetEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BetEventStore for InMemoryBetEventStore {
    fn bet_record(&self, tx_ref: &TxRef) -> anyhow::Result<Option<BetRecord>> {
        Ok(lock(&self.records).get(tx_ref).cloned())
    }

    fn record_bet(&mut self, record: &BetRecord) -> anyhow::Result<()> {
        lock(&self.records).insert(record.tx_ref.clone(), record.clone());
        Ok(())
    }

    fn all_bet_records(&self) -> anyhow::Result<Vec<BetRecord>> {
        let mut records: Vec<BetRecord> = lock(&self.records).values().cloned().collect();
        records.sort_by(|a, b| a.tx_ref.cmp(&b.tx_ref));
        Ok(records)
    }
}
