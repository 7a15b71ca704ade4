//! JSON ledger snapshots for offline replay.
use anyhow::Context;
use fairspin::{
    Seed,
    SeedSource,
    TransactionLookup,
    TxRef,
    adapter::TransactionRecord,
    replay::{
        BetEventStore,
        BetRecord,
        InMemoryBetEventStore,
    },
    test_helpers::SimulatedChain,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixtureLedger {
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    #[serde(default)]
    pub seeds: BTreeMap<u64, Seed>,
    /// Indexed wager parameters, used when a transaction's logs are gone.
    #[serde(default)]
    pub bet_records: Vec<BetRecord>,
}

impl FixtureLedger {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read ledger fixture {}", path.display()))?;
        serde_json::from_str(&raw).context("parse ledger fixture")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize ledger fixture")?;
        fs::write(path.as_ref(), json).context("write ledger fixture")
    }

    /// Snapshot of everything the simulated ledger has produced so far.
    pub fn capture(chain: &SimulatedChain) -> anyhow::Result<Self> {
        let seeds = (0..=chain.height())
            .filter_map(|block| chain.seed_for(block).map(|seed| (block, seed)))
            .collect();
        Ok(Self {
            transactions: chain.transactions(),
            seeds,
            bet_records: chain.event_store().all_bet_records()?,
        })
    }

    pub fn event_store(&self) -> anyhow::Result<InMemoryBetEventStore> {
        let mut store = InMemoryBetEventStore::new();
        for record in &self.bet_records {
            store.record_bet(record)?;
        }
        Ok(store)
    }
}

impl SeedSource for FixtureLedger {
    async fn block_seed(&self, block: u64) -> anyhow::Result<Option<Seed>> {
        Ok(self.seeds.get(&block).copied())
    }
}

impl TransactionLookup for FixtureLedger {
    async fn transaction(&self, tx_ref: &TxRef) -> anyhow::Result<Option<TransactionRecord>> {
        Ok(self
            .transactions
            .iter()
            .find(|tx| &tx.tx_ref == tx_ref)
            .cloned())
    }
}
