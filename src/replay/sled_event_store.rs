// Sled-backed bet event store.
use crate::{
    adapter::TxRef,
    replay::event_store::{
        BetEventStore,
        BetRecord,
    },
};
use anyhow::Context;
use serde::de::DeserializeOwned;
use sled::{
    Config,
    Db,
    Tree,
};
use std::path::Path;

const BET_EVENTS_TREE: &str = "bet_events";

#[derive(Clone)]
pub struct SledBetEventStore {
    tree: Tree,
}

impl SledBetEventStore {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        let tree = db
            .open_tree(BET_EVENTS_TREE)
            .context("open bet_events tree")?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = Config::default()
            .path(path)
            .open()
            .context("open sled database")?;
        Self::new(&db)
    }
}

impl BetEventStore for SledBetEventStore {
    fn bet_record(&self, tx_ref: &TxRef) -> anyhow::Result<Option<BetRecord>> {
        let value = match self
            .tree
            .get(tx_ref.as_str().as_bytes())
            .context("read bet record")?
        {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(Some(deserialize(value.as_ref())?))
    }

    fn record_bet(&mut self, record: &BetRecord) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(record).context("serialize bet record")?;
        self.tree
            .insert(record.tx_ref.as_str().as_bytes(), bytes)
            .context("persist bet record")?;
        self.tree.flush().context("flush bet records")?;
        Ok(())
    }

    fn all_bet_records(&self) -> anyhow::Result<Vec<BetRecord>> {
        let mut records = Vec::new();
        for entry in self.tree.iter() {
            let (_, value) = entry.context("iterate bet records")?;
            records.push(deserialize(value.as_ref())?);
        }
        Ok(records)
    }
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(bytes).context("deserialize sled record")
}
