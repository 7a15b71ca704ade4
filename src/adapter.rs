//! Boundary to the ledger. The engine depends only on these traits; transport, signing and
//! escrow live behind them.
use crate::{
    Result,
    SpinError,
    bet_key::{
        BetKey,
        PartyId,
    },
    config::GameConfig,
    evaluate::{
        SpinOutcome,
        evaluate,
    },
    generator::{
        Seed,
        derive_outcome_grid,
    },
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};
use std::fmt;

/// Opaque reference to a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub String);

impl TxRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxRef {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// What the ledger reports back for an accepted spin transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub bet_key: BetKey,
    pub tx_ref: TxRef,
    pub submit_block: u64,
    /// Block whose seed decides the outcome; always after `submit_block`.
    pub claim_block: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimConfirmation {
    pub tx_ref: TxRef,
    pub block: u64,
    pub payout: u64,
}

pub trait SeedSource {
    /// Seed of `block`, or `None` if the block has not been produced yet.
    fn block_seed(
        &self,
        block: u64,
    ) -> impl Future<Output = anyhow::Result<Option<Seed>>> + Send;
}

pub trait ChainAdapter: SeedSource + Send + Sync + 'static {
    fn submit_spin(
        &self,
        bet_per_line: u64,
        lines: u32,
        party: &PartyId,
    ) -> impl Future<Output = anyhow::Result<Submission>> + Send;

    fn current_block(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    fn claim_spin(
        &self,
        bet_key: &BetKey,
        claim_block: u64,
        bet_per_line: u64,
        lines: u32,
    ) -> impl Future<Output = anyhow::Result<ClaimConfirmation>> + Send;

    fn balance(&self, party: &PartyId) -> impl Future<Output = anyhow::Result<u64>> + Send;

    fn contract_config(&self) -> impl Future<Output = anyhow::Result<GameConfig>> + Send;

    fn calculate_outcome_from_seed(
        &self,
        bet_key: &BetKey,
        claim_block: u64,
        bet_per_line: u64,
        lines: u32,
        config: &GameConfig,
    ) -> impl Future<Output = Result<SpinOutcome>> + Send {
        outcome_from_seed(self, bet_key, claim_block, bet_per_line, lines, config)
    }
}

/// Fetches the claim block's seed and runs generation plus evaluation.
pub async fn outcome_from_seed<S: SeedSource + ?Sized + Sync>(
    source: &S,
    bet_key: &BetKey,
    claim_block: u64,
    bet_per_line: u64,
    lines: u32,
    config: &GameConfig,
) -> Result<SpinOutcome> {
    let seed = source
        .block_seed(claim_block)
        .await?
        .ok_or_else(|| {
            SpinError::Chain(anyhow::anyhow!("no seed available for block {claim_block}"))
        })?;
    let grid = derive_outcome_grid(bet_key, &seed, &config.reels)?;
    evaluate(&grid, config, bet_per_line, lines)
}

/// One emitted log entry, raw bytes. Serialized as hex.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LogEntry(pub Vec<u8>);

impl LogEntry {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogEntry({})", hex::encode(&self.0))
    }
}

impl Serialize for LogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for LogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map(LogEntry).map_err(de::Error::custom)
    }
}

/// A confirmed transaction as the ledger's indexer returns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_ref: TxRef,
    pub sender: PartyId,
    pub confirmed_round: u64,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Inner (nested) transactions, each with their own logs.
    #[serde(default)]
    pub inner: Vec<TransactionRecord>,
}

pub trait TransactionLookup {
    fn transaction(
        &self,
        tx_ref: &TxRef,
    ) -> impl Future<Output = anyhow::Result<Option<TransactionRecord>>> + Send;
}
