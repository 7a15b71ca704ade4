//! Rebuilds a past spin's grid from nothing but its transaction reference.
//!
//! The bet key is read from the transaction's logs when they survive. Otherwise it is
//! re-encoded from the indexed wager parameters and the transaction sender, which yields the
//! same 56 bytes because encoding is a pure function of those four fields.
use crate::{
    Result,
    SpinError,
    adapter::{
        SeedSource,
        TransactionLookup,
        TxRef,
    },
    bet_key::BetKey,
    config::GameConfig,
    evaluate::{
        SpinOutcome,
        evaluate,
    },
    generator::{
        Seed,
        derive_outcome_grid,
        verify_grid,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;
use tracing::{
    debug,
    info,
};

pub mod event_store;
pub mod logs;
pub mod sled_event_store;

pub use event_store::{
    BetEventStore,
    BetRecord,
    InMemoryBetEventStore,
};
pub use sled_event_store::SledBetEventStore;

pub const DEFAULT_LOG_MARKER: [u8; logs::LOG_MARKER_LEN] = *b"SPIN";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Log,
    EventStore,
}

/// Audit record of a reconstructed spin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    pub tx_ref: TxRef,
    pub bet_key: BetKey,
    pub key_source: KeySource,
    pub confirmed_round: u64,
    pub claim_round: u64,
    pub seed: Seed,
    pub outcome: SpinOutcome,
}

impl Replay {
    /// Re-derives the grid from the recorded key and seed and compares.
    pub fn verify(&self, config: &GameConfig) -> Result<bool> {
        verify_grid(&self.bet_key, &self.seed, &config.reels, &self.outcome.grid)
    }
}

pub struct Reconstructor<L, E> {
    ledger: L,
    events: E,
    config: Arc<GameConfig>,
    marker: [u8; logs::LOG_MARKER_LEN],
}

impl<L, E> Reconstructor<L, E>
where
    L: TransactionLookup + SeedSource + Sync,
    E: BetEventStore,
{
    pub fn new(ledger: L, events: E, config: Arc<GameConfig>) -> Self {
        Self {
            ledger,
            events,
            config,
            marker: DEFAULT_LOG_MARKER,
        }
    }

    pub fn with_marker(mut self, marker: [u8; logs::LOG_MARKER_LEN]) -> Self {
        self.marker = marker;
        self
    }

    /// Reconstructs the spin, or `Ok(None)` when neither the logs nor the event store hold
    /// its bet key or its claim round has no seed. Absence is an expected result.
    pub async fn reconstruct(&self, tx_ref: &TxRef) -> Result<Option<Replay>> {
        let Some(tx) = self.ledger.transaction(tx_ref).await? else {
            debug!(%tx_ref, "transaction not found");
            return Ok(None);
        };

        let (bet_key, key_source) = match logs::find_bet_key(&tx, &self.marker) {
            Some(key) => (key, KeySource::Log),
            None => match self.events.bet_record(tx_ref)? {
                Some(record) => {
                    debug!(%tx_ref, "no bet key in logs, rebuilt from event store");
                    (record.bet_key(&tx.sender), KeySource::EventStore)
                }
                None => {
                    debug!(%tx_ref, "no bet key in logs or event store");
                    return Ok(None);
                }
            },
        };

        let Some(claim_round) = tx.confirmed_round.checked_add(1) else {
            return Ok(None);
        };
        let Some(seed) = self.ledger.block_seed(claim_round).await? else {
            debug!(%tx_ref, claim_round, "claim round has no seed");
            return Ok(None);
        };

        let fields = bet_key.fields();
        let Ok(lines) = u32::try_from(fields.lines()) else {
            debug!(%tx_ref, max_payline_index = fields.max_payline_index, "line count out of range");
            return Ok(None);
        };
        let grid = derive_outcome_grid(&bet_key, &seed, &self.config.reels)?;
        let outcome = match evaluate(&grid, &self.config, fields.amount, lines) {
            Ok(outcome) => outcome,
            Err(SpinError::InvalidBet(reason)) => {
                debug!(%tx_ref, %reason, "bet key does not describe a playable wager");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!(%tx_ref, ?key_source, claim_round, total_payout = outcome.total_payout, "spin reconstructed");
        Ok(Some(Replay {
            tx_ref: tx_ref.clone(),
            bet_key,
            key_source,
            confirmed_round: tx.confirmed_round,
            claim_round,
            seed,
            outcome,
        }))
    }

    /// Like [`Self::reconstruct`], but absence is an error.
    pub async fn reconstruct_required(&self, tx_ref: &TxRef) -> Result<Replay> {
        self.reconstruct(tx_ref)
            .await?
            .ok_or_else(|| SpinError::ReconstructionNotFound(tx_ref.clone()))
    }
}
