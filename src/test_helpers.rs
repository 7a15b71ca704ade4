//! An in-memory ledger implementing every adapter trait, for tests and offline demos.
use crate::{
    adapter::{
        ChainAdapter,
        ClaimConfirmation,
        LogEntry,
        SeedSource,
        Submission,
        TransactionLookup,
        TransactionRecord,
        TxRef,
    },
    bet_key::{
        BetKey,
        PartyId,
        encode,
    },
    config::GameConfig,
    evaluate::evaluate,
    generator::{
        Seed,
        derive_outcome_grid,
    },
    lock,
    replay::{
        BetEventStore,
        BetRecord,
        DEFAULT_LOG_MARKER,
        InMemoryBetEventStore,
    },
};
use anyhow::{
    Context,
    bail,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
};

pub const STARTING_BALANCE: u64 = 1_000_000;

/// How the simulated ledger emits the bet key of a spin transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogStyle {
    Bare,
    #[default]
    Prefixed,
    /// Prefixed entry inside an inner transaction.
    Nested,
    /// No logs at all, as after an indexer has pruned them.
    Pruned,
}

struct ChainState {
    config: GameConfig,
    height: u64,
    blocks_per_poll: u64,
    failing_block_polls: u32,
    balances: HashMap<PartyId, u64>,
    transactions: BTreeMap<TxRef, TransactionRecord>,
    claimed: HashSet<BetKey>,
    next_index: u64,
    log_style: LogStyle,
    fail_submissions: bool,
    fail_claims: bool,
    seed_salt: [u8; 32],
}

#[derive(Clone)]
pub struct SimulatedChain {
    state: Arc<Mutex<ChainState>>,
    events: InMemoryBetEventStore,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChain {
    pub const PLAYER: PartyId = PartyId([0x11; 32]);

    pub fn new() -> Self {
        Self::with_config(GameConfig::standard())
    }

    pub fn with_config(config: GameConfig) -> Self {
        let mut balances = HashMap::new();
        balances.insert(Self::PLAYER, STARTING_BALANCE);
        Self {
            state: Arc::new(Mutex::new(ChainState {
                config,
                height: 0,
                blocks_per_poll: 0,
                failing_block_polls: 0,
                balances,
                transactions: BTreeMap::new(),
                claimed: HashSet::new(),
                next_index: 0,
                log_style: LogStyle::default(),
                fail_submissions: false,
                fail_claims: false,
                seed_salt: [0; 32],
            })),
            events: InMemoryBetEventStore::new(),
        }
    }

    /// Every height poll produces `blocks` new blocks after reporting the current height.
    pub fn with_blocks_per_poll(self, blocks: u64) -> Self {
        lock(&self.state).blocks_per_poll = blocks;
        self
    }

    /// Different salts give independent seed sequences.
    pub fn with_seed_salt(self, salt: [u8; 32]) -> Self {
        lock(&self.state).seed_salt = salt;
        self
    }

    pub fn advance(&self, blocks: u64) {
        let mut state = lock(&self.state);
        state.height = state.height.saturating_add(blocks);
    }

    pub fn advance_to_block_height(&self, height: u64) {
        let mut state = lock(&self.state);
        state.height = state.height.max(height);
    }

    pub fn height(&self) -> u64 {
        lock(&self.state).height
    }

    pub fn game_config(&self) -> GameConfig {
        lock(&self.state).config.clone()
    }

    pub fn event_store(&self) -> InMemoryBetEventStore {
        self.events.clone()
    }

    pub fn set_log_style(&self, style: LogStyle) {
        lock(&self.state).log_style = style;
    }

    pub fn fail_submissions(&self, fail: bool) {
        lock(&self.state).fail_submissions = fail;
    }

    pub fn fail_claims(&self, fail: bool) {
        lock(&self.state).fail_claims = fail;
    }

    pub fn fail_next_block_polls(&self, polls: u32) {
        lock(&self.state).failing_block_polls = polls;
    }

    pub fn set_balance(&self, party: PartyId, amount: u64) {
        lock(&self.state).balances.insert(party, amount);
    }

    pub fn balance_of(&self, party: &PartyId) -> u64 {
        lock(&self.state).balances.get(party).copied().unwrap_or(0)
    }

    pub fn is_claimed(&self, bet_key: &BetKey) -> bool {
        lock(&self.state).claimed.contains(bet_key)
    }

    /// Seed of an already produced block.
    pub fn seed_for(&self, block: u64) -> Option<Seed> {
        let state = lock(&self.state);
        (block <= state.height).then(|| simulated_seed(&state.seed_salt, block))
    }

    /// Drops the logs of a transaction and all its inner transactions.
    pub fn prune_logs(&self, tx_ref: &TxRef) -> bool {
        fn strip(tx: &mut TransactionRecord) {
            tx.logs.clear();
            tx.inner.iter_mut().for_each(strip);
        }
        match lock(&self.state).transactions.get_mut(tx_ref) {
            Some(tx) => {
                strip(tx);
                true
            }
            None => false,
        }
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        lock(&self.state).transactions.values().cloned().collect()
    }

    fn record_spin(
        &self,
        bet_per_line: u64,
        lines: u32,
        party: &PartyId,
    ) -> anyhow::Result<(Submission, BetRecord)> {
        let mut state = lock(&self.state);
        if state.fail_submissions {
            bail!("simulated ledger rejected the spin");
        }
        if lines == 0 {
            bail!("spin must cover at least one line");
        }
        let total = bet_per_line
            .checked_mul(u64::from(lines))
            .context("total bet overflows")?;
        let balance = state.balances.get(party).copied().unwrap_or(0);
        if balance < total {
            bail!("insufficient funds: {balance} < {total}");
        }
        state.balances.insert(*party, balance - total);

        let index_value = state.next_index;
        state.next_index += 1;
        let max_payline_index = u64::from(lines) - 1;
        let bet_key = encode(party, bet_per_line, max_payline_index, index_value);
        let tx_ref = TxRef::new(format!("sim-{index_value:06}"));
        let submit_block = state.height;
        let (logs, inner) = spin_logs(state.log_style, &tx_ref, party, submit_block, &bet_key);
        state.transactions.insert(
            tx_ref.clone(),
            TransactionRecord {
                tx_ref: tx_ref.clone(),
                sender: *party,
                confirmed_round: submit_block,
                logs,
                inner,
            },
        );

        let record = BetRecord {
            tx_ref: tx_ref.clone(),
            amount: bet_per_line,
            max_payline_index,
            index_value,
        };
        let submission = Submission {
            bet_key,
            tx_ref,
            submit_block,
            claim_block: submit_block + 1,
        };
        Ok((submission, record))
    }
}

fn simulated_seed(salt: &[u8; 32], block: u64) -> Seed {
    let mut hasher = Sha256::new();
    hasher.update(b"fairspin-simulated-seed");
    hasher.update(salt);
    hasher.update(block.to_be_bytes());
    Seed(hasher.finalize().into())
}

fn spin_logs(
    style: LogStyle,
    tx_ref: &TxRef,
    sender: &PartyId,
    round: u64,
    bet_key: &BetKey,
) -> (Vec<LogEntry>, Vec<TransactionRecord>) {
    let noise = LogEntry(b"escrow-transfer".to_vec());
    let prefixed =
        LogEntry([DEFAULT_LOG_MARKER.as_slice(), bet_key.as_bytes().as_slice()].concat());
    match style {
        LogStyle::Bare => (vec![noise, LogEntry(bet_key.as_bytes().to_vec())], vec![]),
        LogStyle::Prefixed => (vec![noise, prefixed], vec![]),
        LogStyle::Nested => (
            vec![noise],
            vec![TransactionRecord {
                tx_ref: TxRef::new(format!("{tx_ref}/inner-0")),
                sender: *sender,
                confirmed_round: round,
                logs: vec![prefixed],
                inner: vec![],
            }],
        ),
        LogStyle::Pruned => (vec![], vec![]),
    }
}

impl SeedSource for SimulatedChain {
    async fn block_seed(&self, block: u64) -> anyhow::Result<Option<Seed>> {
        Ok(self.seed_for(block))
    }
}

impl ChainAdapter for SimulatedChain {
    async fn submit_spin(
        &self,
        bet_per_line: u64,
        lines: u32,
        party: &PartyId,
    ) -> anyhow::Result<Submission> {
        let (submission, record) = self.record_spin(bet_per_line, lines, party)?;
        self.events.clone().record_bet(&record)?;
        Ok(submission)
    }

    async fn current_block(&self) -> anyhow::Result<u64> {
        let mut state = lock(&self.state);
        if state.failing_block_polls > 0 {
            state.failing_block_polls -= 1;
            bail!("simulated node unavailable");
        }
        let height = state.height;
        state.height = height.saturating_add(state.blocks_per_poll);
        Ok(height)
    }

    async fn claim_spin(
        &self,
        bet_key: &BetKey,
        claim_block: u64,
        bet_per_line: u64,
        lines: u32,
    ) -> anyhow::Result<ClaimConfirmation> {
        let mut state = lock(&self.state);
        if state.fail_claims {
            bail!("simulated claim reverted");
        }
        if state.height <= claim_block {
            bail!("claim block {claim_block} is not final at height {}", state.height);
        }
        if state.claimed.contains(bet_key) {
            bail!("spin already claimed");
        }
        let seed = simulated_seed(&state.seed_salt, claim_block);
        let grid = derive_outcome_grid(bet_key, &seed, &state.config.reels)?;
        let outcome = evaluate(&grid, &state.config, bet_per_line, lines)?;
        let party = bet_key.party();
        let balance = state.balances.entry(party).or_insert(0);
        *balance = balance.saturating_add(outcome.total_payout);
        state.claimed.insert(*bet_key);
        Ok(ClaimConfirmation {
            tx_ref: TxRef::new(format!("claim-{:06}", bet_key.fields().index_value)),
            block: state.height,
            payout: outcome.total_payout,
        })
    }

    async fn balance(&self, party: &PartyId) -> anyhow::Result<u64> {
        Ok(self.balance_of(party))
    }

    async fn contract_config(&self) -> anyhow::Result<GameConfig> {
        Ok(self.game_config())
    }
}

impl TransactionLookup for SimulatedChain {
    async fn transaction(&self, tx_ref: &TxRef) -> anyhow::Result<Option<TransactionRecord>> {
        Ok(lock(&self.state).transactions.get(tx_ref).cloned())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[tokio::test]
    async fn submit_spin__debits_escrow_and_records_event() {
        // given
        let chain = SimulatedChain::new();
        chain.advance(7);

        // when
        let submission = chain
            .submit_spin(10, 20, &SimulatedChain::PLAYER)
            .await
            .unwrap();

        // then
        assert_eq!(submission.submit_block, 7);
        assert_eq!(submission.claim_block, 8);
        assert_eq!(chain.balance_of(&SimulatedChain::PLAYER), STARTING_BALANCE - 200);
        let fields = submission.bet_key.fields();
        assert_eq!(fields.amount, 10);
        assert_eq!(fields.max_payline_index, 19);
        let record = chain
            .event_store()
            .bet_record(&submission.tx_ref)
            .unwrap()
            .unwrap();
        assert_eq!(record.bet_key(&SimulatedChain::PLAYER), submission.bet_key);
    }

    #[tokio::test]
    async fn claim_spin__before_claim_block_is_final__is_rejected() {
        let chain = SimulatedChain::new();
        let submission = chain
            .submit_spin(1, 20, &SimulatedChain::PLAYER)
            .await
            .unwrap();
        chain.advance(1);

        let early = chain
            .claim_spin(&submission.bet_key, submission.claim_block, 1, 20)
            .await;
        chain.advance(1);
        let claimed = chain
            .claim_spin(&submission.bet_key, submission.claim_block, 1, 20)
            .await;
        let twice = chain
            .claim_spin(&submission.bet_key, submission.claim_block, 1, 20)
            .await;

        assert!(early.is_err());
        assert!(claimed.is_ok());
        assert!(twice.is_err());
        assert!(chain.is_claimed(&submission.bet_key));
    }

    #[test]
    fn seed_for__unproduced_block__is_none() {
        let chain = SimulatedChain::new();
        chain.advance(2);
        assert!(chain.seed_for(2).is_some());
        assert!(chain.seed_for(3).is_none());
        assert_ne!(chain.seed_for(1), chain.seed_for(2));
    }
}
