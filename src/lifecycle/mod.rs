//! Client-side orchestration of a wager from placement to a final outcome.
//!
//! Phases: `Pending -> Submitting -> Waiting -> Claiming -> Completed | Failed`.
//! The outcome is computed as soon as the claim block's seed exists; on-chain claim
//! confirmation runs afterwards as a best-effort background task whose result never alters
//! the outcome.
use crate::{
    Result,
    SpinError,
    adapter::{
        ChainAdapter,
        TxRef,
    },
    bet_key::{
        BetKey,
        PartyId,
    },
    config::{
        ControllerConfig,
        GameConfig,
        MatchMode,
    },
    evaluate::SpinOutcome,
    events::{
        EventEmitter,
        SpinEvent,
        SubscriptionId,
    },
    lock,
};
use chrono::{
    DateTime,
    Utc,
};
use queue::SpinQueue;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};
use wait::{
    CancelSource,
    CancelToken,
    WaitError,
    wait_for_block,
    wait_past_block,
};

pub mod queue;
pub mod wait;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SpinId(pub u64);

impl fmt::Display for SpinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinStatus {
    Pending,
    Submitting,
    Waiting,
    Claiming,
    Completed,
    Failed,
}

impl SpinStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SpinStatus::Completed | SpinStatus::Failed)
    }
}

/// Progress of the background on-chain claim for a completed wager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ClaimStatus {
    NotStarted,
    Pending,
    Confirmed,
    Failed(String),
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSpin {
    pub id: SpinId,
    pub party: PartyId,
    pub status: SpinStatus,
    pub bet_per_line: u64,
    pub lines: u32,
    pub mode: MatchMode,
    pub total_bet: u64,
    pub bet_key: Option<BetKey>,
    pub tx_ref: Option<TxRef>,
    pub submit_block: Option<u64>,
    pub claim_block: Option<u64>,
    pub outcome: Option<SpinOutcome>,
    pub error: Option<String>,
    pub claim: ClaimStatus,
    pub placed_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueuedSpin {
    pub fn new(
        id: SpinId,
        party: PartyId,
        bet_per_line: u64,
        lines: u32,
        mode: MatchMode,
    ) -> Self {
        Self {
            id,
            party,
            status: SpinStatus::Pending,
            bet_per_line,
            lines,
            mode,
            total_bet: bet_per_line.saturating_mul(u64::from(lines)),
            bet_key: None,
            tx_ref: None,
            submit_block: None,
            claim_block: None,
            outcome: None,
            error: None,
            claim: ClaimStatus::NotStarted,
            placed_at: Utc::now(),
            finished_at: None,
        }
    }

    fn fail(&mut self, message: String) {
        self.status = SpinStatus::Failed;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
    }
}

/// Point-in-time view of a controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ControllerState {
    pub party: PartyId,
    pub config_loaded: bool,
    pub balance: Option<u64>,
    pub reserved: u64,
    pub available: u64,
    pub in_flight: usize,
    pub retained: usize,
    pub balance_polling: bool,
}

struct Inner {
    game: Option<Arc<GameConfig>>,
    balance: Option<u64>,
    spins: SpinQueue,
    /// Wagers with a live processing task.
    running: BTreeMap<SpinId, CancelSource>,
    /// Background claims still in progress.
    claims: BTreeMap<SpinId, CancelSource>,
    balance_poller: Option<CancelSource>,
}

struct Shared<A> {
    adapter: A,
    party: PartyId,
    settings: ControllerConfig,
    events: EventEmitter,
    inner: Mutex<Inner>,
}

/// Drives wagers for one party. Cheap to clone; clones share state.
pub struct SpinController<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for SpinController<A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

enum Interrupted {
    Cancelled,
    Failed(SpinError),
}

impl From<SpinError> for Interrupted {
    fn from(e: SpinError) -> Self {
        Interrupted::Failed(e)
    }
}

impl From<WaitError> for Interrupted {
    fn from(_: WaitError) -> Self {
        Interrupted::Cancelled
    }
}

impl<A: ChainAdapter> SpinController<A> {
    pub fn new(
        adapter: A,
        party: PartyId,
        settings: ControllerConfig,
        events: EventEmitter,
    ) -> Self {
        let spins = SpinQueue::new(settings.retained_terminal);
        Self {
            shared: Arc::new(Shared {
                adapter,
                party,
                settings,
                events,
                inner: Mutex::new(Inner {
                    game: None,
                    balance: None,
                    spins,
                    running: BTreeMap::new(),
                    claims: BTreeMap::new(),
                    balance_poller: None,
                }),
            }),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.shared.adapter
    }

    pub fn party(&self) -> PartyId {
        self.shared.party
    }

    pub fn events(&self) -> &EventEmitter {
        &self.shared.events
    }

    pub fn subscribe(&self) -> (SubscriptionId, UnboundedReceiver<SpinEvent>) {
        self.shared.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    /// Loads the contract's game configuration and the party's balance.
    pub async fn initialize(&self) -> Result<()> {
        self.load_config().await?;
        self.refresh_balance().await?;
        info!(party = %self.shared.party, "spin controller initialized");
        Ok(())
    }

    pub async fn load_config(&self) -> Result<Arc<GameConfig>> {
        let config = self.shared.adapter.contract_config().await?;
        config.validate()?;
        let config = Arc::new(config);
        lock(&self.shared.inner).game = Some(config.clone());
        Ok(config)
    }

    pub fn config(&self) -> Result<Arc<GameConfig>> {
        lock(&self.shared.inner)
            .game
            .clone()
            .ok_or(SpinError::ConfigNotLoaded)
    }

    /// Re-reads the balance, emitting `BalanceChanged` when it moved.
    pub async fn refresh_balance(&self) -> Result<u64> {
        refresh_balance(&self.shared).await
    }

    /// Validates and records a wager, then starts processing it in the background.
    pub fn spin(&self, bet_per_line: u64, lines: u32) -> Result<SpinId> {
        let placed = self.place(bet_per_line, lines);
        let id = match placed {
            Ok(id) => id,
            Err(e) => {
                warn!(bet_per_line, lines, error = %e, "wager rejected");
                self.shared.events.emit(SpinEvent::Error {
                    spin_id: None,
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                return Err(e);
            }
        };
        self.resume(id)?;
        Ok(id)
    }

    fn place(&self, bet_per_line: u64, lines: u32) -> Result<SpinId> {
        let mut inner = lock(&self.shared.inner);
        let config = inner.game.clone().ok_or(SpinError::ConfigNotLoaded)?;
        let balance = inner.balance.ok_or(SpinError::NotInitialized)?;
        let total_bet = config.validate_bet(bet_per_line, lines)?;
        let available =
            balance.saturating_sub(inner.spins.reserved_for(&self.shared.party));
        if total_bet > available {
            return Err(SpinError::InsufficientBalance {
                required: total_bet,
                available,
            });
        }
        let id = inner.spins.next_id();
        inner.spins.insert(QueuedSpin::new(
            id,
            self.shared.party,
            bet_per_line,
            lines,
            config.mode,
        ));
        debug!(spin_id = %id, bet_per_line, lines, total_bet, "wager placed");
        Ok(id)
    }

    /// Starts processing `id` unless it is already in flight or finished.
    ///
    /// Returns whether a new processing task was started.
    pub fn resume(&self, id: SpinId) -> Result<bool> {
        let token = {
            let mut inner = lock(&self.shared.inner);
            let spin = inner.spins.get(id).ok_or(SpinError::UnknownSpin(id))?;
            if spin.status.is_terminal() || inner.running.contains_key(&id) {
                return Ok(false);
            }
            let source = CancelSource::new();
            let token = source.token();
            inner.running.insert(id, source);
            token
        };
        tokio::spawn(process(self.shared.clone(), id, token));
        Ok(true)
    }

    /// Fails an in-flight wager and stops its processing task.
    ///
    /// Returns false if the wager had already finished.
    pub fn abort(&self, id: SpinId) -> Result<bool> {
        let mut inner = lock(&self.shared.inner);
        if inner.spins.get(id).is_none() {
            return Err(SpinError::UnknownSpin(id));
        }
        let aborted = inner
            .spins
            .update(id, |spin| spin.fail("aborted".into()))
            .is_some();
        if let Some(source) = inner.running.remove(&id) {
            source.cancel();
        }
        drop(inner);
        if aborted {
            info!(spin_id = %id, "spin aborted");
            self.shared.events.emit(SpinEvent::StatusChanged {
                spin_id: id,
                status: SpinStatus::Failed,
            });
        }
        Ok(aborted)
    }

    /// Aborts every in-flight wager, cancels background claims and stops balance polling.
    pub fn shutdown(&self) {
        let ids: Vec<SpinId> = {
            let mut inner = lock(&self.shared.inner);
            for (_, source) in std::mem::take(&mut inner.claims) {
                source.cancel();
            }
            if let Some(poller) = inner.balance_poller.take() {
                poller.cancel();
            }
            inner.spins.pending().map(|spin| spin.id).collect()
        };
        for id in ids {
            if let Err(e) = self.abort(id) {
                debug!(spin_id = %id, error = %e, "spin vanished during shutdown");
            }
        }
        info!(party = %self.shared.party, "spin controller shut down");
    }

    pub fn state(&self) -> ControllerState {
        let inner = lock(&self.shared.inner);
        let reserved = inner.spins.reserved_for(&self.shared.party);
        ControllerState {
            party: self.shared.party,
            config_loaded: inner.game.is_some(),
            balance: inner.balance,
            reserved,
            available: inner.balance.unwrap_or(0).saturating_sub(reserved),
            in_flight: inner.spins.pending().count(),
            retained: inner.spins.len(),
            balance_polling: inner.balance_poller.is_some(),
        }
    }

    /// Non-terminal wagers, oldest first.
    pub fn pending_spins(&self) -> Vec<QueuedSpin> {
        lock(&self.shared.inner).spins.pending().cloned().collect()
    }

    /// Every retained wager, oldest first.
    pub fn spins(&self) -> Vec<QueuedSpin> {
        lock(&self.shared.inner).spins.iter().cloned().collect()
    }

    pub fn spin_record(&self, id: SpinId) -> Option<QueuedSpin> {
        lock(&self.shared.inner).spins.get(id).cloned()
    }

    pub fn clear_finished(&self) -> usize {
        lock(&self.shared.inner).spins.clear_finished()
    }

    /// Starts the periodic balance refresh. Returns false if it is already running.
    pub fn start_balance_polling(&self) -> bool {
        let token = {
            let mut inner = lock(&self.shared.inner);
            if inner.balance_poller.is_some() {
                return false;
            }
            let source = CancelSource::new();
            let token = source.token();
            inner.balance_poller = Some(source);
            token
        };
        tokio::spawn(poll_balance(self.shared.clone(), token));
        true
    }

    pub fn stop_balance_polling(&self) -> bool {
        match lock(&self.shared.inner).balance_poller.take() {
            Some(source) => {
                source.cancel();
                true
            }
            None => false,
        }
    }
}

async fn refresh_balance<A: ChainAdapter>(shared: &Shared<A>) -> Result<u64> {
    let balance = shared.adapter.balance(&shared.party).await?;
    let previous = lock(&shared.inner).balance.replace(balance);
    if previous != Some(balance) {
        debug!(party = %shared.party, balance, "balance changed");
        shared.events.emit(SpinEvent::BalanceChanged {
            party: shared.party,
            balance,
        });
    }
    Ok(balance)
}

async fn poll_balance<A: ChainAdapter>(shared: Arc<Shared<A>>, mut cancel: CancelToken) {
    let mut ticker = time::interval(shared.settings.balance_poll_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = refresh_balance(&shared).await {
                    warn!(error = %e, "balance poll failed");
                }
            }
        }
    }
    debug!("balance polling stopped");
}

fn set_status<A>(shared: &Shared<A>, id: SpinId, f: impl FnOnce(&mut QueuedSpin)) -> bool {
    let updated = lock(&shared.inner).spins.update(id, f);
    match updated {
        Some(spin) => {
            shared.events.emit(SpinEvent::StatusChanged {
                spin_id: id,
                status: spin.status,
            });
            true
        }
        None => false,
    }
}

async fn process<A: ChainAdapter>(shared: Arc<Shared<A>>, id: SpinId, mut cancel: CancelToken) {
    let result = run_phases(&shared, id, &mut cancel).await;
    lock(&shared.inner).running.remove(&id);
    match result {
        Ok(ticket) => {
            if let Err(e) = refresh_balance(&shared).await {
                warn!(spin_id = %id, error = %e, "balance refresh after outcome failed");
            }
            spawn_claim(shared, id, ticket);
        }
        Err(Interrupted::Cancelled) => {
            debug!(spin_id = %id, "spin processing cancelled");
        }
        Err(Interrupted::Failed(e)) => {
            error!(spin_id = %id, error = %e, "spin failed");
            let message = e.to_string();
            if set_status(&shared, id, |spin| spin.fail(message.clone())) {
                shared.events.emit(SpinEvent::Error {
                    spin_id: Some(id),
                    message,
                    recoverable: e.is_recoverable(),
                });
            }
        }
    }
}

/// What the background claim needs; terminal records may be evicted before it runs.
struct ClaimTicket {
    bet_key: BetKey,
    claim_block: u64,
    bet_per_line: u64,
    lines: u32,
}

/// Runs submission through outcome computation.
async fn run_phases<A: ChainAdapter>(
    shared: &Shared<A>,
    id: SpinId,
    cancel: &mut CancelToken,
) -> std::result::Result<ClaimTicket, Interrupted> {
    let (config, spin) = {
        let inner = lock(&shared.inner);
        let config = inner.game.clone().ok_or(SpinError::ConfigNotLoaded)?;
        let spin = inner.spins.get(id).cloned().ok_or(SpinError::UnknownSpin(id))?;
        (config, spin)
    };

    let (bet_key, claim_block) = match (spin.bet_key, spin.claim_block) {
        (Some(key), Some(claim_block)) => (key, claim_block),
        _ => {
            if !set_status(shared, id, |s| s.status = SpinStatus::Submitting) {
                return Err(Interrupted::Cancelled);
            }
            let submit = shared
                .adapter
                .submit_spin(spin.bet_per_line, spin.lines, &spin.party);
            let submitted = tokio::select! {
                submitted = submit => submitted,
                _ = cancel.cancelled() => return Err(Interrupted::Cancelled),
            };
            let submission =
                submitted.map_err(|e| SpinError::SubmissionFailed(format!("{e:#}")))?;
            if submission.claim_block <= submission.submit_block {
                return Err(SpinError::SubmissionFailed(format!(
                    "claim block {} does not follow submit block {}",
                    submission.claim_block, submission.submit_block
                ))
                .into());
            }
            info!(
                spin_id = %id,
                tx_ref = %submission.tx_ref,
                submit_block = submission.submit_block,
                claim_block = submission.claim_block,
                "spin submitted"
            );
            let recorded = set_status(shared, id, |s| {
                s.status = SpinStatus::Waiting;
                s.bet_key = Some(submission.bet_key);
                s.tx_ref = Some(submission.tx_ref.clone());
                s.submit_block = Some(submission.submit_block);
                s.claim_block = Some(submission.claim_block);
            });
            if !recorded {
                return Err(Interrupted::Cancelled);
            }
            (submission.bet_key, submission.claim_block)
        }
    };

    let height = wait_for_block(
        &shared.adapter,
        claim_block,
        shared.settings.block_poll_interval,
        cancel,
    )
    .await?;
    info!(spin_id = %id, claim_block, height, "claim block reached");
    if !set_status(shared, id, |s| s.status = SpinStatus::Claiming) {
        return Err(Interrupted::Cancelled);
    }

    let outcome = shared
        .adapter
        .calculate_outcome_from_seed(
            &bet_key,
            claim_block,
            spin.bet_per_line,
            spin.lines,
            &config,
        )
        .await?;
    info!(
        spin_id = %id,
        total_payout = outcome.total_payout,
        win_level = ?outcome.win_level,
        "outcome computed"
    );
    let completed = set_status(shared, id, |s| {
        s.status = SpinStatus::Completed;
        s.outcome = Some(outcome.clone());
        s.finished_at = Some(Utc::now());
    });
    if !completed {
        return Err(Interrupted::Cancelled);
    }
    shared.events.emit(SpinEvent::OutcomeCompleted {
        spin_id: id,
        outcome,
    });
    Ok(ClaimTicket {
        bet_key,
        claim_block,
        bet_per_line: spin.bet_per_line,
        lines: spin.lines,
    })
}

fn spawn_claim<A: ChainAdapter>(shared: Arc<Shared<A>>, id: SpinId, ticket: ClaimTicket) {
    let token = {
        let mut inner = lock(&shared.inner);
        let source = CancelSource::new();
        let token = source.token();
        inner.claims.insert(id, source);
        inner
            .spins
            .annotate(id, |spin| spin.claim = ClaimStatus::Pending);
        token
    };
    tokio::spawn(confirm_claim(shared, id, ticket, token));
}

/// Background claim confirmation. Failures are logged and recorded, never surfaced.
async fn confirm_claim<A: ChainAdapter>(
    shared: Arc<Shared<A>>,
    id: SpinId,
    ticket: ClaimTicket,
    mut cancel: CancelToken,
) {
    let ClaimTicket {
        bet_key,
        claim_block,
        bet_per_line,
        lines,
    } = ticket;
    let waited = wait_past_block(
        &shared.adapter,
        claim_block,
        shared.settings.claim_poll_interval,
        shared.settings.claim_timeout,
        &mut cancel,
    )
    .await;
    let status = match waited {
        Ok(_) => {
            let claim = shared
                .adapter
                .claim_spin(&bet_key, claim_block, bet_per_line, lines);
            let claimed = tokio::select! {
                claimed = claim => Some(claimed),
                _ = cancel.cancelled() => None,
            };
            match claimed {
                Some(Ok(confirmation)) => {
                    info!(
                        spin_id = %id,
                        tx_ref = %confirmation.tx_ref,
                        payout = confirmation.payout,
                        "claim confirmed"
                    );
                    ClaimStatus::Confirmed
                }
                Some(Err(e)) => {
                    let e = SpinError::ClaimVerificationFailed(format!("{e:#}"));
                    warn!(spin_id = %id, error = %e, "background claim failed");
                    ClaimStatus::Failed(e.to_string())
                }
                None => ClaimStatus::NotStarted,
            }
        }
        Err(WaitError::TimedOut(limit)) => {
            warn!(spin_id = %id, claim_block, ?limit, "background claim timed out");
            ClaimStatus::TimedOut
        }
        Err(WaitError::Cancelled) => ClaimStatus::NotStarted,
    };
    let cancelled = status == ClaimStatus::NotStarted;
    {
        let mut inner = lock(&shared.inner);
        inner.claims.remove(&id);
        if !inner.spins.annotate(id, |spin| spin.claim = status.clone()) {
            debug!(spin_id = %id, ?status, "claim settled after record eviction");
        }
    }
    if cancelled {
        return;
    }

    tokio::select! {
        _ = time::sleep(shared.settings.balance_refresh_delay) => {
            if let Err(e) = refresh_balance(&shared).await {
                warn!(spin_id = %id, error = %e, "balance refresh after claim failed");
            }
        }
        _ = cancel.cancelled() => {}
    }
}
