use clap::{
    Args,
    Parser,
    Subcommand,
    ValueEnum,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use fairspin::{
    BetKey,
    ControllerConfig,
    GameConfig,
    PartyId,
    Reconstructor,
    Seed,
    SpinController,
    TxRef,
    bet_key::encode,
    evaluate::evaluate,
    events::SpinEvent,
    generator::derive_outcome_grid,
    replay::{
        DEFAULT_LOG_MARKER,
        SledBetEventStore,
        logs::LOG_MARKER_LEN,
    },
    test_helpers::{
        LogStyle,
        SimulatedChain,
    },
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};
use tracing::{
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
    prelude::*,
};

mod fixture;

use crate::fixture::FixtureLedger;

#[derive(Parser, Debug)]
#[command(
    name = "fairspin",
    about = "Provably-fair slot spins: encode keys, derive grids, replay and simulate",
    version
)]
struct Cli {
    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bet key encoding utilities
    #[command(subcommand)]
    Key(KeyCommand),

    /// Game configuration utilities
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Derive and evaluate the grid for a bet key and seed
    Grid(GridArgs),

    /// Rebuild a past spin from a ledger snapshot
    Replay(ReplayArgs),

    /// Play spins against an in-memory ledger
    Simulate(SimulateArgs),
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    Encode {
        /// 32-byte party id, hex
        #[arg(long)]
        party: String,
        #[arg(long)]
        amount: u64,
        /// Number of active lines
        #[arg(long, default_value_t = 20)]
        lines: u64,
        #[arg(long, default_value_t = 0)]
        index: u64,
    },
    Decode {
        /// 56-byte bet key, hex
        key: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a preset configuration as JSON
    Init {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "paylines")]
        preset: Preset,
    },
    /// Load and validate a configuration file
    Check { path: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    Paylines,
    Ways,
}

impl Preset {
    fn config(self) -> GameConfig {
        match self {
            Preset::Paylines => GameConfig::standard(),
            Preset::Ways => GameConfig::standard_ways(),
        }
    }
}

#[derive(Args, Debug)]
struct GameArgs {
    /// Game configuration JSON; defaults to the chosen preset
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "paylines")]
    preset: Preset,
}

impl GameArgs {
    fn load(&self) -> Result<GameConfig> {
        match &self.config {
            Some(path) => GameConfig::load(path).map_err(|e| eyre!("{e:#}")),
            None => Ok(self.preset.config()),
        }
    }
}

#[derive(Args, Debug)]
struct GridArgs {
    #[arg(long)]
    key: String,
    #[arg(long)]
    seed: String,
    #[command(flatten)]
    game: GameArgs,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Ledger snapshot JSON, as written by `simulate --export`
    #[arg(long)]
    ledger: PathBuf,
    #[arg(long)]
    tx: String,
    /// Sled database holding indexed bet records; defaults to the snapshot's records
    #[arg(long)]
    index_db: Option<PathBuf>,
    /// Four-byte ASCII marker of prefixed bet key logs
    #[arg(long)]
    marker: Option<String>,
    #[command(flatten)]
    game: GameArgs,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[arg(long, default_value_t = 5)]
    spins: u32,
    #[arg(long, default_value_t = 10)]
    bet: u64,
    #[arg(long, default_value_t = 20)]
    lines: u32,
    #[arg(long, value_enum, default_value = "prefixed")]
    log_style: LogStyleArg,
    /// Write the resulting ledger snapshot here
    #[arg(long)]
    export: Option<PathBuf>,
    #[command(flatten)]
    game: GameArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogStyleArg {
    Bare,
    Prefixed,
    Nested,
    Pruned,
}

impl From<LogStyleArg> for LogStyle {
    fn from(style: LogStyleArg) -> Self {
        match style {
            LogStyleArg::Bare => LogStyle::Bare,
            LogStyleArg::Prefixed => LogStyle::Prefixed,
            LogStyleArg::Nested => LogStyle::Nested,
            LogStyleArg::Pruned => LogStyle::Pruned,
        }
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);
    match log_dir {
        Some(dir) => {
            let appender = rolling::daily(dir, "fairspin.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .try_init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    match cli.command {
        Command::Key(command) => run_key(command),
        Command::Config(command) => run_config(command),
        Command::Grid(args) => run_grid(args),
        Command::Replay(args) => run_replay(args).await,
        Command::Simulate(args) => run_simulate(args).await,
    }
}

fn run_key(command: KeyCommand) -> Result<()> {
    match command {
        KeyCommand::Encode {
            party,
            amount,
            lines,
            index,
        } => {
            let party = PartyId::from_hex(&party)?;
            let max_payline_index = lines
                .checked_sub(1)
                .ok_or_else(|| eyre!("at least one line is required"))?;
            println!("{}", encode(&party, amount, max_payline_index, index).to_hex());
        }
        KeyCommand::Decode { key } => {
            let fields = BetKey::from_hex(&key)?.fields();
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
    }
    Ok(())
}

fn run_config(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { path, preset } => {
            preset
                .config()
                .save(&path)
                .map_err(|e| eyre!("{e:#}"))?;
            info!(path = %path.display(), ?preset, "game configuration written");
        }
        ConfigCommand::Check { path } => {
            let config = GameConfig::load(&path).map_err(|e| eyre!("{e:#}"))?;
            println!(
                "{}: {:?} mode, {} lines max, {}x{} reels",
                path.display(),
                config.mode,
                config.max_lines(),
                config.reels.reel_count,
                config.reels.window_length,
            );
        }
    }
    Ok(())
}

fn run_grid(args: GridArgs) -> Result<()> {
    let config = args.game.load()?;
    let bet_key = BetKey::from_hex(&args.key)?;
    let seed = Seed::from_hex(&args.seed)?;
    let grid = derive_outcome_grid(&bet_key, &seed, &config.reels)?;
    let fields = bet_key.fields();
    let lines = u32::try_from(fields.lines()).wrap_err("line count out of range")?;
    let outcome = evaluate(&grid, &config, fields.amount, lines)?;
    println!("{outcome}");
    Ok(())
}

fn parse_marker(raw: &str) -> Result<[u8; LOG_MARKER_LEN]> {
    raw.as_bytes()
        .try_into()
        .map_err(|_| eyre!("log marker must be exactly {LOG_MARKER_LEN} bytes, got {raw:?}"))
}

async fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = Arc::new(args.game.load()?);
    let ledger = FixtureLedger::load(&args.ledger).map_err(|e| eyre!("{e:#}"))?;
    let marker = match &args.marker {
        Some(raw) => parse_marker(raw)?,
        None => DEFAULT_LOG_MARKER,
    };
    let tx_ref = TxRef::new(args.tx);

    let replay = match &args.index_db {
        Some(path) => {
            let index = SledBetEventStore::open(path).map_err(|e| eyre!("{e:#}"))?;
            Reconstructor::new(ledger, index, config.clone())
                .with_marker(marker)
                .reconstruct_required(&tx_ref)
                .await?
        }
        None => {
            let events = ledger.event_store().map_err(|e| eyre!("{e:#}"))?;
            Reconstructor::new(ledger, events, config.clone())
                .with_marker(marker)
                .reconstruct_required(&tx_ref)
                .await?
        }
    };
    if !replay.verify(&config)? {
        warn!(%tx_ref, "re-derived grid does not match the reconstruction");
    }
    println!("{}", serde_json::to_string_pretty(&replay)?);
    println!("{}", replay.outcome);
    Ok(())
}

async fn run_simulate(args: SimulateArgs) -> Result<()> {
    let chain = SimulatedChain::with_config(args.game.load()?)
        .with_blocks_per_poll(1)
        .with_seed_salt(rand::random());
    chain.set_log_style(args.log_style.into());
    let settings = ControllerConfig {
        block_poll_interval: Duration::from_millis(20),
        claim_poll_interval: Duration::from_millis(20),
        claim_timeout: Some(Duration::from_secs(5)),
        balance_refresh_delay: Duration::from_millis(50),
        ..ControllerConfig::default()
    };
    let controller = SpinController::new(
        chain.clone(),
        SimulatedChain::PLAYER,
        settings,
        Default::default(),
    );
    controller.initialize().await?;
    let (_, mut events) = controller.subscribe();
    let mut completed = Vec::new();

    for _ in 0..args.spins {
        let id = controller.spin(args.bet, args.lines)?;
        loop {
            match events.recv().await {
                Some(SpinEvent::OutcomeCompleted { spin_id, outcome }) if spin_id == id => {
                    let tx_ref = controller
                        .spin_record(id)
                        .and_then(|spin| spin.tx_ref)
                        .ok_or_else(|| eyre!("spin {id} completed without a transaction"))?;
                    println!("spin {id} {tx_ref}\n{outcome}\n");
                    completed.push((tx_ref, outcome));
                    break;
                }
                Some(SpinEvent::Error {
                    spin_id: Some(spin_id),
                    message,
                    ..
                }) if spin_id == id => return Err(eyre!("spin {id} failed: {message}")),
                Some(_) => {}
                None => return Err(eyre!("event stream closed")),
            }
        }
    }

    // let background claims settle before reporting the balance
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.shutdown();
    println!(
        "balance {} after {} spins",
        chain.balance_of(&SimulatedChain::PLAYER),
        args.spins
    );

    let reconstructor = Reconstructor::new(
        chain.clone(),
        chain.event_store(),
        controller.config()?,
    );
    let mut mismatches = 0;
    for (tx_ref, live) in &completed {
        let replay = reconstructor.reconstruct_required(tx_ref).await?;
        if replay.outcome != *live {
            warn!(%tx_ref, "replayed outcome differs from the live one");
            mismatches += 1;
        }
    }
    println!(
        "replayed {} spins, {mismatches} mismatches",
        completed.len()
    );

    if let Some(path) = &args.export {
        FixtureLedger::capture(&chain)
            .and_then(|fixture| fixture.save(path))
            .map_err(|e| eyre!("{e:#}"))?;
        info!(path = %path.display(), "ledger snapshot exported");
    }
    Ok(())
}
