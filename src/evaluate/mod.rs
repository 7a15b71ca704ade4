//! Scores a grid against the paytable under the configured matching mode.
use crate::{
    Result,
    SpinError,
    config::{
        GameConfig,
        MatchMode,
    },
    symbols::{
        Symbol,
        SymbolGrid,
    },
};
use itertools::Itertools;
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

pub mod payline;
pub mod ways;
pub mod win_level;

pub use win_level::{
    WinLevel,
    classify,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WinningLine {
    /// Payline id, or the symbol index for ways and jackpot wins.
    pub line_id: u32,
    pub symbol: Symbol,
    pub match_count: u32,
    /// Combinations folded into this win; always 1 on a payline.
    pub ways: u64,
    pub payout: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinOutcome {
    pub grid: SymbolGrid,
    pub winning_lines: Vec<WinningLine>,
    pub total_payout: u64,
    pub win_level: WinLevel,
    #[serde(default)]
    pub bonus_spins: u32,
    #[serde(default)]
    pub jackpot: bool,
}

impl SpinOutcome {
    pub fn is_win(&self) -> bool {
        self.total_payout > 0
    }
}

impl fmt::Display for SpinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.grid)?;
        let lines = self
            .winning_lines
            .iter()
            .map(|w| format!("#{} {}x{} = {}", w.line_id, w.symbol, w.match_count, w.payout))
            .join(", ");
        write!(f, "payout {} ({:?})", self.total_payout, self.win_level)?;
        if !lines.is_empty() {
            write!(f, " [{lines}]")?;
        }
        if self.bonus_spins > 0 {
            write!(f, " +{} bonus spins", self.bonus_spins)?;
        }
        Ok(())
    }
}

/// Evaluates a grid for a wager of `bet_per_line` across `lines` lines.
///
/// Bet limits are a placement concern and are not re-checked here, so historical wagers still
/// evaluate after the limits change.
pub fn evaluate(
    grid: &SymbolGrid,
    config: &GameConfig,
    bet_per_line: u64,
    lines: u32,
) -> Result<SpinOutcome> {
    check_shape(grid, config)?;
    if bet_per_line == 0 {
        return Err(SpinError::InvalidBet("bet per line must be non-zero".into()));
    }
    if lines == 0 || (config.mode == MatchMode::Paylines && lines > config.max_lines()) {
        return Err(SpinError::InvalidBet(format!(
            "line count {lines} outside 1..={}",
            config.max_lines()
        )));
    }
    let total_bet = bet_per_line.saturating_mul(u64::from(lines));

    let (winning_lines, bonus_spins, jackpot) = match config.mode {
        MatchMode::Paylines => (
            payline::evaluate_paylines(grid, config, bet_per_line, lines)?,
            0,
            false,
        ),
        MatchMode::Ways => {
            let result = ways::evaluate_ways(grid, config, bet_per_line);
            (result.wins, result.bonus_spins, result.jackpot)
        }
    };
    let total_payout = winning_lines
        .iter()
        .fold(0u64, |total, line| total.saturating_add(line.payout));
    let win_level = if jackpot {
        WinLevel::Jackpot
    } else {
        classify(total_payout, total_bet, &config.win_levels)
    };

    Ok(SpinOutcome {
        grid: grid.clone(),
        winning_lines,
        total_payout,
        win_level,
        bonus_spins,
        jackpot,
    })
}

fn check_shape(grid: &SymbolGrid, config: &GameConfig) -> Result<()> {
    let layout = &config.reels;
    if grid.reel_count() != layout.reel_count as usize
        || grid.window_length() != layout.window_length as usize
    {
        return Err(SpinError::InvalidReelData(format!(
            "grid is {}x{}, layout expects {}x{}",
            grid.reel_count(),
            grid.window_length(),
            layout.reel_count,
            layout.window_length
        )));
    }
    Ok(())
}
