//! Ways-to-win evaluation: a symbol counts anywhere in a reel's window.
use crate::{
    config::{
        GameConfig,
        JackpotTrigger,
    },
    evaluate::{
        WinningLine,
        payline::pays_on_lines,
    },
    symbols::{
        Symbol,
        SymbolGrid,
    },
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WaysResult {
    pub wins: Vec<WinningLine>,
    pub bonus_spins: u32,
    pub jackpot: bool,
}

pub fn evaluate_ways(grid: &SymbolGrid, config: &GameConfig, bet_per_line: u64) -> WaysResult {
    if let Some(trigger) = triggered_jackpot(grid, config) {
        return WaysResult {
            wins: vec![WinningLine {
                line_id: trigger.symbol.index(),
                symbol: trigger.symbol,
                match_count: grid.reels_containing(trigger.symbol) as u32,
                ways: 1,
                payout: trigger.payout,
            }],
            bonus_spins: 0,
            jackpot: true,
        };
    }

    let wins = config
        .paytable
        .symbols()
        .filter(|symbol| config.wild != Some(*symbol) && pays_on_lines(*symbol, config))
        .filter_map(|symbol| symbol_ways(grid, config, symbol, bet_per_line))
        .collect();

    let bonus_spins = config
        .bonus
        .as_ref()
        .filter(|bonus| grid.reels_containing(bonus.symbol) >= bonus.min_reels as usize)
        .map(|bonus| bonus.spins)
        .unwrap_or(0);

    WaysResult {
        wins,
        bonus_spins,
        jackpot: false,
    }
}

fn triggered_jackpot<'a>(
    grid: &SymbolGrid,
    config: &'a GameConfig,
) -> Option<&'a JackpotTrigger> {
    config
        .jackpot
        .as_ref()
        .filter(|jackpot| grid.reels_containing(jackpot.symbol) >= jackpot.min_reels as usize)
}

fn symbol_ways(
    grid: &SymbolGrid,
    config: &GameConfig,
    symbol: Symbol,
    bet_per_line: u64,
) -> Option<WinningLine> {
    let mut run = 0u32;
    let mut ways = 1u64;
    let mut real = 0usize;
    for reel in grid.reels() {
        let hits = reel
            .iter()
            .filter(|s| **s == symbol || config.wild == Some(**s))
            .count();
        if hits == 0 {
            break;
        }
        real += reel.iter().filter(|s| **s == symbol).count();
        ways = ways.saturating_mul(hits as u64);
        run += 1;
    }
    // a run made only of wilds belongs to no symbol
    if run < config.min_match || real == 0 {
        return None;
    }
    let payout = config
        .paytable
        .multiplier(symbol, run)
        .saturating_mul(ways)
        .saturating_mul(bet_per_line);
    (payout > 0).then_some(WinningLine {
        line_id: symbol.index(),
        symbol,
        match_count: run,
        ways,
        payout,
    })
}
