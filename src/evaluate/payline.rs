//! Fixed-line evaluation: left-to-right runs along configured payline patterns.
use crate::{
    Result,
    SpinError,
    config::{
        GameConfig,
        PaylinePattern,
    },
    evaluate::WinningLine,
    symbols::{
        Symbol,
        SymbolGrid,
    },
};

/// Evaluates the first `lines` payline patterns. At most one win per line.
pub fn evaluate_paylines(
    grid: &SymbolGrid,
    config: &GameConfig,
    bet_per_line: u64,
    lines: u32,
) -> Result<Vec<WinningLine>> {
    let mut wins = Vec::new();
    for pattern in config.paylines.iter().take(lines as usize) {
        let symbols = read_line(grid, pattern)?;
        if let Some((symbol, match_count, payout)) = best_run(&symbols, config, bet_per_line)
        {
            wins.push(WinningLine {
                line_id: pattern.id,
                symbol,
                match_count,
                ways: 1,
                payout,
            });
        }
    }
    Ok(wins)
}

fn read_line(grid: &SymbolGrid, pattern: &PaylinePattern) -> Result<Vec<Symbol>> {
    pattern
        .rows
        .iter()
        .enumerate()
        .map(|(reel, row)| {
            grid.get(reel, *row as usize).ok_or_else(|| {
                SpinError::InvalidConfig(format!(
                    "payline {} reads reel {reel} row {row} outside the grid",
                    pattern.id
                ))
            })
        })
        .collect()
}

/// Blank and trigger symbols never form a line win.
pub(crate) fn pays_on_lines(symbol: Symbol, config: &GameConfig) -> bool {
    !symbol.is_blank()
        && config.bonus.as_ref().is_none_or(|b| b.symbol != symbol)
        && config.jackpot.as_ref().is_none_or(|j| j.symbol != symbol)
}

fn best_run(
    symbols: &[Symbol],
    config: &GameConfig,
    bet_per_line: u64,
) -> Option<(Symbol, u32, u64)> {
    let is_wild = |s: Symbol| config.wild == Some(s);
    let leading_wilds = symbols.iter().take_while(|s| is_wild(**s)).count();

    let symbol_run = match symbols.get(leading_wilds) {
        Some(&first) if pays_on_lines(first, config) => {
            let run = symbols[leading_wilds..]
                .iter()
                .take_while(|s| **s == first || is_wild(**s))
                .count();
            Some((first, leading_wilds + run))
        }
        Some(_) => None,
        None => config.wild.map(|wild| (wild, leading_wilds)),
    };
    let wild_run = config
        .wild
        .filter(|_| leading_wilds > 0 && leading_wilds < symbols.len())
        .map(|wild| (wild, leading_wilds));

    [symbol_run, wild_run]
        .into_iter()
        .flatten()
        .filter(|(symbol, _)| pays_on_lines(*symbol, config))
        .filter_map(|(symbol, count)| {
            let count = count as u32;
            if count < config.min_match {
                return None;
            }
            let payout = config
                .paytable
                .multiplier(symbol, count)
                .saturating_mul(bet_per_line);
            (payout > 0).then_some((symbol, count, payout))
        })
        .reduce(|best, candidate| if candidate.2 > best.2 { candidate } else { best })
}
