//! Game configuration: reel layout, matching mode, paytable and bet limits.
//!
//! Loaded once (from the contract or a JSON file) and shared read-only.
use crate::{
    Result,
    SpinError,
    symbols::{
        Symbol,
        parse_strip,
    },
};
use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    time::Duration,
};

pub const DEFAULT_MIN_MATCH: u32 = 3;
pub const DEFAULT_WAYS_LINES: u32 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Paylines,
    Ways,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReelLayout {
    /// Shared reel strip, one character per symbol.
    pub strip: String,
    pub reel_length: u32,
    pub window_length: u32,
    pub reel_count: u32,
}

impl ReelLayout {
    pub fn validate(&self) -> Result<()> {
        if self.reel_length == 0 || self.window_length == 0 || self.reel_count == 0 {
            return Err(SpinError::InvalidReelData(format!(
                "reel length ({}), window length ({}) and reel count ({}) must be non-zero",
                self.reel_length, self.window_length, self.reel_count
            )));
        }
        let symbols = parse_strip(&self.strip)?;
        if symbols.len() < self.reel_length as usize {
            return Err(SpinError::InvalidReelData(format!(
                "strip has {} symbols, reel length is {}",
                symbols.len(),
                self.reel_length
            )));
        }
        Ok(())
    }
}

/// A fixed payline: one row index per reel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylinePattern {
    pub id: u32,
    pub rows: Vec<u32>,
}

impl PaylinePattern {
    pub fn straight(id: u32, row: u32, reel_count: u32) -> Self {
        Self {
            id,
            rows: vec![row; reel_count as usize],
        }
    }

    fn new(id: u32, rows: [u32; 5]) -> Self {
        Self {
            id,
            rows: rows.to_vec(),
        }
    }
}

/// Symbol -> (match count -> multiplier).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Paytable(pub BTreeMap<Symbol, BTreeMap<u32, u64>>);

impl Paytable {
    pub fn with(mut self, symbol: Symbol, count: u32, multiplier: u64) -> Self {
        self.0.entry(symbol).or_default().insert(count, multiplier);
        self
    }

    /// Multiplier for exactly `count` matches, 0 when unpaid.
    pub fn multiplier(&self, symbol: Symbol, count: u32) -> u64 {
        self.0
            .get(&symbol)
            .and_then(|pays| pays.get(&count))
            .copied()
            .unwrap_or(0)
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.0.keys().copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTrigger {
    pub symbol: Symbol,
    #[serde(default = "default_bonus_min_reels")]
    pub min_reels: u32,
    pub spins: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JackpotTrigger {
    pub symbol: Symbol,
    #[serde(default = "default_jackpot_min_reels")]
    pub min_reels: u32,
    pub payout: u64,
}

fn default_bonus_min_reels() -> u32 {
    2
}

fn default_jackpot_min_reels() -> u32 {
    3
}

/// Win-level thresholds, as percentages of the total bet (500 = 5x).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLevelThresholds {
    pub medium: u64,
    pub large: u64,
    pub jackpot: u64,
}

impl Default for WinLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 500,
            large: 1_500,
            jackpot: 5_000,
        }
    }
}

/// Per-line bet limits in minor units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLimits {
    pub min_bet: u64,
    pub max_bet: u64,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_bet: 1,
            max_bet: 1_000_000_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub reels: ReelLayout,
    pub mode: MatchMode,
    #[serde(default)]
    pub paylines: Vec<PaylinePattern>,
    pub paytable: Paytable,
    #[serde(default = "default_min_match")]
    pub min_match: u32,
    #[serde(default)]
    pub wild: Option<Symbol>,
    #[serde(default)]
    pub bonus: Option<BonusTrigger>,
    #[serde(default)]
    pub jackpot: Option<JackpotTrigger>,
    #[serde(default)]
    pub win_levels: WinLevelThresholds,
    #[serde(default)]
    pub limits: BetLimits,
    #[serde(default = "default_ways_lines")]
    pub ways_lines: u32,
}

fn default_min_match() -> u32 {
    DEFAULT_MIN_MATCH
}

fn default_ways_lines() -> u32 {
    DEFAULT_WAYS_LINES
}

impl GameConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("Failed to read game config {}", path.display()))?;
        let config: GameConfig = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse game config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json =
            serde_json::to_vec_pretty(self).context("Failed to serialize game config")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write game config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.reels.validate()?;
        if self.min_match == 0 {
            return Err(SpinError::InvalidConfig("min_match must be non-zero".into()));
        }
        match self.mode {
            MatchMode::Paylines => {
                if self.paylines.is_empty() {
                    return Err(SpinError::InvalidConfig(
                        "payline mode requires at least one payline".into(),
                    ));
                }
                for line in &self.paylines {
                    if line.rows.len() != self.reels.reel_count as usize {
                        return Err(SpinError::InvalidConfig(format!(
                            "payline {} covers {} reels, layout has {}",
                            line.id,
                            line.rows.len(),
                            self.reels.reel_count
                        )));
                    }
                    if let Some(row) =
                        line.rows.iter().find(|row| **row >= self.reels.window_length)
                    {
                        return Err(SpinError::InvalidConfig(format!(
                            "payline {} selects row {row} outside a {}-row window",
                            line.id, self.reels.window_length
                        )));
                    }
                }
            }
            MatchMode::Ways => {
                if self.ways_lines == 0 {
                    return Err(SpinError::InvalidConfig(
                        "ways mode requires a non-zero ways_lines".into(),
                    ));
                }
            }
        }
        let levels = &self.win_levels;
        if !(levels.medium <= levels.large && levels.large <= levels.jackpot) {
            return Err(SpinError::InvalidConfig(
                "win level thresholds must be ordered medium <= large <= jackpot".into(),
            ));
        }
        if self.limits.min_bet == 0 || self.limits.min_bet > self.limits.max_bet {
            return Err(SpinError::InvalidConfig(format!(
                "bet limits {}..={} are not a valid range",
                self.limits.min_bet, self.limits.max_bet
            )));
        }
        Ok(())
    }

    /// Highest number of lines a wager may cover.
    pub fn max_lines(&self) -> u32 {
        match self.mode {
            MatchMode::Paylines => self.paylines.len() as u32,
            MatchMode::Ways => self.ways_lines,
        }
    }

    /// Checks a wager's per-line amount and line count, returning its total bet.
    pub fn validate_bet(&self, bet_per_line: u64, lines: u32) -> Result<u64> {
        if bet_per_line == 0 {
            return Err(SpinError::InvalidBet("bet per line must be non-zero".into()));
        }
        if bet_per_line < self.limits.min_bet || bet_per_line > self.limits.max_bet {
            return Err(SpinError::InvalidBet(format!(
                "bet per line {bet_per_line} outside {}..={}",
                self.limits.min_bet, self.limits.max_bet
            )));
        }
        match self.mode {
            MatchMode::Paylines if lines == 0 || lines > self.max_lines() => {
                return Err(SpinError::InvalidBet(format!(
                    "line count {lines} outside 1..={}",
                    self.max_lines()
                )));
            }
            MatchMode::Ways if lines != self.ways_lines => {
                return Err(SpinError::InvalidBet(format!(
                    "ways mode is played on exactly {} lines, got {lines}",
                    self.ways_lines
                )));
            }
            _ => {}
        }
        bet_per_line.checked_mul(u64::from(lines)).ok_or_else(|| {
            SpinError::InvalidBet(format!(
                "total bet overflows: {bet_per_line} x {lines} lines"
            ))
        })
    }

    /// 5x3 fixed-line preset with 20 paylines.
    pub fn standard() -> Self {
        Self {
            reels: standard_reels(),
            mode: MatchMode::Paylines,
            paylines: standard_20_paylines(),
            paytable: standard_paytable(),
            min_match: DEFAULT_MIN_MATCH,
            wild: Some(Symbol::Wild),
            bonus: None,
            jackpot: None,
            win_levels: WinLevelThresholds::default(),
            limits: BetLimits::default(),
            ways_lines: DEFAULT_WAYS_LINES,
        }
    }

    /// 5x3 ways-to-win preset with bonus and jackpot triggers.
    pub fn standard_ways() -> Self {
        Self {
            mode: MatchMode::Ways,
            paylines: Vec::new(),
            bonus: Some(BonusTrigger {
                symbol: Symbol::Scatter,
                min_reels: default_bonus_min_reels(),
                spins: 10,
            }),
            jackpot: Some(JackpotTrigger {
                symbol: Symbol::Jackpot,
                min_reels: default_jackpot_min_reels(),
                payout: 1_000_000,
            }),
            ..Self::standard()
        }
    }
}

fn standard_reels() -> ReelLayout {
    ReelLayout {
        strip: "A_BC_DAE_FBG_HWC_SADB_EJCF_GAD_B".to_string(),
        reel_length: 32,
        window_length: 3,
        reel_count: 5,
    }
}

fn standard_paytable() -> Paytable {
    let tiers: [(Symbol, [u64; 3]); 9] = [
        (Symbol::A, [2, 5, 10]),
        (Symbol::B, [2, 5, 10]),
        (Symbol::C, [3, 8, 15]),
        (Symbol::D, [3, 8, 15]),
        (Symbol::E, [5, 12, 25]),
        (Symbol::F, [5, 12, 25]),
        (Symbol::G, [8, 20, 50]),
        (Symbol::H, [10, 30, 100]),
        (Symbol::Wild, [20, 75, 250]),
    ];
    tiers
        .into_iter()
        .fold(Paytable::default(), |table, (symbol, [three, four, five])| {
            table
                .with(symbol, 3, three)
                .with(symbol, 4, four)
                .with(symbol, 5, five)
        })
}

/// Standard payline patterns for a 5x3 window.
pub fn standard_20_paylines() -> Vec<PaylinePattern> {
    vec![
        PaylinePattern::straight(0, 1, 5),
        PaylinePattern::straight(1, 0, 5),
        PaylinePattern::straight(2, 2, 5),
        PaylinePattern::new(3, [0, 1, 2, 1, 0]),
        PaylinePattern::new(4, [2, 1, 0, 1, 2]),
        PaylinePattern::new(5, [0, 0, 1, 2, 2]),
        PaylinePattern::new(6, [2, 2, 1, 0, 0]),
        PaylinePattern::new(7, [1, 0, 0, 0, 1]),
        PaylinePattern::new(8, [1, 2, 2, 2, 1]),
        PaylinePattern::new(9, [0, 1, 0, 1, 0]),
        PaylinePattern::new(10, [2, 1, 2, 1, 2]),
        PaylinePattern::new(11, [0, 1, 1, 1, 0]),
        PaylinePattern::new(12, [2, 1, 1, 1, 2]),
        PaylinePattern::new(13, [1, 1, 0, 1, 1]),
        PaylinePattern::new(14, [1, 1, 2, 1, 1]),
        PaylinePattern::new(15, [0, 2, 0, 2, 0]),
        PaylinePattern::new(16, [2, 0, 2, 0, 2]),
        PaylinePattern::new(17, [1, 0, 1, 0, 1]),
        PaylinePattern::new(18, [1, 2, 1, 2, 1]),
        PaylinePattern::new(19, [0, 0, 2, 0, 0]),
    ]
}

/// Timing and retention knobs for the spin lifecycle controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub block_poll_interval: Duration,
    pub claim_poll_interval: Duration,
    /// Upper bound on the background claim wait; `None` waits indefinitely.
    pub claim_timeout: Option<Duration>,
    pub balance_refresh_delay: Duration,
    pub balance_poll_interval: Duration,
    /// Terminal wagers kept for inspection; non-terminal wagers are never evicted.
    pub retained_terminal: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            block_poll_interval: Duration::from_secs(1),
            claim_poll_interval: Duration::from_secs(1),
            claim_timeout: None,
            balance_refresh_delay: Duration::from_secs(2),
            balance_poll_interval: Duration::from_secs(10),
            retained_terminal: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn standard__presets__validate() {
        GameConfig::standard().validate().unwrap();
        GameConfig::standard_ways().validate().unwrap();
    }

    #[test]
    fn validate__short_strip__is_invalid_reel_data() {
        // given
        let mut config = GameConfig::standard();
        config.reels.strip = "ABC".into();

        // when
        let err = config.validate().unwrap_err();

        // then
        assert!(matches!(err, SpinError::InvalidReelData(_)));
    }

    #[test]
    fn validate__payline_row_outside_window__is_invalid_config() {
        let mut config = GameConfig::standard();
        config.paylines.push(PaylinePattern::straight(20, 3, 5));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SpinError::InvalidConfig(_)));
    }

    #[test]
    fn validate__unordered_win_levels__is_invalid_config() {
        let mut config = GameConfig::standard();
        config.win_levels.large = config.win_levels.jackpot + 1;
        assert!(matches!(
            config.validate().unwrap_err(),
            SpinError::InvalidConfig(_)
        ));
    }

    #[test]
    fn validate_bet__enforces_limits_and_lines() {
        // given
        let mut config = GameConfig::standard();
        config.limits = BetLimits {
            min_bet: 10,
            max_bet: 100,
        };

        // then
        assert_eq!(config.validate_bet(10, 20).unwrap(), 200);
        assert!(matches!(
            config.validate_bet(0, 1),
            Err(SpinError::InvalidBet(_))
        ));
        assert!(matches!(
            config.validate_bet(9, 1),
            Err(SpinError::InvalidBet(_))
        ));
        assert!(matches!(
            config.validate_bet(101, 1),
            Err(SpinError::InvalidBet(_))
        ));
        assert!(matches!(
            config.validate_bet(10, 21),
            Err(SpinError::InvalidBet(_))
        ));
        assert!(matches!(
            config.validate_bet(10, 0),
            Err(SpinError::InvalidBet(_))
        ));
    }

    #[test]
    fn validate_bet__ways_mode__requires_configured_line_count() {
        let config = GameConfig::standard_ways();
        assert_eq!(config.validate_bet(2, DEFAULT_WAYS_LINES).unwrap(), 50);
        assert!(config.validate_bet(2, 20).is_err());
    }

    #[test]
    fn load__saved_config__round_trips_through_json() {
        // given
        let dir = tempdir::TempDir::new("game_config").unwrap();
        let path = dir.path().join("game.json");
        let config = GameConfig::standard_ways();

        // when
        config.save(&path).unwrap();
        let loaded = GameConfig::load(&path).unwrap();

        // then
        assert_eq!(loaded, config);
    }

    #[test]
    fn load__minimal_json__fills_defaults() {
        let json = r#"{
            "reels": { "strip": "AAAB", "reel_length": 4, "window_length": 3, "reel_count": 5 },
            "mode": "paylines",
            "paylines": [ { "id": 0, "rows": [1, 1, 1, 1, 1] } ],
            "paytable": { "A": { "5": 50 } }
        }"#;
        let config: GameConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.min_match, DEFAULT_MIN_MATCH);
        assert_eq!(config.paytable.multiplier(Symbol::A, 5), 50);
        assert_eq!(config.paytable.multiplier(Symbol::A, 4), 0);
        assert_eq!(config.wild, None);
    }
}
