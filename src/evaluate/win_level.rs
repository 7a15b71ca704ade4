use crate::config::WinLevelThresholds;
use serde::{
    Deserialize,
    Serialize,
};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WinLevel {
    #[default]
    None,
    Small,
    Medium,
    Large,
    Jackpot,
}

/// Classifies a payout relative to the total bet. Thresholds are percentages of the bet.
pub fn classify(payout: u64, total_bet: u64, thresholds: &WinLevelThresholds) -> WinLevel {
    if payout == 0 {
        return WinLevel::None;
    }
    let scaled = u128::from(payout) * 100;
    let reaches = |percent: u64| scaled >= u128::from(total_bet) * u128::from(percent);
    if reaches(thresholds.jackpot) {
        WinLevel::Jackpot
    } else if reaches(thresholds.large) {
        WinLevel::Large
    } else if reaches(thresholds.medium) {
        WinLevel::Medium
    } else {
        WinLevel::Small
    }
}
