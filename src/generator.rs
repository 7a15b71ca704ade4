//! Deterministic reel-stop derivation from a bet key and a block seed.
//!
//! Every step is integer/byte arithmetic so the same grid can be recomputed
//! on-chain for verification.
use crate::{
    Result,
    SpinError,
    bet_key::{
        BET_KEY_LEN,
        BetKey,
    },
    config::ReelLayout,
    symbols::{
        SymbolGrid,
        parse_strip,
    },
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};
use sha2::{
    Digest,
    Sha256,
};
use std::fmt;

pub const SEED_LEN: usize = 32;

/// 32 bytes of block randomness.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed(pub [u8; SEED_LEN]);

impl Seed {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; SEED_LEN] = bytes.try_into().map_err(|_| {
            SpinError::InvalidReelData(format!(
                "seed must be {SEED_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(seed))
    }

    pub fn from_hex(raw: &str) -> Result<Self> {
        let bytes = hex::decode(raw)
            .map_err(|e| SpinError::InvalidReelData(format!("seed is not valid hex: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({})", self.to_hex())
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Seed::from_hex(&raw).map_err(de::Error::custom)
    }
}

/// Stop position of one reel: `SHA-256(key ‖ seed ‖ u64_be(reel))` read as a
/// big-endian integer, reduced modulo `reel_length`.
pub fn reel_stop(bet_key: &[u8], seed: &[u8], reel_index: u64, reel_length: u32) -> Result<u32> {
    if reel_length == 0 {
        return Err(SpinError::InvalidReelData("reel length must be non-zero".into()));
    }
    let mut hasher = Sha256::new();
    hasher.update(bet_key);
    hasher.update(seed);
    hasher.update(reel_index.to_be_bytes());
    let digest = hasher.finalize();
    let modulus = u64::from(reel_length);
    let stop = digest
        .iter()
        .fold(0u64, |acc, byte| ((acc << 8) | u64::from(*byte)) % modulus);
    Ok(stop as u32)
}

/// Stop positions for every reel of the layout.
pub fn reel_stops(
    bet_key: &[u8],
    seed: &[u8],
    reel_length: u32,
    reel_count: u32,
) -> Result<Vec<u32>> {
    check_inputs(bet_key, seed)?;
    (0..u64::from(reel_count))
        .map(|reel| reel_stop(bet_key, seed, reel, reel_length))
        .collect()
}

/// Derives the symbol grid for a wager. Pure: identical inputs always yield an identical grid.
pub fn derive_grid(
    bet_key: &[u8],
    seed: &[u8],
    reel_strip: &str,
    reel_length: u32,
    window_length: u32,
    reel_count: u32,
) -> Result<SymbolGrid> {
    check_inputs(bet_key, seed)?;
    let strip = parse_strip(reel_strip)?;
    if reel_length == 0 || strip.len() < reel_length as usize {
        return Err(SpinError::InvalidReelData(format!(
            "strip has {} symbols, reel length is {reel_length}",
            strip.len()
        )));
    }
    if window_length == 0 || reel_count == 0 {
        return Err(SpinError::InvalidReelData(
            "window length and reel count must be non-zero".into(),
        ));
    }
    let strip = &strip[..reel_length as usize];
    let reels = reel_stops(bet_key, seed, reel_length, reel_count)?
        .into_iter()
        .map(|stop| {
            (0..window_length)
                .map(|row| strip[((stop + row) % reel_length) as usize])
                .collect()
        })
        .collect();
    SymbolGrid::from_reels(reels)
}

pub fn derive_outcome_grid(
    bet_key: &BetKey,
    seed: &Seed,
    layout: &ReelLayout,
) -> Result<SymbolGrid> {
    derive_grid(
        bet_key.as_bytes(),
        seed.as_bytes(),
        &layout.strip,
        layout.reel_length,
        layout.window_length,
        layout.reel_count,
    )
}

/// Re-derives the grid and compares it with a claimed one.
pub fn verify_grid(
    bet_key: &BetKey,
    seed: &Seed,
    layout: &ReelLayout,
    expected: &SymbolGrid,
) -> Result<bool> {
    Ok(derive_outcome_grid(bet_key, seed, layout)? == *expected)
}

fn check_inputs(bet_key: &[u8], seed: &[u8]) -> Result<()> {
    if bet_key.len() != BET_KEY_LEN {
        return Err(SpinError::InvalidReelData(format!(
            "bet key must be {BET_KEY_LEN} bytes, got {}",
            bet_key.len()
        )));
    }
    if seed.len() != SEED_LEN {
        return Err(SpinError::InvalidReelData(format!(
            "seed must be {SEED_LEN} bytes, got {}",
            seed.len()
        )));
    }
    Ok(())
}
