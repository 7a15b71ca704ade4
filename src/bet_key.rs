//! Fixed-size binary commitment to a wager's parameters.
//!
//! Layout (56 bytes):
//! `party (32) ‖ amount (u64 BE) ‖ max payline index (u64 BE) ‖ index value (u64 BE)`.
use crate::{
    Result,
    SpinError,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};
use std::fmt;

pub const PARTY_ID_LEN: usize = 32;
pub const BET_KEY_LEN: usize = 56;
pub const BET_KEY_HEX_LEN: usize = BET_KEY_LEN * 2;

const AMOUNT_OFFSET: usize = PARTY_ID_LEN;
const MAX_PAYLINE_OFFSET: usize = AMOUNT_OFFSET + 8;
const INDEX_OFFSET: usize = MAX_PAYLINE_OFFSET + 8;

/// Identifier of the wagering party (an on-chain address).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PartyId(pub [u8; PARTY_ID_LEN]);

impl PartyId {
    pub fn from_hex(raw: &str) -> Result<Self> {
        let bytes = decode_hex_exact(raw, PARTY_ID_LEN, "party id")?;
        let mut id = [0u8; PARTY_ID_LEN];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; PARTY_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyId({})", self.to_hex())
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The decoded fields of a bet key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BetKeyFields {
    pub party: PartyId,
    pub amount: u64,
    pub max_payline_index: u64,
    pub index_value: u64,
}

impl BetKeyFields {
    pub fn encode(&self) -> BetKey {
        encode(
            &self.party,
            self.amount,
            self.max_payline_index,
            self.index_value,
        )
    }

    /// Number of lines the wager covers.
    pub fn lines(&self) -> u64 {
        self.max_payline_index.saturating_add(1)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BetKey([u8; BET_KEY_LEN]);

/// Concatenates the four fields in their fixed order. Inputs are validated by the caller.
pub fn encode(
    party: &PartyId,
    amount: u64,
    max_payline_index: u64,
    index_value: u64,
) -> BetKey {
    let mut key = [0u8; BET_KEY_LEN];
    key[..AMOUNT_OFFSET].copy_from_slice(&party.0);
    key[AMOUNT_OFFSET..MAX_PAYLINE_OFFSET].copy_from_slice(&amount.to_be_bytes());
    key[MAX_PAYLINE_OFFSET..INDEX_OFFSET]
        .copy_from_slice(&max_payline_index.to_be_bytes());
    key[INDEX_OFFSET..].copy_from_slice(&index_value.to_be_bytes());
    BetKey(key)
}

pub fn decode(bytes: &[u8]) -> Result<BetKeyFields> {
    Ok(BetKey::from_slice(bytes)?.fields())
}

impl BetKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; BET_KEY_LEN] = bytes.try_into().map_err(|_| {
            SpinError::MalformedKey(format!(
                "expected {BET_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn from_hex(raw: &str) -> Result<Self> {
        let bytes = decode_hex_exact(raw, BET_KEY_LEN, "bet key")?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; BET_KEY_LEN] {
        &self.0
    }

    pub fn fields(&self) -> BetKeyFields {
        BetKeyFields {
            party: self.party(),
            amount: read_u64(&self.0, AMOUNT_OFFSET),
            max_payline_index: read_u64(&self.0, MAX_PAYLINE_OFFSET),
            index_value: read_u64(&self.0, INDEX_OFFSET),
        }
    }

    pub fn party(&self) -> PartyId {
        let mut party = [0u8; PARTY_ID_LEN];
        party.copy_from_slice(&self.0[..AMOUNT_OFFSET]);
        PartyId(party)
    }
}

fn read_u64(bytes: &[u8; BET_KEY_LEN], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_be_bytes(word)
}

fn decode_hex_exact(raw: &str, len: usize, what: &str) -> Result<Vec<u8>> {
    if raw.len() != len * 2 {
        return Err(SpinError::MalformedKey(format!(
            "{what} must be {} hex characters, got {}",
            len * 2,
            raw.len()
        )));
    }
    hex::decode(raw)
        .map_err(|e| SpinError::MalformedKey(format!("{what} is not valid hex: {e}")))
}

impl fmt::Debug for BetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BetKey({})", self.to_hex())
    }
}

impl fmt::Display for BetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BetKey::from_hex(&raw).map_err(de::Error::custom)
    }
}

impl Serialize for PartyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PartyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PartyId::from_hex(&raw).map_err(de::Error::custom)
    }
}
