use crate::{
    Result,
    SpinError,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// The closed reel alphabet. Each symbol is one character in a reel strip.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Symbol {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    Wild,
    Scatter,
    Jackpot,
    Blank,
}

impl Symbol {
    pub const ALL: [Symbol; 12] = [
        Symbol::A,
        Symbol::B,
        Symbol::C,
        Symbol::D,
        Symbol::E,
        Symbol::F,
        Symbol::G,
        Symbol::H,
        Symbol::Wild,
        Symbol::Scatter,
        Symbol::Jackpot,
        Symbol::Blank,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        let symbol = match c {
            'A' => Symbol::A,
            'B' => Symbol::B,
            'C' => Symbol::C,
            'D' => Symbol::D,
            'E' => Symbol::E,
            'F' => Symbol::F,
            'G' => Symbol::G,
            'H' => Symbol::H,
            'W' => Symbol::Wild,
            'S' => Symbol::Scatter,
            'J' => Symbol::Jackpot,
            '_' => Symbol::Blank,
            _ => return None,
        };
        Some(symbol)
    }

    pub fn as_char(self) -> char {
        match self {
            Symbol::A => 'A',
            Symbol::B => 'B',
            Symbol::C => 'C',
            Symbol::D => 'D',
            Symbol::E => 'E',
            Symbol::F => 'F',
            Symbol::G => 'G',
            Symbol::H => 'H',
            Symbol::Wild => 'W',
            Symbol::Scatter => 'S',
            Symbol::Jackpot => 'J',
            Symbol::Blank => '_',
        }
    }

    /// Stable index used as the group id of ways wins.
    pub fn index(self) -> u32 {
        match self {
            Symbol::A => 0,
            Symbol::B => 1,
            Symbol::C => 2,
            Symbol::D => 3,
            Symbol::E => 4,
            Symbol::F => 5,
            Symbol::G => 6,
            Symbol::H => 7,
            Symbol::Wild => 8,
            Symbol::Scatter => 9,
            Symbol::Jackpot => 10,
            Symbol::Blank => 11,
        }
    }

    pub fn is_blank(self) -> bool {
        self == Symbol::Blank
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Parses a reel strip, one symbol per character.
pub fn parse_strip(strip: &str) -> Result<Vec<Symbol>> {
    strip
        .chars()
        .enumerate()
        .map(|(pos, c)| {
            Symbol::from_char(c).ok_or_else(|| {
                SpinError::InvalidReelData(format!(
                    "unknown symbol {c:?} at strip position {pos}"
                ))
            })
        })
        .collect()
}

/// `reel_count` columns of `window_length` rows. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct SymbolGrid {
    reels: Vec<Vec<Symbol>>,
}

#[derive(Deserialize)]
struct RawGrid {
    reels: Vec<Vec<Symbol>>,
}

impl TryFrom<RawGrid> for SymbolGrid {
    type Error = SpinError;

    fn try_from(raw: RawGrid) -> Result<Self> {
        Self::from_reels(raw.reels)
    }
}

impl SymbolGrid {
    /// Builds a grid from columns; every reel must show the same, non-zero number of rows.
    pub fn from_reels(reels: Vec<Vec<Symbol>>) -> Result<Self> {
        let Some(first) = reels.first() else {
            return Err(SpinError::InvalidReelData("grid has no reels".into()));
        };
        let rows = first.len();
        if rows == 0 || reels.iter().any(|reel| reel.len() != rows) {
            return Err(SpinError::InvalidReelData(
                "every reel must show the same non-zero number of rows".into(),
            ));
        }
        Ok(Self { reels })
    }

    /// Parses row-major text: one line per row, one character per reel.
    pub fn parse_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let parsed = rows
            .iter()
            .map(|row| parse_strip(row.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let reel_count = parsed.first().map(Vec::len).unwrap_or(0);
        if parsed.iter().any(|row| row.len() != reel_count) {
            return Err(SpinError::InvalidReelData(
                "every row must have the same number of reels".into(),
            ));
        }
        let reels = (0..reel_count)
            .map(|reel| parsed.iter().map(|row| row[reel]).collect())
            .collect();
        Self::from_reels(reels)
    }

    pub fn reel_count(&self) -> usize {
        self.reels.len()
    }

    pub fn window_length(&self) -> usize {
        self.reels[0].len()
    }

    pub fn reels(&self) -> &[Vec<Symbol>] {
        &self.reels
    }

    pub fn reel(&self, reel: usize) -> Option<&[Symbol]> {
        self.reels.get(reel).map(Vec::as_slice)
    }

    pub fn get(&self, reel: usize, row: usize) -> Option<Symbol> {
        self.reels.get(reel).and_then(|r| r.get(row)).copied()
    }

    pub fn rows(&self) -> Vec<String> {
        (0..self.window_length())
            .map(|row| self.reels.iter().map(|reel| reel[row].as_char()).collect())
            .collect()
    }

    /// Number of reels whose window shows `symbol` at least once.
    pub fn reels_containing(&self, symbol: Symbol) -> usize {
        self.reels
            .iter()
            .filter(|reel| reel.contains(&symbol))
            .count()
    }
}

impl fmt::Display for SymbolGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            f.write_str(row)?;
        }
        Ok(())
    }
}
