use serde::{Deserialize, Serialize};
use std::fmt;

const SYMBOLS: [&str; 9] = ["1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// A single stimulus symbol, always one of the digits 1 through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digit(u8);

impl Digit {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 9;
    pub const COUNT: usize = 9;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Digit(value))
    }

    /// Maps `0..COUNT` onto `1..=9`. Out-of-range indices wrap.
    pub fn from_index(index: usize) -> Self {
        Digit((index % Self::COUNT) as u8 + Self::MIN)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_str(self) -> &'static str {
        SYMBOLS[(self.0 - Self::MIN) as usize]
    }

    /// The next digit in cyclic order, 9 wraps to 1. Never equal to `self`.
    pub fn successor(self) -> Self {
        Self::from_index(self.0 as usize)
    }
}

impl TryFrom<u8> for Digit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Digit::new(value).ok_or_else(|| format!("digit out of range 1..=9: {value}"))
    }
}

impl From<Digit> for u8 {
    fn from(d: Digit) -> u8 {
        d.0
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a generated sequence.
///
/// `is_forced_match` is the generator's intent; whether the position matches
/// is always recomputed from the surrounding sequence when it is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stimulus {
    pub value: Digit,
    pub is_forced_match: bool,
}

impl Stimulus {
    pub fn new(value: Digit, is_forced_match: bool) -> Self {
        Self {
            value,
            is_forced_match,
        }
    }
}
