use serde::{Deserialize, Serialize};
use std::fmt;

/// The N of an N-back run, selectable as 0 through 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    Zero,
    One,
    Two,
    Three,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Zero, Level::One, Level::Two, Level::Three];

    pub fn from_lag(lag: u8) -> Option<Self> {
        Self::ALL.get(lag as usize).copied()
    }

    pub fn lag(self) -> usize {
        match self {
            Level::Zero => 0,
            Level::One => 1,
            Level::Two => 2,
            Level::Three => 3,
        }
    }

    /// Zero-back compares against a fixed target instead of an earlier stimulus.
    pub fn is_zero_back(self) -> bool {
        matches!(self, Level::Zero)
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::from_lag(value).ok_or_else(|| format!("N-back level must be 0..=3, got {value}"))
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.lag() as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-back", self.lag())
    }
}
