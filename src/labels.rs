use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output order of the primary classifier.
pub const LABELS: [&str; 10] = ["I", "II", "III", "IV", "IX", "V", "VI", "VII", "VIII", "X"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RomanNumeral {
    I,
    II,
    III,
    IV,
    IX,
    V,
    VI,
    VII,
    VIII,
    X,
}

impl RomanNumeral {
    /// Numerals in [`LABELS`] order.
    pub const ALL: [RomanNumeral; 10] = [
        RomanNumeral::I,
        RomanNumeral::II,
        RomanNumeral::III,
        RomanNumeral::IV,
        RomanNumeral::IX,
        RomanNumeral::V,
        RomanNumeral::VI,
        RomanNumeral::VII,
        RomanNumeral::VIII,
        RomanNumeral::X,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        LABELS[self.index()]
    }
}

impl fmt::Display for RomanNumeral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RomanNumeral {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LABELS
            .iter()
            .position(|label| *label == s)
            .and_then(Self::from_index)
            .ok_or("unknown roman numeral")
    }
}
