//! Fixed-point coin amounts.
//!
//! Balances move in half-coin steps (the fourth prize pays 0.5), so amounts
//! are stored as a count of halves to keep arithmetic exact.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(i64);

impl Coins {
    pub const ZERO: Coins = Coins(0);
    pub const HALF: Coins = Coins(1);
    pub const ONE: Coins = Coins(2);

    pub const fn from_halves(halves: i64) -> Self {
        Coins(halves)
    }

    pub const fn whole(coins: i64) -> Self {
        Coins(coins * 2)
    }

    pub const fn halves(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn abs(self) -> Self {
        Coins(self.0.abs())
    }

    /// Convert a spreadsheet cell value. Only whole and half amounts are accepted.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let doubled = value * 2.0;
        if doubled.fract() != 0.0 || doubled.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Coins(doubled as i64))
    }
}

impl Add for Coins {
    type Output = Coins;

    fn add(self, rhs: Coins) -> Coins {
        Coins(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Coins {
    fn add_assign(&mut self, rhs: Coins) {
        *self = *self + rhs;
    }
}

impl Sub for Coins {
    type Output = Coins;

    fn sub(self, rhs: Coins) -> Coins {
        Coins(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Coins {
    fn sub_assign(&mut self, rhs: Coins) {
        *self = *self - rhs;
    }
}

impl Neg for Coins {
    type Output = Coins;

    fn neg(self) -> Coins {
        Coins(self.0.saturating_neg())
    }
}

/// Prints `3`, `2.5` or `-0.5`
impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        if magnitude % 2 == 0 {
            write!(f, "{}{}", sign, magnitude / 2)
        } else {
            write!(f, "{}{}.5", sign, magnitude / 2)
        }
    }
}
