//! Fixed-point ratios
//!
//! All multiplicative factors (reward rates, educational multipliers, bonus
//! factors) are expressed in 1/10_000 units. No floating point is used in
//! any monetary computation; products are taken in `u128` and floored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Denominator of every `Ratio`
pub const RATIO_SCALE: u64 = 10_000;

/// Non-negative fixed-point factor with 4 decimal places
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ratio {
    bps: u64,
}

impl Ratio {
    pub const ZERO: Self = Self { bps: 0 };
    pub const ONE: Self = Self { bps: RATIO_SCALE };

    /// Create from basis points of 1/10_000 (`15_000` is 1.5x)
    pub const fn from_bps(bps: u64) -> Self {
        Self { bps }
    }

    /// Create from a whole-number percentage (`10` is 0.10)
    pub const fn from_percent(percent: u64) -> Self {
        Self { bps: percent * 100 }
    }

    pub const fn bps(&self) -> u64 {
        self.bps
    }

    /// Clamp to an upper bound
    pub fn clamp_to(self, max: Ratio) -> Self {
        self.min(max)
    }

    /// Saturating sum of two ratios
    pub fn saturating_add(self, other: Ratio) -> Self {
        Self {
            bps: self.bps.saturating_add(other.bps),
        }
    }

    /// `floor(amount * self)`, `None` if the result does not fit in `u64`
    pub fn apply_floor(&self, amount: u64) -> Option<u64> {
        let product = amount as u128 * self.bps as u128 / RATIO_SCALE as u128;
        u64::try_from(product).ok()
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:04}x",
            self.bps / RATIO_SCALE,
            self.bps % RATIO_SCALE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Ratio::from_bps(15_000).to_string(), "1.5000x");
        assert_eq!(Ratio::ONE.to_string(), "1.0000x");
        assert_eq!(Ratio::from_bps(3).to_string(), "0.0003x");
    }

    #[test]
    fn test_apply_floor_rounds_down() {
        let ratio = Ratio::from_bps(15_000);
        assert_eq!(ratio.apply_floor(3), Some(4)); // 4.5 -> 4
        assert_eq!(ratio.apply_floor(1000), Some(1500));
    }

    #[test]
    fn test_apply_floor_overflow() {
        assert_eq!(Ratio::from_bps(20_000).apply_floor(u64::MAX), None);
        assert_eq!(Ratio::ONE.apply_floor(u64::MAX), Some(u64::MAX));
    }

    #[test]
    fn test_clamp() {
        let cap = Ratio::from_bps(30_000);
        assert_eq!(Ratio::from_bps(45_000).clamp_to(cap), cap);
        assert_eq!(Ratio::from_bps(12_000).clamp_to(cap), Ratio::from_bps(12_000));
    }

    #[test]
    fn test_from_percent() {
        assert_eq!(Ratio::from_percent(10).bps(), 1_000);
    }
}
