use std::fmt::{Display, Formatter};
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Link or path cost. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metric(u32);

impl Metric {
    pub const MINIMUM: Metric = Metric(16);
    pub const DEFAULT: Metric = Metric(4096);
    pub const MAXIMUM: Metric = Metric(1015808);
    /// No metric known, absorbs every sum it takes part in
    pub const UNDEFINED: Metric = Metric(u32::MAX);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn is_undefined(&self) -> bool {
        self.0 == u32::MAX
    }

    /// Rounds a computed link cost into the valid link metric range
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::MAXIMUM;
        }
        let value = value
            .round()
            .clamp(Self::MINIMUM.0 as f64, Self::MAXIMUM.0 as f64);
        Self(value as u32)
    }

    /// `None` for the undefined metric
    pub fn defined(self) -> Option<Self> {
        (!self.is_undefined()).then_some(self)
    }

    pub fn in_link_range(&self) -> bool {
        *self >= Self::MINIMUM && *self <= Self::MAXIMUM
    }
}

impl Default for Metric {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Add for Metric {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        if self.is_undefined() || rhs.is_undefined() {
            Self::UNDEFINED
        } else {
            Self(self.0.saturating_add(rhs.0).min(u32::MAX - 1))
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_undefined() {
            write!(f, "Undefined")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_absorbs_sums() {
        assert_eq!(Metric::DEFAULT + Metric::UNDEFINED, Metric::UNDEFINED);
        assert_eq!(Metric::UNDEFINED + Metric::MINIMUM, Metric::UNDEFINED);
        assert_eq!(Metric::DEFAULT + Metric::DEFAULT, Metric::new(8192));
        assert!(!(Metric::new(u32::MAX - 1) + Metric::MAXIMUM).is_undefined());
    }

    #[test]
    fn clamps_into_link_range() {
        assert_eq!(Metric::clamped(1.0), Metric::MINIMUM);
        assert_eq!(Metric::clamped(1e12), Metric::MAXIMUM);
        assert_eq!(Metric::clamped(409.6 * 2.0), Metric::new(819));
        assert_eq!(Metric::clamped(f64::NAN), Metric::MAXIMUM);
    }
}
