//! Fixed-point currency amounts.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DocumentError;

/// Number of minor units in one major unit (paise per rupee, cents per dollar).
pub const MINOR_PER_MAJOR: i64 = 100;

/// A currency amount stored as an integer count of minor units.
///
/// Amounts always render with exactly two decimal places, so layout code can
/// right-justify them without rounding surprises. In JSON they travel as plain
/// numbers (`12.5`), matching what the order store emits.
///
/// ```
/// use posprint_types::Money;
///
/// let price = Money::from_minor(12_050);
/// assert_eq!(price.to_string(), "120.50");
/// assert_eq!((price * 2).to_string(), "241.00");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Create an amount from whole major units.
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_PER_MAJOR)
    }

    /// Convert a floating point amount, rounding half away from zero.
    pub fn try_from_f64(value: f64) -> Result<Self, DocumentError> {
        if !value.is_finite() {
            return Err(DocumentError::InvalidAmount(value.to_string()));
        }
        let minor = (value * MINOR_PER_MAJOR as f64).round();
        if minor.abs() > i64::MAX as f64 / 2.0 {
            return Err(DocumentError::InvalidAmount(value.to_string()));
        }
        Ok(Money(minor as i64))
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// The amount as a float, for serialization only.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / MINOR_PER_MAJOR as f64
    }

    /// Checked addition. `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Money) -> Option<Money> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Checked subtraction. `None` on overflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Money) -> Option<Money> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Checked multiplication by a quantity. `None` on overflow.
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Money> {
        match self.0.checked_mul(quantity as i64) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Sum amounts, failing on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Whether the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

impl FromStr for Money {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(DocumentError::UnparsableAmount(s.to_string()));
        }
        if frac.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(DocumentError::UnparsableAmount(s.to_string()));
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| DocumentError::UnparsableAmount(s.to_string()))?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().unwrap_or(0) * 10,
            _ => frac.parse::<i64>().unwrap_or(0),
        };
        let minor = whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(frac))
            .ok_or_else(|| DocumentError::InvalidAmount(s.to_string()))?;
        Ok(Money(if negative { -minor } else { minor }))
    }
}

// Operators saturate at the i64 range. Use the `checked_*` methods where an
// overflow must be reported.
impl core::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl core::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl core::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl core::ops::Mul<u32> for Money {
    type Output = Money;

    fn mul(self, rhs: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(rhs)))
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::try_from_f64(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_two_decimals() {
        assert_eq!(Money::from_minor(0).to_string(), "0.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(12_345).to_string(), "123.45");
        assert_eq!(Money::from_major(40).to_string(), "40.00");
        assert_eq!(Money::from_minor(-250).to_string(), "-2.50");
    }

    #[test]
    fn test_from_f64_rounds() {
        assert_eq!(Money::try_from_f64(12.5).unwrap(), Money::from_minor(1250));
        assert_eq!(Money::try_from_f64(0.105).unwrap().minor(), 11);
        assert_eq!(Money::try_from_f64(-3.333).unwrap().minor(), -333);
        assert!(Money::try_from_f64(f64::NAN).is_err());
        assert!(Money::try_from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_major(12));
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_minor(1250));
        assert_eq!("-0.75".parse::<Money>().unwrap(), Money::from_minor(-75));
        assert_eq!(".5".parse::<Money>().unwrap(), Money::from_minor(50));
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1999);
        assert_eq!(a * 3, Money::from_minor(5997));
        assert_eq!(a + a - Money::from_minor(1), Money::from_minor(3997));
        assert_eq!(-a, Money::from_minor(-1999));
        let total: Money = [a, a].into_iter().sum();
        assert_eq!(total, Money::from_minor(3998));
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let big = Money::try_from_f64(4e16).unwrap();
        assert_eq!(big.checked_add(big), Some(Money::from_minor(8_000_000_000_000_000_000)));
        assert_eq!(Money::checked_sum([big, big, big]), None);
        assert_eq!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)), None);
        assert_eq!(big.checked_mul(u32::MAX), None);
        assert_eq!(Money::from_minor(5).checked_mul(3), Some(Money::from_minor(15)));
    }

    #[test]
    fn test_operators_saturate() {
        let big = Money::try_from_f64(4e16).unwrap();
        let total: Money = [big, big, big].into_iter().sum();
        assert_eq!(total, Money::from_minor(i64::MAX));
        assert_eq!(big * u32::MAX, Money::from_minor(i64::MAX));
        assert_eq!(-Money::from_minor(i64::MIN), Money::from_minor(i64::MAX));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_number() {
        let m: Money = serde_json::from_str("249.99").unwrap();
        assert_eq!(m, Money::from_minor(24_999));
        assert_eq!(serde_json::to_string(&Money::from_minor(150)).unwrap(), "1.5");
    }

    proptest::proptest! {
        #[test]
        fn prop_display_parses_back(minor in -10_000_000i64..10_000_000) {
            let m = Money::from_minor(minor);
            proptest::prop_assert_eq!(m.to_string().parse::<Money>().unwrap(), m);
        }
    }
}
