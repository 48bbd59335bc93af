//! Written durations and the rational arithmetic used for all musical time.
//!
//! Every time value in the crate is a fraction of a whole note. A quarter
//! note is `1/4`, a dotted eighth `3/16`, a triplet eighth `1/12`.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

/// Exact musical time, measured in whole notes.
pub type Rational = Ratio<i64>;

/// Zero length.
pub fn zero() -> Rational {
    Rational::from_integer(0)
}

/// Build a rational from numerator and denominator.
pub fn ratio(numer: i64, denom: i64) -> Rational {
    Rational::new(numer, denom)
}

/// Largest `log` magnitude honoured; longer or shorter values are clamped.
pub const MAX_LOG: u32 = 30;

const MAX_DOTS: u32 = 16;

/// `1 / 2^log` whole notes, with `log` clamped to `±MAX_LOG`.
pub fn note_value(log: i8) -> Rational {
    let shift = u32::from(log.unsigned_abs()).min(MAX_LOG);
    if log >= 0 {
        ratio(1, 1i64 << shift)
    } else {
        Rational::from_integer(1i64 << shift)
    }
}

fn unit_factor() -> Rational {
    Rational::from_integer(1)
}

fn is_unit(factor: &Rational) -> bool {
    *factor == Rational::from_integer(1)
}

/// A written duration: `4.` is `{ log: 2, dots: 1 }`, `1*3/4` carries a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    /// Base value as a power of two: 0 = whole, 1 = half, 2 = quarter, -1 = breve
    pub log: i8,
    /// Augmentation dots
    #[serde(default)]
    pub dots: u8,
    /// Multiplier written as `*n/m`
    #[serde(default = "unit_factor", skip_serializing_if = "is_unit")]
    pub factor: Rational,
}

impl Duration {
    pub fn new(log: i8, dots: u8) -> Self {
        Self {
            log,
            dots,
            factor: unit_factor(),
        }
    }

    pub fn with_factor(mut self, factor: Rational) -> Self {
        self.factor = factor;
        self
    }

    /// The undotted, unscaled value of the base note.
    pub fn base(&self) -> Rational {
        note_value(self.log)
    }

    /// Nominal length: base value, dots and factor applied.
    pub fn length(&self) -> Rational {
        let dots = u32::from(self.dots).min(MAX_DOTS);
        let dot_scale = ratio((1i64 << (dots + 1)) - 1, 1i64 << dots);
        self.base() * dot_scale * self.factor
    }

    /// Parse LilyPond duration text: `4`, `8..`, `\breve`, `1*3/4`.
    pub fn from_lily(text: &str) -> Option<Self> {
        let (written, factor) = match text.split_once('*') {
            Some((w, f)) => (w, Some(f)),
            None => (text, None),
        };
        let digits_end = written
            .find(|c: char| c == '.')
            .unwrap_or(written.len());
        let (value, dots) = written.split_at(digits_end);
        if !dots.chars().all(|c| c == '.') {
            return None;
        }
        let log = match value {
            "\\maxima" => -3,
            "\\longa" => -2,
            "\\breve" => -1,
            other => {
                let n: u32 = other.parse().ok()?;
                if n == 0 || !n.is_power_of_two() {
                    return None;
                }
                n.trailing_zeros() as i8
            }
        };
        let mut duration = Duration::new(log, dots.len() as u8);
        if let Some(factor) = factor {
            let factor = match factor.split_once('/') {
                Some((n, d)) => ratio(n.parse().ok()?, d.parse().ok()?),
                None => Rational::from_integer(factor.parse().ok()?),
            };
            duration.factor = factor;
        }
        Some(duration)
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::new(2, 0)
    }
}

pub fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return a.max(b);
    }
    (a / gcd(a, b) * b).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        assert_eq!(Duration::new(2, 0).length(), ratio(1, 4));
        assert_eq!(Duration::new(3, 1).length(), ratio(3, 16));
        assert_eq!(Duration::new(2, 2).length(), ratio(7, 16));
        assert_eq!(Duration::new(-1, 0).length(), Rational::from_integer(2));
    }

    #[test]
    fn test_extreme_log_is_clamped() {
        assert_eq!(Duration::new(i8::MAX, 0).base(), ratio(1, 1i64 << MAX_LOG));
        assert_eq!(Duration::new(i8::MIN, 0).base(), Rational::from_integer(1i64 << MAX_LOG));
        assert_eq!(Duration::new(2, u8::MAX).length(), Duration::new(2, 16).length());
    }

    #[test]
    fn test_from_lily() {
        assert_eq!(Duration::from_lily("8."), Some(Duration::new(3, 1)));
        assert_eq!(Duration::from_lily("\\breve"), Some(Duration::new(-1, 0)));
        let multi = Duration::from_lily("1*3").unwrap();
        assert_eq!(multi.length(), Rational::from_integer(3));
        let scaled = Duration::from_lily("2*3/4").unwrap();
        assert_eq!(scaled.length(), ratio(3, 8));
        assert_eq!(Duration::from_lily("3"), None);
        assert_eq!(Duration::from_lily("4x"), None);
    }

    #[test]
    fn test_lcm() {
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(0, 3), 3);
        assert_eq!(gcd(12, 18), 6);
    }
}
