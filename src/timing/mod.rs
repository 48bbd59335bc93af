//! Musical time bookkeeping shared by the pre-pass and the translator
//!
//! Both passes advance absolute time identically: a nominal duration is scaled
//! by every enclosing tuplet and the active tremolo repeat, then added to the
//! [`Clock`]. Only the translator reacts to bar boundaries by building bars;
//! the pre-pass merely records positions.

pub mod beaming;
pub mod prepass;

use serde::{Deserialize, Serialize};

use crate::models::{ratio, zero, Rational, ScalerKind};

/// Absolute time and position within the current bar for one voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    /// Time since the start of the part
    pub total: Rational,
    /// Time since the last bar line
    pub since_bar: Rational,
    /// Still in the first bar of the part
    pub first_bar: bool,
    /// Nominal length of a full bar under the current time signature
    pub measure: Rational,
    /// Declared pickup length (`\partial`)
    pub partial: Option<Rational>,
}

impl Clock {
    pub fn new(measure: Rational) -> Self {
        Self {
            total: zero(),
            since_bar: zero(),
            first_bar: true,
            measure,
            partial: None,
        }
    }

    /// Restart at the beginning of a part, keeping meter and pickup.
    pub fn restart(&mut self) {
        self.total = zero();
        self.since_bar = zero();
        self.first_bar = true;
    }

    pub fn advance(&mut self, length: Rational) {
        self.total += length;
        self.since_bar += length;
    }

    /// Length the current bar is expected to reach.
    pub fn bar_length(&self) -> Rational {
        match self.partial {
            Some(pickup) if self.first_bar => pickup,
            _ => self.measure,
        }
    }

    /// In a pickup bar shorter than a full measure.
    pub fn in_pickup(&self) -> bool {
        self.first_bar && self.partial.map_or(false, |p| p < self.measure)
    }

    pub fn bar_complete(&self) -> bool {
        self.since_bar > zero() && self.since_bar >= self.bar_length()
    }

    /// Close the current bar. Time overshooting the bar carries into the next.
    pub fn close_bar(&mut self) {
        let length = self.bar_length();
        self.since_bar = if self.since_bar > length {
            self.since_bar - length
        } else {
            zero()
        };
        self.first_bar = false;
    }

    /// Time left before the current bar is full.
    pub fn remaining(&self) -> Rational {
        let rest = self.bar_length() - self.since_bar;
        if rest > zero() {
            rest
        } else {
            zero()
        }
    }

    /// Position in the bar as if the bar were full, for beat grouping.
    pub fn metric_position(&self) -> Rational {
        if self.in_pickup() {
            self.measure - self.bar_length() + self.since_bar
        } else {
            self.since_bar
        }
    }
}

/// One active duration scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupletLevel {
    pub kind: ScalerKind,
    /// Notes played in the time of `normal` notes
    pub actual: i64,
    pub normal: i64,
    /// Bracket number, 1 for the outermost bracket
    pub nr: u32,
    /// Restart the bracket after this much scaled time
    pub span: Option<Rational>,
    /// Scaled time elapsed in the current bracket
    pub elapsed: Rational,
    /// No note has been written in the current bracket yet
    pub pending_start: bool,
}

impl TupletLevel {
    /// Duration factor applied to enclosed notes.
    pub fn factor(&self) -> Rational {
        ratio(self.normal, self.actual)
    }

    pub fn bracketed(&self) -> bool {
        self.kind != ScalerKind::ScaleDurations
    }
}

/// Stack of enclosing scalers, innermost last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TupletStack {
    pub levels: Vec<TupletLevel>,
}

impl TupletStack {
    /// Push `\times n/d`, `\tuplet n/d` or `\scaleDurations n/d`.
    pub fn push(&mut self, kind: ScalerKind, numerator: i64, denominator: i64, span: Option<Rational>) {
        let (actual, normal) = match kind {
            ScalerKind::Times | ScalerKind::ScaleDurations => (denominator, numerator),
            ScalerKind::Tuplet => (numerator, denominator),
        };
        let nr = self.levels.iter().filter(|l| l.bracketed()).count() as u32 + 1;
        self.levels.push(TupletLevel {
            kind,
            actual: actual.max(1),
            normal: normal.max(1),
            nr,
            span,
            elapsed: zero(),
            pending_start: true,
        });
    }

    pub fn pop(&mut self) -> Option<TupletLevel> {
        self.levels.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Product of all enclosing factors.
    pub fn scale(&self) -> Rational {
        self.levels
            .iter()
            .fold(Rational::from_integer(1), |acc, l| acc * l.factor())
    }
}

/// Everything that turns a written duration into elapsed time.
#[derive(Debug, Clone, Default)]
pub struct Scaling {
    pub tuplets: TupletStack,
    /// Repeat count of an enclosing `\repeat tremolo`
    pub tremolo: Option<u32>,
}

impl Scaling {
    pub fn effective(&self, nominal: Rational) -> Rational {
        let tremolo = Rational::from_integer(self.tremolo.unwrap_or(1).max(1) as i64);
        nominal * self.tuplets.scale() * tremolo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_tuplet_scale() {
        let mut stack = TupletStack::default();
        stack.push(ScalerKind::Times, 2, 3, None);
        stack.push(ScalerKind::Tuplet, 5, 4, None);
        assert_eq!(stack.scale(), ratio(8, 15));
        assert_eq!(stack.levels[1].nr, 2);
        stack.push(ScalerKind::ScaleDurations, 1, 2, None);
        assert_eq!(stack.levels[2].nr, 3);
        assert!(!stack.levels[2].bracketed());
    }

    #[test]
    fn test_tremolo_multiplies() {
        let scaling = Scaling {
            tuplets: TupletStack::default(),
            tremolo: Some(4),
        };
        assert_eq!(scaling.effective(ratio(1, 16)), ratio(1, 4));
    }

    #[test]
    fn test_pickup_bar() {
        let mut clock = Clock::new(ratio(3, 4));
        clock.partial = Some(ratio(1, 4));
        assert!(clock.in_pickup());
        assert_eq!(clock.metric_position(), ratio(1, 2));
        clock.advance(ratio(1, 4));
        assert!(clock.bar_complete());
        clock.close_bar();
        assert_eq!(clock.bar_length(), ratio(3, 4));
        assert_eq!(clock.since_bar, zero());
        assert!(!clock.in_pickup());
    }

    #[test]
    fn test_overshoot_carries() {
        let mut clock = Clock::new(ratio(1, 1));
        clock.advance(ratio(5, 4));
        assert!(clock.bar_complete());
        clock.close_bar();
        assert_eq!(clock.since_bar, ratio(1, 4));
        assert_eq!(clock.total, ratio(5, 4));
    }
}
