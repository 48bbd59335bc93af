//! Automatic beaming rules
//!
//! Beam groups come from the meter. Compound meters group their units in
//! threes; a few meters have fixed asymmetric groupings; everything else
//! beams by beat. On top of that an exception table regroups beams whose
//! shortest note matches a given resolution, e.g. eighths in 4/4 beam by
//! half bar instead of by beat.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::models::{ratio, zero, Rational};

/// Beam group lengths counted in `unit` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub unit: Rational,
    pub groups: Vec<u32>,
}

impl Grouping {
    fn new(unit: Rational, groups: &[u32]) -> Self {
        Self {
            unit,
            groups: groups.to_vec(),
        }
    }

    /// Group boundaries within a bar of `measure`, ending with `measure`.
    ///
    /// Groups are cycled when they are shorter than the bar.
    pub fn boundaries(&self, measure: Rational) -> Vec<Rational> {
        let mut out = Vec::new();
        let mut pos = zero();
        if self.groups.iter().all(|g| *g == 0) || self.unit <= zero() {
            return vec![measure];
        }
        'outer: loop {
            for group in &self.groups {
                pos += self.unit * Rational::from_integer(*group as i64);
                if pos >= measure {
                    break 'outer;
                }
                out.push(pos);
            }
        }
        out.push(measure);
        out
    }
}

lazy_static! {
    /// Meters whose beat structure is not one group per beat.
    static ref NAMED_METERS: HashMap<(u32, u32), Vec<u32>> = {
        let mut m = HashMap::new();
        m.insert((4, 8), vec![2, 2]);
        m.insert((5, 8), vec![3, 2]);
        m.insert((8, 8), vec![3, 3, 2]);
        m
    };

    /// Regroupings keyed by meter, each with the note resolution it applies to.
    static ref EXCEPTIONS: HashMap<(u32, u32), Vec<Grouping>> = {
        let mut m = HashMap::new();
        m.insert((2, 2), vec![Grouping::new(ratio(1, 32), &[8, 8, 8, 8])]);
        m.insert((3, 2), vec![Grouping::new(ratio(1, 32), &[8, 8, 8, 8, 8, 8])]);
        m.insert((3, 4), vec![Grouping::new(ratio(1, 8), &[6])]);
        m.insert((3, 8), vec![Grouping::new(ratio(1, 8), &[3])]);
        m.insert((4, 2), vec![Grouping::new(ratio(1, 16), &[4, 4, 4, 4, 4, 4, 4, 4])]);
        m.insert(
            (4, 4),
            vec![
                Grouping::new(ratio(1, 8), &[4, 4]),
                Grouping::new(ratio(1, 12), &[3, 3, 3, 3]),
            ],
        );
        m.insert((6, 4), vec![Grouping::new(ratio(1, 16), &[4, 4, 4, 4, 4, 4])]);
        m.insert((9, 4), vec![Grouping::new(ratio(1, 32), &[8; 8])]);
        m.insert((12, 4), vec![Grouping::new(ratio(1, 32), &[8; 12])]);
        m
    };
}

/// Compound meters: more than three beats, divisible by three.
pub fn is_compound(numerator: u32) -> bool {
    numerator > 3 && numerator % 3 == 0
}

/// Beat structure of a meter.
pub fn beat_structure(numerator: u32, denominator: u32) -> Grouping {
    let unit = ratio(1, denominator.max(1) as i64);
    if let Some(groups) = NAMED_METERS.get(&(numerator, denominator)) {
        return Grouping::new(unit, groups);
    }
    if is_compound(numerator) {
        return Grouping::new(unit, &vec![3; (numerator / 3) as usize]);
    }
    Grouping::new(unit, &vec![1; numerator.max(1) as usize])
}

/// Grouping for a beam whose shortest note is `shortest`.
///
/// An exception applies only when its resolution equals the shortest note
/// exactly. A beam with shorter notes than the resolution falls back to the
/// beat structure, so sixteenths in 4/4 beam by beat, not by half bar.
pub fn grouping_for(numerator: u32, denominator: u32, shortest: Rational) -> Grouping {
    let matching = EXCEPTIONS
        .get(&(numerator, denominator))
        .and_then(|rules| rules.iter().find(|rule| rule.unit == shortest));
    match matching {
        Some(rule) => rule.clone(),
        None => beat_structure(numerator, denominator),
    }
}

/// Index of the beam group containing bar position `pos`.
pub fn group_index(boundaries: &[Rational], pos: Rational) -> usize {
    boundaries.iter().take_while(|b| **b <= pos).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_four_eighths_by_half_bar() {
        let grouping = grouping_for(4, 4, ratio(1, 8));
        assert_eq!(grouping.boundaries(ratio(1, 1)), vec![ratio(1, 2), ratio(1, 1)]);
    }

    #[test]
    fn test_four_four_sixteenths_by_beat() {
        let grouping = grouping_for(4, 4, ratio(1, 16));
        assert_eq!(
            grouping.boundaries(ratio(1, 1)),
            vec![ratio(1, 4), ratio(1, 2), ratio(3, 4), ratio(1, 1)]
        );
    }

    #[test]
    fn test_compound_meter() {
        let grouping = beat_structure(6, 8);
        assert_eq!(grouping.boundaries(ratio(3, 4)), vec![ratio(3, 8), ratio(3, 4)]);
        let grouping = beat_structure(12, 8);
        assert_eq!(grouping.boundaries(ratio(3, 2)).len(), 4);
    }

    #[test]
    fn test_named_meters() {
        let grouping = beat_structure(5, 8);
        assert_eq!(grouping.boundaries(ratio(5, 8)), vec![ratio(3, 8), ratio(5, 8)]);
        let grouping = beat_structure(8, 8);
        assert_eq!(
            grouping.boundaries(ratio(1, 1)),
            vec![ratio(3, 8), ratio(3, 4), ratio(1, 1)]
        );
    }

    #[test]
    fn test_three_four_eighths_whole_bar() {
        let grouping = grouping_for(3, 4, ratio(1, 8));
        assert_eq!(grouping.boundaries(ratio(3, 4)), vec![ratio(3, 4)]);
        let grouping = grouping_for(3, 4, ratio(1, 16));
        assert_eq!(grouping.boundaries(ratio(3, 4)).len(), 3);
    }

    #[test]
    fn test_group_index() {
        let bounds = vec![ratio(1, 2), ratio(1, 1)];
        assert_eq!(group_index(&bounds, zero()), 0);
        assert_eq!(group_index(&bounds, ratio(3, 8)), 0);
        assert_eq!(group_index(&bounds, ratio(1, 2)), 1);
    }
}
