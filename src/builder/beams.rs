//! Beam cursor for one voice
//!
//! Automatic beams collect notes while they fall in one beat group. Groups
//! are recomputed when a shorter note joins, which can split notes collected
//! earlier. Manual `[` `]` brackets bypass the grouping entirely.

use crate::ir::BeamState;
use crate::models::Rational;
use crate::timing::beaming::{group_index, grouping_for};

/// Position of an item in the bars of the open section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub bar: usize,
    pub item: usize,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    at: ItemRef,
    start: Rational,
    length: Rational,
}

/// Meter context for one automatic beam decision.
#[derive(Debug, Clone, Copy)]
pub struct Meter {
    pub numerator: u32,
    pub denominator: u32,
    pub measure: Rational,
}

#[derive(Debug, Default)]
pub struct BeamCursor {
    pending: Vec<Pending>,
    manual: Option<Vec<ItemRef>>,
}

pub type BeamAssignments = Vec<(ItemRef, BeamState)>;

fn finalize(group: &[Pending], out: &mut BeamAssignments) {
    if group.len() < 2 {
        return;
    }
    let last = group.len() - 1;
    for (i, note) in group.iter().enumerate() {
        let state = match i {
            0 => BeamState::Begin,
            i if i == last => BeamState::End,
            _ => BeamState::Continue,
        };
        out.push((note.at, state));
    }
}

impl BeamCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manual_open(&self) -> bool {
        self.manual.is_some()
    }

    /// Add a beamable note at bar position `start`.
    pub fn auto_note(
        &mut self,
        at: ItemRef,
        start: Rational,
        length: Rational,
        meter: Meter,
    ) -> BeamAssignments {
        let mut out = Vec::new();
        self.pending.push(Pending { at, start, length });
        let shortest = self
            .pending
            .iter()
            .map(|p| p.length)
            .min()
            .unwrap_or(length);
        let bounds = grouping_for(meter.numerator, meter.denominator, shortest)
            .boundaries(meter.measure);

        // split off every completed group
        let current_group = group_index(&bounds, start);
        let split = self
            .pending
            .iter()
            .position(|p| group_index(&bounds, p.start) == current_group)
            .unwrap_or(0);
        let done: Vec<Pending> = self.pending.drain(..split).collect();
        let mut group: Vec<Pending> = Vec::new();
        let mut index = None;
        for note in done {
            let g = group_index(&bounds, note.start);
            if index.is_some() && index != Some(g) {
                finalize(&group, &mut out);
                group.clear();
            }
            index = Some(g);
            group.push(note);
        }
        finalize(&group, &mut out);

        let end = start + length;
        if bounds.contains(&end) {
            out.extend(self.flush());
        }
        out
    }

    /// Close the automatic beam: rest, long note, bar line, end of voice.
    pub fn flush(&mut self) -> BeamAssignments {
        let mut out = Vec::new();
        let group = std::mem::take(&mut self.pending);
        finalize(&group, &mut out);
        out
    }

    /// `[` after `at`. The note leaves any automatic beam.
    pub fn manual_start(&mut self, at: ItemRef) -> BeamAssignments {
        self.pending.retain(|p| p.at != at);
        let out = self.flush();
        self.manual = Some(vec![at]);
        out
    }

    /// A note inside a manual beam.
    pub fn manual_note(&mut self, at: ItemRef) {
        if let Some(notes) = self.manual.as_mut() {
            if !notes.contains(&at) {
                notes.push(at);
            }
        }
    }

    /// `]` after `at`; `None` when no manual beam is open.
    pub fn manual_stop(&mut self, at: ItemRef) -> Option<BeamAssignments> {
        let mut notes = self.manual.take()?;
        if !notes.contains(&at) {
            notes.push(at);
        }
        let last = notes.len() - 1;
        let out = notes
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let state = match i {
                    0 if last == 0 => BeamState::None,
                    0 => BeamState::Begin,
                    i if i == last => BeamState::End,
                    _ => BeamState::Continue,
                };
                (r, state)
            })
            .collect();
        Some(out)
    }

    /// Drop an unclosed manual beam, returning the notes to clear.
    pub fn abandon_manual(&mut self) -> Option<Vec<ItemRef>> {
        self.manual.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ratio, zero};

    fn at(item: usize) -> ItemRef {
        ItemRef { bar: 0, item }
    }

    const FOUR_FOUR: Meter = Meter {
        numerator: 4,
        denominator: 4,
        measure: Rational::new_raw(1, 1),
    };

    #[test]
    fn test_eighths_in_four_four() {
        let mut cursor = BeamCursor::new();
        let mut all = Vec::new();
        for i in 0..8 {
            let start = ratio(i, 8);
            all.extend(cursor.auto_note(at(i as usize), start, ratio(1, 8), FOUR_FOUR));
        }
        all.extend(cursor.flush());
        let states: Vec<BeamState> = all.iter().map(|(_, s)| *s).collect();
        let group = [BeamState::Begin, BeamState::Continue, BeamState::Continue, BeamState::End];
        assert_eq!(states, [group, group].concat());
    }

    #[test]
    fn test_sixteenth_splits_earlier_group() {
        let mut cursor = BeamCursor::new();
        let mut all = Vec::new();
        all.extend(cursor.auto_note(at(0), zero(), ratio(1, 8), FOUR_FOUR));
        all.extend(cursor.auto_note(at(1), ratio(1, 8), ratio(1, 8), FOUR_FOUR));
        all.extend(cursor.auto_note(at(2), ratio(1, 4), ratio(1, 16), FOUR_FOUR));
        all.extend(cursor.auto_note(at(3), ratio(5, 16), ratio(1, 16), FOUR_FOUR));
        all.extend(cursor.flush());
        assert_eq!(
            all,
            vec![
                (at(0), BeamState::Begin),
                (at(1), BeamState::End),
                (at(2), BeamState::Begin),
                (at(3), BeamState::End),
            ]
        );
    }

    #[test]
    fn test_single_note_gets_no_beam() {
        let mut cursor = BeamCursor::new();
        let out = cursor.auto_note(at(0), ratio(3, 8), ratio(1, 8), FOUR_FOUR);
        assert!(out.is_empty());
        assert!(cursor.flush().is_empty());
    }

    #[test]
    fn test_manual_beam() {
        let mut cursor = BeamCursor::new();
        cursor.auto_note(at(0), zero(), ratio(1, 8), FOUR_FOUR);
        cursor.manual_start(at(0));
        assert!(cursor.manual_open());
        cursor.manual_note(at(1));
        let out = cursor.manual_stop(at(2)).unwrap();
        assert_eq!(
            out,
            vec![
                (at(0), BeamState::Begin),
                (at(1), BeamState::Continue),
                (at(2), BeamState::End),
            ]
        );
        assert!(cursor.manual_stop(at(3)).is_none());
    }
}
