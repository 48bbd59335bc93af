//! Emission walker
//!
//! Walks a finished [`Score`] in document order and hands [`OutputOp`]s to a
//! [`ScoreSink`]:
//!
//! ```text
//! Header
//! StartPartGroup / ScorePart / EndPartGroup ...   part list
//! StartPart
//!   StartMeasure, Attributes, Barline(left), Tempo,
//!   [annotations, Note | Rest | Forward, annotations | Backup]*,
//!   Barline(right), EndMeasure
//! EndPart
//! ```
//!
//! The first emitted bar of every part is seeded with the default time
//! signature and clef plus the resolved divisions. Bars without items are
//! skipped; their attributes move to the next emitted bar and a right
//! barline joins the measure before them.

use log::debug;

use super::duration::{divisions_for, to_divisions};
use super::ops::{AttributesOp, BarSide, GroupOp, HeaderOp, OutputOp, PartOp, ScoreSink};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ir::{
    clef_from_name, Bar, BarAttr, BarItem, BarMus, Barline, Part, PartId, Score, ScoreEntry,
    ShiftKind, TimeAttr,
};
use crate::settings::ConversionSettings;

pub struct EmissionWalker<'a> {
    score: &'a Score,
    settings: &'a ConversionSettings,
    divisions: u32,
    /// Output id per part, `None` for suppressed parts
    ids: Vec<Option<String>>,
    diagnostics: Diagnostics,
}

/// The measure currently open in the sink.
struct OpenMeasure {
    right: Option<Barline>,
}

impl<'a> EmissionWalker<'a> {
    pub fn new(score: &'a Score, settings: &'a ConversionSettings) -> Self {
        let divisions = settings
            .divisions
            .filter(|d| *d > 0)
            .unwrap_or_else(|| divisions_for(score));
        let mut diagnostics = Diagnostics::new();
        let mut ids = vec![None; score.parts.len()];
        let mut next = 1;
        for id in score.part_order() {
            let Some(part) = score.parts.get(id) else {
                continue;
            };
            if part.has_music() {
                ids[id] = Some(format!("P{}", next));
                next += 1;
            } else {
                diagnostics.warn(
                    DiagnosticKind::EmptyPart,
                    format!("part {} has no notes and is left out", part_label(part, id)),
                );
            }
        }
        Self {
            score,
            settings,
            divisions,
            ids,
            diagnostics,
        }
    }

    /// Divisions per quarter note used for every duration.
    pub fn divisions(&self) -> u32 {
        self.divisions
    }

    pub fn walk(self, sink: &mut dyn ScoreSink) -> Diagnostics {
        debug!("emitting score with {} divisions per quarter", self.divisions);
        sink.emit(OutputOp::Header(HeaderOp {
            meta: self.score.meta.clone(),
            version: self.settings.musicxml_version.clone(),
            software: self.settings.software.clone(),
        }));
        for entry in &self.score.layout {
            self.list_entry(*entry, sink);
        }
        for id in self.score.part_order() {
            if let (Some(Some(xml_id)), Some(part)) = (self.ids.get(id), self.score.parts.get(id)) {
                self.part(xml_id, part, sink);
            }
        }
        self.diagnostics
    }

    fn list_entry(&self, entry: ScoreEntry, sink: &mut dyn ScoreSink) {
        match entry {
            ScoreEntry::Part(id) => {
                if let (Some(Some(xml_id)), Some(part)) = (self.ids.get(id), self.score.parts.get(id)) {
                    sink.emit(OutputOp::ScorePart(PartOp {
                        id: xml_id.clone(),
                        name: part.name.clone(),
                        abbr: part.abbr.clone(),
                        midi: part.midi.clone(),
                        staves: part.staves,
                        instruments: instruments(part),
                    }));
                }
            }
            ScoreEntry::Group(id) => {
                let Some(group) = self.score.groups.get(id) else {
                    return;
                };
                if !group.entries.iter().any(|e| self.has_emitted_part(*e)) {
                    return;
                }
                sink.emit(OutputOp::StartPartGroup(GroupOp {
                    number: group.number,
                    name: group.name.clone(),
                    abbr: group.abbr.clone(),
                    symbol: group.symbol,
                }));
                for child in &group.entries {
                    self.list_entry(*child, sink);
                }
                sink.emit(OutputOp::EndPartGroup { number: group.number });
            }
        }
    }

    fn has_emitted_part(&self, entry: ScoreEntry) -> bool {
        match entry {
            ScoreEntry::Part(id) => matches!(self.ids.get(id), Some(Some(_))),
            ScoreEntry::Group(id) => self
                .score
                .groups
                .get(id)
                .map_or(false, |g| g.entries.iter().any(|e| self.has_emitted_part(*e))),
        }
    }

    fn part(&self, xml_id: &str, part: &Part, sink: &mut dyn ScoreSink) {
        sink.emit(OutputOp::StartPart { id: xml_id.to_string() });
        let mut carried = Some(self.seed(part));
        let mut open: Option<OpenMeasure> = None;
        let mut number = match part.bars.iter().find(|b| !b.is_empty()) {
            Some(first) if first.pickup => 0,
            _ => 1,
        };
        for bar in &part.bars {
            if bar.is_empty() {
                if let Some(attr) = &bar.attr {
                    carry(&mut carried, &mut open, attr);
                }
                continue;
            }
            if let Some(measure) = open.take() {
                close_measure(measure, sink);
            }
            let mut attr = carried.take().unwrap_or_default();
            if let Some(own) = &bar.attr {
                attr.merge(own, true);
            }
            open = Some(self.measure(bar, number, attr, sink));
            number += 1;
        }
        if let Some(measure) = open.take() {
            close_measure(measure, sink);
        }
        sink.emit(OutputOp::EndPart);
    }

    /// Attributes every part starts with.
    fn seed(&self, part: &Part) -> BarAttr {
        let (numerator, denominator) = self.settings.default_time;
        let mut seed = BarAttr {
            time: Some(TimeAttr {
                numerator,
                denominator,
                numeric: false,
            }),
            divisions: Some(self.divisions),
            ..Default::default()
        };
        if part.staves > 1 {
            seed.staves = Some(part.staves);
            for staff in 1..=part.staves {
                seed.set_clef(clef_from_name(&self.settings.default_clef, Some(staff)));
            }
        } else {
            seed.set_clef(clef_from_name(&self.settings.default_clef, None));
        }
        seed
    }

    fn measure(&self, bar: &Bar, number: u32, mut attr: BarAttr, sink: &mut dyn ScoreSink) -> OpenMeasure {
        sink.emit(OutputOp::StartMeasure {
            number,
            implicit: bar.pickup && number == 0,
        });
        let attributes = AttributesOp {
            divisions: attr.divisions,
            key: attr.key.take(),
            time: attr.time,
            staves: attr.staves,
            clefs: std::mem::take(&mut attr.clefs),
        };
        if !attributes.is_empty() {
            sink.emit(OutputOp::Attributes(attributes));
        }
        if let Some(left) = attr.left.take() {
            sink.emit(OutputOp::Barline {
                side: BarSide::Left,
                barline: left,
            });
        }
        if let Some(tempo) = attr.tempo.take() {
            sink.emit(OutputOp::Tempo(tempo));
        }
        for item in &bar.items {
            self.item(item, sink);
        }
        OpenMeasure { right: attr.right }
    }

    fn item(&self, item: &BarItem, sink: &mut dyn ScoreSink) {
        match item {
            BarItem::Note(note) => {
                self.before(&note.mus, sink);
                let duration = if note.is_grace() {
                    0
                } else {
                    to_divisions(note.mus.duration, self.divisions)
                };
                sink.emit(OutputOp::Note {
                    note: note.clone(),
                    duration,
                });
                after(&note.mus, sink);
            }
            BarItem::Rest(rest) => {
                self.before(&rest.mus, sink);
                let duration = to_divisions(rest.mus.duration, self.divisions);
                if rest.shown {
                    sink.emit(OutputOp::Rest {
                        rest: rest.clone(),
                        duration,
                    });
                } else if !rest.mus.chord && duration > 0 {
                    sink.emit(OutputOp::Forward {
                        duration,
                        voice: rest.mus.voice,
                        staff: rest.mus.staff,
                    });
                }
                after(&rest.mus, sink);
            }
            BarItem::Backup(backup) => {
                let duration = to_divisions(backup.duration, self.divisions);
                if duration > 0 {
                    sink.emit(OutputOp::Backup { duration });
                }
            }
        }
    }

    fn before(&self, mus: &BarMus, sink: &mut dyn ScoreSink) {
        for dynamic in mus.dynamics.iter().filter(|d| d.before) {
            sink.emit(OutputOp::Dynamic(dynamic.clone()));
        }
        for shift in mus.octave_shifts.iter().filter(|s| s.kind != ShiftKind::Stop) {
            sink.emit(OutputOp::OctaveShift(*shift));
        }
        for harmony in &mus.harmonies {
            sink.emit(OutputOp::Harmony {
                harmony: harmony.clone(),
                offset: to_divisions(harmony.offset, self.divisions),
            });
        }
    }
}

fn after(mus: &BarMus, sink: &mut dyn ScoreSink) {
    for dynamic in mus.dynamics.iter().filter(|d| !d.before) {
        sink.emit(OutputOp::Dynamic(dynamic.clone()));
    }
    for shift in mus.octave_shifts.iter().filter(|s| s.kind == ShiftKind::Stop) {
        sink.emit(OutputOp::OctaveShift(*shift));
    }
}

/// Attributes of a skipped bar. A right barline closes the measure already
/// open; everything else waits for the next emitted bar.
fn carry(carried: &mut Option<BarAttr>, open: &mut Option<OpenMeasure>, attr: &BarAttr) {
    let mut attr = attr.clone();
    if let (Some(measure), Some(right)) = (open.as_mut(), attr.right.take()) {
        match measure.right.as_mut() {
            Some(existing) => {
                existing.style = right.style.or(existing.style.take());
                existing.repeat = right.repeat.or(existing.repeat);
                existing.ending = right.ending.or(existing.ending);
            }
            None => measure.right = Some(right),
        }
    }
    match carried.as_mut() {
        Some(existing) => existing.merge(&attr, true),
        None => *carried = Some(attr),
    }
}

fn close_measure(measure: OpenMeasure, sink: &mut dyn ScoreSink) {
    if let Some(right) = measure.right {
        sink.emit(OutputOp::Barline {
            side: BarSide::Right,
            barline: right,
        });
    }
    sink.emit(OutputOp::EndMeasure);
}

/// Distinct drum instruments in order of first use.
fn instruments(part: &Part) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let names = part
        .bars
        .iter()
        .flat_map(|b| b.items.iter())
        .filter_map(BarItem::as_note)
        .filter_map(|n| n.instrument.as_ref());
    for name in names {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

fn part_label(part: &Part, id: PartId) -> String {
    match (&part.name, &part.context_id) {
        (Some(name), _) => format!("\"{}\"", name),
        (None, Some(context)) => format!("\"{}\"", context),
        (None, None) => format!("#{}", id + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BarNote, BarRest, NoteType, PartGroup};
    use crate::models::{ratio, zero, Pitch, Rational};
    use crate::renderers::musicxml::ops::OpRecorder;

    fn quarter(onset: Rational) -> BarItem {
        let mus = BarMus::new(ratio(1, 4), NoteType { log: 2, dots: 0 }, onset, 1);
        BarItem::Note(BarNote::new(mus, Pitch::new(0, 0, 4)))
    }

    fn full_bar() -> Bar {
        let mut bar = Bar::new();
        bar.items = (0..4).map(|i| quarter(ratio(i, 4))).collect();
        bar
    }

    fn single_part(bars: Vec<Bar>) -> Score {
        let mut part = Part::new(None);
        part.bars = bars;
        let mut score = Score::new();
        score.parts.push(part);
        score.layout.push(ScoreEntry::Part(0));
        score
    }

    fn walk(score: &Score) -> (OpRecorder, Diagnostics) {
        let settings = ConversionSettings::default();
        let mut recorder = OpRecorder::new();
        let diagnostics = EmissionWalker::new(score, &settings).walk(&mut recorder);
        (recorder, diagnostics)
    }

    #[test]
    fn test_first_bar_is_seeded() {
        let (recorder, _) = walk(&single_part(vec![full_bar()]));
        let attributes = recorder
            .ops
            .iter()
            .find_map(|op| match op {
                OutputOp::Attributes(a) => Some(a.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(attributes.divisions, Some(1));
        assert_eq!(attributes.time.map(|t| (t.numerator, t.denominator)), Some((4, 4)));
        assert_eq!(attributes.clefs[0].sign, "G");
        assert_eq!(attributes.clefs[0].line, Some(2));
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::Attributes(_))), 1);
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::Note { duration: 1, .. })), 4);
    }

    #[test]
    fn test_explicit_attributes_win_over_seed() {
        let mut bar = full_bar();
        bar.attr_mut().time = Some(TimeAttr {
            numerator: 3,
            denominator: 4,
            numeric: true,
        });
        bar.items.pop();
        let (recorder, _) = walk(&single_part(vec![bar]));
        let time = recorder.ops.iter().find_map(|op| match op {
            OutputOp::Attributes(a) => a.time,
            _ => None,
        });
        assert_eq!(time.map(|t| (t.numerator, t.numeric)), Some((3, true)));
    }

    #[test]
    fn test_empty_bar_is_skipped_and_barline_kept() {
        let mut trailing = Bar::new();
        trailing.attr_mut().right = Some(Barline::styled("light-heavy"));
        let (recorder, _) = walk(&single_part(vec![full_bar(), trailing]));
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::StartMeasure { .. })), 1);
        let close: Vec<&OutputOp> = recorder.ops.iter().rev().skip(1).take(2).collect();
        assert_eq!(close[0], &OutputOp::EndMeasure);
        assert!(matches!(
            close[1],
            OutputOp::Barline { side: BarSide::Right, barline } if barline.style.as_deref() == Some("light-heavy")
        ));
    }

    #[test]
    fn test_pickup_is_measure_zero() {
        let mut pickup = Bar::new();
        pickup.items.push(quarter(zero()));
        pickup.pickup = true;
        let (recorder, _) = walk(&single_part(vec![pickup, full_bar()]));
        let numbers: Vec<(u32, bool)> = recorder
            .ops
            .iter()
            .filter_map(|op| match op {
                OutputOp::StartMeasure { number, implicit } => Some((*number, *implicit)),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![(0, true), (1, false)]);
    }

    #[test]
    fn test_skip_becomes_forward() {
        let mut bar = Bar::new();
        let mus = BarMus::new(ratio(1, 1), NoteType { log: 0, dots: 0 }, zero(), 2);
        bar.items.push(BarItem::Rest(BarRest {
            mus,
            shown: false,
            show_type: true,
            full_measure: false,
            position: None,
        }));
        bar.items.push(BarItem::Backup(crate::ir::BarBackup { duration: ratio(1, 1) }));
        bar.items.extend(full_bar().items);
        let (recorder, _) = walk(&single_part(vec![bar]));
        assert!(recorder
            .ops
            .contains(&OutputOp::Forward { duration: 4, voice: 2, staff: None }));
        assert!(recorder.ops.contains(&OutputOp::Backup { duration: 4 }));
    }

    #[test]
    fn test_empty_part_suppressed_with_group() {
        let mut score = single_part(vec![full_bar()]);
        score.parts.push(Part::new(Some("silent".into())));
        score.groups.push(PartGroup {
            number: 1,
            entries: vec![ScoreEntry::Part(1)],
            ..Default::default()
        });
        score.layout.push(ScoreEntry::Group(0));
        let (recorder, diagnostics) = walk(&score);
        assert_eq!(diagnostics.count(DiagnosticKind::EmptyPart), 1);
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::ScorePart(_))), 1);
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::StartPartGroup(_))), 0);
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::StartPart { .. })), 1);
    }

    #[test]
    fn test_divisions_override() {
        let score = single_part(vec![full_bar()]);
        let settings = ConversionSettings {
            divisions: Some(8),
            ..Default::default()
        };
        let walker = EmissionWalker::new(&score, &settings);
        assert_eq!(walker.divisions(), 8);
        let mut recorder = OpRecorder::new();
        walker.walk(&mut recorder);
        assert_eq!(recorder.count(|op| matches!(op, OutputOp::Note { duration: 8, .. })), 4);
    }
}
