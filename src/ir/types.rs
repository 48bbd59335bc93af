//! Measure-level score model
//!
//! A [`Bar`] holds an optional leading [`BarAttr`] and an ordered list of
//! [`BarItem`]s. Within a bar, voices follow one another separated by
//! [`BarBackup`]s that rewind the time cursor. Between two backups the
//! non-chord durations of one voice add up to the bar length.
//!
//! ```text
//! Bar
//! ├── attr: clef, key, time, divisions, left/right barline, staves, tempo
//! └── items
//!     ├── Note  (voice 1)
//!     ├── Note  (voice 1, chord)
//!     ├── Rest  (voice 1)
//!     ├── Backup
//!     └── Note  (voice 2) ...
//! ```

use serde::{Deserialize, Serialize};

use super::notation::{
    BeamState, Dynamics, Edge, Ending, Glissando, Harmony, Lyric, NoteType, OctaveShift, Slur,
    TempoDir, TieType, Tremolo, Tuplet,
};
use crate::models::{zero, Pitch, Rational};

/// Clef with its staff number (`None` on single-staff parts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClefAttr {
    pub sign: String,
    pub line: Option<u8>,
    #[serde(default)]
    pub octave_change: i8,
    #[serde(default)]
    pub staff: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttr {
    pub fifths: i32,
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAttr {
    pub numerator: u32,
    pub denominator: u32,
    /// Print digits even for 4/4 and 2/2
    pub numeric: bool,
}

impl TimeAttr {
    pub fn measure(&self) -> Rational {
        Rational::new(self.numerator as i64, self.denominator.max(1) as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatDir {
    Forward,
    Backward,
}

/// Bar line on one side of a bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barline {
    /// MusicXML bar-style
    pub style: Option<String>,
    pub repeat: Option<RepeatDir>,
    pub ending: Option<Ending>,
}

impl Barline {
    pub fn styled(style: &str) -> Self {
        Self {
            style: Some(style.to_string()),
            ..Default::default()
        }
    }

    fn merge(&mut self, other: &Barline, override_: bool) {
        merge_field(&mut self.style, &other.style, override_);
        merge_field(&mut self.repeat, &other.repeat, override_);
        merge_field(&mut self.ending, &other.ending, override_);
    }
}

fn merge_field<T: Clone>(target: &mut Option<T>, other: &Option<T>, override_: bool) {
    if other.is_some() && (target.is_none() || override_) {
        *target = other.clone();
    }
}

/// Attributes that may open a bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarAttr {
    pub clefs: Vec<ClefAttr>,
    pub key: Option<KeyAttr>,
    pub time: Option<TimeAttr>,
    pub divisions: Option<u32>,
    pub left: Option<Barline>,
    pub right: Option<Barline>,
    pub staves: Option<u32>,
    pub tempo: Option<TempoDir>,
}

impl BarAttr {
    pub fn has_attr(&self) -> bool {
        !self.clefs.is_empty()
            || self.key.is_some()
            || self.time.is_some()
            || self.divisions.is_some()
            || self.left.is_some()
            || self.right.is_some()
            || self.staves.is_some()
            || self.tempo.is_some()
    }

    /// Set a clef, replacing an earlier one on the same staff.
    pub fn set_clef(&mut self, clef: ClefAttr) {
        match self.clefs.iter_mut().find(|c| c.staff == clef.staff) {
            Some(existing) => *existing = clef,
            None => self.clefs.push(clef),
        }
    }

    /// Combine with `other`. Values already set win unless `override_` is set.
    /// Clefs on different staves are concatenated.
    pub fn merge(&mut self, other: &BarAttr, override_: bool) {
        for clef in &other.clefs {
            match self.clefs.iter_mut().find(|c| c.staff == clef.staff) {
                Some(existing) if override_ => *existing = clef.clone(),
                Some(_) => {}
                None => self.clefs.push(clef.clone()),
            }
        }
        merge_field(&mut self.key, &other.key, override_);
        merge_field(&mut self.time, &other.time, override_);
        merge_field(&mut self.divisions, &other.divisions, override_);
        merge_field(&mut self.staves, &other.staves, override_);
        merge_field(&mut self.tempo, &other.tempo, override_);
        merge_barline(&mut self.left, &other.left, override_);
        merge_barline(&mut self.right, &other.right, override_);
    }
}

fn merge_barline(target: &mut Option<Barline>, other: &Option<Barline>, override_: bool) {
    match (target.as_mut(), other) {
        (Some(t), Some(o)) => t.merge(o, override_),
        (None, Some(o)) => *target = Some(o.clone()),
        _ => {}
    }
}

/// Fields shared by notes and rests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarMus {
    /// Sounding duration after tuplet scaling
    pub duration: Rational,
    /// Written note type
    pub note_type: NoteType,
    /// Absolute start time within the part
    pub onset: Rational,
    pub voice: u32,
    pub voice_name: Option<String>,
    pub staff: Option<u32>,
    /// Secondary note of a chord
    pub chord: bool,
    pub tuplets: Vec<Tuplet>,
    pub dynamics: Vec<Dynamics>,
    pub octave_shifts: Vec<OctaveShift>,
    pub harmonies: Vec<Harmony>,
}

impl BarMus {
    pub fn new(duration: Rational, note_type: NoteType, onset: Rational, voice: u32) -> Self {
        Self {
            duration,
            note_type,
            onset,
            voice,
            voice_name: None,
            staff: None,
            chord: false,
            tuplets: Vec::new(),
            dynamics: Vec::new(),
            octave_shifts: Vec::new(),
            harmonies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceNote {
    pub slash: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarNote {
    pub mus: BarMus,
    pub pitch: Pitch,
    /// Drum or rhythmic-staff note; `pitch` is the display position
    pub unpitched: bool,
    /// Instrument name for drum notes
    pub instrument: Option<String>,
    pub grace: Option<GraceNote>,
    pub ties: Vec<TieType>,
    pub slurs: Vec<Slur>,
    pub articulations: Vec<String>,
    pub ornaments: Vec<String>,
    pub technical: Vec<String>,
    pub fermata: Option<String>,
    pub trill_spanner: Option<Edge>,
    pub glissandos: Vec<Glissando>,
    pub tremolo: Option<Tremolo>,
    pub fingerings: Vec<u8>,
    pub beam: BeamState,
    pub lyrics: Vec<Lyric>,
}

impl BarNote {
    pub fn new(mus: BarMus, pitch: Pitch) -> Self {
        Self {
            mus,
            pitch,
            unpitched: false,
            instrument: None,
            grace: None,
            ties: Vec::new(),
            slurs: Vec::new(),
            articulations: Vec::new(),
            ornaments: Vec::new(),
            technical: Vec::new(),
            fermata: None,
            trill_spanner: None,
            glissandos: Vec::new(),
            tremolo: None,
            fingerings: Vec::new(),
            beam: BeamState::None,
            lyrics: Vec::new(),
        }
    }

    pub fn is_grace(&self) -> bool {
        self.grace.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRest {
    pub mus: BarMus,
    /// Visible rest; `false` for spacer skips
    pub shown: bool,
    /// Print a note type (whole-bar rests do not)
    pub show_type: bool,
    /// `R`, a rest filling the whole bar
    pub full_measure: bool,
    /// Vertical position for `c4\rest`
    pub position: Option<Pitch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarBackup {
    pub duration: Rational,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "lowercase")]
pub enum BarItem {
    Note(BarNote),
    Rest(BarRest),
    Backup(BarBackup),
}

impl BarItem {
    pub fn mus(&self) -> Option<&BarMus> {
        match self {
            BarItem::Note(n) => Some(&n.mus),
            BarItem::Rest(r) => Some(&r.mus),
            BarItem::Backup(_) => None,
        }
    }

    pub fn mus_mut(&mut self) -> Option<&mut BarMus> {
        match self {
            BarItem::Note(n) => Some(&mut n.mus),
            BarItem::Rest(r) => Some(&mut r.mus),
            BarItem::Backup(_) => None,
        }
    }

    pub fn as_note(&self) -> Option<&BarNote> {
        match self {
            BarItem::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_note_mut(&mut self) -> Option<&mut BarNote> {
        match self {
            BarItem::Note(n) => Some(n),
            _ => None,
        }
    }

    /// Time this item moves the cursor: zero for chord members and graces.
    pub fn advance(&self) -> Rational {
        match self {
            BarItem::Note(n) if n.mus.chord || n.is_grace() => zero(),
            BarItem::Note(n) => n.mus.duration,
            BarItem::Rest(r) if r.mus.chord => zero(),
            BarItem::Rest(r) => r.mus.duration,
            BarItem::Backup(b) => -b.duration,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, BarItem::Rest(r) if !r.shown)
    }
}

/// One measure of one part or section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub attr: Option<BarAttr>,
    pub items: Vec<BarItem>,
    /// Written as an upbeat shorter than the time signature
    #[serde(default)]
    pub pickup: bool,
}

impl Bar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attribute object, created on first use.
    pub fn attr_mut(&mut self) -> &mut BarAttr {
        self.attr.get_or_insert_with(BarAttr::default)
    }

    pub fn has_attr(&self) -> bool {
        self.attr.as_ref().map_or(false, BarAttr::has_attr)
    }

    /// No notes, rests or backups (attributes alone do not count).
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Holds only spacer skips.
    pub fn is_skip(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|i| i.is_skip() || matches!(i, BarItem::Backup(_)))
    }

    pub fn has_music(&self) -> bool {
        self.items.iter().any(|i| i.mus().is_some() && !i.is_skip())
    }

    /// Time cursor after the last item, relative to the bar start.
    pub fn cursor(&self) -> Rational {
        self.items.iter().map(BarItem::advance).fold(zero(), |a, b| a + b)
    }

    /// Durations of each voice segment between backups.
    pub fn segment_lengths(&self) -> Vec<Rational> {
        let mut out = vec![zero()];
        for item in &self.items {
            match item {
                BarItem::Backup(_) => out.push(zero()),
                other => {
                    if let Some(last) = out.last_mut() {
                        *last += other.advance();
                    }
                }
            }
        }
        out
    }

    /// Splice another voice's bar into this one.
    ///
    /// Attributes merge first. An all-skip bar fills a bar that is still
    /// empty and contributes nothing to one that already holds items;
    /// otherwise a backup rewinds to the bar start and the new items follow.
    pub fn inject(&mut self, incoming: &Bar, override_: bool) {
        if let Some(attr) = incoming.attr.as_ref() {
            match self.attr.as_mut() {
                Some(existing) => existing.merge(attr, override_),
                None => self.attr = Some(attr.clone()),
            }
        }
        self.pickup |= incoming.pickup;
        if incoming.is_empty() {
            return;
        }
        if incoming.is_skip() {
            if self.items.is_empty() {
                self.items.extend(incoming.items.iter().cloned());
            }
            return;
        }
        let cursor = self.cursor();
        if cursor != zero() {
            self.items.push(BarItem::Backup(BarBackup { duration: cursor }));
        }
        self.items.extend(incoming.items.iter().cloned());
    }
}

/// Positional merge: bar `i` of `incoming` goes into bar `offset + i` of
/// `base`, which is extended with empty bars when it is shorter.
pub fn merge_bars(base: &[Bar], incoming: &[Bar], offset: usize, override_: bool) -> Vec<Bar> {
    let mut merged = base.to_vec();
    let needed = offset + incoming.len();
    if merged.len() < needed {
        merged.resize_with(needed, Bar::new);
    }
    for (i, bar) in incoming.iter().enumerate() {
        merged[offset + i].inject(bar, override_);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ratio;

    fn quarter_note(step: u8, voice: u32) -> BarItem {
        let mus = BarMus::new(ratio(1, 4), NoteType { log: 2, dots: 0 }, zero(), voice);
        BarItem::Note(BarNote::new(mus, Pitch::new(step, 0, 4)))
    }

    fn skip(length: Rational) -> BarItem {
        let mus = BarMus::new(length, NoteType { log: 0, dots: 0 }, zero(), 1);
        BarItem::Rest(BarRest {
            mus,
            shown: false,
            show_type: true,
            full_measure: false,
            position: None,
        })
    }

    fn bar_of(items: Vec<BarItem>) -> Bar {
        Bar {
            attr: None,
            items,
            pickup: false,
        }
    }

    #[test]
    fn test_inject_adds_backup() {
        let mut bar = bar_of((0..4).map(|s| quarter_note(s, 1)).collect());
        let other = bar_of((0..4).map(|s| quarter_note(s, 2)).collect());
        bar.inject(&other, false);
        assert_eq!(bar.items.len(), 9);
        assert_eq!(bar.items[4], BarItem::Backup(BarBackup { duration: ratio(1, 1) }));
        assert_eq!(bar.segment_lengths(), vec![ratio(1, 1), ratio(1, 1)]);
    }

    #[test]
    fn test_inject_skip_bar_dropped() {
        let mut bar = bar_of(vec![quarter_note(0, 1)]);
        let mut other = bar_of(vec![skip(ratio(1, 1))]);
        other.attr_mut().key = Some(KeyAttr { fifths: 2, mode: "major".into() });
        bar.inject(&other, false);
        assert_eq!(bar.items.len(), 1);
        assert_eq!(bar.attr.unwrap().key.unwrap().fifths, 2);
    }

    #[test]
    fn test_inject_skip_bar_fills_empty_bar() {
        let mut bar = Bar::new();
        bar.inject(&bar_of(vec![skip(ratio(1, 1))]), false);
        assert_eq!(bar.items.len(), 1);
        assert!(bar.is_skip());
        assert!(!bar.is_empty());

        let merged = merge_bars(&[], &[bar_of(vec![quarter_note(0, 1)]), bar_of(vec![skip(ratio(1, 1))])], 0, false);
        assert_eq!(merged.len(), 2);
        assert!(merged[1].is_skip());
    }

    #[test]
    fn test_chord_notes_do_not_advance() {
        let mut chord = quarter_note(2, 1);
        if let Some(mus) = chord.mus_mut() {
            mus.chord = true;
        }
        let bar = bar_of(vec![quarter_note(0, 1), chord]);
        assert_eq!(bar.cursor(), ratio(1, 4));
    }

    #[test]
    fn test_attr_merge_keeps_first() {
        let mut first = BarAttr::default();
        first.time = Some(TimeAttr { numerator: 3, denominator: 4, numeric: false });
        let mut second = BarAttr::default();
        second.time = Some(TimeAttr { numerator: 4, denominator: 4, numeric: false });
        second.clefs.push(ClefAttr { sign: "F".into(), line: Some(4), octave_change: 0, staff: Some(2) });
        let mut merged = first.clone();
        merged.merge(&second, false);
        assert_eq!(merged.time.unwrap().numerator, 3);
        assert_eq!(merged.clefs.len(), 1);
        merged.merge(&second, true);
        assert_eq!(merged.time.unwrap().numerator, 4);
    }

    #[test]
    fn test_merge_bars_extends_target() {
        let base = vec![bar_of(vec![quarter_note(0, 1)])];
        let incoming = vec![bar_of(vec![quarter_note(1, 2)]), bar_of(vec![quarter_note(2, 2)])];
        let merged = merge_bars(&base, &incoming, 0, false);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].items.len(), 3);
        assert_eq!(merged[1].items.len(), 1);
        // the source slices are untouched
        assert_eq!(base[0].items.len(), 1);
    }
}
