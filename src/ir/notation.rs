//! Small value objects attached to notes, rests and bars.

use serde::{Deserialize, Serialize};

use crate::models::duration::note_value;
use crate::models::Rational;

/// Start or end of a spanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Start,
    Stop,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::Start => "start",
            Edge::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Wavy,
}

impl LineStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStyle::Solid => "solid",
            LineStyle::Dashed => "dashed",
            LineStyle::Dotted => "dotted",
            LineStyle::Wavy => "wavy",
        }
    }

    /// Parse a `Glissando.style` value.
    pub fn from_scheme(value: &str) -> LineStyle {
        match value.trim_start_matches(['#', '\'']) {
            "dashed-line" => LineStyle::Dashed,
            "dotted-line" => LineStyle::Dotted,
            "zigzag" | "trill" => LineStyle::Wavy,
            _ => LineStyle::Solid,
        }
    }
}

/// Displayed duration: base value and dots, independent of tuplet scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteType {
    pub log: i8,
    pub dots: u8,
}

impl NoteType {
    /// Undotted length of this type in whole notes.
    pub fn base(&self) -> Rational {
        note_value(self.log)
    }

    /// The plain or dotted type written for `length`, whole note when none fits.
    pub fn from_length(length: Rational) -> NoteType {
        for log in -2i8..=10 {
            let base = NoteType { log, dots: 0 }.base();
            let mut total = base;
            let mut add = base;
            for dots in 0u8..=3 {
                if total == length {
                    return NoteType { log, dots };
                }
                add /= 2;
                total += add;
            }
        }
        NoteType { log: 0, dots: 0 }
    }
}

/// Tuplet bracket membership of one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuplet {
    pub actual: i64,
    pub normal: i64,
    /// Bracket start or stop on this note
    pub edge: Option<Edge>,
    /// Nesting level, 1 for the outermost
    pub nr: u32,
    /// Printed bracket (false for `\scaleDurations`)
    pub bracket: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slur {
    pub nr: u32,
    pub edge: Edge,
    pub phrasing: bool,
    pub line: LineStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieType {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeamState {
    #[default]
    None,
    Begin,
    Continue,
    End,
}

impl BeamState {
    pub fn xml_name(&self) -> Option<&'static str> {
        match self {
            BeamState::None => None,
            BeamState::Begin => Some("begin"),
            BeamState::Continue => Some("continue"),
            BeamState::End => Some("end"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glissando {
    pub edge: Edge,
    pub line: LineStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TremoloKind {
    Single,
    Start,
    Stop,
}

impl TremoloKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TremoloKind::Single => "single",
            TremoloKind::Start => "start",
            TremoloKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tremolo {
    pub kind: TremoloKind,
    /// Number of tremolo strokes
    pub lines: u8,
}

/// Beam strokes of a tremolo written as `:8`, `:16`, `:32`.
pub fn tremolo_lines(duration: u32) -> u8 {
    match duration {
        0..=8 => 1,
        16 => 2,
        32 => 3,
        64 => 4,
        d if d > 64 => 5,
        _ => 1,
    }
}

/// Chord symbol attached to a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harmony {
    pub root_step: u8,
    pub root_alter: i8,
    #[serde(default)]
    pub bass: Option<(u8, i8)>,
    /// Chord modifier text such as `m7`
    #[serde(default)]
    pub text: Option<String>,
    /// Distance from the start of the note it is attached to
    pub offset: Rational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftKind {
    /// Notes sound higher than written (`8va`)
    Down,
    /// Notes sound lower than written (`8vb`)
    Up,
    Stop,
}

impl ShiftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftKind::Down => "down",
            ShiftKind::Up => "up",
            ShiftKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OctaveShift {
    pub kind: ShiftKind,
    pub size: u8,
}

impl OctaveShift {
    /// Shift for `\ottava #n`; `None` for `#0`.
    pub fn from_ottava(octaves: i8) -> Option<OctaveShift> {
        if octaves == 0 {
            return None;
        }
        let kind = if octaves > 0 { ShiftKind::Down } else { ShiftKind::Up };
        let size = if octaves.unsigned_abs() >= 2 { 15 } else { 8 };
        Some(OctaveShift { kind, size })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WedgeKind {
    Crescendo,
    Diminuendo,
    Stop,
}

impl WedgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WedgeKind::Crescendo => "crescendo",
            WedgeKind::Diminuendo => "diminuendo",
            WedgeKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DynamicsKind {
    Mark { sign: String },
    Wedge { wedge: WedgeKind },
    Text { text: String },
    Dashes { edge: Edge },
}

/// A dynamic written before or after the note it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dynamics {
    pub kind: DynamicsKind,
    pub before: bool,
}

/// Dynamic marks available in MusicXML `<dynamics>`.
pub const DYNAMIC_MARKS: &[&str] = &[
    "ppppp", "pppp", "ppp", "pp", "p", "mp", "mf", "f", "ff", "fff", "ffff", "fffff", "fp", "sf",
    "sfp", "sfpp", "sfz", "sffz", "sfzp", "fz", "pf", "rf", "rfz", "n",
];

/// Metronome mark and tempo words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoDir {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub unit: Option<NoteType>,
    #[serde(default)]
    pub bpm: Option<u32>,
    /// Quarter notes per minute for playback
    #[serde(default)]
    pub playback: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndingEdge {
    Start,
    Stop,
    Discontinue,
}

impl EndingEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndingEdge::Start => "start",
            EndingEdge::Stop => "stop",
            EndingEdge::Discontinue => "discontinue",
        }
    }
}

/// Alternative ending bracket covering repeat iterations `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ending {
    pub start: u32,
    pub end: u32,
    pub edge: EndingEdge,
}

impl Ending {
    /// Iteration list as written in MusicXML, e.g. `1, 2`.
    pub fn numbers(&self) -> String {
        (self.start..=self.end.max(self.start))
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syllabic {
    Single,
    Begin,
    Middle,
    End,
}

impl Syllabic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Syllabic::Single => "single",
            Syllabic::Begin => "begin",
            Syllabic::Middle => "middle",
            Syllabic::End => "end",
        }
    }
}

/// One syllable attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyric {
    pub text: String,
    pub syllabic: Syllabic,
    /// Verse number
    pub number: u32,
    /// Extender line follows
    pub extend: bool,
}

/// Where a notation token belongs inside MusicXML `<notations>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotationGroup {
    Articulation(&'static str),
    Ornament(&'static str),
    Technical(&'static str),
    Fermata(&'static str),
}

/// Classify an articulation token (`staccato`, `.`, `trill`, `upbow`, ...).
pub fn lookup_notation(token: &str) -> Option<NotationGroup> {
    use NotationGroup::*;
    let token = token.trim_start_matches('\\');
    let group = match token {
        "." | "staccato" => Articulation("staccato"),
        "-" | "tenuto" => Articulation("tenuto"),
        ">" | "accent" => Articulation("accent"),
        "^" | "marcato" => Articulation("strong-accent"),
        "!" | "staccatissimo" => Articulation("staccatissimo"),
        "_" | "portato" => Articulation("detached-legato"),
        "espressivo" => Articulation("soft-accent"),
        "spiccato" => Articulation("spiccato"),
        "breathe" => Articulation("breath-mark"),
        "stress" => Articulation("stress"),
        "unstress" => Articulation("unstress"),
        "trill" => Ornament("trill-mark"),
        "prall" => Ornament("inverted-mordent"),
        "mordent" => Ornament("mordent"),
        "turn" => Ornament("turn"),
        "reverseturn" => Ornament("inverted-turn"),
        "upbow" => Technical("up-bow"),
        "downbow" => Technical("down-bow"),
        "open" => Technical("open-string"),
        "stopped" | "+" => Technical("stopped"),
        "flageolet" => Technical("harmonic"),
        "thumb" => Technical("thumb-position"),
        "snappizzicato" => Technical("snap-pizzicato"),
        "fermata" => Fermata("normal"),
        "shortfermata" => Fermata("angled"),
        "longfermata" | "verylongfermata" => Fermata("square"),
        _ => return None,
    };
    Some(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_notation() {
        assert_eq!(lookup_notation("."), Some(NotationGroup::Articulation("staccato")));
        assert_eq!(lookup_notation("\\upbow"), Some(NotationGroup::Technical("up-bow")));
        assert_eq!(lookup_notation("trill"), Some(NotationGroup::Ornament("trill-mark")));
        assert_eq!(lookup_notation("fermata"), Some(NotationGroup::Fermata("normal")));
        assert_eq!(lookup_notation("segno"), None);
    }

    #[test]
    fn test_ottava_shift() {
        assert_eq!(
            OctaveShift::from_ottava(1),
            Some(OctaveShift { kind: ShiftKind::Down, size: 8 })
        );
        assert_eq!(
            OctaveShift::from_ottava(-1),
            Some(OctaveShift { kind: ShiftKind::Up, size: 8 })
        );
        assert_eq!(OctaveShift::from_ottava(2).map(|s| s.size), Some(15));
        assert_eq!(OctaveShift::from_ottava(0), None);
    }

    #[test]
    fn test_tremolo_lines() {
        assert_eq!(tremolo_lines(8), 1);
        assert_eq!(tremolo_lines(16), 2);
        assert_eq!(tremolo_lines(32), 3);
    }

    #[test]
    fn test_ending_numbers() {
        let ending = Ending { start: 1, end: 2, edge: EndingEdge::Start };
        assert_eq!(ending.numbers(), "1, 2");
    }

    #[test]
    fn test_note_type_from_length() {
        use crate::models::ratio;
        assert_eq!(NoteType::from_length(ratio(3, 8)), NoteType { log: 2, dots: 1 });
        assert_eq!(NoteType::from_length(ratio(2, 1)), NoteType { log: -1, dots: 0 });
        assert_eq!(NoteType::from_length(ratio(7, 16)), NoteType { log: 2, dots: 2 });
        assert_eq!(NoteType::from_length(ratio(5, 8)), NoteType { log: 0, dots: 0 });
        assert_eq!(NoteType { log: i8::MIN, dots: 0 }.base(), NoteType { log: -30, dots: 0 }.base());
    }
}
