//! The parsed music tree handed over by the LilyPond front end.
//!
//! Node kinds form one closed enum. Post-events (ties, slurs, articulations,
//! dynamics) are siblings that follow the note they decorate; containers own
//! their children and are walked with explicit enter/exit events (see
//! [`super::events`]).

use serde::{Deserialize, Serialize};

use super::duration::{Duration, Rational};
use super::pitch::Pitch;

/// Opening or closing edge of a bracketed post-event (`(`/`)`, `[`/`]`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Span {
    Start,
    Stop,
}

/// Input modes entered with `\chordmode`, `\drummode`, `\lyricmode` and friends.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Note,
    Chord,
    Drum,
    Figure,
    Lyric,
}

/// Duration scalers: `\times 2/3`, `\tuplet 3/2`, `\scaleDurations 2/3`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    /// Fraction is the scale factor itself
    Times,
    /// Fraction is actual/normal, the inverse of the scale factor
    Tuplet,
    /// Like `Times` but without a printed bracket
    ScaleDurations,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraceKind {
    Grace,
    Acciaccatura,
    Appoggiatura,
    SlashedGrace,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    Volta,
    Unfold,
    Percent,
    Tremolo,
}

/// Lyric tokens that are not syllables.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LyricToken {
    /// `--` joins syllables of one word
    Hyphen,
    /// `__` extends the previous syllable
    Extender,
    /// `_` consumes a note without text
    Skip,
}

/// A value assigned by `\set`, `\override` or a `\with` block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(i64),
    Moment(Rational),
    Text(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Text(t) if t == "#t" || t == "##t" => Some(true),
            PropertyValue::Text(t) if t == "#f" || t == "##f" => Some(false),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(t) => Some(t.trim_matches('"')),
            _ => None,
        }
    }

    pub fn as_moment(&self) -> Option<Rational> {
        match self {
            PropertyValue::Moment(m) => Some(*m),
            _ => None,
        }
    }
}

/// One node of the input music tree.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Score {
        #[serde(default)]
        children: Vec<Node>,
    },
    Header {
        fields: Vec<(String, String)>,
    },
    /// `{ ... }`
    Sequential {
        #[serde(default)]
        children: Vec<Node>,
    },
    /// `<< ... >>`
    Simultaneous {
        #[serde(default)]
        children: Vec<Node>,
    },
    /// `\\` inside `<< >>`
    VoiceSeparator,
    /// `\new Staff = "id" \with { ... } music` or `\context ...`
    Context {
        context: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        with: Vec<(String, PropertyValue)>,
        #[serde(default)]
        children: Vec<Node>,
    },
    /// `\change Staff = "id"`
    Change {
        context: String,
        id: String,
    },
    Mode {
        mode: InputMode,
        #[serde(default)]
        children: Vec<Node>,
    },
    Transpose {
        from: Pitch,
        to: Pitch,
        #[serde(default)]
        children: Vec<Node>,
    },
    Scaler {
        scaling: ScalerKind,
        numerator: i64,
        denominator: i64,
        /// `\tuplet 3/2 4 { ... }` restarts the bracket every quarter
        #[serde(default)]
        span: Option<Duration>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Grace {
        grace: GraceKind,
        #[serde(default)]
        children: Vec<Node>,
    },
    /// `\repeat volta 2 { ... } \alternative { ... }`; the alternative is the last child.
    Repeat {
        repeat: RepeatKind,
        count: u32,
        #[serde(default)]
        children: Vec<Node>,
    },
    /// Children are the ending branches.
    Alternative {
        #[serde(default)]
        children: Vec<Node>,
    },
    /// `< c e g >4`; children are notes without durations plus post-events.
    Chord {
        #[serde(default)]
        duration: Option<Duration>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Note {
        pitch: Pitch,
        #[serde(default)]
        duration: Option<Duration>,
    },
    Rest {
        #[serde(default)]
        duration: Option<Duration>,
        /// `R`
        #[serde(default)]
        full_measure: bool,
    },
    Skip {
        #[serde(default)]
        duration: Option<Duration>,
    },
    /// Rhythm without pitch, as in a `RhythmicStaff`
    Unpitched {
        #[serde(default)]
        duration: Option<Duration>,
    },
    DrumNote {
        name: String,
        #[serde(default)]
        duration: Option<Duration>,
    },
    /// `q`
    RepeatChord {
        #[serde(default)]
        duration: Option<Duration>,
    },
    Clef {
        name: String,
    },
    KeySignature {
        pitch: Pitch,
        mode: String,
    },
    TimeSignature {
        numerator: u32,
        denominator: u32,
    },
    Partial {
        duration: Duration,
    },
    Tempo {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        unit: Option<Duration>,
        #[serde(default)]
        bpm: Option<u32>,
    },
    Tie,
    Slur {
        edge: Span,
    },
    PhrasingSlur {
        edge: Span,
    },
    Beam {
        edge: Span,
    },
    /// `\p`, `\<`, `\!`, `\cresc`
    Dynamic {
        name: String,
    },
    /// `-.`, `\staccato`, `\fermata`, `\trill`
    Articulation {
        name: String,
    },
    Fingering {
        finger: u8,
    },
    /// `:32`
    Tremolo {
        #[serde(default)]
        duration: Option<u32>,
    },
    /// Chord-mode modifier following a root: `:m7`, `/e`
    ChordSpecifier {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        bass: Option<Pitch>,
    },
    Set {
        #[serde(default)]
        context: Option<String>,
        property: String,
        value: PropertyValue,
    },
    Unset {
        #[serde(default)]
        context: Option<String>,
        property: String,
    },
    Override {
        #[serde(default)]
        context: Option<String>,
        grob: String,
        property: String,
        value: PropertyValue,
    },
    /// Argument-less command such as `\voiceOne`, `\rest` or `\bar`
    Command {
        name: String,
    },
    /// String literal, e.g. the argument of a preceding `\bar`
    String {
        value: String,
    },
    /// `\ottava #1`
    Ottava {
        octaves: i8,
    },
    /// `\lyricsto "voice" { ... }`
    LyricsTo {
        voice: String,
        #[serde(default)]
        children: Vec<Node>,
    },
    /// `\addlyrics { ... }`, bound to the preceding music
    AddLyrics {
        #[serde(default)]
        children: Vec<Node>,
    },
    LyricText {
        text: String,
        #[serde(default)]
        duration: Option<Duration>,
    },
    LyricItem {
        item: LyricToken,
    },
    /// Anything the front end could not classify
    Unknown {
        name: String,
    },
}

impl Node {
    /// Child nodes of a container, `None` for leaves.
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Score { children }
            | Node::Sequential { children }
            | Node::Simultaneous { children }
            | Node::Context { children, .. }
            | Node::Mode { children, .. }
            | Node::Transpose { children, .. }
            | Node::Scaler { children, .. }
            | Node::Grace { children, .. }
            | Node::Repeat { children, .. }
            | Node::Alternative { children }
            | Node::Chord { children, .. }
            | Node::LyricsTo { children, .. }
            | Node::AddLyrics { children } => Some(children),
            _ => None,
        }
    }

    /// Nodes that occupy musical time.
    pub fn is_rhythmic(&self) -> bool {
        matches!(
            self,
            Node::Note { .. }
                | Node::Rest { .. }
                | Node::Skip { .. }
                | Node::Unpitched { .. }
                | Node::DrumNote { .. }
                | Node::Chord { .. }
                | Node::RepeatChord { .. }
        )
    }

    /// Whether this node or anything below it occupies musical time.
    ///
    /// Grace notes and lyrics never do.
    pub fn contains_rhythm(&self) -> bool {
        match self {
            Node::Grace { .. } | Node::LyricsTo { .. } | Node::AddLyrics { .. } => false,
            Node::Mode {
                mode: InputMode::Lyric,
                ..
            } => false,
            node if node.is_rhythmic() => true,
            node => node
                .children()
                .map_or(false, |c| c.iter().any(Node::contains_rhythm)),
        }
    }

    /// Written duration of a rhythmic leaf or chord.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Node::Note { duration, .. }
            | Node::Rest { duration, .. }
            | Node::Skip { duration }
            | Node::Unpitched { duration }
            | Node::DrumNote { duration, .. }
            | Node::Chord { duration, .. }
            | Node::RepeatChord { duration }
            | Node::LyricText { duration, .. } => *duration,
            _ => None,
        }
    }

    /// Short kind name used in diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            Node::Score { .. } => "score",
            Node::Header { .. } => "header",
            Node::Sequential { .. } => "sequential",
            Node::Simultaneous { .. } => "simultaneous",
            Node::VoiceSeparator => "voice_separator",
            Node::Context { .. } => "context",
            Node::Change { .. } => "change",
            Node::Mode { .. } => "mode",
            Node::Transpose { .. } => "transpose",
            Node::Scaler { .. } => "scaler",
            Node::Grace { .. } => "grace",
            Node::Repeat { .. } => "repeat",
            Node::Alternative { .. } => "alternative",
            Node::Chord { .. } => "chord",
            Node::Note { .. } => "note",
            Node::Rest { .. } => "rest",
            Node::Skip { .. } => "skip",
            Node::Unpitched { .. } => "unpitched",
            Node::DrumNote { .. } => "drum_note",
            Node::RepeatChord { .. } => "repeat_chord",
            Node::Clef { .. } => "clef",
            Node::KeySignature { .. } => "key_signature",
            Node::TimeSignature { .. } => "time_signature",
            Node::Partial { .. } => "partial",
            Node::Tempo { .. } => "tempo",
            Node::Tie => "tie",
            Node::Slur { .. } => "slur",
            Node::PhrasingSlur { .. } => "phrasing_slur",
            Node::Beam { .. } => "beam",
            Node::Dynamic { .. } => "dynamic",
            Node::Articulation { .. } => "articulation",
            Node::Fingering { .. } => "fingering",
            Node::Tremolo { .. } => "tremolo",
            Node::ChordSpecifier { .. } => "chord_specifier",
            Node::Set { .. } => "set",
            Node::Unset { .. } => "unset",
            Node::Override { .. } => "override",
            Node::Command { .. } => "command",
            Node::String { .. } => "string",
            Node::Ottava { .. } => "ottava",
            Node::LyricsTo { .. } => "lyricsto",
            Node::AddLyrics { .. } => "addlyrics",
            Node::LyricText { .. } => "lyric_text",
            Node::LyricItem { .. } => "lyric_item",
            Node::Unknown { name } => name,
        }
    }

    // Constructors used when building trees by hand.

    pub fn seq(children: Vec<Node>) -> Node {
        Node::Sequential { children }
    }

    pub fn sim(children: Vec<Node>) -> Node {
        Node::Simultaneous { children }
    }

    pub fn note(pitch: Pitch, duration: Duration) -> Node {
        Node::Note {
            pitch,
            duration: Some(duration),
        }
    }

    pub fn rest(duration: Duration) -> Node {
        Node::Rest {
            duration: Some(duration),
            full_measure: false,
        }
    }

    pub fn skip(duration: Duration) -> Node {
        Node::Skip {
            duration: Some(duration),
        }
    }

    pub fn context(context: &str, id: Option<&str>, children: Vec<Node>) -> Node {
        Node::Context {
            context: context.to_string(),
            id: id.map(str::to_string),
            with: Vec::new(),
            children,
        }
    }

    pub fn command(name: &str) -> Node {
        Node::Command {
            name: name.to_string(),
        }
    }

    pub fn time(numerator: u32, denominator: u32) -> Node {
        Node::TimeSignature {
            numerator,
            denominator,
        }
    }

    /// `\bar "style"` as the command/string pair the front end produces.
    pub fn bar(style: &str) -> [Node; 2] {
        [
            Node::command("bar"),
            Node::String {
                value: style.to_string(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_rhythm_ignores_grace() {
        let grace = Node::Grace {
            grace: GraceKind::Grace,
            children: vec![Node::note(Pitch::new(0, 0, 4), Duration::new(4, 0))],
        };
        assert!(!grace.contains_rhythm());
        let seq = Node::seq(vec![grace, Node::rest(Duration::new(2, 0))]);
        assert!(seq.contains_rhythm());
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"kind":"sequential","children":[
            {"kind":"note","pitch":{"step":0,"octave":4},"duration":{"log":2}},
            {"kind":"slur","edge":"start"},
            {"kind":"set","property":"autoBeaming","value":false}
        ]}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        let children = node.children().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].duration(), Some(Duration::new(2, 0)));
        assert_eq!(children[1], Node::Slur { edge: Span::Start });
        match &children[2] {
            Node::Set { value, .. } => assert_eq!(value.as_bool(), Some(false)),
            other => panic!("unexpected node {:?}", other),
        }
    }
}
