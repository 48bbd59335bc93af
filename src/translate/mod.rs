//! Tree-walking translator
//!
//! Walks the enter/exit event stream of the music tree once, after the
//! timing pre-pass, and turns every node into calls on the
//! [`ScoreBuilder`]. Running time, tuplet and mode state live in one
//! [`TranslationState`].
//!
//! # Modules
//!
//! - **state**: the translation state, split by concern
//! - **music**: notes, rests, chords, grace notes, lyric items and bar lines
//! - **contexts**: staves, groups, voices, lyrics, forks and repeats
//! - **drums**: drum note names

mod contexts;
pub mod drums;
mod music;
pub mod state;

use log::debug;
use serde::Serialize;

pub use state::TranslationState;

use crate::builder::{LyricEvent, ScoreBuilder};
use crate::diagnostics::Diagnostic;
use crate::ir::{
    lookup_notation, tremolo_lines, Edge, LineStyle, NotationGroup, NoteType, Score, TempoDir,
    Tremolo, TremoloKind, WedgeKind, DYNAMIC_MARKS,
};
use crate::models::{
    key_fifths, Event, Events, LyricToken, Node, PropertyValue, Rational, Span,
};
use crate::settings::ConversionSettings;
use crate::timing::prepass::{self, Layout};

/// The finished score together with everything reported on the way.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub score: Score,
    pub diagnostics: Vec<Diagnostic>,
}

/// One translation of one tree. Not reusable.
pub struct Translator<'s> {
    settings: &'s ConversionSettings,
    layout: Layout,
    state: TranslationState,
    builder: ScoreBuilder,
}

impl<'s> Translator<'s> {
    pub fn new(settings: &'s ConversionSettings) -> Self {
        Self {
            settings,
            layout: Layout::default(),
            state: TranslationState::new(settings),
            builder: ScoreBuilder::new(),
        }
    }

    pub fn translate(mut self, root: &Node) -> ConversionResult {
        let (layout, mut diagnostics) =
            prepass::scan(root, self.settings.default_measure(), self.settings.unfold_repeats);
        self.layout = layout;

        let mut events = Events::new(root).unfolding_volta(self.settings.unfold_repeats);
        while let Some(event) = events.next() {
            match event {
                Event::Enter(node) => {
                    self.begin_child(node);
                    self.enter(node, &mut events);
                }
                Event::Leaf(node) => {
                    self.begin_child(node);
                    self.leaf(node, &events);
                    self.end_child();
                }
                Event::Exit(node) => {
                    self.exit(node, &events);
                    self.end_child();
                }
            }
        }

        if !self.state.chords.pending.is_empty() {
            debug!(
                "{} chord symbols found no note to attach to",
                self.state.chords.pending.len()
            );
        }
        let (score, built) = self.builder.finish();
        diagnostics.extend(built);
        debug!(
            "translation finished: {} parts, {} diagnostics",
            score.parts.len(),
            diagnostics.len()
        );
        ConversionResult {
            score,
            diagnostics: diagnostics.into_vec(),
        }
    }

    fn not_implemented(&mut self, what: &str) {
        self.builder.diagnostics_mut().not_implemented(what);
    }

    fn enter(&mut self, node: &Node, events: &mut Events) {
        match node {
            Node::Simultaneous { children } => self.enter_fork(children, events),
            Node::Context {
                context, id, with, ..
            } => self.enter_context(context, id.as_deref(), with, events),
            Node::Mode { mode, .. } => self.enter_mode(*mode, events),
            Node::Transpose { from, to, .. } => {
                self.state.transpose.push((*from, *to));
                self.push(state::Container::Transpose);
            }
            Node::Scaler {
                scaling,
                numerator,
                denominator,
                span,
                ..
            } => {
                let span = span.map(|d| d.length()).or(self.state.scaling.span);
                self.state
                    .scaling
                    .scaling
                    .tuplets
                    .push(*scaling, *numerator, *denominator, span);
                self.push(state::Container::Scaler);
            }
            Node::Grace { grace, .. } => {
                self.state.modes.grace = Some(*grace);
                self.state.modes.grace_first = true;
                self.push(state::Container::Grace);
            }
            Node::Repeat {
                repeat,
                count,
                children,
            } => self.enter_repeat(*repeat, *count, children),
            Node::Alternative { children } => self.enter_alternative(children.len(), events),
            Node::Chord { duration, .. } => self.enter_chord(*duration),
            Node::LyricsTo { voice, .. } => self.enter_lyrics_to(voice),
            Node::AddLyrics { .. } => self.enter_add_lyrics(),
            Node::Score { .. } | Node::Sequential { .. } => self.push(state::Container::Plain),
            // leaves never arrive as containers
            _ => self.push(state::Container::Plain),
        }
    }

    fn exit(&mut self, _node: &Node, events: &Events) {
        use state::Container;
        let Some(container) = self.state.containers.pop() else {
            return;
        };
        match container {
            Container::Plain | Container::Skipped | Container::Alternative { .. } => {}
            Container::Fork => self.exit_fork(events),
            Container::Part { drum } => {
                self.builder.close_section();
                self.state.timing.staff = None;
                if drum {
                    self.state.modes.modes.pop();
                }
            }
            Container::Piano => self.builder.end_piano(),
            Container::Group => self.builder.end_group(),
            Container::Voice { in_fork } => {
                self.builder.close_section();
                if !in_fork {
                    let clock = self.state.timing.clock;
                    self.builder.merge_fork(clock.since_bar, clock.total);
                }
            }
            Container::Devnull => self.builder.close_section(),
            Container::Lyrics { opened } => {
                if opened {
                    self.builder.close_lyrics();
                }
                self.state.modes.lyric_depth = self.state.modes.lyric_depth.saturating_sub(1);
            }
            Container::ChordNames => {
                self.state.modes.chord_depth = self.state.modes.chord_depth.saturating_sub(1);
                self.state.modes.modes.pop();
            }
            Container::Mode { lyric, chord } => {
                self.state.modes.modes.pop();
                if lyric {
                    self.state.modes.lyric_depth = self.state.modes.lyric_depth.saturating_sub(1);
                }
                if chord {
                    self.state.modes.chord_depth = self.state.modes.chord_depth.saturating_sub(1);
                }
            }
            Container::Transpose => {
                self.state.transpose.pop();
            }
            Container::Scaler => {
                if let Some(level) = self.state.scaling.scaling.tuplets.pop() {
                    if level.bracketed() && !level.pending_start {
                        self.builder.stop_tuplet(level.nr);
                    }
                }
            }
            Container::Grace => {
                self.state.modes.grace = None;
                self.state.modes.grace_first = false;
            }
            Container::Repeat { backward, .. } => {
                if backward {
                    self.builder.set_right_barline(music::backward_repeat(None));
                }
            }
            Container::TremoloRepeat => {
                self.state.scaling.scaling.tremolo = None;
                self.state.scaling.tremolo = None;
            }
            Container::Chord => self.exit_chord(events),
        }
    }

    fn push(&mut self, container: state::Container) {
        self.state.containers.push(container);
    }

    fn leaf(&mut self, node: &Node, events: &Events) {
        match node {
            Node::Note { pitch, duration } => {
                let pitch = self.state.transposed(pitch);
                self.head(music::Head::pitched(pitch), *duration, events);
            }
            Node::Rest {
                duration,
                full_measure,
            } => self.rest(*duration, *full_measure, events),
            Node::Skip { duration } => self.skip(*duration, events),
            Node::Unpitched { duration } => self.head(music::Head::unpitched(), *duration, events),
            Node::DrumNote { name, duration } => {
                self.head(music::Head::drum(name), *duration, events)
            }
            Node::RepeatChord { duration } => self.repeat_chord(*duration, events),
            Node::VoiceSeparator => self.next_separated_branch(),
            Node::Header { fields } => {
                for (key, value) in fields {
                    self.builder.set_header(key, value);
                }
            }
            Node::Change { context, id } => {
                if context == "Staff" {
                    self.builder.change_staff(id);
                } else {
                    self.not_implemented(&format!("\\change {}", context));
                }
            }
            Node::Clef { name } => self.builder.new_clef(name),
            Node::KeySignature { pitch, mode } => {
                let tonic = self.state.transposed(pitch);
                let mode = mode.trim_start_matches('\\');
                self.builder.new_key(key_fifths(&tonic, mode), mode);
            }
            Node::TimeSignature {
                numerator,
                denominator,
            } => {
                self.state.timing.set_time(*numerator, *denominator);
                let numeric = self.state.timing.numeric;
                self.builder.new_time(*numerator, *denominator, numeric);
            }
            Node::Partial { duration } => {
                let length = duration.length();
                let clock = &mut self.state.timing.clock;
                clock.partial = Some(length);
                if length < clock.measure {
                    self.builder.mark_pickup();
                }
            }
            Node::Tempo { text, unit, bpm } => self.builder.new_tempo(TempoDir {
                text: text.clone(),
                unit: unit.map(|u| NoteType {
                    log: u.log,
                    dots: u.dots,
                }),
                bpm: *bpm,
                playback: match (unit, bpm) {
                    (Some(unit), Some(bpm)) => Some(*bpm as f64 * 4.0 * to_f64(unit.length())),
                    _ => None,
                },
            }),
            Node::Tie => self.builder.tie(),
            Node::Slur { edge } => self.builder.slur(to_edge(*edge), false),
            Node::PhrasingSlur { edge } => self.builder.slur(to_edge(*edge), true),
            Node::Beam { edge } => {
                if self.state.modes.grace.is_none() {
                    self.builder.manual_beam(to_edge(*edge));
                }
            }
            Node::Dynamic { name } => self.dynamic(name),
            Node::Articulation { name } => match lookup_notation(name) {
                Some(group) => self.builder.notation(group),
                None => self.not_implemented(&format!("articulation {}", name)),
            },
            Node::Fingering { finger } => self.builder.fingering(*finger),
            Node::Tremolo { duration } => self.builder.tremolo(Tremolo {
                kind: TremoloKind::Single,
                lines: tremolo_lines(duration.unwrap_or(8)),
            }),
            Node::ChordSpecifier { text, bass } => {
                if self.state.modes.in_chord_mode() {
                    let bass = bass.map(|b| self.state.transposed(&b));
                    self.state.chords.specify(text.as_deref(), bass.as_ref());
                }
            }
            Node::Set {
                context,
                property,
                value,
            } => self.set_property(context.as_deref(), property, value),
            Node::Unset { property, .. } => self.unset_property(property),
            Node::Override {
                grob,
                property,
                value,
                ..
            } => self.override_property(grob, property, value),
            Node::Command { name } => self.command(name),
            Node::String { value } => {
                let after_bar = matches!(
                    events.previous_sibling(),
                    Some(Node::Command { name }) if name == "bar"
                );
                if after_bar {
                    self.explicit_bar(value);
                } else if self.state.modes.in_lyrics() {
                    self.builder.lyric(LyricEvent::Syllable(value.clone()));
                } else {
                    self.not_implemented("free-standing string");
                }
            }
            Node::Ottava { octaves } => self.builder.ottava(*octaves),
            Node::LyricText { text, duration } => {
                if let Some(duration) = duration {
                    self.state.timing.last_duration = *duration;
                }
                self.builder.lyric(LyricEvent::Syllable(text.clone()));
            }
            Node::LyricItem { item } => self.lyric_item(*item),
            Node::Unknown { name } => self.not_implemented(name),
            Node::Score { .. }
            | Node::Sequential { .. }
            | Node::Simultaneous { .. }
            | Node::Context { .. }
            | Node::Mode { .. }
            | Node::Transpose { .. }
            | Node::Scaler { .. }
            | Node::Grace { .. }
            | Node::Repeat { .. }
            | Node::Alternative { .. }
            | Node::Chord { .. }
            | Node::LyricsTo { .. }
            | Node::AddLyrics { .. } => {}
        }
    }

    fn dynamic(&mut self, name: &str) {
        let name = name.trim_start_matches('\\');
        match name {
            "<" | "cr" | "crescHairpin" => self.builder.wedge(WedgeKind::Crescendo),
            ">" | "decr" | "dimHairpin" => self.builder.wedge(WedgeKind::Diminuendo),
            "!" => self.builder.end_dynamic_span(),
            "cresc" => self.builder.dynamic_text("cresc."),
            "dim" => self.builder.dynamic_text("dim."),
            "decresc" => self.builder.dynamic_text("decresc."),
            sign if DYNAMIC_MARKS.contains(&sign) => self.builder.dynamic_mark(sign),
            other => self.not_implemented(&format!("dynamic \\{}", other)),
        }
    }

    fn command(&mut self, name: &str) {
        let name = name.trim_start_matches('\\');
        match name {
            "rest" => self.builder.note_to_rest(),
            "numericTimeSignature" => self.state.timing.numeric = true,
            "defaultTimeSignature" => self.state.timing.numeric = false,
            "voiceOne" => self.builder.set_voice(0),
            "voiceTwo" => self.builder.set_voice(1),
            "voiceThree" => self.builder.set_voice(2),
            "voiceFour" => self.builder.set_voice(3),
            "oneVoice" => self.builder.one_voice(),
            "glissando" => self.builder.glissando(self.state.modes.glissando),
            "startTrillSpan" => self.builder.trill_span(Edge::Start),
            "stopTrillSpan" => self.builder.trill_span(Edge::Stop),
            "autoBeamOff" => self.state.modes.auto_beam = false,
            "autoBeamOn" => self.state.modes.auto_beam = true,
            "slurDashed" => self.builder.set_slur_line(false, LineStyle::Dashed),
            "slurDotted" => self.builder.set_slur_line(false, LineStyle::Dotted),
            "slurSolid" => self.builder.set_slur_line(false, LineStyle::Solid),
            "phrasingSlurDashed" => self.builder.set_slur_line(true, LineStyle::Dashed),
            "phrasingSlurDotted" => self.builder.set_slur_line(true, LineStyle::Dotted),
            "phrasingSlurSolid" => self.builder.set_slur_line(true, LineStyle::Solid),
            "breathe" => self
                .builder
                .notation(NotationGroup::Articulation("breath-mark")),
            "default" => self.state.scaling.span = None,
            // arguments follow as their own nodes
            "bar" | "major" | "minor" => {}
            other => self.not_implemented(&format!("\\{}", other)),
        }
    }

    fn set_property(&mut self, context: Option<&str>, property: &str, value: &PropertyValue) {
        match property {
            "autoBeaming" => self.state.modes.auto_beam = value.as_bool().unwrap_or(true),
            "tupletSpannerDuration" => self.state.scaling.span = value.as_moment(),
            "ignoreMelismata" => self
                .builder
                .lyric(LyricEvent::IgnoreMelismata(value.as_bool().unwrap_or(true))),
            "associatedVoice" => match value.as_text() {
                Some(voice) => self
                    .builder
                    .lyric(LyricEvent::AssociatedVoice(voice.to_string())),
                None => self.not_implemented("\\set associatedVoice without a name"),
            },
            "instrumentName" | "shortInstrumentName" | "midiInstrument"
            | "systemStartDelimiter" => {
                let text = property_text(value);
                let applied = match context {
                    Some("StaffGroup" | "ChoirStaff") => {
                        self.builder.set_group_property(property, &text)
                    }
                    _ => self.builder.set_part_property(property, &text),
                };
                if !applied {
                    let context = context.unwrap_or("Staff");
                    self.not_implemented(&format!("\\set {}.{}", context, property));
                }
            }
            other => self.not_implemented(&format!("\\set {}", other)),
        }
    }

    fn unset_property(&mut self, property: &str) {
        match property {
            "autoBeaming" => self.state.modes.auto_beam = self.settings.auto_beaming,
            "tupletSpannerDuration" => self.state.scaling.span = None,
            "ignoreMelismata" => self.builder.lyric(LyricEvent::IgnoreMelismata(false)),
            other => self.not_implemented(&format!("\\unset {}", other)),
        }
    }

    fn override_property(&mut self, grob: &str, property: &str, value: &PropertyValue) {
        let text = property_text(value);
        match (grob, property) {
            ("Glissando", "style") => self.state.modes.glissando = LineStyle::from_scheme(&text),
            ("TimeSignature", "style") => {
                self.state.timing.numeric = text.trim_start_matches(&['#', '\''][..]) == "numbered"
            }
            _ => self.not_implemented(&format!("\\override {}.{}", grob, property)),
        }
    }

    fn lyric_item(&mut self, item: LyricToken) {
        let event = match item {
            LyricToken::Hyphen => LyricEvent::Hyphen,
            LyricToken::Extender => LyricEvent::Extender,
            LyricToken::Skip => LyricEvent::Skip,
        };
        self.builder.lyric(event);
    }
}

fn to_edge(span: Span) -> Edge {
    match span {
        Span::Start => Edge::Start,
        Span::Stop => Edge::Stop,
    }
}

fn to_f64(value: Rational) -> f64 {
    *value.numer() as f64 / *value.denom() as f64
}

fn property_text(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Text(_) => value.as_text().unwrap_or_default().to_string(),
        PropertyValue::Bool(b) => if *b { "#t" } else { "#f" }.to_string(),
        PropertyValue::Number(n) => n.to_string(),
        PropertyValue::Moment(m) => m.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::ir::{BarItem, BeamState};
    use crate::models::{ratio, Duration, Pitch};

    fn q(step: u8) -> Node {
        Node::note(Pitch::new(step, 0, 4), Duration::new(2, 0))
    }

    fn e(step: u8) -> Node {
        Node::note(Pitch::new(step, 0, 4), Duration::new(3, 0))
    }

    fn run(tree: Node) -> ConversionResult {
        let settings = ConversionSettings::default();
        Translator::new(&settings).translate(&tree)
    }

    fn notes(result: &ConversionResult, part: usize) -> Vec<crate::ir::BarNote> {
        result.score.parts[part]
            .bars
            .iter()
            .flat_map(|b| b.items.iter())
            .filter_map(|i| i.as_note().cloned())
            .collect()
    }

    #[test]
    fn test_bars_close_on_measure() {
        let tree = Node::context("Staff", None, vec![Node::seq((0..6).map(q).collect())]);
        let result = run(tree);
        let bars = &result.score.parts[0].bars;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].segment_lengths(), vec![ratio(1, 1)]);
        assert_eq!(bars[1].segment_lengths(), vec![ratio(1, 2)]);
    }

    #[test]
    fn test_auto_beams_in_four_four() {
        let tree = Node::context("Staff", None, vec![Node::seq((0..8).map(e).collect())]);
        let result = run(tree);
        let beams: Vec<BeamState> = notes(&result, 0).iter().map(|n| n.beam).collect();
        let group = [BeamState::Begin, BeamState::Continue, BeamState::Continue, BeamState::End];
        assert_eq!(beams, [group, group].concat());
    }

    #[test]
    fn test_auto_beam_off() {
        let mut music = vec![Node::command("autoBeamOff")];
        music.extend((0..4).map(e));
        let result = run(Node::seq(music));
        assert!(notes(&result, 0).iter().all(|n| n.beam == BeamState::None));
    }

    #[test]
    fn test_chord_advances_once() {
        let chord = Node::Chord {
            duration: Some(Duration::new(1, 0)),
            children: vec![
                Node::Note { pitch: Pitch::new(0, 0, 4), duration: None },
                Node::Note { pitch: Pitch::new(2, 0, 4), duration: None },
                Node::Note { pitch: Pitch::new(4, 0, 4), duration: None },
            ],
        };
        let result = run(Node::seq(vec![chord, Node::note(Pitch::new(0, 0, 5), Duration::new(1, 0))]));
        let bar = &result.score.parts[0].bars[0];
        assert_eq!(bar.segment_lengths(), vec![ratio(1, 1)]);
        let all = notes(&result, 0);
        assert_eq!(all.iter().filter(|n| n.mus.chord).count(), 2);
        assert_eq!(all[3].mus.onset, ratio(1, 2));
    }

    #[test]
    fn test_unknown_node_reported() {
        let tree = Node::seq(vec![q(0), Node::Unknown { name: "markup".into() }, q(1)]);
        let result = run(tree);
        let count = result
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::NotImplemented)
            .count();
        assert_eq!(count, 1);
        assert_eq!(notes(&result, 0).len(), 2);
    }

    #[test]
    fn test_tuplet_brackets() {
        let triplet = Node::Scaler {
            scaling: crate::models::ScalerKind::Tuplet,
            numerator: 3,
            denominator: 2,
            span: None,
            children: vec![e(0), e(1), e(2)],
        };
        let result = run(Node::seq(vec![triplet]));
        let all = notes(&result, 0);
        assert_eq!(all[0].mus.duration, ratio(1, 12));
        assert_eq!(all[0].mus.tuplets[0].edge, Some(Edge::Start));
        assert_eq!(all[1].mus.tuplets[0].edge, None);
        assert_eq!(all[2].mus.tuplets[0].edge, Some(Edge::Stop));
    }

    #[test]
    fn test_full_measure_rest_split() {
        let rest = Node::Rest {
            duration: Some(Duration::new(0, 0).with_factor(Rational::from_integer(3))),
            full_measure: true,
        };
        let result = run(Node::context("Staff", None, vec![Node::seq(vec![rest])]));
        let bars: Vec<_> = result.score.parts[0]
            .bars
            .iter()
            .filter(|b| !b.is_empty())
            .collect();
        assert_eq!(bars.len(), 3);
        for bar in bars {
            match &bar.items[0] {
                BarItem::Rest(rest) => {
                    assert!(rest.full_measure);
                    assert_eq!(rest.mus.duration, ratio(1, 1));
                }
                other => panic!("expected a rest, got {:?}", other),
            }
        }
    }
}
