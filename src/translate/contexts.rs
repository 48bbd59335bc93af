//! Contexts, forks and repeats.
//!
//! Every staff-like context becomes a part (or a staff of the enclosing
//! piano part); voices and fork branches write into sections of their own
//! that merge back when they close.

use log::debug;

use crate::builder::VoiceStart;
use crate::diagnostics::DiagnosticKind;
use crate::ir::GroupSymbol;
use crate::models::events::split_repeat;
use crate::models::{BranchLimit, Events, InputMode, Node, PropertyValue, RepeatKind};
use crate::timing::prepass::is_staff_context;

use super::music::forward_repeat;
use super::state::{Container, ForkFrame};
use super::{property_text, Translator};

const VOICE_CONTEXTS: &[&str] = &["Voice", "CueVoice", "DrumVoice", "TabVoice", "NullVoice"];

/// Contexts whose content has no MusicXML counterpart here.
const SKIPPED_CONTEXTS: &[&str] = &["FiguredBass", "Dynamics", "NoteNames", "FretBoards"];

fn is_voice_context(node: &Node) -> bool {
    matches!(node, Node::Context { context, .. } if VOICE_CONTEXTS.contains(&context.as_str()))
}

/// Fork children that are not a voice of the enclosing staff.
fn is_structural(node: &Node) -> bool {
    match node {
        Node::Context { context, .. } => {
            is_staff_context(context)
                || SKIPPED_CONTEXTS.contains(&context.as_str())
                || matches!(
                    context.as_str(),
                    "PianoStaff"
                        | "GrandStaff"
                        | "StaffGroup"
                        | "ChoirStaff"
                        | "Lyrics"
                        | "ChordNames"
                        | "Devnull"
                )
        }
        Node::LyricsTo { .. } | Node::AddLyrics { .. } | Node::Header { .. } => true,
        _ => false,
    }
}

impl<'s> Translator<'s> {
    // ---------------------------------------------------------------------
    // forks

    pub(super) fn enter_fork(&mut self, children: &[Node], events: &Events) {
        let separated = children.iter().any(|c| matches!(c, Node::VoiceSeparator));
        let timing = &self.state.timing;
        self.state.forks.push(ForkFrame {
            depth: events.depth(),
            limit: if separated {
                BranchLimit::Separator
            } else {
                BranchLimit::Child
            },
            snapshot: timing.clock,
            meter: (timing.numerator, timing.denominator),
            start_bar: self.builder.current_bar_index(),
            voice: self.builder.voice(),
            longest: None,
            branches: u32::from(separated),
            open: false,
            deferring: separated,
        });
        self.push(Container::Fork);
    }

    /// `\\`: close the running branch and start the next one at the fork start.
    pub(super) fn next_separated_branch(&mut self) {
        let Some(fork) = self.state.forks.last_mut() else {
            return;
        };
        if fork.limit != BranchLimit::Separator {
            return;
        }
        if fork.open {
            self.builder.close_section();
        }
        fork.record_end(&self.state.timing.clock);
        let k = fork.branches;
        fork.branches += 1;
        self.state.timing.clock = fork.snapshot;
        self.state.timing.numerator = fork.meter.0;
        self.state.timing.denominator = fork.meter.1;
        self.builder.open_branch(
            k,
            VoiceStart {
                bar: fork.start_bar,
                lead: fork.snapshot.since_bar,
                onset: fork.snapshot.total,
            },
        );
        fork.open = true;
    }

    /// A child of a fork without separators starts a branch of its own.
    fn begin_fork_child(&mut self, node: &Node) {
        let Some(fork) = self.state.forks.last_mut() else {
            return;
        };
        if fork.limit != BranchLimit::Child {
            return;
        }
        let voice = is_voice_context(node);
        if is_structural(node) || !(voice || node.contains_rhythm()) {
            fork.deferring = false;
            return;
        }
        let k = fork.branches;
        fork.branches += 1;
        fork.deferring = true;
        self.state.timing.clock = fork.snapshot;
        self.state.timing.numerator = fork.meter.0;
        self.state.timing.denominator = fork.meter.1;
        if !voice && k > 0 {
            self.builder.open_branch(
                k,
                VoiceStart {
                    bar: fork.start_bar,
                    lead: fork.snapshot.since_bar,
                    onset: fork.snapshot.total,
                },
            );
            fork.open = true;
        }
    }

    fn end_fork_child(&mut self) {
        let Some(fork) = self.state.forks.last_mut() else {
            return;
        };
        if fork.limit != BranchLimit::Child || !fork.deferring {
            return;
        }
        if fork.open {
            self.builder.close_section();
            fork.open = false;
        }
        fork.record_end(&self.state.timing.clock);
    }

    pub(super) fn exit_fork(&mut self, events: &Events) {
        let Some(mut fork) = self.state.forks.pop() else {
            return;
        };
        if fork.limit == BranchLimit::Separator {
            if fork.open {
                self.builder.close_section();
            }
            fork.record_end(&self.state.timing.clock);
        }
        if fork.branches == 0 {
            return;
        }
        if let Some(end) = fork.longest {
            self.state.timing.clock = end;
        }
        self.builder.restore_voice(fork.voice);
        let clock = self.state.timing.clock;
        self.builder.merge_fork(clock.since_bar, clock.total);
        debug!("fork of {} branches merged at {}", fork.branches, clock.total);
        self.after_rhythm(events);
    }

    pub(super) fn begin_child(&mut self, node: &Node) {
        match self.state.containers.last() {
            Some(Container::Fork) => self.begin_fork_child(node),
            Some(Container::Alternative {
                count,
                endings,
                index,
            }) => {
                let (count, endings, index) = (*count, *endings, *index);
                self.start_ending(count, endings, index);
            }
            _ => {}
        }
    }

    pub(super) fn end_child(&mut self) {
        match self.state.containers.last_mut() {
            Some(Container::Fork) => self.end_fork_child(),
            Some(Container::Alternative {
                count,
                endings,
                index,
            }) => {
                let (count, endings, at) = (*count, *endings, *index);
                *index += 1;
                self.finish_ending(count, endings, at);
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // contexts

    pub(super) fn enter_context(
        &mut self,
        context: &str,
        id: Option<&str>,
        with: &[(String, PropertyValue)],
        events: &mut Events,
    ) {
        match context {
            c if is_staff_context(c) => self.enter_staff(c, id, with),
            "PianoStaff" | "GrandStaff" => {
                self.builder.begin_piano(id);
                for (property, value) in with {
                    self.with_property(false, property, value);
                }
                self.push(Container::Piano);
            }
            "StaffGroup" | "ChoirStaff" => {
                self.builder.begin_group(GroupSymbol::Bracket);
                for (property, value) in with {
                    self.with_property(true, property, value);
                }
                self.push(Container::Group);
            }
            c if VOICE_CONTEXTS.contains(&c) => self.enter_voice(id),
            "Devnull" => {
                self.builder.open_discard();
                self.push(Container::Devnull);
            }
            "Lyrics" => {
                self.builder.open_lyrics(None);
                self.state.modes.lyric_depth += 1;
                self.push(Container::Lyrics { opened: true });
            }
            "ChordNames" => {
                self.state.modes.chord_depth += 1;
                self.state.modes.modes.push(InputMode::Chord);
                self.state.timing.clock.restart();
                self.push(Container::ChordNames);
            }
            c if SKIPPED_CONTEXTS.contains(&c) => {
                self.not_implemented(&format!("{} context", c));
                events.truncate_children(0);
                self.push(Container::Skipped);
            }
            "Score" => self.push(Container::Plain),
            other => {
                self.not_implemented(&format!("{} context", other));
                self.push(Container::Plain);
            }
        }
    }

    fn enter_staff(&mut self, context: &str, id: Option<&str>, with: &[(String, PropertyValue)]) {
        let timing = &mut self.state.timing;
        timing.staff = Some(timing.staves_seen);
        timing.staves_seen += 1;
        timing.clock.restart();
        let initial = self.layout.time_change_at(crate::models::zero()).cloned();
        match &initial {
            Some(change) => timing.set_time(change.numerator, change.denominator),
            None => {
                let (numerator, denominator) = self.settings.default_time;
                timing.set_time(numerator, denominator);
            }
        }
        let staff = timing.staff.unwrap_or(0);

        if self.builder.in_piano() {
            self.builder.begin_piano_staff(id);
        } else {
            self.builder.begin_part(id);
        }
        if let Some(change) = initial {
            self.builder
                .new_time(change.numerator, change.denominator, change.numeric_for(staff));
        }
        for (property, value) in with {
            self.with_property(false, property, value);
        }

        let drum = context == "DrumStaff";
        match context {
            "DrumStaff" | "RhythmicStaff" => self.builder.new_clef("percussion"),
            "TabStaff" => self.builder.new_clef("tab"),
            _ => {}
        }
        if drum {
            self.state.modes.modes.push(InputMode::Drum);
        }
        self.push(Container::Part { drum });
    }

    fn with_property(&mut self, group: bool, property: &str, value: &PropertyValue) {
        let text = property_text(value);
        let applied = if group {
            self.builder.set_group_property(property, &text)
        } else {
            self.builder.set_part_property(property, &text)
        };
        if !applied {
            self.not_implemented(&format!("\\with {}", property));
        }
    }

    fn enter_voice(&mut self, id: Option<&str>) {
        let fork = match self.state.containers.last() {
            Some(Container::Fork) => self
                .state
                .forks
                .last()
                .filter(|f| f.limit == BranchLimit::Child),
            _ => None,
        };
        let start = match fork {
            Some(fork) => VoiceStart {
                bar: fork.start_bar,
                lead: fork.snapshot.since_bar,
                onset: fork.snapshot.total,
            },
            None => {
                let clock = self.state.timing.clock;
                VoiceStart {
                    bar: self.builder.current_bar_index(),
                    lead: clock.since_bar,
                    onset: clock.total,
                }
            }
        };
        let in_fork = fork.is_some();
        self.builder.open_voice(id, start);
        self.push(Container::Voice { in_fork });
    }

    pub(super) fn enter_lyrics_to(&mut self, voice: &str) {
        self.state.modes.lyric_depth += 1;
        let opened = !self.builder.bind_lyrics(voice);
        if opened {
            self.builder.open_lyrics(Some(voice.to_string()));
        }
        self.push(Container::Lyrics { opened });
    }

    pub(super) fn enter_add_lyrics(&mut self) {
        self.state.modes.lyric_depth += 1;
        let voice = self.builder.last_voice_name();
        self.builder.open_lyrics(voice);
        self.push(Container::Lyrics { opened: true });
    }

    pub(super) fn enter_mode(&mut self, mode: InputMode, events: &mut Events) {
        let (lyric, chord) = match mode {
            InputMode::Lyric => (true, false),
            InputMode::Chord => (false, true),
            InputMode::Figure => {
                self.not_implemented("\\figuremode");
                events.truncate_children(0);
                self.push(Container::Skipped);
                return;
            }
            InputMode::Note | InputMode::Drum => (false, false),
        };
        if lyric {
            self.state.modes.lyric_depth += 1;
        }
        if chord {
            self.state.modes.chord_depth += 1;
        }
        self.state.modes.modes.push(mode);
        self.push(Container::Mode { lyric, chord });
    }

    // ---------------------------------------------------------------------
    // repeats

    pub(super) fn enter_repeat(&mut self, repeat: RepeatKind, count: u32, children: &[Node]) {
        match repeat {
            RepeatKind::Tremolo => {
                let notes: usize = children.iter().map(count_heads).sum();
                self.state.scaling.scaling.tremolo = Some(count.max(1));
                self.state.scaling.tremolo = Some(super::state::TremoloRepeat {
                    count: count.max(1),
                    notes,
                    written: 0,
                });
                self.push(Container::TremoloRepeat);
            }
            RepeatKind::Volta if !self.settings.unfold_repeats => {
                let alternative = children.iter().any(|c| matches!(c, Node::Alternative { .. }));
                self.builder.set_left_barline(forward_repeat());
                self.push(Container::Repeat {
                    count,
                    backward: !alternative,
                });
            }
            // expanded by the event stream
            _ => {
                let (_, endings) = split_repeat(children);
                if endings.len() > count as usize {
                    self.builder.diagnostics_mut().warn(
                        DiagnosticKind::ExcessEndings,
                        format!(
                            "{} alternatives for {} repeats, extra endings never play",
                            endings.len(),
                            count
                        ),
                    );
                }
                self.push(Container::Plain)
            }
        }
    }

    pub(super) fn enter_alternative(&mut self, endings: usize, events: &mut Events) {
        let count = match self.state.containers.last() {
            Some(Container::Repeat { count, .. }) => *count,
            _ => endings as u32,
        };
        let mut endings = endings as u32;
        if endings > count {
            self.builder.diagnostics_mut().warn(
                DiagnosticKind::ExcessEndings,
                format!("{} alternatives for {} repeats, extra endings dropped", endings, count),
            );
            events.truncate_children(count as usize);
            endings = count;
        }
        self.push(Container::Alternative {
            count,
            endings,
            index: 0,
        });
    }
}

/// Note heads in a `\repeat tremolo` body; chords count once.
fn count_heads(node: &Node) -> usize {
    match node {
        Node::Note { .. }
        | Node::Unpitched { .. }
        | Node::DrumNote { .. }
        | Node::Chord { .. }
        | Node::RepeatChord { .. } => 1,
        other => other
            .children()
            .map_or(0, |c| c.iter().map(count_heads).sum()),
    }
}
