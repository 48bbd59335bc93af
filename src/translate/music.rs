//! Rhythmic leaves and bar lines.

use crate::builder::{LyricEvent, NoteSpec, RestSpec};
use crate::ir::{
    tremolo_lines, Barline, Ending, EndingEdge, GraceNote, NoteType, RepeatDir, Tremolo,
    TremoloKind,
};
use crate::models::{zero, Duration, Events, GraceKind, Node, Pitch, Rational};

use super::drums;
use super::state::{Container, OpenChord};
use super::Translator;

/// What gets written for one note head.
#[derive(Debug, Clone)]
pub(super) struct Head {
    pitch: Pitch,
    unpitched: bool,
    instrument: Option<String>,
}

impl Head {
    pub(super) fn pitched(pitch: Pitch) -> Self {
        Self {
            pitch,
            unpitched: false,
            instrument: None,
        }
    }

    /// Middle line of the staff.
    pub(super) fn unpitched() -> Self {
        Self {
            pitch: Pitch::new(6, 0, 4),
            unpitched: true,
            instrument: None,
        }
    }

    pub(super) fn drum(name: &str) -> Self {
        let (instrument, display) = drums::lookup(name);
        Self {
            pitch: display,
            unpitched: true,
            instrument: Some(instrument),
        }
    }

    fn spec(&self, duration: Rational, note_type: NoteType, onset: Rational) -> NoteSpec {
        let mut spec = NoteSpec::new(self.pitch, duration, note_type, onset);
        spec.unpitched = self.unpitched;
        spec.instrument = self.instrument.clone();
        spec
    }
}

/// Right bar line closing a repeated section.
pub(super) fn backward_repeat(ending: Option<Ending>) -> Barline {
    Barline {
        style: Some("light-heavy".to_string()),
        repeat: Some(RepeatDir::Backward),
        ending,
    }
}

pub(super) fn forward_repeat() -> Barline {
    Barline {
        style: Some("heavy-light".to_string()),
        repeat: Some(RepeatDir::Forward),
        ending: None,
    }
}

/// Split a `\bar` style into the right side of the bar it ends and the left
/// side of the bar it starts.
pub(super) fn barline_parts(style: &str) -> (Option<Barline>, Option<Barline>) {
    let simple = |s: &str| (Some(Barline::styled(s)), None);
    match style {
        "|" => simple("regular"),
        "||" => simple("light-light"),
        "|." => simple("light-heavy"),
        ".|" => simple("heavy-light"),
        ".|." => simple("heavy-heavy"),
        "." => simple("heavy"),
        ";" => simple("dotted"),
        "!" => simple("dashed"),
        "'" => simple("tick"),
        "" => simple("none"),
        ":|." | ":|" | ":|.|" => (Some(backward_repeat(None)), None),
        ".|:" | "|:" | "[|:" => (None, Some(forward_repeat())),
        ":..:" | ":|.|:" | ":|.:" | ":|][|:" => {
            (Some(backward_repeat(None)), Some(forward_repeat()))
        }
        _ => simple("regular"),
    }
}

fn note_type(written: Duration) -> NoteType {
    NoteType {
        log: written.log,
        dots: written.dots,
    }
}

impl<'s> Translator<'s> {
    /// Displayed value of a written duration. Inside a tremolo repeat the
    /// notes show the length of the whole repetition.
    fn display_type(&self, written: Duration) -> NoteType {
        match self.state.scaling.tremolo {
            Some(tremolo) => NoteType::from_length(
                written.length() * Rational::from_integer(tremolo.count.max(1) as i64),
            ),
            None => note_type(written),
        }
    }

    pub(super) fn head(&mut self, head: Head, duration: Option<Duration>, events: &Events) {
        if self.state.chord.is_some() {
            self.chord_member(head);
            return;
        }
        let written = self.state.timing.written(duration);
        if self.state.modes.in_lyrics() {
            return;
        }
        if self.state.modes.in_chord_mode() {
            let total = self.state.timing.clock.total;
            self.state.chords.record(total, &head.pitch);
            self.advance(self.state.scaling.effective(written.length()));
            return;
        }
        if self.state.modes.grace.is_some() {
            self.grace_note(&head, written);
            return;
        }

        let length = self.state.scaling.effective(written.length());
        let clock = self.state.timing.clock;
        let display = self.display_type(written);
        let mut spec = head.spec(length, display, clock.total);
        spec.tuplets = self.state.scaling.take_tuplets();
        self.builder.new_note(spec);
        self.decorate_head(clock.total, length, written, clock.metric_position());
        self.advance(length);
        self.after_rhythm(events);
    }

    /// Chord symbols, tremolo marks and beaming for a freshly written head.
    fn decorate_head(&mut self, onset: Rational, length: Rational, written: Duration, position: Rational) {
        let harmonies = self.state.chords.take_within(onset, length);
        if !harmonies.is_empty() {
            self.builder.attach_harmonies(harmonies);
        }

        if let Some(tremolo) = self.state.scaling.tremolo.as_mut() {
            tremolo.written += 1;
            let kind = if tremolo.notes <= 1 {
                Some(TremoloKind::Single)
            } else if tremolo.written == 1 {
                Some(TremoloKind::Start)
            } else if tremolo.written == tremolo.notes {
                Some(TremoloKind::Stop)
            } else {
                None
            };
            if let Some(kind) = kind {
                let value = if written.log >= 0 { 1u32 << written.log.min(30) } else { 1 };
                self.builder.tremolo(Tremolo {
                    kind,
                    lines: tremolo_lines(value),
                });
            }
        }

        let display = self.display_type(written);
        let beamable = self.state.modes.auto_beam
            && display.log >= 3
            && self.state.scaling.tremolo.is_none();
        let placement = beamable.then(|| (position, length, self.state.timing.meter()));
        self.builder.beam_current(placement);
    }

    fn grace_note(&mut self, head: &Head, written: Duration) {
        let Some(kind) = self.state.modes.grace else {
            return;
        };
        let onset = self.state.timing.clock.total;
        let mut spec = head.spec(written.length(), note_type(written), onset);
        spec.grace = Some(GraceNote {
            slash: matches!(kind, GraceKind::Acciaccatura | GraceKind::SlashedGrace),
        });
        self.builder.new_note(spec);
        self.grace_slur(kind);
    }

    fn grace_slur(&mut self, kind: GraceKind) {
        if !self.state.modes.grace_first {
            return;
        }
        self.state.modes.grace_first = false;
        if matches!(kind, GraceKind::Acciaccatura | GraceKind::Appoggiatura) {
            self.builder.grace_slur();
        }
    }

    /// Advance the clock and close tuplet brackets whose span filled up.
    pub(super) fn advance(&mut self, length: Rational) {
        self.state.timing.clock.advance(length);
        for nr in self.state.scaling.elapse(length) {
            self.builder.stop_tuplet(nr);
        }
    }

    // ---------------------------------------------------------------------
    // chords

    pub(super) fn enter_chord(&mut self, duration: Option<Duration>) {
        let written = self.state.timing.written(duration);
        let grace = self.state.modes.grace.is_some();
        let silent = grace || self.state.modes.in_chord_mode() || self.state.modes.in_lyrics();
        let length = if grace {
            zero()
        } else {
            self.state.scaling.effective(written.length())
        };
        let clock = self.state.timing.clock;
        let tuplets = if silent {
            Vec::new()
        } else {
            self.state.scaling.take_tuplets()
        };
        self.state.chord = Some(OpenChord {
            written,
            length,
            onset: clock.total,
            position: clock.metric_position(),
            tuplets,
            head_written: false,
        });
        self.push(Container::Chord);
    }

    fn chord_member(&mut self, head: Head) {
        let Some(chord) = self.state.chord.as_mut() else {
            return;
        };
        let first = !chord.head_written;
        chord.head_written = true;
        let (written, length, onset, position) =
            (chord.written, chord.length, chord.onset, chord.position);
        let tuplets = if first {
            std::mem::take(&mut chord.tuplets)
        } else {
            Vec::new()
        };

        if self.state.modes.in_chord_mode() {
            if first {
                self.state.chords.record(onset, &head.pitch);
            }
            return;
        }
        if self.state.modes.in_lyrics() {
            return;
        }

        if let Some(kind) = self.state.modes.grace {
            let mut spec = head.spec(written.length(), note_type(written), onset);
            spec.grace = Some(GraceNote {
                slash: matches!(kind, GraceKind::Acciaccatura | GraceKind::SlashedGrace),
            });
            if first {
                self.builder.new_note(spec);
                self.grace_slur(kind);
            } else {
                self.builder.new_chord_note(spec);
            }
            return;
        }

        let mut spec = head.spec(length, self.display_type(written), onset);
        if first {
            spec.tuplets = tuplets;
            self.builder.new_note(spec);
            self.decorate_head(onset, length, written, position);
        } else {
            self.builder.new_chord_note(spec);
        }
    }

    pub(super) fn exit_chord(&mut self, events: &Events) {
        let Some(chord) = self.state.chord.take() else {
            return;
        };
        if self.state.modes.in_lyrics() {
            return;
        }
        if self.state.modes.in_chord_mode() {
            self.advance(chord.length);
            return;
        }
        self.builder.end_chord();
        if self.state.modes.grace.is_some() {
            return;
        }
        self.advance(chord.length);
        self.after_rhythm(events);
    }

    /// `q`: the previous chord again.
    pub(super) fn repeat_chord(&mut self, duration: Option<Duration>, events: &Events) {
        let pitches = self.builder.last_chord();
        if pitches.is_empty() {
            self.not_implemented("q without a preceding chord");
            self.skip(duration, events);
            return;
        }
        self.enter_chord(duration);
        for pitch in pitches {
            self.chord_member(Head::pitched(pitch));
        }
        self.state.containers.pop();
        self.exit_chord(events);
    }

    // ---------------------------------------------------------------------
    // rests and skips

    pub(super) fn rest(&mut self, duration: Option<Duration>, full_measure: bool, events: &Events) {
        let written = self.state.timing.written(duration);
        if self.state.modes.in_lyrics() || self.state.modes.grace.is_some() {
            return;
        }
        let length = self.state.scaling.effective(written.length());
        if self.state.modes.in_chord_mode() {
            self.advance(length);
            return;
        }
        if full_measure {
            self.split_rhythm(length, true, events);
            return;
        }
        let onset = self.state.timing.clock.total;
        self.builder.new_rest(RestSpec {
            duration: length,
            note_type: self.display_type(written),
            onset,
            tuplets: self.state.scaling.take_tuplets(),
            shown: true,
            full_measure: false,
        });
        self.builder.beam_current(None);
        self.advance(length);
        self.after_rhythm(events);
    }

    pub(super) fn skip(&mut self, duration: Option<Duration>, events: &Events) {
        let written = self.state.timing.written(duration);
        if self.state.modes.in_lyrics() {
            self.builder.lyric(LyricEvent::Skip);
            return;
        }
        if self.state.modes.grace.is_some() {
            return;
        }
        let length = self.state.scaling.effective(written.length());
        if self.state.modes.in_chord_mode() {
            self.advance(length);
            return;
        }
        self.split_rhythm(length, false, events);
    }

    /// Write a full-measure rest or a skip, split at every bar line it spans.
    fn split_rhythm(&mut self, length: Rational, rest: bool, events: &Events) {
        let mut left = length;
        while left > zero() {
            let clock = self.state.timing.clock;
            let room = match clock.remaining() {
                r if r > zero() => r,
                _ => clock.bar_length(),
            };
            let piece = if room > zero() && room < left { room } else { left };
            if rest {
                let whole = clock.since_bar == zero() && piece == clock.bar_length();
                self.builder.new_rest(RestSpec {
                    duration: piece,
                    note_type: NoteType::from_length(piece),
                    onset: clock.total,
                    tuplets: Vec::new(),
                    shown: true,
                    full_measure: whole,
                });
                self.builder.beam_current(None);
            } else {
                self.builder.new_skip(piece, clock.total);
            }
            self.advance(piece);
            left -= piece;
            if left > zero() {
                self.barline_check();
            }
        }
        self.after_rhythm(events);
    }

    // ---------------------------------------------------------------------
    // bar lines

    /// Bar line check after a rhythmic event, unless a fork branch or a
    /// following `\bar` takes care of it.
    pub(super) fn after_rhythm(&mut self, events: &Events) {
        if let Some(fork) = self.state.forks.last() {
            if fork.deferring && !events.rhythm_follows(fork.depth, fork.limit) {
                return;
            }
        }
        let bar_follows = matches!(
            events.next_sibling(),
            Some(Node::Command { name }) if name == "bar"
        );
        if !bar_follows {
            self.barline_check();
        }
    }

    pub(super) fn barline_check(&mut self) {
        let clock = self.state.timing.clock;
        if clock.since_bar <= zero() {
            return;
        }
        let explicit = self.layout.barline_at(clock.total).map(str::to_string);
        match explicit {
            Some(style) => {
                let (right, left) = barline_parts(&style);
                if let Some(right) = right {
                    self.builder.set_right_barline(right);
                }
                self.state.pending_left = left;
                if clock.bar_complete() {
                    self.state.timing.clock.close_bar();
                }
                self.open_bar();
            }
            None if clock.bar_complete() => {
                self.state.timing.clock.close_bar();
                self.open_bar();
            }
            None => {}
        }
    }

    fn open_bar(&mut self) {
        self.builder.new_bar();
        if let Some(left) = self.state.pending_left.take() {
            self.builder.set_left_barline(left);
        }
        let total = self.state.timing.clock.total;
        if let Some(change) = self.layout.time_change_at(total).cloned() {
            self.state.timing.set_time(change.numerator, change.denominator);
            let numeric = change.numeric_for(self.state.timing.staff.unwrap_or(0));
            self.builder
                .new_time(change.numerator, change.denominator, numeric);
        }
    }

    /// The string after `\bar`.
    pub(super) fn explicit_bar(&mut self, style: &str) {
        let clock = self.state.timing.clock;
        if clock.since_bar > zero() {
            self.barline_check();
            return;
        }
        let (right, left) = barline_parts(style);
        if let Some(right) = right {
            if clock.total > zero() {
                self.builder.set_right_barline(right);
            }
        }
        if let Some(left) = left {
            self.builder.set_left_barline(left);
        }
    }

    /// Left bar line of an alternative ending.
    pub(super) fn start_ending(&mut self, count: u32, endings: u32, index: u32) {
        let (start, end) = ending_numbers(count, endings, index);
        self.builder.set_left_barline(Barline {
            ending: Some(Ending {
                start,
                end,
                edge: EndingEdge::Start,
            }),
            ..Default::default()
        });
    }

    pub(super) fn finish_ending(&mut self, count: u32, endings: u32, index: u32) {
        let (start, end) = ending_numbers(count, endings, index);
        let barline = if index + 1 < endings {
            backward_repeat(Some(Ending {
                start,
                end,
                edge: EndingEdge::Stop,
            }))
        } else {
            Barline {
                ending: Some(Ending {
                    start,
                    end,
                    edge: EndingEdge::Discontinue,
                }),
                ..Default::default()
            }
        };
        self.builder.set_right_barline(barline);
    }
}

/// Repeat iterations played by ending `index`. The first ending covers every
/// iteration the later endings leave over.
fn ending_numbers(count: u32, endings: u32, index: u32) -> (u32, u32) {
    let shared = count.saturating_sub(endings) + 1;
    if index == 0 {
        (1, shared)
    } else {
        (shared + index, shared + index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barline_parts() {
        let (right, left) = barline_parts("|.");
        assert_eq!(right.and_then(|b| b.style).as_deref(), Some("light-heavy"));
        assert!(left.is_none());

        let (right, left) = barline_parts(":..:");
        assert_eq!(right.and_then(|b| b.repeat), Some(RepeatDir::Backward));
        assert_eq!(left.and_then(|b| b.repeat), Some(RepeatDir::Forward));

        let (right, left) = barline_parts(".|:");
        assert!(right.is_none());
        assert_eq!(left.and_then(|b| b.style).as_deref(), Some("heavy-light"));
    }

    #[test]
    fn test_ending_numbers() {
        // \repeat volta 3 with two endings: 1.-2. then 3.
        assert_eq!(ending_numbers(3, 2, 0), (1, 2));
        assert_eq!(ending_numbers(3, 2, 1), (3, 3));
        assert_eq!(ending_numbers(2, 2, 0), (1, 1));
        assert_eq!(ending_numbers(2, 2, 1), (2, 2));
    }
}
