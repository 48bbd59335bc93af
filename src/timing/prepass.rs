//! Timing and layout pre-pass
//!
//! One forward scan over the tree, before translation, that locates explicit
//! bar lines and time signature changes by absolute time. The translator
//! needs these positions up front: a `\bar` in one staff closes bars in every
//! staff, and a `\time` written in the top staff applies to all of them.
//!
//! Explicit bar lines that fall strictly inside a sounding note are dropped,
//! since a bar line can only sit on a rhythmic boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Clock, Scaling};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::models::{
    ratio, zero, Duration, Event, Events, InputMode, Node, Rational, RepeatKind,
};

/// A time signature change at some absolute position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeChange {
    pub numerator: u32,
    pub denominator: u32,
    /// Nominal bar length
    pub measure: Rational,
    /// Numeric display (`\numericTimeSignature`) per staff ordinal
    pub numeric_by_staff: BTreeMap<usize, bool>,
}

impl TimeChange {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
            measure: ratio(numerator as i64, denominator.max(1) as i64),
            numeric_by_staff: BTreeMap::new(),
        }
    }

    /// Display flag for a staff, falling back to the staff that wrote the change.
    pub fn numeric_for(&self, staff: usize) -> bool {
        self.numeric_by_staff
            .get(&staff)
            .or_else(|| self.numeric_by_staff.values().next())
            .copied()
            .unwrap_or(false)
    }
}

/// Result of the pre-pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Explicit bar line style by absolute time
    pub barlines: BTreeMap<Rational, String>,
    /// Time signature changes by absolute time
    pub time_changes: BTreeMap<Rational, TimeChange>,
}

impl Layout {
    pub fn barline_at(&self, time: Rational) -> Option<&str> {
        self.barlines.get(&time).map(String::as_str)
    }

    pub fn time_change_at(&self, time: Rational) -> Option<&TimeChange> {
        self.time_changes.get(&time)
    }
}

struct Fork {
    start: Rational,
    longest: Rational,
    separated: bool,
}

#[derive(Default)]
struct Scan {
    scaling: Scaling,
    forks: Vec<Fork>,
    last_duration: Duration,
    numeric: bool,
    staff: Option<usize>,
    staves_seen: usize,
    // depths of containers that suppress note spans
    chord_depth: usize,
    grace_depth: usize,
    lyric_depth: usize,
    chord_mode_depth: usize,
    spans: Vec<(Rational, Rational)>,
}

/// Scan `root` and build the bar line and time signature maps.
pub fn scan(root: &Node, measure: Rational, unfold_volta: bool) -> (Layout, Diagnostics) {
    let mut layout = Layout::default();
    let mut diagnostics = Diagnostics::new();
    let mut clock = Clock::new(measure);
    let mut state = Scan::default();
    let mut events = Events::new(root).unfolding_volta(unfold_volta);

    while let Some(event) = events.next() {
        match event {
            Event::Enter(node) => {
                restart_branch(&mut clock, &mut state, events.parent());
                enter(node, &mut clock, &mut state);
            }
            Event::Leaf(node) => {
                restart_branch(&mut clock, &mut state, events.parent());
                leaf(node, &events, &mut clock, &mut state, &mut layout);
                close_branch(&clock, &mut state, events.parent());
            }
            Event::Exit(node) => {
                exit(node, &mut clock, &mut state);
                close_branch(&clock, &mut state, events.parent());
            }
        }
    }

    let spans = std::mem::take(&mut state.spans);
    layout.barlines.retain(|time, style| {
        let conflict = spans.iter().any(|(on, off)| on < time && time < off);
        if conflict {
            diagnostics.add(
                Diagnostic::warning(
                    DiagnosticKind::BarlineConflict,
                    format!("bar line \"{}\" falls inside a note and was dropped", style),
                )
                .at(*time),
            );
        }
        !conflict
    });
    log::debug!(
        "pre-pass found {} bar lines and {} time changes",
        layout.barlines.len(),
        layout.time_changes.len()
    );
    (layout, diagnostics)
}

fn in_child_fork(state: &Scan, parent: Option<&Node>) -> bool {
    matches!(parent, Some(Node::Simultaneous { .. }))
        && state.forks.last().map_or(false, |f| !f.separated)
}

// Every direct child of a `<< >>` without separators is its own branch.
fn restart_branch(clock: &mut Clock, state: &mut Scan, parent: Option<&Node>) {
    if in_child_fork(state, parent) {
        if let Some(fork) = state.forks.last() {
            clock.total = fork.start;
        }
    }
}

fn close_branch(clock: &Clock, state: &mut Scan, parent: Option<&Node>) {
    if in_child_fork(state, parent) {
        if let Some(fork) = state.forks.last_mut() {
            fork.longest = fork.longest.max(clock.total);
        }
    }
}

pub(crate) fn is_staff_context(name: &str) -> bool {
    matches!(
        name,
        "Staff" | "RhythmicStaff" | "TabStaff" | "DrumStaff" | "VaticanaStaff" | "MensuralStaff"
    )
}

fn enter(node: &Node, clock: &mut Clock, state: &mut Scan) {
    match node {
        Node::Simultaneous { children } => state.forks.push(Fork {
            start: clock.total,
            longest: clock.total,
            separated: children.iter().any(|c| matches!(c, Node::VoiceSeparator)),
        }),
        Node::Context { context, .. } if is_staff_context(context) => {
            state.staff = Some(state.staves_seen);
            state.staves_seen += 1;
            clock.restart();
        }
        Node::Context { context, .. } if context == "Lyrics" => state.lyric_depth += 1,
        Node::Context { context, .. } if context == "ChordNames" => {
            state.chord_mode_depth += 1;
            clock.restart();
        }
        Node::Mode { mode, .. } => match mode {
            InputMode::Lyric => state.lyric_depth += 1,
            InputMode::Chord => state.chord_mode_depth += 1,
            _ => {}
        },
        Node::LyricsTo { .. } | Node::AddLyrics { .. } => state.lyric_depth += 1,
        Node::Grace { .. } => state.grace_depth += 1,
        Node::Scaler {
            scaling,
            numerator,
            denominator,
            ..
        } => state
            .scaling
            .tuplets
            .push(*scaling, *numerator, *denominator, None),
        Node::Repeat {
            repeat: RepeatKind::Tremolo,
            count,
            ..
        } => state.scaling.tremolo = Some(*count),
        Node::Chord { duration, .. } => {
            let duration = duration.unwrap_or(state.last_duration);
            state.last_duration = duration;
            state.chord_depth += 1;
            rhythm(clock, state, duration.length(), true);
        }
        _ => {}
    }
}

fn exit(node: &Node, clock: &mut Clock, state: &mut Scan) {
    match node {
        Node::Simultaneous { .. } => {
            if let Some(fork) = state.forks.pop() {
                clock.total = fork.longest.max(clock.total);
            }
        }
        Node::Context { context, .. } if is_staff_context(context) => state.staff = None,
        Node::Context { context, .. } if context == "Lyrics" => state.lyric_depth -= 1,
        Node::Context { context, .. } if context == "ChordNames" => state.chord_mode_depth -= 1,
        Node::Mode { mode, .. } => match mode {
            InputMode::Lyric => state.lyric_depth -= 1,
            InputMode::Chord => state.chord_mode_depth -= 1,
            _ => {}
        },
        Node::LyricsTo { .. } | Node::AddLyrics { .. } => state.lyric_depth -= 1,
        Node::Grace { .. } => state.grace_depth -= 1,
        Node::Scaler { .. } => {
            state.scaling.tuplets.pop();
        }
        Node::Repeat {
            repeat: RepeatKind::Tremolo,
            ..
        } => state.scaling.tremolo = None,
        Node::Chord { .. } => state.chord_depth -= 1,
        _ => {}
    }
}

fn leaf(node: &Node, events: &Events, clock: &mut Clock, state: &mut Scan, layout: &mut Layout) {
    match node {
        Node::VoiceSeparator => {
            if let Some(fork) = state.forks.last_mut() {
                fork.longest = fork.longest.max(clock.total);
                clock.total = fork.start;
            }
        }
        Node::Note { duration, .. }
        | Node::Rest { duration, .. }
        | Node::Unpitched { duration }
        | Node::DrumNote { duration, .. }
        | Node::RepeatChord { duration } => {
            if state.chord_depth > 0 {
                return;
            }
            let duration = duration.unwrap_or(state.last_duration);
            state.last_duration = duration;
            rhythm(clock, state, duration.length(), true);
        }
        Node::Skip { duration } => {
            let duration = duration.unwrap_or(state.last_duration);
            state.last_duration = duration;
            rhythm(clock, state, duration.length(), false);
        }
        Node::LyricText { duration, .. } => {
            if let Some(duration) = duration {
                state.last_duration = *duration;
            }
        }
        Node::TimeSignature {
            numerator,
            denominator,
        } => {
            let change = layout
                .time_changes
                .entry(clock.total)
                .or_insert_with(|| TimeChange::new(*numerator, *denominator));
            change
                .numeric_by_staff
                .insert(state.staff.unwrap_or(0), state.numeric);
        }
        Node::Command { name } => match name.as_str() {
            "numericTimeSignature" => state.numeric = true,
            "defaultTimeSignature" => state.numeric = false,
            _ => {}
        },
        Node::String { value } => {
            if matches!(events.previous_sibling(), Some(Node::Command { name }) if name == "bar") {
                layout.barlines.insert(clock.total, value.clone());
            }
        }
        _ => {}
    }
}

fn rhythm(clock: &mut Clock, state: &mut Scan, nominal: Rational, sounding: bool) {
    if state.grace_depth > 0 || state.lyric_depth > 0 {
        return;
    }
    let length = state.scaling.effective(nominal);
    let onset = clock.total;
    clock.advance(length);
    if sounding && state.chord_mode_depth == 0 && length > zero() {
        state.spans.push((onset, clock.total));
    }
}
