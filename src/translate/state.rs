//! Translation state
//!
//! Everything the translator carries from one node to the next, grouped by
//! concern: timing, duration scaling, open forks, pending chord symbols, input
//! modes and the stack of entered containers.

use std::collections::BTreeMap;

use crate::builder::Meter;
use crate::ir::{Harmony, Tuplet};
use crate::models::{BranchLimit, Duration, GraceKind, InputMode, Pitch, Rational};
use crate::settings::ConversionSettings;
use crate::timing::{Clock, Scaling};

/// Musical time of the voice being walked.
#[derive(Debug, Clone)]
pub struct TimingState {
    pub clock: Clock,
    pub numerator: u32,
    pub denominator: u32,
    /// `\numericTimeSignature` is active
    pub numeric: bool,
    /// Ordinal of the staff being walked, counted in document order
    pub staff: Option<usize>,
    pub staves_seen: usize,
    /// Written duration reused by notes that omit one
    pub last_duration: Duration,
}

impl TimingState {
    pub fn new(settings: &ConversionSettings) -> Self {
        let (numerator, denominator) = settings.default_time;
        Self {
            clock: Clock::new(settings.default_measure()),
            numerator,
            denominator,
            numeric: false,
            staff: None,
            staves_seen: 0,
            last_duration: Duration::default(),
        }
    }

    pub fn set_time(&mut self, numerator: u32, denominator: u32) {
        self.numerator = numerator;
        self.denominator = denominator.max(1);
        self.clock.measure = Rational::new(numerator as i64, self.denominator as i64);
    }

    pub fn meter(&self) -> Meter {
        Meter {
            numerator: self.numerator,
            denominator: self.denominator,
            measure: self.clock.measure,
        }
    }

    /// Resolve an omitted duration and remember the result.
    pub fn written(&mut self, duration: Option<Duration>) -> Duration {
        let duration = duration.unwrap_or(self.last_duration);
        self.last_duration = duration;
        duration
    }
}

/// `\repeat tremolo n { ... }` in progress.
#[derive(Debug, Clone, Copy)]
pub struct TremoloRepeat {
    pub count: u32,
    /// Note heads in the body
    pub notes: usize,
    pub written: usize,
}

/// Duration scaling: tuplets, tremolo repeats and tuplet spans.
#[derive(Debug, Clone, Default)]
pub struct ScalingState {
    pub scaling: Scaling,
    /// `tupletSpannerDuration`
    pub span: Option<Rational>,
    pub tremolo: Option<TremoloRepeat>,
}

impl ScalingState {
    pub fn effective(&self, nominal: Rational) -> Rational {
        self.scaling.effective(nominal)
    }

    /// Bracket membership for the next note, consuming pending starts.
    pub fn take_tuplets(&mut self) -> Vec<Tuplet> {
        let mut out = Vec::with_capacity(self.scaling.tuplets.levels.len());
        for level in &mut self.scaling.tuplets.levels {
            let edge = if level.bracketed() && level.pending_start {
                Some(crate::ir::Edge::Start)
            } else {
                None
            };
            level.pending_start = false;
            out.push(Tuplet {
                actual: level.actual,
                normal: level.normal,
                edge,
                nr: level.nr,
                bracket: level.bracketed(),
            });
        }
        out
    }

    /// Add sounding time to every open bracket. Returns the bracket numbers
    /// whose span just filled up.
    pub fn elapse(&mut self, length: Rational) -> Vec<u32> {
        let mut finished = Vec::new();
        for level in &mut self.scaling.tuplets.levels {
            level.elapsed += length;
            if let Some(span) = level.span {
                if level.elapsed >= span && !level.pending_start {
                    level.elapsed = Rational::from_integer(0);
                    level.pending_start = true;
                    if level.bracketed() {
                        finished.push(level.nr);
                    }
                }
            }
        }
        finished
    }
}

/// A `<< >>` being walked.
#[derive(Debug, Clone)]
pub struct ForkFrame {
    /// Event stream depth right after entering the fork
    pub depth: usize,
    pub limit: BranchLimit,
    pub snapshot: Clock,
    pub meter: (u32, u32),
    /// Bar of the enclosing section where the fork starts
    pub start_bar: usize,
    /// Voice number of the enclosing section
    pub voice: u32,
    /// Clock at the end of the longest branch so far
    pub longest: Option<Clock>,
    /// Music branches seen so far
    pub branches: u32,
    /// The current branch writes into its own section
    pub open: bool,
    /// The current branch defers its final bar line check to the fork exit
    pub deferring: bool,
}

impl ForkFrame {
    /// Remember where the current branch ended.
    pub fn record_end(&mut self, clock: &Clock) {
        let longer = self.longest.map_or(true, |l| clock.total > l.total);
        if longer {
            self.longest = Some(*clock);
        }
    }
}

/// Chord symbols recorded in chord mode, waiting for a note to carry them.
#[derive(Debug, Clone, Default)]
pub struct ChordSymbols {
    pub pending: BTreeMap<Rational, Harmony>,
    last: Option<Rational>,
}

impl ChordSymbols {
    pub fn record(&mut self, at: Rational, root: &Pitch) {
        self.pending.insert(
            at,
            Harmony {
                root_step: root.step,
                root_alter: root.alter,
                bass: None,
                text: None,
                offset: Rational::from_integer(0),
            },
        );
        self.last = Some(at);
    }

    /// Fill in the modifier and bass of the last recorded symbol.
    pub fn specify(&mut self, text: Option<&str>, bass: Option<&Pitch>) {
        let Some(harmony) = self.last.and_then(|at| self.pending.get_mut(&at)) else {
            return;
        };
        if let Some(text) = text {
            let text = text.trim_start_matches(':');
            match harmony.text.as_mut() {
                Some(existing) => existing.push_str(text),
                None => harmony.text = Some(text.to_string()),
            }
        }
        if let Some(bass) = bass {
            harmony.bass = Some((bass.step, bass.alter));
        }
    }

    /// Remove every symbol starting inside `[onset, onset + length)`.
    pub fn take_within(&mut self, onset: Rational, length: Rational) -> Vec<Harmony> {
        let end = onset + length;
        let keys: Vec<Rational> = self
            .pending
            .range(onset..)
            .take_while(|(at, _)| **at < end)
            .map(|(at, _)| *at)
            .collect();
        keys.into_iter()
            .filter_map(|at| {
                self.pending.remove(&at).map(|mut h| {
                    h.offset = at - onset;
                    h
                })
            })
            .collect()
    }
}

/// Input modes and the flags that change how notes are read.
#[derive(Debug, Clone)]
pub struct ModeState {
    pub modes: Vec<InputMode>,
    /// Lyrics contexts, lyric modes and `\lyricsto` blocks entered
    pub lyric_depth: usize,
    /// `ChordNames` contexts and chord modes entered
    pub chord_depth: usize,
    pub grace: Option<GraceKind>,
    /// No note written yet in the current grace group
    pub grace_first: bool,
    pub auto_beam: bool,
    pub glissando: crate::ir::LineStyle,
}

impl ModeState {
    pub fn new(settings: &ConversionSettings) -> Self {
        Self {
            modes: Vec::new(),
            lyric_depth: 0,
            chord_depth: 0,
            grace: None,
            grace_first: false,
            auto_beam: settings.auto_beaming,
            glissando: crate::ir::LineStyle::Solid,
        }
    }

    pub fn current(&self) -> InputMode {
        self.modes.last().copied().unwrap_or(InputMode::Note)
    }

    pub fn in_lyrics(&self) -> bool {
        self.lyric_depth > 0
    }

    pub fn in_chord_mode(&self) -> bool {
        self.chord_depth > 0
    }
}

/// A chord whose notes are being written.
#[derive(Debug, Clone)]
pub struct OpenChord {
    pub written: Duration,
    pub length: Rational,
    pub onset: Rational,
    /// Metric position of the chord start, for beaming
    pub position: Rational,
    pub tuplets: Vec<Tuplet>,
    pub head_written: bool,
}

/// What an entered container has to undo when it exits.
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    Plain,
    Part { drum: bool },
    Piano,
    Group,
    Voice { in_fork: bool },
    Devnull,
    Lyrics { opened: bool },
    ChordNames,
    /// Children were dropped
    Skipped,
    Fork,
    Mode { lyric: bool, chord: bool },
    Transpose,
    Scaler,
    Grace,
    Repeat { count: u32, backward: bool },
    TremoloRepeat,
    Alternative { count: u32, endings: u32, index: u32 },
    Chord,
}

/// The full state of one translation.
#[derive(Debug, Clone)]
pub struct TranslationState {
    pub timing: TimingState,
    pub scaling: ScalingState,
    pub forks: Vec<ForkFrame>,
    pub chords: ChordSymbols,
    pub modes: ModeState,
    pub containers: Vec<Container>,
    pub chord: Option<OpenChord>,
    /// Enclosing `\transpose` intervals, innermost last
    pub transpose: Vec<(Pitch, Pitch)>,
    /// Left bar line waiting for the next bar to open
    pub pending_left: Option<crate::ir::Barline>,
}

impl TranslationState {
    pub fn new(settings: &ConversionSettings) -> Self {
        Self {
            timing: TimingState::new(settings),
            scaling: ScalingState::default(),
            forks: Vec::new(),
            chords: ChordSymbols::default(),
            modes: ModeState::new(settings),
            containers: Vec::new(),
            chord: None,
            transpose: Vec::new(),
            pending_left: None,
        }
    }

    /// Apply every enclosing transposition, innermost first.
    pub fn transposed(&self, pitch: &Pitch) -> Pitch {
        self.transpose
            .iter()
            .rev()
            .fold(*pitch, |p, (from, to)| p.transposed(from, to))
    }
}
