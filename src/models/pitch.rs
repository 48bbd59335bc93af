//! Pitch representation and transposition
//!
//! Pitches carry a diatonic step, a chromatic alteration in semitones and an
//! octave in MusicXML numbering (octave 4 starts at middle C, LilyPond `c'`).

use serde::{Deserialize, Serialize};

/// Step letters in MusicXML order.
pub const STEP_NAMES: [&str; 7] = ["C", "D", "E", "F", "G", "A", "B"];

/// Semitones above C for each natural step.
const STEP_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Position of each natural step on the circle of fifths, relative to C.
const STEP_FIFTHS: [i32; 7] = [0, 2, 4, -1, 1, 3, 5];

/// How an accidental should be displayed regardless of key context.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccidentalMark {
    /// `c!` always prints the accidental
    Forced,
    /// `c?` prints it in parentheses
    Cautionary,
}

/// A concrete pitch.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pitch {
    /// Diatonic step, 0 = C through 6 = B
    pub step: u8,
    /// Chromatic alteration in semitones (-2..=2)
    #[serde(default)]
    pub alter: i8,
    /// Octave number (4 = middle C octave)
    pub octave: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accidental: Option<AccidentalMark>,
}

impl Pitch {
    pub fn new(step: u8, alter: i8, octave: i8) -> Self {
        Self {
            step: step % 7,
            alter,
            octave,
            accidental: None,
        }
    }

    /// Step letter as used in MusicXML `<step>`.
    pub fn step_name(&self) -> &'static str {
        STEP_NAMES[(self.step % 7) as usize]
    }

    /// Absolute diatonic index (C0 = 0).
    pub fn diatonic(&self) -> i32 {
        self.octave as i32 * 7 + self.step as i32
    }

    /// Absolute chromatic index (C0 = 0).
    pub fn semitones(&self) -> i32 {
        self.octave as i32 * 12 + STEP_SEMITONES[self.step as usize % 7] + self.alter as i32
    }

    /// Same pitch class and octave, ignoring display marks.
    pub fn sounds_like(&self, other: &Pitch) -> bool {
        self.step == other.step && self.alter == other.alter && self.octave == other.octave
    }

    /// Transpose by the interval that takes `from` to `to`.
    pub fn transposed(&self, from: &Pitch, to: &Pitch) -> Pitch {
        let diatonic = self.diatonic() + (to.diatonic() - from.diatonic());
        let chromatic = self.semitones() + (to.semitones() - from.semitones());
        let step = diatonic.rem_euclid(7);
        let octave = diatonic.div_euclid(7);
        let natural = octave * 12 + STEP_SEMITONES[step as usize];
        Pitch {
            step: step as u8,
            alter: (chromatic - natural) as i8,
            octave: octave as i8,
            accidental: self.accidental,
        }
    }

    /// Circle-of-fifths position of this pitch class as a major tonic.
    pub fn fifths(&self) -> i32 {
        STEP_FIFTHS[self.step as usize % 7] + 7 * self.alter as i32
    }

    /// Parse a LilyPond (Dutch) note name with octave marks: `c`, `fis''`, `bes,`, `e!`.
    ///
    /// Without octave marks `c` is the octave below middle C, as in
    /// absolute LilyPond entry.
    pub fn from_lily(text: &str) -> Option<Self> {
        let mut chars = text.chars().peekable();
        let letter = chars.next()?;
        let step = match letter {
            'c' => 0,
            'd' => 1,
            'e' => 2,
            'f' => 3,
            'g' => 4,
            'a' => 5,
            'b' => 6,
            _ => return None,
        };
        let rest: String = chars.collect();
        let name_end = rest
            .find(|c: char| matches!(c, '\'' | ',' | '!' | '?'))
            .unwrap_or(rest.len());
        let (suffix, marks) = rest.split_at(name_end);
        let alter = match (letter, suffix) {
            (_, "") => 0,
            (_, "is") => 1,
            (_, "isis") => 2,
            (_, "es") => -1,
            (_, "eses") => -2,
            ('e' | 'a', "s") => -1,
            ('e' | 'a', "ses") => -2,
            _ => return None,
        };
        let mut octave = 3i8;
        let mut accidental = None;
        for mark in marks.chars() {
            match mark {
                '\'' => octave += 1,
                ',' => octave -= 1,
                '!' => accidental = Some(AccidentalMark::Forced),
                '?' => accidental = Some(AccidentalMark::Cautionary),
                _ => return None,
            }
        }
        Some(Pitch {
            step,
            alter,
            octave,
            accidental,
        })
    }
}

/// Key signature fifths for a tonic and a mode name.
///
/// Unknown modes are treated as major.
pub fn key_fifths(tonic: &Pitch, mode: &str) -> i32 {
    let offset = match mode.trim_start_matches('\\') {
        "minor" | "aeolian" => -3,
        "dorian" => -2,
        "phrygian" => -4,
        "lydian" => 1,
        "mixolydian" => -1,
        "locrian" => -5,
        _ => 0,
    };
    tonic.fifths() + offset
}
