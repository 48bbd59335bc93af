// Duration helpers for MusicXML export

use crate::ir::{BarItem, Score};
use crate::models::duration::lcm;
use crate::models::Rational;

/// MusicXML `<type>` name for a note value given as a power of two.
///
/// ```
/// use ly_musicxml::renderers::musicxml::duration::note_type_name;
///
/// assert_eq!(note_type_name(2), "quarter");
/// assert_eq!(note_type_name(-1), "breve");
/// ```
pub fn note_type_name(log: i8) -> &'static str {
    match log {
        i8::MIN..=-3 => "maxima",
        -2 => "long",
        -1 => "breve",
        0 => "whole",
        1 => "half",
        2 => "quarter",
        3 => "eighth",
        4 => "16th",
        5 => "32nd",
        6 => "64th",
        7 => "128th",
        8 => "256th",
        9 => "512th",
        _ => "1024th",
    }
}

/// Smallest divisions-per-quarter that expresses every duration in the
/// score as a whole number.
pub fn divisions_for(score: &Score) -> u32 {
    let mut divisions: i64 = 1;
    let mut add = |length: Rational| {
        let quarters = length * Rational::from_integer(4);
        if quarters > Rational::from_integer(0) {
            divisions = lcm(divisions, *quarters.denom());
        }
    };
    for bar in score.parts.iter().flat_map(|p| p.bars.iter()) {
        for item in &bar.items {
            match item {
                BarItem::Note(note) if note.is_grace() => {}
                BarItem::Note(note) => {
                    add(note.mus.duration);
                    note.mus.harmonies.iter().for_each(|h| add(h.offset));
                }
                BarItem::Rest(rest) => add(rest.mus.duration),
                BarItem::Backup(backup) => add(backup.duration),
            }
        }
    }
    u32::try_from(divisions).unwrap_or(u32::MAX)
}

/// A whole-note based length in divisions.
pub fn to_divisions(length: Rational, divisions: u32) -> u32 {
    let scaled = length * Rational::from_integer(4 * divisions as i64);
    u32::try_from(scaled.round().to_integer()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Bar, BarMus, BarNote, NoteType, Part};
    use crate::models::{ratio, zero, Pitch};

    fn note(duration: Rational) -> BarItem {
        let mus = BarMus::new(duration, NoteType { log: 3, dots: 0 }, zero(), 1);
        BarItem::Note(BarNote::new(mus, Pitch::new(0, 0, 4)))
    }

    #[test]
    fn test_type_names() {
        assert_eq!(note_type_name(0), "whole");
        assert_eq!(note_type_name(4), "16th");
        assert_eq!(note_type_name(-4), "maxima");
    }

    #[test]
    fn test_divisions_cover_triplets() {
        let mut bar = Bar::new();
        bar.items = vec![note(ratio(1, 8)), note(ratio(1, 12)), note(ratio(1, 16))];
        let mut part = Part::new(None);
        part.bars.push(bar);
        let mut score = Score::new();
        score.parts.push(part);
        // eighth = 1/2, triplet eighth = 1/3, sixteenth = 1/4 quarter
        assert_eq!(divisions_for(&score), 12);
        assert_eq!(to_divisions(ratio(1, 12), 12), 4);
        assert_eq!(to_divisions(ratio(1, 1), 12), 48);
    }

    #[test]
    fn test_empty_score_divisions() {
        assert_eq!(divisions_for(&Score::new()), 1);
    }
}
