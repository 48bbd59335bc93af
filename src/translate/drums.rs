//! Drum note names
//!
//! Maps `\drummode` names to an instrument and a display position on the
//! five-line percussion staff.

use crate::models::Pitch;

/// (short name, long name, instrument, display step, display octave)
const DRUMS: &[(&str, &str, &str, u8, i8)] = &[
    ("bd", "bassdrum", "Bass Drum", 3, 4),
    ("bda", "acousticbassdrum", "Acoustic Bass Drum", 3, 4),
    ("sn", "snare", "Snare Drum", 0, 5),
    ("sna", "acousticsnare", "Acoustic Snare", 0, 5),
    ("sne", "electricsnare", "Electric Snare", 0, 5),
    ("ss", "sidestick", "Side Stick", 0, 5),
    ("hh", "hihat", "Hi-Hat", 4, 5),
    ("hhc", "closedhihat", "Closed Hi-Hat", 4, 5),
    ("hho", "openhihat", "Open Hi-Hat", 4, 5),
    ("hhp", "pedalhihat", "Pedal Hi-Hat", 3, 4),
    ("cymc", "crashcymbal", "Crash Cymbal", 5, 5),
    ("cymr", "ridecymbal", "Ride Cymbal", 5, 5),
    ("cymch", "chinesecymbal", "Chinese Cymbal", 5, 5),
    ("cb", "cowbell", "Cowbell", 5, 5),
    ("tomh", "hightom", "High Tom", 2, 5),
    ("tommh", "himidtom", "High Mid Tom", 1, 5),
    ("tomml", "lowmidtom", "Low Mid Tom", 6, 4),
    ("toml", "lowtom", "Low Tom", 5, 4),
    ("tomfh", "highfloortom", "High Floor Tom", 5, 4),
    ("tomfl", "lowfloortom", "Low Floor Tom", 4, 4),
    ("tamb", "tambourine", "Tambourine", 6, 4),
    ("cl", "claves", "Claves", 6, 4),
];

/// Instrument name and display pitch for a drum name.
///
/// Unknown names sit on the middle line and keep their own name.
pub fn lookup(name: &str) -> (String, Pitch) {
    DRUMS
        .iter()
        .find(|(short, long, ..)| *short == name || *long == name)
        .map(|(_, _, instrument, step, octave)| {
            (instrument.to_string(), Pitch::new(*step, 0, *octave))
        })
        .unwrap_or_else(|| (name.to_string(), Pitch::new(6, 0, 4)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_long_names() {
        let (name, pitch) = lookup("sn");
        assert_eq!(name, "Snare Drum");
        assert_eq!((pitch.step, pitch.octave), (0, 5));
        assert_eq!(lookup("hihat").0, "Hi-Hat");
        let (unknown, middle) = lookup("gong");
        assert_eq!(unknown, "gong");
        assert_eq!((middle.step, middle.octave), (6, 4));
    }
}
