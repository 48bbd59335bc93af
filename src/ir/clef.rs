//! Clef names to MusicXML sign, line and octave change
//!
//! Accepts the LilyPond clef names, with the `_8` / `^15` style octave
//! suffixes. Unknown names fall back to treble.

use super::types::ClefAttr;

/// Resolve a clef name such as `"bass"`, `"treble_8"` or `"G"`.
pub fn clef_from_name(name: &str, staff: Option<u32>) -> ClefAttr {
    let name = name.trim_matches('"');
    let (base, octave_change) = split_octave_suffix(name);
    let (sign, line) = match base {
        "treble" | "violin" | "G" | "G2" => ("G", Some(2)),
        "french" => ("G", Some(1)),
        "bass" | "F" => ("F", Some(4)),
        "varbaritone" => ("F", Some(3)),
        "subbass" => ("F", Some(5)),
        "alto" | "C" => ("C", Some(3)),
        "tenor" => ("C", Some(4)),
        "baritone" => ("C", Some(5)),
        "mezzosoprano" => ("C", Some(2)),
        "soprano" => ("C", Some(1)),
        "percussion" => ("percussion", None),
        "tab" => ("TAB", Some(5)),
        _ => ("G", Some(2)),
    };
    ClefAttr {
        sign: sign.to_string(),
        line,
        octave_change,
        staff,
    }
}

fn split_octave_suffix(name: &str) -> (&str, i8) {
    let Some(pos) = name.find(['_', '^']) else {
        return (name, 0);
    };
    let (base, suffix) = name.split_at(pos);
    let down = suffix.starts_with('_');
    let octaves = match suffix[1..].trim_matches(|c| c == '(' || c == ')') {
        "8" => 1,
        "15" => 2,
        _ => 0,
    };
    (base, if down { -octaves } else { octaves })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_clefs() {
        let bass = clef_from_name("bass", None);
        assert_eq!((bass.sign.as_str(), bass.line), ("F", Some(4)));
        let alto = clef_from_name("alto", Some(2));
        assert_eq!((alto.sign.as_str(), alto.line, alto.staff), ("C", Some(3), Some(2)));
        let perc = clef_from_name("percussion", None);
        assert_eq!(perc.line, None);
    }

    #[test]
    fn test_octave_suffix() {
        let tenor_g = clef_from_name("\"treble_8\"", None);
        assert_eq!((tenor_g.sign.as_str(), tenor_g.octave_change), ("G", -1));
        let high = clef_from_name("treble^15", None);
        assert_eq!(high.octave_change, 2);
    }

    #[test]
    fn test_unknown_falls_back_to_treble() {
        let clef = clef_from_name("neomensural-c3", None);
        assert_eq!(clef.sign, "G");
    }
}
