//! Lyric streams and their alignment onto notes
//!
//! Lyrics arrive as a flat stream per `\lyricsto`/`\addlyrics` block. After
//! the walk every stream is zipped against the notes of its voice in time
//! order. Tied continuations and notes inside a slur are melismas and get no
//! syllable unless `ignoreMelismata` is on.

use std::collections::HashMap;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ir::{BarItem, Lyric, Score, Syllabic, TieType};
use crate::models::Rational;

#[derive(Debug, Clone, PartialEq)]
pub enum LyricEvent {
    Syllable(String),
    /// `--`
    Hyphen,
    /// `__`
    Extender,
    /// `_`
    Skip,
    IgnoreMelismata(bool),
    AssociatedVoice(String),
}

/// Lyric stream bound to a voice name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricSection {
    pub voice: Option<String>,
    pub events: Vec<LyricEvent>,
}

impl LyricSection {
    pub fn new(voice: Option<String>) -> Self {
        Self {
            voice,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Syllable {
        text: String,
        syllabic: Syllabic,
        extend: bool,
    },
    Skip,
    Ignore(bool),
    Switch(String),
}

/// Resolve hyphens and extenders into per-syllable flags.
fn tokens(events: &[LyricEvent]) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    let mut last_syllable: Option<usize> = None;
    let mut hyphen_pending = false;
    for event in events {
        match event {
            LyricEvent::Syllable(text) => {
                let syllabic = if hyphen_pending { Syllabic::End } else { Syllabic::Single };
                hyphen_pending = false;
                last_syllable = Some(out.len());
                out.push(Token::Syllable {
                    text: text.replace('~', "\u{203F}"),
                    syllabic,
                    extend: false,
                });
            }
            LyricEvent::Hyphen => {
                if let Some(Token::Syllable { syllabic, .. }) = last_syllable.and_then(|i| out.get_mut(i)) {
                    *syllabic = match *syllabic {
                        Syllabic::Single => Syllabic::Begin,
                        Syllabic::End => Syllabic::Middle,
                        other => other,
                    };
                    hyphen_pending = true;
                }
            }
            LyricEvent::Extender => {
                if let Some(Token::Syllable { extend, .. }) = last_syllable.and_then(|i| out.get_mut(i)) {
                    *extend = true;
                }
            }
            LyricEvent::Skip => {
                hyphen_pending = false;
                out.push(Token::Skip);
            }
            LyricEvent::IgnoreMelismata(on) => out.push(Token::Ignore(*on)),
            LyricEvent::AssociatedVoice(voice) => out.push(Token::Switch(voice.clone())),
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct NoteLocation {
    part: usize,
    bar: usize,
    item: usize,
    onset: Rational,
    melisma: bool,
}

/// Notes of `voice` in time order, starting after `after` when given.
fn voice_notes(score: &Score, voice: &str, after: Option<Rational>) -> Vec<NoteLocation> {
    let mut found = Vec::new();
    for (p, part) in score.parts.iter().enumerate() {
        for (b, bar) in part.bars.iter().enumerate() {
            for (i, item) in bar.items.iter().enumerate() {
                let BarItem::Note(note) = item else { continue };
                if note.mus.chord || note.is_grace() || note.mus.voice_name.as_deref() != Some(voice) {
                    continue;
                }
                found.push((p, b, i, note));
            }
        }
    }
    found.sort_by(|a, b| a.3.mus.onset.cmp(&b.3.mus.onset));

    let mut open_slurs: i32 = 0;
    let mut out = Vec::with_capacity(found.len());
    for (part, bar, item, note) in found {
        let tied = note.ties.contains(&TieType::Stop);
        let melisma = tied || open_slurs > 0;
        for slur in note.slurs.iter().filter(|s| !s.phrasing) {
            match slur.edge {
                crate::ir::Edge::Start => open_slurs += 1,
                crate::ir::Edge::Stop => open_slurs = (open_slurs - 1).max(0),
            }
        }
        if after.map_or(true, |t| note.mus.onset > t) {
            out.push(NoteLocation {
                part,
                bar,
                item,
                onset: note.mus.onset,
                melisma,
            });
        }
    }
    out
}

fn attach(score: &mut Score, at: NoteLocation, lyric: Lyric) {
    let item = score
        .parts
        .get_mut(at.part)
        .and_then(|p| p.bars.get_mut(at.bar))
        .and_then(|b| b.items.get_mut(at.item));
    if let Some(BarItem::Note(note)) = item {
        note.lyrics.push(lyric);
    }
}

/// Attach every lyric section to the notes of its voice.
pub fn align(score: &mut Score, sections: &[LyricSection], diagnostics: &mut Diagnostics) {
    let mut verses: HashMap<String, u32> = HashMap::new();
    for section in sections {
        let Some(voice) = section.voice.clone() else {
            diagnostics.warn(DiagnosticKind::UnmatchedLyrics, "lyrics without a voice to follow");
            continue;
        };
        let verse = {
            let count = verses.entry(voice.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let mut target = voice;
        let mut notes = voice_notes(score, &target, None);
        if notes.is_empty() {
            diagnostics.warn(
                DiagnosticKind::UnmatchedLyrics,
                format!("lyrics follow voice \"{}\" which has no notes", target),
            );
            continue;
        }
        let mut next = 0;
        let mut ignore = false;
        let mut last_onset = None;
        let mut unmatched = 0;

        for token in tokens(&section.events) {
            match token {
                Token::Ignore(on) => ignore = on,
                Token::Switch(name) => {
                    notes = voice_notes(score, &name, last_onset);
                    target = name;
                    next = 0;
                }
                Token::Skip | Token::Syllable { .. } => {
                    while !ignore && notes.get(next).map_or(false, |n| n.melisma) {
                        next += 1;
                    }
                    let Some(at) = notes.get(next).copied() else {
                        unmatched += 1;
                        continue;
                    };
                    next += 1;
                    last_onset = Some(at.onset);
                    if let Token::Syllable { text, syllabic, extend } = token {
                        let lyric = Lyric {
                            text,
                            syllabic,
                            number: verse,
                            extend,
                        };
                        attach(score, at, lyric);
                    }
                }
            }
        }
        if unmatched > 0 {
            diagnostics.warn(
                DiagnosticKind::UnmatchedLyrics,
                format!("{} syllables left over after the last note of \"{}\"", unmatched, target),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Bar, BarMus, BarNote, Edge, NoteType, Part, Slur, LineStyle};
    use crate::models::{ratio, Pitch};

    fn note(onset: i64, voice: &str) -> BarNote {
        let mut mus = BarMus::new(ratio(1, 4), NoteType { log: 2, dots: 0 }, ratio(onset, 4), 1);
        mus.voice_name = Some(voice.to_string());
        BarNote::new(mus, Pitch::new(0, 0, 4))
    }

    fn score_of(notes: Vec<BarNote>) -> Score {
        let mut part = Part::new(None);
        let mut bar = Bar::new();
        bar.items = notes.into_iter().map(BarItem::Note).collect();
        part.bars.push(bar);
        let mut score = Score::new();
        score.parts.push(part);
        score
    }

    fn lyric_texts(score: &Score) -> Vec<Option<String>> {
        score.parts[0].bars[0]
            .items
            .iter()
            .map(|i| i.as_note().and_then(|n| n.lyrics.first()).map(|l| l.text.clone()))
            .collect()
    }

    fn syllables(words: &[&str]) -> Vec<LyricEvent> {
        words
            .iter()
            .map(|w| match *w {
                "--" => LyricEvent::Hyphen,
                "__" => LyricEvent::Extender,
                "_" => LyricEvent::Skip,
                w => LyricEvent::Syllable(w.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_tied_note_is_skipped() {
        let first = note(0, "v");
        let mut second = note(1, "v");
        second.ties.push(TieType::Start);
        let mut third = note(2, "v");
        third.ties.push(TieType::Stop);
        let mut score = score_of(vec![first, second, third]);
        let section = LyricSection {
            voice: Some("v".into()),
            events: syllables(&["one", "two"]),
        };
        let mut diagnostics = Diagnostics::new();
        align(&mut score, &[section], &mut diagnostics);
        assert_eq!(
            lyric_texts(&score),
            vec![Some("one".to_string()), Some("two".to_string()), None]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_slur_melisma_and_ignore() {
        let slur = |edge| Slur { nr: 1, edge, phrasing: false, line: LineStyle::Solid };
        let mut a = note(0, "v");
        a.slurs.push(slur(Edge::Start));
        let mut b = note(1, "v");
        b.slurs.push(slur(Edge::Stop));
        let c = note(2, "v");
        let mut score = score_of(vec![a.clone(), b.clone(), c.clone()]);
        let section = LyricSection {
            voice: Some("v".into()),
            events: syllables(&["la", "di"]),
        };
        let mut diagnostics = Diagnostics::new();
        align(&mut score, &[section], &mut diagnostics);
        assert_eq!(lyric_texts(&score), vec![Some("la".into()), None, Some("di".into())]);

        let mut score = score_of(vec![a, b, c]);
        let mut events = vec![LyricEvent::IgnoreMelismata(true)];
        events.extend(syllables(&["la", "di"]));
        align(&mut score, &[LyricSection { voice: Some("v".into()), events }], &mut diagnostics);
        assert_eq!(lyric_texts(&score), vec![Some("la".into()), Some("di".into()), None]);
    }

    #[test]
    fn test_hyphens_and_extender() {
        let mut score = score_of(vec![note(0, "v"), note(1, "v"), note(2, "v"), note(3, "v")]);
        let section = LyricSection {
            voice: Some("v".into()),
            events: syllables(&["hal", "--", "le", "--", "lu", "jah", "__"]),
        };
        let mut diagnostics = Diagnostics::new();
        align(&mut score, &[section], &mut diagnostics);
        let lyrics: Vec<(Syllabic, bool)> = score.parts[0].bars[0]
            .items
            .iter()
            .filter_map(|i| i.as_note())
            .map(|n| (n.lyrics[0].syllabic, n.lyrics[0].extend))
            .collect();
        assert_eq!(
            lyrics,
            vec![
                (Syllabic::Begin, false),
                (Syllabic::Middle, false),
                (Syllabic::End, false),
                (Syllabic::Single, true),
            ]
        );
    }

    #[test]
    fn test_skip_and_verses_and_undertie() {
        let mut score = score_of(vec![note(0, "v"), note(1, "v")]);
        let first = LyricSection {
            voice: Some("v".into()),
            events: syllables(&["_", "a~b"]),
        };
        let second = LyricSection {
            voice: Some("v".into()),
            events: syllables(&["x", "y", "z"]),
        };
        let mut diagnostics = Diagnostics::new();
        align(&mut score, &[first, second], &mut diagnostics);
        let items = &score.parts[0].bars[0].items;
        let second_note = items[1].as_note().unwrap();
        assert_eq!(second_note.lyrics[0].text, "a\u{203F}b");
        assert_eq!(second_note.lyrics[0].number, 1);
        assert_eq!(second_note.lyrics[1].number, 2);
        assert_eq!(diagnostics.count(DiagnosticKind::UnmatchedLyrics), 1);
    }

    #[test]
    fn test_associated_voice_switch() {
        let mut score = score_of(vec![note(0, "s"), note(1, "s"), note(1, "a"), note(2, "a")]);
        let mut events = syllables(&["one"]);
        events.push(LyricEvent::AssociatedVoice("a".into()));
        events.extend(syllables(&["two"]));
        let mut diagnostics = Diagnostics::new();
        align(&mut score, &[LyricSection { voice: Some("s".into()), events }], &mut diagnostics);
        assert_eq!(
            lyric_texts(&score),
            vec![Some("one".into()), None, Some("two".into()), None]
        );
    }

    #[test]
    fn test_missing_voice_reported() {
        let mut score = score_of(vec![note(0, "v")]);
        let mut diagnostics = Diagnostics::new();
        align(
            &mut score,
            &[LyricSection { voice: Some("nobody".into()), events: syllables(&["a"]) }],
            &mut diagnostics,
        );
        assert_eq!(diagnostics.count(DiagnosticKind::UnmatchedLyrics), 1);
    }
}
