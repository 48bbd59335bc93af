// End-to-end lowering scenarios

mod common;

use common::*;
use ly_musicxml::ir::{BarItem, BeamState, TieType};
use ly_musicxml::models::{ratio, Node, RepeatKind};
use ly_musicxml::renderers::musicxml::ops::BarSide;
use ly_musicxml::{ConversionSettings, DiagnosticKind, OutputOp};
use pretty_assertions::assert_eq;

#[test]
fn test_one_bar_of_quarters() {
    let tree = staff(None, (0..4).map(quarter).collect());
    let (score, recorder, diagnostics) = ops(&tree);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    let bars: Vec<_> = score.parts[0].bars.iter().filter(|b| !b.is_empty()).collect();
    assert_eq!(bars.len(), 1);
    assert!(!bars[0].items.iter().any(|i| matches!(i, BarItem::Backup(_))));

    assert_eq!(measure_count(&recorder), 1);
    let attributes = recorder
        .ops
        .iter()
        .find_map(|op| match op {
            OutputOp::Attributes(a) => Some(a.clone()),
            _ => None,
        })
        .expect("attributes in the first measure");
    let time = attributes.time.expect("seeded time signature");
    assert_eq!((time.numerator, time.denominator), (4, 4));
    assert_eq!(attributes.clefs[0].sign, "G");
    assert_eq!(attributes.clefs[0].line, Some(2));

    let notes: Vec<_> = recorder.notes().collect();
    assert_eq!(notes.len(), 4);
    assert!(notes.iter().all(|n| n.mus.duration == ratio(1, 4)));
    assert!(notes.iter().all(|n| n.beam == BeamState::None));
}

#[test]
fn test_eighths_beam_in_fours() {
    let tree = staff(None, (0..8).map(eighth).collect());
    let (_, recorder, _) = ops(&tree);
    let beams: Vec<BeamState> = recorder.notes().map(|n| n.beam).collect();
    let group = [BeamState::Begin, BeamState::Continue, BeamState::Continue, BeamState::End];
    assert_eq!(beams, [group, group].concat());
}

#[test]
fn test_unfolded_volta_reuses_first_ending() {
    // \repeat volta 3 { a4 } \alternative { { b4 } { c4 } }
    let repeat = Node::Repeat {
        repeat: RepeatKind::Volta,
        count: 3,
        children: vec![
            Node::seq(vec![quarter(5)]),
            Node::Alternative {
                children: vec![Node::seq(vec![quarter(6)]), Node::seq(vec![quarter(0)])],
            },
        ],
    };
    let settings = ConversionSettings {
        unfold_repeats: true,
        ..Default::default()
    };
    let (score, _, _) = ops_with(&staff(None, vec![repeat]), &settings);
    let steps: Vec<u8> = all_notes(&score).iter().map(|n| n.pitch.step).collect();
    // a b a c a b
    assert_eq!(steps, vec![5, 6, 5, 0, 5, 6]);
}

#[test]
fn test_bar_line_and_time_change_at_same_boundary() {
    let [bar, style] = Node::bar("|.");
    let tree = staff(
        None,
        vec![
            note(0, 0),
            bar,
            style,
            Node::time(3, 4),
            Node::note(
                ly_musicxml::models::Pitch::new(1, 0, 4),
                ly_musicxml::models::Duration::new(1, 1),
            ),
        ],
    );
    let (_, recorder, diagnostics) = ops(&tree);
    assert_eq!(
        diagnostics.iter().filter(|d| d.kind == DiagnosticKind::BarlineConflict).count(),
        0
    );
    assert_eq!(measure_count(&recorder), 2);

    // the right bar line closes measure 1, the new time opens measure 2
    let mut measure = 0;
    let mut right_in = None;
    let mut time_in = None;
    for op in &recorder.ops {
        match op {
            OutputOp::StartMeasure { number, .. } => measure = *number,
            OutputOp::Barline { side: BarSide::Right, barline }
                if barline.style.as_deref() == Some("light-heavy") =>
            {
                right_in = Some(measure)
            }
            OutputOp::Attributes(a) if a.time.map(|t| t.numerator) == Some(3) => time_in = Some(measure),
            _ => {}
        }
    }
    assert_eq!(right_in, Some(1));
    assert_eq!(time_in, Some(2));
}

#[test]
fn test_bar_line_inside_note_is_dropped() {
    let [bar, style] = Node::bar("||");
    let upper = staff(None, vec![quarter(0), bar, style, quarter(1), note(2, 1)]);
    let lower = staff(None, vec![note(0, 1), note(1, 1)]);
    let tree = score(vec![Node::sim(vec![upper, lower])]);
    let (_, recorder, diagnostics) = ops(&tree);
    assert_eq!(
        diagnostics.iter().filter(|d| d.kind == DiagnosticKind::BarlineConflict).count(),
        1
    );
    assert!(!recorder.ops.iter().any(|op| matches!(
        op,
        OutputOp::Barline { barline, .. } if barline.style.as_deref() == Some("light-light")
    )));
}

#[test]
fn test_tied_continuation_gets_no_syllable() {
    // \new Voice = "mel" { c4 d2 ~ d4 }  \new Lyrics \lyricsto "mel" { one two }
    let melody = Node::context(
        "Voice",
        Some("mel"),
        vec![Node::seq(vec![quarter(0), note(1, 1), Node::Tie, quarter(1)])],
    );
    let words = Node::context(
        "Lyrics",
        None,
        vec![Node::LyricsTo {
            voice: "mel".into(),
            children: vec![
                Node::LyricText { text: "one".into(), duration: None },
                Node::LyricText { text: "two".into(), duration: None },
            ],
        }],
    );
    let tree = score(vec![Node::sim(vec![Node::context("Staff", None, vec![melody]), words])]);
    let (score, _, diagnostics) = ops(&tree);
    assert_eq!(
        diagnostics.iter().filter(|d| d.kind == DiagnosticKind::UnmatchedLyrics).count(),
        0
    );
    let notes = all_notes(&score);
    assert_eq!(notes.len(), 3);
    let texts: Vec<Option<&str>> = notes
        .iter()
        .map(|n| n.lyrics.first().map(|l| l.text.as_str()))
        .collect();
    assert_eq!(texts, vec![Some("one"), Some("two"), None]);
    assert_eq!(notes[2].ties, vec![TieType::Stop]);
}
