// Part layout and MusicXML text produced by the reference writer

mod common;

use common::*;
use ly_musicxml::ir::{Edge, GroupSymbol};
use ly_musicxml::models::{from_json, Node, Pitch, ScalerKind};
use ly_musicxml::{convert_to_musicxml, ConversionError, ConversionSettings, DiagnosticKind, OutputOp};
use pretty_assertions::assert_eq;

#[test]
fn test_piano_staff_is_one_part_with_two_staves() {
    let right = staff(Some("rh"), (0..4).map(quarter).collect());
    let mut left_music = vec![Node::Clef { name: "bass".into() }];
    left_music.extend((0..4).map(|s| Node::note(Pitch::new(s, 0, 3), ly_musicxml::models::Duration::new(2, 0))));
    let left = staff(Some("lh"), left_music);
    let tree = score(vec![Node::context("PianoStaff", None, vec![Node::sim(vec![right, left])])]);

    let (score, recorder, _) = ops(&tree);
    assert_eq!(score.parts.len(), 1);
    assert_eq!(score.parts[0].staves, 2);

    let parts: Vec<u32> = recorder
        .ops
        .iter()
        .filter_map(|op| match op {
            OutputOp::ScorePart(p) => Some(p.staves),
            _ => None,
        })
        .collect();
    assert_eq!(parts, vec![2]);

    let lower: Vec<_> = recorder.notes().filter(|n| n.mus.staff == Some(2)).collect();
    assert_eq!(lower.len(), 4);
    assert!(lower.iter().all(|n| n.mus.voice == 5));
    assert!(recorder.ops.contains(&OutputOp::Backup { duration: 4 }));

    let attributes = recorder
        .ops
        .iter()
        .find_map(|op| match op {
            OutputOp::Attributes(a) => Some(a.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(attributes.staves, Some(2));
    let signs: Vec<(Option<u32>, &str)> = attributes
        .clefs
        .iter()
        .map(|c| (c.staff, c.sign.as_str()))
        .collect();
    assert!(signs.contains(&(Some(1), "G")));
    assert!(signs.contains(&(Some(2), "F")));
}

#[test]
fn test_nested_groups_in_part_list() {
    let inner = Node::context(
        "ChoirStaff",
        None,
        vec![Node::sim(vec![
            staff(None, vec![note(0, 0)]),
            staff(None, vec![note(2, 0)]),
        ])],
    );
    let tree = score(vec![Node::context(
        "StaffGroup",
        None,
        vec![Node::sim(vec![staff(None, vec![note(4, 0)]), inner])],
    )]);
    let (_, recorder, _) = ops(&tree);
    let list: Vec<String> = recorder
        .ops
        .iter()
        .filter_map(|op| match op {
            OutputOp::StartPartGroup(g) => Some(format!("start {}", g.number)),
            OutputOp::EndPartGroup { number } => Some(format!("stop {}", number)),
            OutputOp::ScorePart(p) => Some(p.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(list, vec!["start 1", "P1", "start 2", "P2", "P3", "stop 2", "stop 1"]);
    let symbols: Vec<GroupSymbol> = recorder
        .ops
        .iter()
        .filter_map(|op| match op {
            OutputOp::StartPartGroup(g) => Some(g.symbol),
            _ => None,
        })
        .collect();
    assert_eq!(symbols, vec![GroupSymbol::Bracket, GroupSymbol::Bracket]);
}

#[test]
fn test_triplet_durations_and_brackets() {
    let triplet = Node::Scaler {
        scaling: ScalerKind::Tuplet,
        numerator: 3,
        denominator: 2,
        span: None,
        children: vec![eighth(0), eighth(1), eighth(2)],
    };
    let mut music = vec![triplet];
    music.extend((3..6).map(quarter));
    let (_, recorder, _) = ops(&staff(None, music));

    let durations: Vec<u32> = recorder
        .ops
        .iter()
        .filter_map(|op| match op {
            OutputOp::Note { duration, .. } => Some(*duration),
            _ => None,
        })
        .collect();
    assert_eq!(durations, vec![1, 1, 1, 3, 3, 3]);

    let edges: Vec<Option<Edge>> = recorder
        .notes()
        .take(3)
        .map(|n| n.mus.tuplets.first().and_then(|t| t.edge))
        .collect();
    assert_eq!(edges, vec![Some(Edge::Start), None, Some(Edge::Stop)]);

    let output = convert_to_musicxml(&staff(None, {
        let mut music = vec![Node::Scaler {
            scaling: ScalerKind::Tuplet,
            numerator: 3,
            denominator: 2,
            span: None,
            children: vec![eighth(0), eighth(1), eighth(2)],
        }];
        music.extend((3..6).map(quarter));
        music
    }), &ConversionSettings::default())
    .unwrap();
    let doc = parse_xml(&output.xml);
    let divisions = doc.descendants().find(|n| n.has_tag_name("divisions")).and_then(|n| n.text());
    assert_eq!(divisions, Some("3"));
    let actual: Vec<&str> = doc
        .descendants()
        .filter(|n| n.has_tag_name("actual-notes"))
        .filter_map(|n| n.text())
        .collect();
    assert_eq!(actual, vec!["3", "3", "3"]);
    let tuplet_types: Vec<&str> = doc
        .descendants()
        .filter(|n| n.has_tag_name("tuplet"))
        .filter_map(|n| n.attribute("type"))
        .collect();
    assert_eq!(tuplet_types, vec!["start", "stop"]);
}

#[test]
fn test_chord_symbols_with_offsets() {
    // \new ChordNames \chordmode { c2:m7 g4 g4 }  \new Staff { c1 }
    let chords = Node::context(
        "ChordNames",
        None,
        vec![Node::seq(vec![
            note(0, 1),
            Node::ChordSpecifier {
                text: Some(":m7".into()),
                bass: None,
            },
            quarter(4),
            quarter(4),
        ])],
    );
    let tree = score(vec![Node::sim(vec![chords, staff(None, vec![note(0, 0)])])]);
    let (score, recorder, _) = ops(&tree);

    let notes = all_notes(&score);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].mus.harmonies.len(), 3);

    let harmonies: Vec<(u8, Option<String>, u32)> = recorder
        .ops
        .iter()
        .filter_map(|op| match op {
            OutputOp::Harmony { harmony, offset } => {
                Some((harmony.root_step, harmony.text.clone(), *offset))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        harmonies,
        vec![(0, Some("m7".to_string()), 0), (4, None, 2), (4, None, 3)]
    );
}

#[test]
fn test_json_tree_to_musicxml() {
    let json = r#"{"kind":"score","children":[
        {"kind":"header","fields":[["title","Little Tune"],["composer","Anon."]]},
        {"kind":"context","context":"Staff","children":[
            {"kind":"sequential","children":[
                {"kind":"key_signature","pitch":{"step":4,"octave":4},"mode":"\\major"},
                {"kind":"note","pitch":{"step":4,"octave":4},"duration":{"log":2}},
                {"kind":"note","pitch":{"step":3,"alter":1,"octave":4},"duration":{"log":2}},
                {"kind":"articulation","name":"staccato"},
                {"kind":"note","pitch":{"step":4,"octave":4},"duration":{"log":1}},
                {"kind":"dynamic","name":"p"}
            ]}
        ]}
    ]}"#;
    let tree = from_json(json).unwrap();
    let output = convert_to_musicxml(&tree, &ConversionSettings::default()).unwrap();
    let doc = parse_xml(&output.xml);

    let title = doc.descendants().find(|n| n.has_tag_name("work-title")).and_then(|n| n.text());
    assert_eq!(title, Some("Little Tune"));
    let composer = doc
        .descendants()
        .find(|n| n.has_tag_name("creator"))
        .filter(|n| n.attribute("type") == Some("composer"))
        .and_then(|n| n.text());
    assert_eq!(composer, Some("Anon."));
    let fifths = doc.descendants().find(|n| n.has_tag_name("fifths")).and_then(|n| n.text());
    assert_eq!(fifths, Some("1"));
    assert_eq!(doc.descendants().filter(|n| n.has_tag_name("note")).count(), 3);
    assert!(doc.descendants().any(|n| n.has_tag_name("staccato")));
    assert!(doc.descendants().any(|n| n.has_tag_name("p")));
    let alters: Vec<&str> = doc
        .descendants()
        .filter(|n| n.has_tag_name("alter"))
        .filter_map(|n| n.text())
        .collect();
    assert_eq!(alters, vec!["1"]);
}

#[test]
fn test_yaml_settings_change_default_time() {
    let settings = ConversionSettings::from_yaml_str("default_time: [3, 4]\ndivisions: 4\n").unwrap();
    let (_, recorder, _) = ops_with(&staff(None, (0..6).map(quarter).collect()), &settings);
    assert_eq!(measure_count(&recorder), 2);
    let time = recorder.ops.iter().find_map(|op| match op {
        OutputOp::Attributes(a) => a.time,
        _ => None,
    });
    assert_eq!(time.map(|t| (t.numerator, t.denominator)), Some((3, 4)));
    assert!(recorder
        .ops
        .iter()
        .filter(|op| matches!(op, OutputOp::Note { .. }))
        .all(|op| matches!(op, OutputOp::Note { duration: 4, .. })));
}

#[test]
fn test_empty_input_is_an_error() {
    let tree = score(vec![staff(None, vec![])]);
    match convert_to_musicxml(&tree, &ConversionSettings::default()) {
        Err(ConversionError::EmptyScore) => {}
        other => panic!("expected EmptyScore, got {:?}", other.map(|o| o.xml)),
    }
}

#[test]
fn test_silent_staff_is_left_out() {
    let tree = score(vec![Node::sim(vec![
        staff(None, (0..4).map(quarter).collect()),
        staff(None, vec![Node::skip(ly_musicxml::models::Duration::new(0, 0))]),
    ])]);
    let output = convert_to_musicxml(&tree, &ConversionSettings::default()).unwrap();
    assert_eq!(
        output.diagnostics.iter().filter(|d| d.kind == DiagnosticKind::EmptyPart).count(),
        1
    );
    let doc = parse_xml(&output.xml);
    assert_eq!(doc.descendants().filter(|n| n.has_tag_name("score-part")).count(), 1);
    assert_eq!(doc.descendants().filter(|n| n.has_tag_name("part")).count(), 1);
}
