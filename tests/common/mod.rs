// Shared helpers for the integration tests
#![allow(dead_code)]

use ly_musicxml::ir::{BarNote, Score};
use ly_musicxml::models::{Duration, Node, Pitch};
use ly_musicxml::{convert, emit, ConversionSettings, Diagnostic, OpRecorder, OutputOp};

/// Note on `step` (0 = C) in the middle octave with a duration of `1 / 2^log`.
pub fn note(step: u8, log: i8) -> Node {
    Node::note(Pitch::new(step, 0, 4), Duration::new(log, 0))
}

pub fn quarter(step: u8) -> Node {
    note(step, 2)
}

pub fn eighth(step: u8) -> Node {
    note(step, 3)
}

pub fn staff(id: Option<&str>, music: Vec<Node>) -> Node {
    Node::context("Staff", id, vec![Node::seq(music)])
}

pub fn score(children: Vec<Node>) -> Node {
    Node::Score { children }
}

/// Translate and walk with the given settings.
pub fn ops_with(tree: &Node, settings: &ConversionSettings) -> (Score, OpRecorder, Vec<Diagnostic>) {
    let result = convert(tree, settings);
    let mut recorder = OpRecorder::new();
    let mut diagnostics = result.diagnostics;
    diagnostics.extend(emit(&result.score, settings, &mut recorder));
    (result.score, recorder, diagnostics)
}

pub fn ops(tree: &Node) -> (Score, OpRecorder, Vec<Diagnostic>) {
    ops_with(tree, &ConversionSettings::default())
}

/// Every note of every part, in bar order.
pub fn all_notes(score: &Score) -> Vec<BarNote> {
    score
        .parts
        .iter()
        .flat_map(|p| p.bars.iter())
        .flat_map(|b| b.items.iter())
        .filter_map(|i| i.as_note().cloned())
        .collect()
}

pub fn measure_count(recorder: &OpRecorder) -> usize {
    recorder.count(|op| matches!(op, OutputOp::StartMeasure { .. }))
}

pub fn parse_xml(xml: &str) -> roxmltree::Document<'_> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    roxmltree::Document::parse_with_options(xml, options).expect("well-formed MusicXML")
}
