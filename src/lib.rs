//! LilyPond music tree to MusicXML
//!
//! Lowers an already-parsed LilyPond music tree into a measure-oriented
//! score model and walks that model as a stream of MusicXML output
//! operations.
//!
//! ```text
//! Node tree ──▶ timing::prepass ──▶ translate::Translator ──▶ builder::ScoreBuilder
//!                 (bar lines,          (one walk over the          (bars, parts,
//!                  time changes)        enter/exit events)          sections)
//!                                                                       │
//!                                                                       ▼
//!         ScoreSink ◀── renderers::musicxml::EmissionWalker ◀──────── ir::Score
//! ```
//!
//! ```
//! use ly_musicxml::models::{Duration, Node, Pitch};
//! use ly_musicxml::{convert_to_musicxml, ConversionSettings};
//!
//! let music = Node::seq(vec![Node::note(Pitch::new(0, 0, 4), Duration::new(0, 0))]);
//! let output = convert_to_musicxml(&music, &ConversionSettings::default()).unwrap();
//! assert!(output.xml.contains("<step>C</step>"));
//! ```

pub mod builder;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod models;
pub mod renderers;
pub mod settings;
pub mod timing;
pub mod translate;

use serde::Serialize;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSeverity, Diagnostics};
pub use error::ConversionError;
pub use ir::Score;
pub use models::{from_json, Node};
pub use renderers::musicxml::{EmissionWalker, MusicXmlWriter, OpRecorder, OutputOp, ScoreSink};
pub use settings::ConversionSettings;
pub use translate::{ConversionResult, Translator};

/// MusicXML text together with every diagnostic of the conversion.
#[derive(Debug, Clone, Serialize)]
pub struct MusicXmlOutput {
    pub xml: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower a music tree into the score model.
pub fn convert(root: &Node, settings: &ConversionSettings) -> ConversionResult {
    Translator::new(settings).translate(root)
}

/// Walk a finished score into `sink`, returning the diagnostics of the walk.
pub fn emit(score: &Score, settings: &ConversionSettings, sink: &mut dyn ScoreSink) -> Vec<Diagnostic> {
    EmissionWalker::new(score, settings).walk(sink).into_vec()
}

/// Lower a music tree and serialize it with the reference writer.
///
/// Fails only when the tree produced no music at all.
pub fn convert_to_musicxml(
    root: &Node,
    settings: &ConversionSettings,
) -> Result<MusicXmlOutput, ConversionError> {
    let ConversionResult { score, mut diagnostics } = convert(root, settings);
    if score.is_empty() {
        log::warn!("conversion produced an empty score");
        return Err(ConversionError::EmptyScore);
    }
    let (xml, walk_diagnostics) = renderers::musicxml::to_musicxml(&score, settings);
    diagnostics.extend(walk_diagnostics);
    log::info!(
        "converted {} parts with {} diagnostics",
        score.parts.len(),
        diagnostics.len()
    );
    Ok(MusicXmlOutput { xml, diagnostics })
}
