//! MusicXML output
//!
//! The [`walker`] turns a finished score into a flat stream of
//! [`OutputOp`]s. Any [`ScoreSink`] can consume that stream; the crate
//! ships two:
//!
//! - [`OpRecorder`], which keeps the ops for inspection
//! - [`MusicXmlWriter`], a reference serializer producing MusicXML 3.1
//!   partwise text
//!
//! # Module Structure
//!
//! - **ops**: the operation enum and the sink trait
//! - **walker**: part-list and measure traversal, divisions resolution
//! - **writer**: MusicXML text output
//! - **duration**: note-type names and divisions arithmetic

pub mod duration;
pub mod ops;
pub mod walker;
pub mod writer;

pub use ops::{OpRecorder, OutputOp, ScoreSink};
pub use walker::EmissionWalker;
pub use writer::{to_musicxml, MusicXmlWriter};
