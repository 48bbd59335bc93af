//! Input side: the parsed music tree and the event stream over it
//!
//! The LilyPond lexer and parser live outside this crate; they hand over a
//! [`Node`] tree (directly or as JSON) with pitches in absolute octaves and
//! every post-event placed after the note it belongs to.

pub mod duration;
pub mod events;
pub mod node;
pub mod pitch;

pub use duration::{ratio, zero, Duration, Rational};
pub use events::{unfold_sequence, BranchLimit, Event, Events};
pub use node::{
    GraceKind, InputMode, LyricToken, Node, PropertyValue, RepeatKind, ScalerKind, Span,
};
pub use pitch::{key_fifths, AccidentalMark, Pitch};

use crate::error::ConversionError;

/// Decode a node tree serialized as JSON.
pub fn from_json(json: &str) -> Result<Node, ConversionError> {
    serde_json::from_str(json).map_err(ConversionError::InvalidTree)
}
