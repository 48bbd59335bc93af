//! Output operations
//!
//! The emission walker turns a finished [`Score`](crate::ir::Score) into a
//! flat, ordered sequence of [`OutputOp`]s. A [`ScoreSink`] consumes them;
//! the crate ships [`OpRecorder`] and the reference
//! [`MusicXmlWriter`](super::writer::MusicXmlWriter).
//!
//! Durations in ops are already converted to divisions.

use serde::Serialize;

use crate::ir::{
    Barline, BarNote, BarRest, ClefAttr, Dynamics, GroupSymbol, Harmony, KeyAttr, OctaveShift,
    ScoreMeta, TempoDir, TimeAttr,
};

/// Document header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderOp {
    pub meta: ScoreMeta,
    pub version: String,
    pub software: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOp {
    pub number: u32,
    pub name: Option<String>,
    pub abbr: Option<String>,
    pub symbol: GroupSymbol,
}

/// A part as listed in the part list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartOp {
    /// `P1`, `P2`, ...
    pub id: String,
    pub name: Option<String>,
    pub abbr: Option<String>,
    pub midi: Option<String>,
    pub staves: u32,
    /// Distinct percussion instruments, in order of first use
    pub instruments: Vec<String>,
}

/// Only the fields that are present get written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributesOp {
    pub divisions: Option<u32>,
    pub key: Option<KeyAttr>,
    pub time: Option<TimeAttr>,
    pub staves: Option<u32>,
    pub clefs: Vec<ClefAttr>,
}

impl AttributesOp {
    pub fn is_empty(&self) -> bool {
        self.divisions.is_none()
            && self.key.is_none()
            && self.time.is_none()
            && self.staves.is_none()
            && self.clefs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSide {
    Left,
    Right,
}

impl BarSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarSide::Left => "left",
            BarSide::Right => "right",
        }
    }
}

/// One output operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutputOp {
    Header(HeaderOp),
    StartPartGroup(GroupOp),
    EndPartGroup {
        number: u32,
    },
    /// Entry of the part list
    ScorePart(PartOp),
    /// Music of a part listed earlier
    StartPart {
        id: String,
    },
    EndPart,
    StartMeasure {
        number: u32,
        implicit: bool,
    },
    EndMeasure,
    Attributes(AttributesOp),
    Barline {
        side: BarSide,
        barline: Barline,
    },
    Tempo(TempoDir),
    Dynamic(Dynamics),
    OctaveShift(OctaveShift),
    Harmony {
        harmony: Harmony,
        offset: u32,
    },
    Note {
        note: BarNote,
        duration: u32,
    },
    Rest {
        rest: BarRest,
        duration: u32,
    },
    /// A spacer: time passes without anything printed
    Forward {
        duration: u32,
        voice: u32,
        staff: Option<u32>,
    },
    Backup {
        duration: u32,
    },
}

/// Receives output operations in document order.
pub trait ScoreSink {
    fn emit(&mut self, op: OutputOp);
}

/// Collects every operation, for inspection.
#[derive(Debug, Clone, Default)]
pub struct OpRecorder {
    pub ops: Vec<OutputOp>,
}

impl OpRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> impl Iterator<Item = &BarNote> {
        self.ops.iter().filter_map(|op| match op {
            OutputOp::Note { note, .. } => Some(note),
            _ => None,
        })
    }

    pub fn count(&self, predicate: impl Fn(&OutputOp) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }
}

impl ScoreSink for OpRecorder {
    fn emit(&mut self, op: OutputOp) {
        self.ops.push(op);
    }
}
