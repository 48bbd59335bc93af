//! Intermediate score model
//!
//! The translator fills this model bar by bar; the emission walker reads it.
//!
//! ```text
//! Score
//! ├── meta (title, creators, rights)
//! ├── layout: [Part | PartGroup ...]      document order
//! ├── groups  (arena)
//! └── parts   (arena)
//!     └── bars: Vec<Bar>
//!         ├── attr: BarAttr
//!         └── items: Note | Rest | Backup
//! ```
//!
//! # Modules
//!
//! - **types**: bars, attributes, notes, rests and backups, plus the
//!   positional merge of bar slices
//! - **score**: score, parts, groups and transient sections
//! - **notation**: small value objects (tuplets, slurs, dynamics, endings)
//! - **clef**: clef name table

pub mod clef;
pub mod notation;
pub mod score;
pub mod types;

pub use clef::clef_from_name;
pub use notation::*;
pub use score::{GroupId, GroupSymbol, Part, PartGroup, PartId, Score, ScoreEntry, ScoreMeta, Section};
pub use types::{
    merge_bars, Bar, BarAttr, BarBackup, BarItem, BarMus, BarNote, BarRest, Barline, ClefAttr,
    GraceNote, KeyAttr, RepeatDir, TimeAttr,
};
