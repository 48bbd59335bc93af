//! Renderers
//!
//! Output stages that read a finished [`Score`](crate::ir::Score).

pub mod musicxml;
