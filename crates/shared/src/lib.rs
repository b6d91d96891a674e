//! Shared types for the quake relay workspace.

mod models;

pub use models::{EmptySequence, Record, RecordSequence};
