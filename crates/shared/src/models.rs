//! Record model: upstream objects and the fixed sequence replayed to subscribers.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One upstream object. Forwarded verbatim; its fields are never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub serde_json::Value);

impl From<serde_json::Value> for Record {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Returned when a sequence would be built from zero records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record sequence must contain at least one record")]
pub struct EmptySequence;

/// Ordered, non-empty, read-only list of records.
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone)]
pub struct RecordSequence<R = Record> {
    records: Arc<[R]>,
}

impl<R> RecordSequence<R> {
    pub fn new(records: Vec<R>) -> Result<Self, EmptySequence> {
        if records.is_empty() {
            return Err(EmptySequence);
        }
        Ok(Self {
            records: records.into(),
        })
    }

    /// Record at `index`, wrapping past the end.
    pub fn at(&self, index: usize) -> &R {
        &self.records[index % self.records.len()]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl<R> Deref for RecordSequence<R> {
    type Target = [R];

    fn deref(&self) -> &[R] {
        &self.records
    }
}

impl<R> TryFrom<Vec<R>> for RecordSequence<R> {
    type Error = EmptySequence;

    fn try_from(records: Vec<R>) -> Result<Self, Self::Error> {
        Self::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_sequence_is_rejected() {
        let err = RecordSequence::<Record>::new(Vec::new()).unwrap_err();
        assert_eq!(err, EmptySequence);
    }

    #[test]
    fn at_wraps_past_the_end() {
        let seq = RecordSequence::new(vec!["a", "b", "c"]).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(*seq.at(0), "a");
        assert_eq!(*seq.at(2), "c");
        assert_eq!(*seq.at(3), "a");
        assert_eq!(*seq.at(7), "b");
    }

    #[test]
    fn record_serializes_verbatim() {
        let raw = json!({"code": 551, "earthquake": {"maxScale": 30}, "id": "abc"});
        let record: Record = serde_json::from_value(raw.clone()).unwrap();
        let out: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn clones_share_storage() {
        let seq = RecordSequence::new(vec![Record(json!({"n": 1}))]).unwrap();
        let other = seq.clone();
        assert!(std::ptr::eq(seq.as_ptr(), other.as_ptr()));
    }
}
