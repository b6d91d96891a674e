//! Broadcast loop: replays the record sequence to all subscribers on a fixed cadence.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::{Record, RecordSequence};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::{BroadcastReport, ConnectionRegistry};

/// Position of the next record to send. Wraps at the sequence length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    len: usize,
}

impl Cursor {
    /// `len` must be non-zero; a `RecordSequence` guarantees it.
    pub fn new(len: usize) -> Self {
        debug_assert!(len > 0);
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.len;
    }
}

/// What happened on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Delivered { index: usize, report: BroadcastReport },
    /// The record at `index` could not be serialized; nobody received anything.
    Skipped { index: usize },
}

pub struct BroadcastLoop<R = Record> {
    records: RecordSequence<R>,
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    cursor: Cursor,
}

impl<R: Serialize> BroadcastLoop<R> {
    pub fn new(
        records: RecordSequence<R>,
        registry: Arc<ConnectionRegistry>,
        period: Duration,
    ) -> Self {
        let cursor = Cursor::new(records.len());
        Self {
            records,
            registry,
            period,
            cursor,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Send the current record to every subscriber, then advance the cursor.
    ///
    /// The cursor advances even when the record is skipped so one bad record
    /// cannot stall the sequence.
    pub fn tick(&mut self) -> TickOutcome {
        let index = self.cursor.index();
        let outcome = match serde_json::to_string(self.records.at(index)) {
            Ok(json) => {
                let report = self.registry.broadcast(json.into());
                if report.evicted > 0 {
                    tracing::info!(
                        index,
                        delivered = report.delivered,
                        evicted = report.evicted,
                        "broadcast"
                    );
                } else {
                    tracing::debug!(index, delivered = report.delivered, "broadcast");
                }
                TickOutcome::Delivered { index, report }
            }
            Err(e) => {
                tracing::error!(index, error = %e, "failed to serialize record, skipping tick");
                TickOutcome::Skipped { index }
            }
        };
        self.cursor.advance();
        outcome
    }

    /// Tick every `period` until `shutdown` is cancelled.
    ///
    /// The first tick fires one period after start.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            records = self.records.len(),
            period_secs = self.period.as_secs_f64(),
            "broadcast loop started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        tracing::info!("broadcast loop stopped");
    }
}
