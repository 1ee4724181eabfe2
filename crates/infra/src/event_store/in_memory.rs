use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value as JsonValue;

use clienthub_core::{AggregateId, ExpectedVersion};
use clienthub_messaging::EventEnvelope;

use super::store::{EventStore, EventStoreError, PendingEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<EventEnvelope<JsonValue>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[EventEnvelope<JsonValue>]) -> u64 {
        stream.len() as u64
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: ExpectedVersion,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        // All events must target the stream being appended to.
        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains a foreign aggregate_id (index {idx})"
                )));
            }
        }

        let mut streams = match self.streams.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let stream = streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual: current,
            });
        }

        // Assign 0-based target versions and stamp commit time.
        let committed_at = Utc::now();
        let mut next_target = current;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let envelope = EventEnvelope::new(
                e.event_id,
                e.aggregate_id,
                e.aggregate_type,
                e.correlation_id,
                next_target,
                committed_at,
                e.event_type,
                e.schema_version,
                e.payload,
            );
            next_target += 1;
            stream.push(envelope.clone());
            committed.push(envelope);
        }

        Ok(committed)
    }

    fn read_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, EventStoreError> {
        let streams = match self.streams.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}
