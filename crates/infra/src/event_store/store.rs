use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use clienthub_core::{AggregateId, CorrelationId, ExpectedVersion};
use clienthub_messaging::{DomainEvent, EventEnvelope};

/// An event ready to be appended to a stream.
///
/// Pending events carry no target version and no committed timestamp; both
/// are assigned by the store inside `append`. The payload is erased to JSON
/// so the store stays decoupled from domain event types while preserving the
/// metadata needed for later deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub correlation_id: CorrelationId,

    pub event_type: String,
    pub schema_version: u32,

    pub payload: JsonValue,
}

impl PendingEvent {
    /// Build a pending event from a typed domain event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        correlation_id: CorrelationId,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: DomainEvent + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            correlation_id,
            event_type: event.event_type().to_string(),
            schema_version: event.schema_version(),
            payload,
        })
    }
}

/// Event store operation error.
///
/// A `VersionConflict` signals a concurrent write race; retry policy belongs
/// to the caller (reload the stream and re-execute), never to the store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("version conflict on {aggregate_id}: expected {expected:?}, stream is at {actual}")]
    VersionConflict {
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only event store.
///
/// Events are organized into streams, one per aggregate. The stream version
/// equals the number of committed events; target versions are 0-based, so an
/// event appended to a stream at version k targets exactly version k.
///
/// Implementations must:
/// - enforce optimistic concurrency against the current stream version
/// - assign gap-free, strictly increasing target versions
/// - stamp `committed_at` during append (commit time, not creation time)
/// - persist a batch atomically (all events or none)
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream.
    fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: ExpectedVersion,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, EventStoreError>;

    /// Read the full ordered stream for an aggregate. Empty when the
    /// aggregate has no events yet.
    fn read_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: ExpectedVersion,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, EventStoreError> {
        (**self).append(aggregate_id, expected_version, events)
    }

    fn read_stream(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, EventStoreError> {
        (**self).read_stream(aggregate_id)
    }
}
