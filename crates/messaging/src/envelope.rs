use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clienthub_core::{AggregateId, CorrelationId};

/// Envelope for a committed event, carrying stream metadata.
///
/// This is the unit the event store hands back and the bus broadcasts.
///
/// Notes:
/// - `target_version` is the aggregate version this event transitions the
///   stream **to** (0-based: the first event of a stream targets version 0).
///   Per aggregate these form a strictly increasing, gap-free sequence.
/// - `committed_at` is assigned at commit time by the store, never at event
///   creation time.
/// - `payload` is the domain-agnostic event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_id: AggregateId,
    aggregate_type: String,
    correlation_id: CorrelationId,
    target_version: u64,
    committed_at: DateTime<Utc>,

    event_type: String,
    schema_version: u32,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        correlation_id: CorrelationId,
        target_version: u64,
        committed_at: DateTime<Utc>,
        event_type: impl Into<String>,
        schema_version: u32,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            correlation_id,
            target_version,
            committed_at,
            event_type: event_type.into(),
            schema_version,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn target_version(&self) -> u64 {
        self.target_version
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.committed_at
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Re-wrap the payload, keeping all stream metadata.
    ///
    /// Used at the store boundary to move between erased (JSON) and typed
    /// payloads.
    pub fn try_map_payload<U, Err>(
        self,
        f: impl FnOnce(E) -> Result<U, Err>,
    ) -> Result<EventEnvelope<U>, Err> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            correlation_id: self.correlation_id,
            target_version: self.target_version,
            committed_at: self.committed_at,
            event_type: self.event_type,
            schema_version: self.schema_version,
            payload: f(self.payload)?,
        })
    }
}
