//! Projection folding engine.
//!
//! Consumes committed (JSON-erased) envelopes, deserializes them into the
//! projection's event type, and applies the fold under a per-aggregate-key
//! lock: two events for the same aggregate are never folded concurrently,
//! while distinct aggregates fold fully in parallel. The projection store
//! (and any cache layered on it) is updated before the fold returns, so a
//! caller that has awaited the fold never reads a stale snapshot.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use clienthub_core::AggregateId;
use clienthub_messaging::{EventEnvelope, FoldError, ProjectionFold};

use crate::projection_store::ProjectionStore;

#[derive(Debug, Error)]
pub enum FoldingError {
    /// Sequencing or lifecycle failure; the projection was left unchanged.
    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),
}

/// Serializes folds per aggregate key and writes results through the store.
pub struct FoldingEngine<P, S> {
    store: S,
    stripes: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
    _marker: PhantomData<fn() -> P>,
}

impl<P, S> FoldingEngine<P, S>
where
    P: ProjectionFold + Clone,
    P::Ev: DeserializeOwned,
    S: ProjectionStore<P>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            stripes: Mutex::new(HashMap::new()),
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fold one committed envelope into its aggregate's projection.
    ///
    /// On error the stored projection is untouched: out-of-order and
    /// duplicate events are rejected, never partially applied.
    pub fn fold_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<P, FoldingError> {
        let typed = envelope
            .clone()
            .try_map_payload(|payload| serde_json::from_value::<P::Ev>(payload))
            .map_err(|e| FoldingError::Deserialize(e.to_string()))?;

        let stripe = self.stripe(envelope.aggregate_id());
        let _guard = match stripe.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let current = self.store.get(envelope.aggregate_id());
        let next = P::fold(current, &typed)?;
        self.store.put(next.clone());

        debug!(
            aggregate_id = %envelope.aggregate_id(),
            event_type = envelope.event_type(),
            version = next.version(),
            "folded event into projection"
        );

        Ok(next)
    }

    /// Fold a batch of envelopes in order, stopping at the first failure.
    pub fn fold_all<'a>(
        &self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<(), FoldingError> {
        for envelope in envelopes {
            self.fold_envelope(envelope)?;
        }
        Ok(())
    }

    fn stripe(&self, aggregate_id: AggregateId) -> Arc<Mutex<()>> {
        let mut stripes = match self.stripes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        stripes
            .entry(aggregate_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
