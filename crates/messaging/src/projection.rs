//! Projection fold contract (read-model builders).
//!
//! A projection is a read-optimized materialization of one aggregate, built
//! by applying its committed events in order. The fold is a single function
//! over the aggregate's tagged event union, one branch per event kind, so
//! the read-model state machine stays exhaustive at compile time.

use thiserror::Error;

use clienthub_core::AggregateId;

use crate::{DomainEvent, EventEnvelope};

/// Sequencing and lifecycle failures raised by a fold.
///
/// These are data-consistency errors: never auto-corrected, always reported
/// upstream (a version mismatch signals a missed event or a concurrent-write
/// race that the event-store layer owns retrying).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FoldError {
    /// The event's target version does not equal the projection's current
    /// version. No gap-filling, no replay-skipping.
    #[error("out-of-order event for {aggregate_id}: expected target version {expected}, found {found}")]
    OutOfOrderEvent {
        aggregate_id: AggregateId,
        expected: u64,
        found: u64,
    },

    /// A creation-class event arrived for an aggregate that already has a
    /// projection. Projections must not be double-initialized.
    #[error("projection for {aggregate_id} is already initialized")]
    AlreadyInitialized { aggregate_id: AggregateId },

    /// A non-creation event arrived with no projection to fold into.
    #[error("no projection exists for {aggregate_id}")]
    MissingProjection { aggregate_id: AggregateId },
}

/// A read model built by folding one aggregate's ordered events.
///
/// Implementations guarantee `version() == last folded event's
/// target_version + 1`: a projection that has folded k events is at version
/// k, and the next event it accepts must target exactly version k.
pub trait ProjectionFold: Sized + Send + Sync + 'static {
    type Ev: DomainEvent;

    /// Apply one committed event, producing the projection's next state.
    ///
    /// `current` is `None` only for the first (creation-class) event of an
    /// aggregate. On any error the caller keeps the previous state: a failed
    /// fold never mutates the projection.
    fn fold(current: Option<Self>, envelope: &EventEnvelope<Self::Ev>) -> Result<Self, FoldError>;

    fn aggregate_id(&self) -> AggregateId;

    /// External snapshot/lookup key, when the read model carries one.
    fn external_key(&self) -> Option<&str>;

    /// Equals the target version of the last folded event + 1.
    fn version(&self) -> u64;
}
