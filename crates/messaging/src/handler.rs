use crate::{Command, DomainEvent, EventEnvelope, Query};
use clienthub_core::Notifications;

/// Boxed error handlers return across the dispatch boundary.
///
/// Handlers live behind type-erased routing tables, so their failures are
/// carried as a boxed error; callers that need the concrete type downcast.
/// Expected business-rule failures do NOT travel this channel; they are
/// recorded into the per-dispatch [`Notifications`] accumulator.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Handles a command, emitting events as its durable effect.
///
/// Returns the number of events committed. Expected rule failures are raised
/// into `notifications`; the bus converts a non-empty accumulator into a
/// rejected outcome. `Err` is reserved for infrastructure and sequencing
/// failures (store conflicts, wiring defects), never for rule violations.
pub trait CommandHandler<C: Command>: Send + Sync {
    fn handle(&self, command: C, notifications: &mut Notifications) -> Result<usize, HandlerError>;
}

/// Answers a query. Read-only and side-effect-free from the caller's
/// perspective.
pub trait QueryHandler<Q: Query>: Send + Sync {
    fn handle(&self, query: Q) -> Result<Q::Output, HandlerError>;
}

/// Receives broadcast events.
///
/// Subscriber failures are isolated: one subscriber failing never prevents
/// delivery to the remaining subscribers for the same event.
pub trait EventSubscriber<E: DomainEvent>: Send + Sync {
    fn on_event(&self, envelope: &EventEnvelope<E>) -> Result<(), HandlerError>;
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// Canonical event-sourced lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` returns events (pure).
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// Useful for tests and inline processing; the full pipeline (persistence,
/// folding, publication) lives in the infra crate.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: clienthub_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
