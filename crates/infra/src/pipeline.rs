//! Command execution pipeline (application-level orchestration).
//!
//! One dispatch runs the full lifecycle:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's event stream
//!   ↓
//! 2. Rehydrate state (apply historical events)
//!   ↓
//! 3. Decide (pure handler logic, produces events)
//!   ↓
//! 4. Append to the event store (optimistic concurrency check)
//!   ↓
//! 5. Fold committed events into the projection (settles before return)
//!   ↓
//! 6. Broadcast to event subscribers (failures isolated)
//! ```
//!
//! Expected business-rule failures surface as notifications and end the
//! dispatch in a rejected outcome; store conflicts and sequencing failures
//! propagate as errors so the caller can pick retry vs. abort. This module
//! contains no IO itself; it composes the store, folding, and bus traits.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use clienthub_core::{
    Aggregate, AggregateId, DomainError, ExpectedVersion, Notifications,
};
use clienthub_messaging::{
    BusError, Command, CommandDescriptor, CommandHandler, DomainEvent, EventEnvelope, HandlerError,
    MessageBus, ProjectionFold,
};
use clienthub_onboarding::{
    ActivateClientApplication, ChangeProductAccess, ClientApplication, ClientApplicationCommand,
    ClientApplicationId, CreateClientApplication, GrantProductAccess,
    RejectClientApplicationCreation, RevokeClientApplicationCreation,
};

use crate::event_store::{EventStore, EventStoreError, PendingEvent};
use crate::folding::{FoldingEngine, FoldingError};
use crate::projection_store::ProjectionStore;
use crate::projections::ClientApplicationView;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Deterministic domain failure (validation, invariant, conflict).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting to the event store failed (includes version conflicts).
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// Folding the committed events failed (sequencing error).
    #[error(transparent)]
    Folding(#[from] FoldingError),

    /// A stored payload did not deserialize into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store, projection store, and projection so tests can run
/// fully in memory and production can swap real backends without touching
/// domain code.
pub struct CommandPipeline<S, PS, P> {
    store: S,
    folding: Arc<FoldingEngine<P, PS>>,
    bus: Arc<MessageBus>,
}

impl<S, PS, P> CommandPipeline<S, PS, P> {
    pub fn new(store: S, folding: Arc<FoldingEngine<P, PS>>, bus: Arc<MessageBus>) -> Self {
        Self {
            store,
            folding,
            bus,
        }
    }

    pub fn folding(&self) -> &Arc<FoldingEngine<P, PS>> {
        &self.folding
    }
}

impl<S, PS, P> CommandPipeline<S, PS, P>
where
    S: EventStore,
    PS: ProjectionStore<P>,
    P: ProjectionFold + Clone,
    P::Ev: DeserializeOwned,
{
    /// Dispatch one aggregate command through the full pipeline.
    ///
    /// Returns the committed envelopes. Completion implies validation,
    /// persistence, and folding have all settled; only the broadcast step
    /// tolerates (and isolates) subscriber failures.
    pub fn execute<A>(
        &self,
        descriptor: &CommandDescriptor,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, PipelineError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DomainEvent + Serialize + DeserializeOwned,
    {
        let aggregate_id = descriptor.aggregate_id;

        // 1) Load history
        let history = self.store.read_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(history.len() as u64);

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        for stored in &history {
            let event: A::Event = serde_json::from_value(stored.payload().clone())
                .map_err(|e| PipelineError::Deserialize(e.to_string()))?;
            aggregate.apply(&event);
        }

        // 3) Decide (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let pending = decided
            .iter()
            .map(|event| {
                PendingEvent::from_typed(
                    aggregate_id,
                    aggregate_type,
                    descriptor.correlation_id,
                    Uuid::now_v7(),
                    event,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(aggregate_id, expected, pending)?;

        // 5) Fold committed events; readers observe the new snapshot once
        //    this dispatch returns.
        self.folding.fold_all(&committed)?;

        // 6) Broadcast typed envelopes; subscriber failures are isolated and
        //    reported, never fatal to the dispatch.
        for stored in &committed {
            let typed = stored
                .clone()
                .try_map_payload(|payload| serde_json::from_value::<A::Event>(payload))
                .map_err(|e| PipelineError::Deserialize(e.to_string()))?;
            let report = self.bus.raise_event(&typed);
            if !report.all_delivered() {
                warn!(
                    aggregate_id = %aggregate_id,
                    event_type = stored.event_type(),
                    failed_subscribers = report.failures().len(),
                    "event broadcast completed with subscriber failures"
                );
            }
        }

        Ok(committed)
    }
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[EventEnvelope<JsonValue>],
) -> Result<(), PipelineError> {
    // Enforce stream integrity even if a buggy backend returns foreign or
    // out-of-order events: targets must run 0, 1, 2, ... with no gaps.
    for (idx, stored) in stream.iter().enumerate() {
        if stored.aggregate_id() != aggregate_id {
            return Err(PipelineError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains a foreign aggregate_id at index {idx}"),
            )));
        }
        if stored.target_version() != idx as u64 {
            return Err(PipelineError::Store(EventStoreError::InvalidAppend(
                format!(
                    "loaded stream is not gap-free (index {idx}, target {})",
                    stored.target_version()
                ),
            )));
        }
    }
    Ok(())
}

/// Maps a rule failure onto the notification key callers group on.
fn rule_key(error: &DomainError) -> &'static str {
    match error {
        DomainError::Validation(_) | DomainError::InvalidId(_) => "validation",
        DomainError::InvariantViolation(_) => "rule",
        DomainError::Conflict(_) => "conflict",
        DomainError::NotFound => "not_found",
    }
}

/// Bus-facing handler for every client-application command type.
///
/// One instance is registered once per command type; all routes share the
/// same pipeline. Expected rule failures become notifications (rejected
/// outcome); everything else propagates as a handler error.
pub struct OnboardingCommandHandler<S, PS> {
    pipeline: Arc<CommandPipeline<S, PS, ClientApplicationView>>,
}

impl<S, PS> OnboardingCommandHandler<S, PS> {
    pub fn new(pipeline: Arc<CommandPipeline<S, PS, ClientApplicationView>>) -> Self {
        Self { pipeline }
    }
}

impl<S, PS> Clone for OnboardingCommandHandler<S, PS> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<S, PS> OnboardingCommandHandler<S, PS>
where
    S: EventStore,
    PS: ProjectionStore<ClientApplicationView>,
{
    fn run(
        &self,
        descriptor: CommandDescriptor,
        command: ClientApplicationCommand,
        notifications: &mut Notifications,
    ) -> Result<usize, HandlerError> {
        let result = self.pipeline.execute::<ClientApplication>(
            &descriptor,
            "onboarding.client_application",
            &command,
            |id| ClientApplication::empty(ClientApplicationId(id)),
        );

        match result {
            Ok(committed) => Ok(committed.len()),
            Err(PipelineError::Domain(error)) if error.is_rule_failure() => {
                notifications.raise(rule_key(&error), error.to_string());
                Ok(0)
            }
            Err(other) => Err(Box::new(other) as HandlerError),
        }
    }
}

macro_rules! impl_onboarding_handler {
    ($command:ty, $variant:ident) => {
        impl<S, PS> CommandHandler<$command> for OnboardingCommandHandler<S, PS>
        where
            S: EventStore,
            PS: ProjectionStore<ClientApplicationView>,
        {
            fn handle(
                &self,
                command: $command,
                notifications: &mut Notifications,
            ) -> Result<usize, HandlerError> {
                let descriptor = *command.descriptor();
                self.run(
                    descriptor,
                    ClientApplicationCommand::$variant(command),
                    notifications,
                )
            }
        }
    };
}

impl_onboarding_handler!(CreateClientApplication, Create);
impl_onboarding_handler!(ActivateClientApplication, Activate);
impl_onboarding_handler!(RejectClientApplicationCreation, Reject);
impl_onboarding_handler!(RevokeClientApplicationCreation, Revoke);
impl_onboarding_handler!(GrantProductAccess, GrantAccess);
impl_onboarding_handler!(ChangeProductAccess, ChangeAccess);

/// Register one handler per client-application command type.
pub fn register_onboarding_commands<S, PS>(
    bus: &MessageBus,
    pipeline: Arc<CommandPipeline<S, PS, ClientApplicationView>>,
) -> Result<(), BusError>
where
    S: EventStore + 'static,
    PS: ProjectionStore<ClientApplicationView> + 'static,
{
    let handler = OnboardingCommandHandler::new(pipeline);
    bus.register_command::<CreateClientApplication, _>(handler.clone())?;
    bus.register_command::<ActivateClientApplication, _>(handler.clone())?;
    bus.register_command::<RejectClientApplicationCreation, _>(handler.clone())?;
    bus.register_command::<RevokeClientApplicationCreation, _>(handler.clone())?;
    bus.register_command::<GrantProductAccess, _>(handler.clone())?;
    bus.register_command::<ChangeProductAccess, _>(handler)?;
    Ok(())
}
