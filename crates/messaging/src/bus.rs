//! Command/query/event routing (mechanics only).
//!
//! The bus routes commands and queries to exactly one registered handler and
//! broadcasts events to zero or more subscribers in registration order. The
//! routing tables are runtime-pluggable: handlers can be subscribed and
//! unsubscribed while dispatches are in flight.
//!
//! ## Concurrency
//!
//! All three tables live behind a single `RwLock`. A dispatch takes the read
//! lock only long enough to clone the matching route (an `Arc`), then invokes
//! the handler outside the lock, so concurrent dispatches never block each
//! other on handler work, and a subscribe/unsubscribe during dispatch can
//! never be observed mid-update.
//!
//! ## Failure semantics
//!
//! - Commands/queries with no registered handler fail loudly
//!   (`NoHandlerRegistered`): a wiring defect, not a data condition.
//! - Duplicate command/query registration is rejected **at registration
//!   time**; dispatch still reports `MultipleHandlersRegistered` should a
//!   corrupt table ever be observed.
//! - Event subscriber failures are isolated per subscriber and enumerated in
//!   the returned [`PublishReport`] instead of being thrown.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::warn;

use clienthub_core::{DomainNotification, Notifications};

use crate::{Command, CommandHandler, DomainEvent, EventEnvelope, EventSubscriber, Query, QueryHandler};
use crate::handler::HandlerError;

/// Terminal result of one command's journey through the bus.
///
/// `Rejected` is the expected business failure path: the ordered rule
/// violations are returned to the caller and no events were committed.
#[derive(Debug)]
pub enum DispatchOutcome {
    Accepted { events_committed: usize },
    Rejected { notifications: Vec<DomainNotification> },
}

impl DispatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted { .. })
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    /// No handler registered for the message's concrete type (wiring defect).
    #[error("no handler registered for {0}")]
    NoHandlerRegistered(&'static str),

    /// Registration-time rejection of ambiguous routing.
    #[error("a handler is already registered for {0}")]
    HandlerAlreadyRegistered(&'static str),

    /// The routing table held more than one handler at dispatch time.
    #[error("routing table holds multiple handlers for {0}")]
    MultipleHandlersRegistered(&'static str),

    /// A subscriber with the same label is already registered for the event.
    #[error("subscriber '{label}' is already registered for {event}")]
    SubscriberAlreadyRegistered { event: &'static str, label: String },

    /// The handler failed with an infrastructure or sequencing error.
    #[error("handler execution failed: {0}")]
    Handler(HandlerError),
}

/// Per-subscriber failure surfaced by [`MessageBus::raise_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    pub subscriber: String,
    pub error: String,
}

/// Aggregate outcome of one event broadcast.
#[derive(Debug, Default)]
pub struct PublishReport {
    delivered: Vec<String>,
    failures: Vec<SubscriberFailure>,
}

impl PublishReport {
    /// Labels of subscribers that processed the event, in delivery order.
    pub fn delivered(&self) -> &[String] {
        &self.delivered
    }

    pub fn failures(&self) -> &[SubscriberFailure] {
        &self.failures
    }

    pub fn all_delivered(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Error)]
#[error("message payload did not match its registered type")]
struct RouteTypeMismatch;

type ErasedCommandFn =
    Arc<dyn Fn(Box<dyn Any + Send>, &mut Notifications) -> Result<usize, HandlerError> + Send + Sync>;
type ErasedQueryFn =
    Arc<dyn Fn(Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>, HandlerError> + Send + Sync>;
type ErasedEventFn = Arc<dyn Fn(&dyn Any) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Clone)]
struct CommandRoute {
    invoke: ErasedCommandFn,
}

#[derive(Clone)]
struct QueryRoute {
    invoke: ErasedQueryFn,
}

#[derive(Clone)]
struct EventRoute {
    label: String,
    invoke: ErasedEventFn,
}

#[derive(Default)]
struct Routes {
    commands: HashMap<TypeId, Vec<CommandRoute>>,
    queries: HashMap<TypeId, Vec<QueryRoute>>,
    events: HashMap<TypeId, Vec<EventRoute>>,
}

/// Interface-keyed message router with runtime-pluggable handler tables.
#[derive(Default)]
pub struct MessageBus {
    routes: RwLock<Routes>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the single handler for command type `C`.
    ///
    /// Ambiguous command routing is a correctness bug, so a second
    /// registration for the same type is rejected here rather than detected
    /// at dispatch time.
    pub fn register_command<C, H>(&self, handler: H) -> Result<(), BusError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let handler = Arc::new(handler);
        let invoke: ErasedCommandFn = Arc::new(move |boxed, notifications| {
            let command = boxed
                .downcast::<C>()
                .map_err(|_| Box::new(RouteTypeMismatch) as HandlerError)?;
            handler.handle(*command, notifications)
        });

        let mut routes = self.write_routes();
        let entry = routes.commands.entry(TypeId::of::<C>()).or_default();
        if !entry.is_empty() {
            return Err(BusError::HandlerAlreadyRegistered(type_name::<C>()));
        }
        entry.push(CommandRoute { invoke });
        Ok(())
    }

    /// Remove the handler for command type `C`. Returns whether one existed.
    pub fn unregister_command<C: Command>(&self) -> bool {
        let mut routes = self.write_routes();
        routes.commands.remove(&TypeId::of::<C>()).is_some()
    }

    /// Register the single handler for query type `Q`.
    pub fn register_query<Q, H>(&self, handler: H) -> Result<(), BusError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let handler = Arc::new(handler);
        let invoke: ErasedQueryFn = Arc::new(move |boxed| {
            let query = boxed
                .downcast::<Q>()
                .map_err(|_| Box::new(RouteTypeMismatch) as HandlerError)?;
            let output = handler.handle(*query)?;
            Ok(Box::new(output) as Box<dyn Any + Send>)
        });

        let mut routes = self.write_routes();
        let entry = routes.queries.entry(TypeId::of::<Q>()).or_default();
        if !entry.is_empty() {
            return Err(BusError::HandlerAlreadyRegistered(type_name::<Q>()));
        }
        entry.push(QueryRoute { invoke });
        Ok(())
    }

    /// Remove the handler for query type `Q`. Returns whether one existed.
    pub fn unregister_query<Q: Query>(&self) -> bool {
        let mut routes = self.write_routes();
        routes.queries.remove(&TypeId::of::<Q>()).is_some()
    }

    /// Append a subscriber for event type `E`. Subscribers receive events in
    /// registration order; `label` identifies the subscriber for reporting
    /// and unsubscription.
    pub fn subscribe_event<E, S>(&self, label: impl Into<String>, subscriber: S) -> Result<(), BusError>
    where
        E: DomainEvent,
        S: EventSubscriber<E> + 'static,
    {
        let label = label.into();
        let subscriber = Arc::new(subscriber);
        let invoke: ErasedEventFn = Arc::new(move |any| {
            let envelope = any
                .downcast_ref::<EventEnvelope<E>>()
                .ok_or_else(|| Box::new(RouteTypeMismatch) as HandlerError)?;
            subscriber.on_event(envelope)
        });

        let mut routes = self.write_routes();
        let entry = routes.events.entry(TypeId::of::<E>()).or_default();
        if entry.iter().any(|r| r.label == label) {
            return Err(BusError::SubscriberAlreadyRegistered {
                event: type_name::<E>(),
                label,
            });
        }
        entry.push(EventRoute { label, invoke });
        Ok(())
    }

    /// Remove the subscriber registered under `label` for event type `E`.
    /// Returns whether one existed.
    pub fn unsubscribe_event<E: DomainEvent>(&self, label: &str) -> bool {
        let mut routes = self.write_routes();
        if let Some(entry) = routes.events.get_mut(&TypeId::of::<E>()) {
            let before = entry.len();
            entry.retain(|r| r.label != label);
            return entry.len() != before;
        }
        false
    }

    /// Route a command to its single registered handler.
    ///
    /// Journey: Submitted → Validated {ok | rejected-with-notifications} →
    /// Executed → EventsEmitted. A command failing its own validity predicate
    /// never reaches the handler; a handler that records notifications ends
    /// the journey in `Rejected` with zero events committed. The bus holds no
    /// retry policy; that belongs to the outer transport.
    pub fn dispatch<C: Command>(&self, command: C) -> Result<DispatchOutcome, BusError> {
        let route = self.command_route::<C>()?;

        // Fresh accumulator per logical operation; violations never leak
        // across dispatches.
        let mut notifications = Notifications::new();
        command.validate(&mut notifications);
        if notifications.has_notifications() {
            return Ok(DispatchOutcome::Rejected {
                notifications: notifications.into_notifications(),
            });
        }

        let committed =
            (route.invoke)(Box::new(command), &mut notifications).map_err(BusError::Handler)?;

        if notifications.has_notifications() {
            Ok(DispatchOutcome::Rejected {
                notifications: notifications.into_notifications(),
            })
        } else {
            Ok(DispatchOutcome::Accepted {
                events_committed: committed,
            })
        }
    }

    /// Route a query to its single registered handler and return the typed
    /// result.
    pub fn query<Q: Query>(&self, query: Q) -> Result<Q::Output, BusError> {
        let route = self.query_route::<Q>()?;
        let output = (route.invoke)(Box::new(query)).map_err(BusError::Handler)?;
        output
            .downcast::<Q::Output>()
            .map(|boxed| *boxed)
            .map_err(|_| BusError::Handler(Box::new(RouteTypeMismatch)))
    }

    /// Broadcast an event to all subscribers in registration order.
    ///
    /// Subscriber failures are isolated: a failing subscriber is recorded in
    /// the report and delivery continues with the remaining subscribers.
    pub fn raise_event<E: DomainEvent>(&self, envelope: &EventEnvelope<E>) -> PublishReport {
        let subscribers = {
            let routes = self.read_routes();
            routes
                .events
                .get(&TypeId::of::<E>())
                .cloned()
                .unwrap_or_default()
        };

        let mut report = PublishReport::default();
        for route in subscribers {
            match (route.invoke)(envelope as &dyn Any) {
                Ok(()) => report.delivered.push(route.label),
                Err(error) => {
                    warn!(
                        subscriber = %route.label,
                        event_type = envelope.event_type(),
                        error = %error,
                        "event subscriber failed; continuing with remaining subscribers"
                    );
                    report.failures.push(SubscriberFailure {
                        subscriber: route.label,
                        error: error.to_string(),
                    });
                }
            }
        }
        report
    }

    fn command_route<C: Command>(&self) -> Result<CommandRoute, BusError> {
        let routes = self.read_routes();
        match routes.commands.get(&TypeId::of::<C>()) {
            None => Err(BusError::NoHandlerRegistered(type_name::<C>())),
            Some(entry) if entry.is_empty() => Err(BusError::NoHandlerRegistered(type_name::<C>())),
            Some(entry) if entry.len() > 1 => {
                Err(BusError::MultipleHandlersRegistered(type_name::<C>()))
            }
            Some(entry) => Ok(entry[0].clone()),
        }
    }

    fn query_route<Q: Query>(&self) -> Result<QueryRoute, BusError> {
        let routes = self.read_routes();
        match routes.queries.get(&TypeId::of::<Q>()) {
            None => Err(BusError::NoHandlerRegistered(type_name::<Q>())),
            Some(entry) if entry.is_empty() => Err(BusError::NoHandlerRegistered(type_name::<Q>())),
            Some(entry) if entry.len() > 1 => {
                Err(BusError::MultipleHandlersRegistered(type_name::<Q>()))
            }
            Some(entry) => Ok(entry[0].clone()),
        }
    }

    fn read_routes(&self) -> std::sync::RwLockReadGuard<'_, Routes> {
        match self.routes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_routes(&self) -> std::sync::RwLockWriteGuard<'_, Routes> {
        match self.routes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
