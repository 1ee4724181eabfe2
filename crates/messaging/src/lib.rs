//! `clienthub-messaging` — message abstractions and the dispatch layer.
//!
//! Defines the command/query/event contracts, the runtime-pluggable
//! [`MessageBus`], the deferred-delivery [`CommandScheduler`], and the
//! projection fold contract. No storage assumptions live here; persistence
//! sits behind the infra crate's traits.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod projection;
pub mod query;
pub mod scheduler;

pub use bus::{BusError, DispatchOutcome, MessageBus, PublishReport, SubscriberFailure};
pub use command::{Command, CommandDescriptor};
pub use envelope::EventEnvelope;
pub use event::DomainEvent;
pub use handler::{execute, CommandHandler, EventSubscriber, HandlerError, QueryHandler};
pub use projection::{FoldError, ProjectionFold};
pub use query::Query;
pub use scheduler::{CommandScheduler, ScheduleHandle};
