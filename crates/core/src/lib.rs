//! `clienthub-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model, aggregate execution
//! traits, the notification accumulator for expected business-rule failures,
//! and the composable specification engine used by the query side.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod notification;
pub mod specification;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, CorrelationId, IssuerId, ProcessId};
pub use notification::{DomainNotification, Notifications};
pub use specification::{
    compose, Criteria, SpecRef, Specification, SpecificationError, SpecificationExt,
};
