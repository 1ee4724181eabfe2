use serde::{Deserialize, Serialize};

use clienthub_core::{AggregateId, CorrelationId, IssuerId, Notifications, ProcessId};

/// Routing and causality metadata every command carries.
///
/// - `aggregate_id` identifies the target aggregate (transaction boundary).
/// - `correlation_id` ties together all work in one causal chain.
/// - `issuer_id` identifies the application that issued the command.
/// - `process_id` ties together all commands of one multi-step process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub aggregate_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub issuer_id: IssuerId,
    pub process_id: ProcessId,
}

impl CommandDescriptor {
    /// Descriptor for a fresh causal chain: new correlation and process keys.
    pub fn new(aggregate_id: AggregateId, issuer_id: IssuerId) -> Self {
        Self {
            aggregate_id,
            correlation_id: CorrelationId::new(),
            issuer_id,
            process_id: ProcessId::new(),
        }
    }

    /// Continue an existing causal chain.
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Attach this command to an existing multi-step process.
    pub fn with_process(mut self, process_id: ProcessId) -> Self {
        self.process_id = process_id;
        self
    }
}

/// A command targets a specific aggregate and represents **intent**.
///
/// Commands are transient: consumed exactly once by their handler and never
/// persisted; only the events they produce are durable. They must be
/// `Clone + Send + Sync + 'static` so they can cross thread boundaries
/// (scheduler, workers) and be retried by outer transports.
///
/// `validate` is the pre-dispatch validity predicate: the bus evaluates it
/// before routing, and a command that raises notifications here never
/// reaches its handler's execution logic.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable command name (e.g. "onboarding.client_application.create").
    fn command_type(&self) -> &'static str;

    fn descriptor(&self) -> &CommandDescriptor;

    /// Record self-contained validity violations, in order.
    fn validate(&self, notifications: &mut Notifications);

    fn aggregate_id(&self) -> AggregateId {
        self.descriptor().aggregate_id
    }

    fn correlation_id(&self) -> CorrelationId {
        self.descriptor().correlation_id
    }

    /// Whether the command passes its own validity predicate.
    fn is_valid(&self) -> bool {
        let mut notifications = Notifications::new();
        self.validate(&mut notifications);
        !notifications.has_notifications()
    }
}
