//! Notification accumulator for expected business-rule failures.
//!
//! Rule violations are facts about a request, not exceptional control flow.
//! Handlers record them here instead of bailing out, and the dispatch
//! boundary turns a non-empty accumulator into a rejected outcome carrying
//! the ordered violations.
//!
//! An accumulator is scoped to **one logical operation** (one command
//! execution or one request). Callers create a fresh instance per scope and
//! pass it explicitly; nothing here is ambient or shared across operations,
//! so no synchronization is needed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single recorded rule violation.
///
/// `key` names the violated rule or field, `value` is the caller-facing
/// message. Identity is assigned when the notification is appended; the
/// schema version is fixed at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNotification {
    id: Uuid,
    key: String,
    value: String,
    version: u32,
}

impl DomainNotification {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            key: key.into(),
            value: value.into(),
            version: 1,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// Ordered, per-operation collection of rule violations.
#[derive(Debug, Default)]
pub struct Notifications {
    items: Vec<DomainNotification>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation, preserving insertion order.
    pub fn handle(&mut self, notification: DomainNotification) {
        self.items.push(notification);
    }

    /// Convenience: record a violation from key/value parts.
    pub fn raise(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.handle(DomainNotification::new(key, value));
    }

    pub fn has_notifications(&self) -> bool {
        !self.items.is_empty()
    }

    /// The recorded violations in the order they were raised; empty when the
    /// operation passed all rules.
    pub fn notifications(&self) -> &[DomainNotification] {
        &self.items
    }

    /// Clear the accumulator at the start of a reused scope.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// Consume the accumulator, yielding the ordered violations.
    pub fn into_notifications(self) -> Vec<DomainNotification> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let acc = Notifications::new();
        assert!(!acc.has_notifications());
        assert!(acc.notifications().is_empty());
    }

    #[test]
    fn preserves_insertion_order() {
        let mut acc = Notifications::new();
        acc.raise("name", "name cannot be empty");
        acc.raise("external_key", "external key cannot be empty");

        let recorded = acc.notifications();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].key(), "name");
        assert_eq!(recorded[1].key(), "external_key");
    }

    #[test]
    fn assigns_identity_and_fixed_version() {
        let a = DomainNotification::new("k", "v");
        let b = DomainNotification::new("k", "v");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.version(), 1);
    }

    #[test]
    fn reset_clears_previous_scope() {
        let mut acc = Notifications::new();
        acc.raise("status", "cannot activate a rejected application");
        assert!(acc.has_notifications());

        acc.reset();
        assert!(!acc.has_notifications());
    }
}
