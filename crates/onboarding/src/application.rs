use serde::{Deserialize, Serialize};

use clienthub_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Notifications};
use clienthub_messaging::{Command, CommandDescriptor, DomainEvent};

/// Client application identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientApplicationId(pub AggregateId);

impl ClientApplicationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientApplicationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Application lifecycle. Terminal states are statuses, never deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    /// Created and awaiting activation.
    Accepted,
    Active,
    Rejected,
    Revoked,
}

/// One product-access entry, keyed by `product_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAccess {
    pub product_key: String,
    pub scopes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Command: create a client application for an external party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClientApplication {
    pub descriptor: CommandDescriptor,
    /// External identifier of the requesting party (snapshot lookup key).
    pub external_key: String,
    pub name: String,
}

/// Command: activate an accepted application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateClientApplication {
    pub descriptor: CommandDescriptor,
}

/// Command: reject an accepted application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectClientApplicationCreation {
    pub descriptor: CommandDescriptor,
    pub reason: String,
}

/// Command: revoke the creation of a not-yet-activated application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeClientApplicationCreation {
    pub descriptor: CommandDescriptor,
    pub reason: String,
}

/// Command: grant access to a product on an active application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantProductAccess {
    pub descriptor: CommandDescriptor,
    pub product_key: String,
    pub scopes: Vec<String>,
}

/// Command: change the scopes of an existing product-access entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductAccess {
    pub descriptor: CommandDescriptor,
    pub product_key: String,
    pub scopes: Vec<String>,
}

impl Command for CreateClientApplication {
    fn command_type(&self) -> &'static str {
        "onboarding.client_application.create"
    }

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn validate(&self, notifications: &mut Notifications) {
        if self.external_key.trim().is_empty() {
            notifications.raise("external_key", "external key cannot be empty");
        }
        if self.name.trim().is_empty() {
            notifications.raise("name", "name cannot be empty");
        }
    }
}

impl Command for ActivateClientApplication {
    fn command_type(&self) -> &'static str {
        "onboarding.client_application.activate"
    }

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn validate(&self, _notifications: &mut Notifications) {}
}

impl Command for RejectClientApplicationCreation {
    fn command_type(&self) -> &'static str {
        "onboarding.client_application.reject"
    }

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn validate(&self, notifications: &mut Notifications) {
        if self.reason.trim().is_empty() {
            notifications.raise("reason", "a rejection reason is required");
        }
    }
}

impl Command for RevokeClientApplicationCreation {
    fn command_type(&self) -> &'static str {
        "onboarding.client_application.revoke"
    }

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn validate(&self, notifications: &mut Notifications) {
        if self.reason.trim().is_empty() {
            notifications.raise("reason", "a revocation reason is required");
        }
    }
}

impl Command for GrantProductAccess {
    fn command_type(&self) -> &'static str {
        "onboarding.client_application.grant_product_access"
    }

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn validate(&self, notifications: &mut Notifications) {
        if self.product_key.trim().is_empty() {
            notifications.raise("product_key", "product key cannot be empty");
        }
    }
}

impl Command for ChangeProductAccess {
    fn command_type(&self) -> &'static str {
        "onboarding.client_application.change_product_access"
    }

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn validate(&self, notifications: &mut Notifications) {
        if self.product_key.trim().is_empty() {
            notifications.raise("product_key", "product key cannot be empty");
        }
    }
}

/// Aggregate-level command union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientApplicationCommand {
    Create(CreateClientApplication),
    Activate(ActivateClientApplication),
    Reject(RejectClientApplicationCreation),
    Revoke(RevokeClientApplicationCreation),
    GrantAccess(GrantProductAccess),
    ChangeAccess(ChangeProductAccess),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Event: the application was created and accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplicationCreated {
    pub application_id: ClientApplicationId,
    pub external_key: String,
    pub name: String,
}

/// Event: the application became active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplicationActivated {
    pub application_id: ClientApplicationId,
}

/// Event: the application was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplicationRejected {
    pub application_id: ClientApplicationId,
    pub reason: String,
}

/// Event: the application's creation was revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplicationCreationRevoked {
    pub application_id: ClientApplicationId,
    pub reason: String,
}

/// Event: product access was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAccessGranted {
    pub application_id: ClientApplicationId,
    pub product_key: String,
    pub scopes: Vec<String>,
}

/// Event: an existing product-access entry was changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAccessChanged {
    pub application_id: ClientApplicationId,
    pub product_key: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientApplicationEvent {
    Created(ClientApplicationCreated),
    Activated(ClientApplicationActivated),
    Rejected(ClientApplicationRejected),
    CreationRevoked(ClientApplicationCreationRevoked),
    ProductAccessGranted(ProductAccessGranted),
    ProductAccessChanged(ProductAccessChanged),
}

impl DomainEvent for ClientApplicationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientApplicationEvent::Created(_) => "onboarding.client_application.created",
            ClientApplicationEvent::Activated(_) => "onboarding.client_application.activated",
            ClientApplicationEvent::Rejected(_) => "onboarding.client_application.rejected",
            ClientApplicationEvent::CreationRevoked(_) => {
                "onboarding.client_application.creation_revoked"
            }
            ClientApplicationEvent::ProductAccessGranted(_) => {
                "onboarding.client_application.product_access_granted"
            }
            ClientApplicationEvent::ProductAccessChanged(_) => {
                "onboarding.client_application.product_access_changed"
            }
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Aggregate root: a client application requesting platform access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientApplication {
    id: ClientApplicationId,
    external_key: String,
    name: String,
    status: ApplicationStatus,
    status_reason: Option<String>,
    product_access: Vec<ProductAccess>,
    version: u64,
    created: bool,
}

impl ClientApplication {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientApplicationId) -> Self {
        Self {
            id,
            external_key: String::new(),
            name: String::new(),
            status: ApplicationStatus::Accepted,
            status_reason: None,
            product_access: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientApplicationId {
        self.id
    }

    pub fn external_key(&self) -> &str {
        &self.external_key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ApplicationStatus {
        self.status
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    pub fn product_access(&self) -> &[ProductAccess] {
        &self.product_access
    }

    /// Invariant helper: only active applications may hold product access.
    pub fn can_use_products(&self) -> bool {
        self.status == ApplicationStatus::Active
    }
}

impl AggregateRoot for ClientApplication {
    type Id = ClientApplicationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for ClientApplication {
    type Command = ClientApplicationCommand;
    type Event = ClientApplicationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientApplicationEvent::Created(e) => {
                self.id = e.application_id;
                self.external_key = e.external_key.clone();
                self.name = e.name.clone();
                self.status = ApplicationStatus::Accepted;
                self.created = true;
            }
            ClientApplicationEvent::Activated(_) => {
                self.status = ApplicationStatus::Active;
            }
            ClientApplicationEvent::Rejected(e) => {
                self.status = ApplicationStatus::Rejected;
                self.status_reason = Some(e.reason.clone());
            }
            ClientApplicationEvent::CreationRevoked(e) => {
                self.status = ApplicationStatus::Revoked;
                self.status_reason = Some(e.reason.clone());
            }
            ClientApplicationEvent::ProductAccessGranted(e) => {
                upsert_access(&mut self.product_access, &e.product_key, &e.scopes);
            }
            ClientApplicationEvent::ProductAccessChanged(e) => {
                upsert_access(&mut self.product_access, &e.product_key, &e.scopes);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientApplicationCommand::Create(cmd) => self.handle_create(cmd),
            ClientApplicationCommand::Activate(cmd) => self.handle_activate(cmd),
            ClientApplicationCommand::Reject(cmd) => self.handle_reject(cmd),
            ClientApplicationCommand::Revoke(cmd) => self.handle_revoke(cmd),
            ClientApplicationCommand::GrantAccess(cmd) => self.handle_grant(cmd),
            ClientApplicationCommand::ChangeAccess(cmd) => self.handle_change(cmd),
        }
    }
}

/// Replace-by-matching-key, append-if-absent.
fn upsert_access(entries: &mut Vec<ProductAccess>, product_key: &str, scopes: &[String]) {
    match entries.iter_mut().find(|a| a.product_key == product_key) {
        Some(existing) => existing.scopes = scopes.to_vec(),
        None => entries.push(ProductAccess {
            product_key: product_key.to_string(),
            scopes: scopes.to_vec(),
        }),
    }
}

impl ClientApplication {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreateClientApplication,
    ) -> Result<Vec<ClientApplicationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client application already exists"));
        }
        if cmd.external_key.trim().is_empty() {
            return Err(DomainError::validation("external key cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ClientApplicationEvent::Created(
            ClientApplicationCreated {
                application_id: ClientApplicationId(cmd.descriptor.aggregate_id),
                external_key: cmd.external_key.clone(),
                name: cmd.name.clone(),
            },
        )])
    }

    fn handle_activate(
        &self,
        _cmd: &ActivateClientApplication,
    ) -> Result<Vec<ClientApplicationEvent>, DomainError> {
        self.ensure_created()?;
        match self.status {
            ApplicationStatus::Accepted => Ok(vec![ClientApplicationEvent::Activated(
                ClientApplicationActivated {
                    application_id: self.id,
                },
            )]),
            ApplicationStatus::Active => {
                Err(DomainError::conflict("application is already active"))
            }
            ApplicationStatus::Rejected => Err(DomainError::invariant(
                "cannot activate a rejected application",
            )),
            ApplicationStatus::Revoked => Err(DomainError::invariant(
                "cannot activate a revoked application",
            )),
        }
    }

    fn handle_reject(
        &self,
        cmd: &RejectClientApplicationCreation,
    ) -> Result<Vec<ClientApplicationEvent>, DomainError> {
        self.ensure_created()?;
        match self.status {
            ApplicationStatus::Accepted => Ok(vec![ClientApplicationEvent::Rejected(
                ClientApplicationRejected {
                    application_id: self.id,
                    reason: cmd.reason.clone(),
                },
            )]),
            ApplicationStatus::Active => Err(DomainError::invariant(
                "cannot reject an activated application",
            )),
            ApplicationStatus::Rejected => {
                Err(DomainError::conflict("application is already rejected"))
            }
            ApplicationStatus::Revoked => {
                Err(DomainError::conflict("application is already revoked"))
            }
        }
    }

    fn handle_revoke(
        &self,
        cmd: &RevokeClientApplicationCreation,
    ) -> Result<Vec<ClientApplicationEvent>, DomainError> {
        self.ensure_created()?;
        match self.status {
            ApplicationStatus::Accepted => Ok(vec![ClientApplicationEvent::CreationRevoked(
                ClientApplicationCreationRevoked {
                    application_id: self.id,
                    reason: cmd.reason.clone(),
                },
            )]),
            ApplicationStatus::Active => Err(DomainError::invariant(
                "cannot revoke the creation of an activated application",
            )),
            ApplicationStatus::Rejected => {
                Err(DomainError::conflict("application is already rejected"))
            }
            ApplicationStatus::Revoked => {
                Err(DomainError::conflict("application is already revoked"))
            }
        }
    }

    fn handle_grant(
        &self,
        cmd: &GrantProductAccess,
    ) -> Result<Vec<ClientApplicationEvent>, DomainError> {
        self.ensure_created()?;
        if !self.can_use_products() {
            return Err(DomainError::invariant(
                "product access requires an active application",
            ));
        }
        if self
            .product_access
            .iter()
            .any(|a| a.product_key == cmd.product_key)
        {
            return Err(DomainError::conflict(format!(
                "product access for '{}' is already granted",
                cmd.product_key
            )));
        }

        Ok(vec![ClientApplicationEvent::ProductAccessGranted(
            ProductAccessGranted {
                application_id: self.id,
                product_key: cmd.product_key.clone(),
                scopes: cmd.scopes.clone(),
            },
        )])
    }

    fn handle_change(
        &self,
        cmd: &ChangeProductAccess,
    ) -> Result<Vec<ClientApplicationEvent>, DomainError> {
        self.ensure_created()?;
        if !self.can_use_products() {
            return Err(DomainError::invariant(
                "product access requires an active application",
            ));
        }
        if !self
            .product_access
            .iter()
            .any(|a| a.product_key == cmd.product_key)
        {
            return Err(DomainError::invariant(format!(
                "no product access entry for '{}'",
                cmd.product_key
            )));
        }

        Ok(vec![ClientApplicationEvent::ProductAccessChanged(
            ProductAccessChanged {
                application_id: self.id,
                product_key: cmd.product_key.clone(),
                scopes: cmd.scopes.clone(),
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clienthub_core::IssuerId;
    use clienthub_messaging::execute;

    fn test_application_id() -> ClientApplicationId {
        ClientApplicationId::new(AggregateId::new())
    }

    fn descriptor_for(id: ClientApplicationId) -> CommandDescriptor {
        CommandDescriptor::new(id.0, IssuerId::new())
    }

    fn create_cmd(id: ClientApplicationId) -> ClientApplicationCommand {
        ClientApplicationCommand::Create(CreateClientApplication {
            descriptor: descriptor_for(id),
            external_key: "EXT-1".to_string(),
            name: "Acme".to_string(),
        })
    }

    fn created(id: ClientApplicationId) -> ClientApplication {
        let mut app = ClientApplication::empty(id);
        let events = app.handle(&create_cmd(id)).unwrap();
        app.apply(&events[0]);
        app
    }

    fn activated(id: ClientApplicationId) -> ClientApplication {
        let mut app = created(id);
        let events = app
            .handle(&ClientApplicationCommand::Activate(
                ActivateClientApplication {
                    descriptor: descriptor_for(id),
                },
            ))
            .unwrap();
        app.apply(&events[0]);
        app
    }

    #[test]
    fn create_emits_created_event_with_accepted_status() {
        let id = test_application_id();
        let app = ClientApplication::empty(id);

        let events = app.handle(&create_cmd(id)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ClientApplicationEvent::Created(e) => {
                assert_eq!(e.application_id, id);
                assert_eq!(e.external_key, "EXT-1");
                assert_eq!(e.name, "Acme");
            }
            other => panic!("expected Created event, got {other:?}"),
        }

        let app = created(id);
        assert_eq!(app.status(), ApplicationStatus::Accepted);
        assert_eq!(app.version(), 1);
        assert_eq!(app.external_key(), "EXT-1");
    }

    #[test]
    fn create_rejects_duplicate_creation() {
        let id = test_application_id();
        let app = created(id);

        let err = app.handle(&create_cmd(id)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn create_rejects_empty_name_and_external_key() {
        let id = test_application_id();
        let app = ClientApplication::empty(id);

        let cmd = ClientApplicationCommand::Create(CreateClientApplication {
            descriptor: descriptor_for(id),
            external_key: "  ".to_string(),
            name: "Acme".to_string(),
        });
        assert!(matches!(
            app.handle(&cmd).unwrap_err(),
            DomainError::Validation(_)
        ));

        let cmd = ClientApplicationCommand::Create(CreateClientApplication {
            descriptor: descriptor_for(id),
            external_key: "EXT-1".to_string(),
            name: "".to_string(),
        });
        assert!(matches!(
            app.handle(&cmd).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn activate_transitions_accepted_to_active() {
        let id = test_application_id();
        let app = activated(id);
        assert_eq!(app.status(), ApplicationStatus::Active);
        assert_eq!(app.version(), 2);
        assert!(app.can_use_products());
    }

    #[test]
    fn activate_rejects_non_accepted_statuses() {
        let id = test_application_id();
        let app = activated(id);
        assert!(matches!(
            app.handle(&ClientApplicationCommand::Activate(
                ActivateClientApplication {
                    descriptor: descriptor_for(id)
                }
            ))
            .unwrap_err(),
            DomainError::Conflict(_)
        ));

        let mut rejected = created(id);
        let events = rejected
            .handle(&ClientApplicationCommand::Reject(
                RejectClientApplicationCreation {
                    descriptor: descriptor_for(id),
                    reason: "incomplete".to_string(),
                },
            ))
            .unwrap();
        rejected.apply(&events[0]);

        assert!(matches!(
            rejected
                .handle(&ClientApplicationCommand::Activate(
                    ActivateClientApplication {
                        descriptor: descriptor_for(id)
                    }
                ))
                .unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
    }

    #[test]
    fn revoke_only_works_before_activation() {
        let id = test_application_id();
        let mut app = created(id);

        let events = app
            .handle(&ClientApplicationCommand::Revoke(
                RevokeClientApplicationCreation {
                    descriptor: descriptor_for(id),
                    reason: "fraud".to_string(),
                },
            ))
            .unwrap();
        app.apply(&events[0]);
        assert_eq!(app.status(), ApplicationStatus::Revoked);
        assert_eq!(app.status_reason(), Some("fraud"));
    }

    #[test]
    fn revoke_rejects_an_already_active_application() {
        let id = test_application_id();
        let app = activated(id);
        let version_before = app.version();

        let err = app
            .handle(&ClientApplicationCommand::Revoke(
                RevokeClientApplicationCreation {
                    descriptor: descriptor_for(id),
                    reason: "fraud".to_string(),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(app.version(), version_before);
    }

    #[test]
    fn commands_against_a_missing_application_report_not_found() {
        let id = test_application_id();
        let app = ClientApplication::empty(id);

        let err = app
            .handle(&ClientApplicationCommand::Activate(
                ActivateClientApplication {
                    descriptor: descriptor_for(id),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn product_access_requires_an_active_application() {
        let id = test_application_id();
        let app = created(id);

        let err = app
            .handle(&ClientApplicationCommand::GrantAccess(GrantProductAccess {
                descriptor: descriptor_for(id),
                product_key: "payments".to_string(),
                scopes: vec!["read".to_string()],
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn grant_then_change_updates_the_matching_entry_in_place() {
        let id = test_application_id();
        let mut app = activated(id);

        let events = app
            .handle(&ClientApplicationCommand::GrantAccess(GrantProductAccess {
                descriptor: descriptor_for(id),
                product_key: "payments".to_string(),
                scopes: vec!["read".to_string()],
            }))
            .unwrap();
        app.apply(&events[0]);
        assert_eq!(app.product_access().len(), 1);

        let events = app
            .handle(&ClientApplicationCommand::ChangeAccess(
                ChangeProductAccess {
                    descriptor: descriptor_for(id),
                    product_key: "payments".to_string(),
                    scopes: vec!["read".to_string(), "write".to_string()],
                },
            ))
            .unwrap();
        app.apply(&events[0]);

        // Replaced by matching key, not appended.
        assert_eq!(app.product_access().len(), 1);
        assert_eq!(
            app.product_access()[0].scopes,
            vec!["read".to_string(), "write".to_string()]
        );
    }

    #[test]
    fn duplicate_grant_and_unknown_change_are_rejected() {
        let id = test_application_id();
        let mut app = activated(id);

        let events = app
            .handle(&ClientApplicationCommand::GrantAccess(GrantProductAccess {
                descriptor: descriptor_for(id),
                product_key: "payments".to_string(),
                scopes: vec![],
            }))
            .unwrap();
        app.apply(&events[0]);

        assert!(matches!(
            app.handle(&ClientApplicationCommand::GrantAccess(GrantProductAccess {
                descriptor: descriptor_for(id),
                product_key: "payments".to_string(),
                scopes: vec![],
            }))
            .unwrap_err(),
            DomainError::Conflict(_)
        ));

        assert!(matches!(
            app.handle(&ClientApplicationCommand::ChangeAccess(
                ChangeProductAccess {
                    descriptor: descriptor_for(id),
                    product_key: "ledger".to_string(),
                    scopes: vec![],
                }
            ))
            .unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let id = test_application_id();
        let app = created(id);
        let before = app.clone();

        let _ = app.handle(&ClientApplicationCommand::Activate(
            ActivateClientApplication {
                descriptor: descriptor_for(id),
            },
        ));

        assert_eq!(app, before);
    }

    #[test]
    fn execute_runs_decide_then_evolve() {
        let id = test_application_id();
        let mut app = ClientApplication::empty(id);

        let events = execute(&mut app, &create_cmd(id)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(app.version(), 1);
        assert_eq!(app.status(), ApplicationStatus::Accepted);
    }

    #[test]
    fn version_increments_once_per_applied_event() {
        let id = test_application_id();
        let app = activated(id);
        assert_eq!(app.version(), 2);
    }

    #[test]
    fn command_validation_collects_ordered_notifications() {
        let cmd = CreateClientApplication {
            descriptor: descriptor_for(test_application_id()),
            external_key: String::new(),
            name: String::new(),
        };
        let mut notifications = Notifications::new();
        cmd.validate(&mut notifications);

        let recorded = notifications.notifications();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].key(), "external_key");
        assert_eq!(recorded[1].key(), "name");
        assert!(!cmd.is_valid());
    }
}
