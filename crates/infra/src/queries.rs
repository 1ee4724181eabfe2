//! Query side: specifications over the client-application read model and the
//! bus-routed query handlers serving them.

use std::fmt;
use std::sync::Arc;

use clienthub_core::{AggregateId, Criteria, SpecRef, Specification};
use clienthub_messaging::{BusError, HandlerError, MessageBus, Query, QueryHandler};
use clienthub_onboarding::ApplicationStatus;

use crate::projection_store::ProjectionStore;
use crate::projections::ClientApplicationView;

/// Matches applications whose external key is one of the given keys.
pub struct ByExternalKeys(pub Vec<String>);

impl Specification<ClientApplicationView> for ByExternalKeys {
    fn is_satisfied_by(&self, candidate: &ClientApplicationView) -> bool {
        self.0.iter().any(|key| *key == candidate.external_key)
    }

    fn criteria(&self) -> Criteria {
        Criteria::leaf("external_key", self.0.clone())
    }
}

/// Matches applications by aggregate key.
pub struct ByAggregateKeys(pub Vec<AggregateId>);

impl Specification<ClientApplicationView> for ByAggregateKeys {
    fn is_satisfied_by(&self, candidate: &ClientApplicationView) -> bool {
        self.0.contains(&candidate.application_id.0)
    }

    fn criteria(&self) -> Criteria {
        Criteria::leaf("aggregate_id", self.0.iter().map(ToString::to_string))
    }
}

/// Matches applications in a given lifecycle status.
pub struct ByStatus(pub ApplicationStatus);

fn status_label(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Accepted => "accepted",
        ApplicationStatus::Active => "active",
        ApplicationStatus::Rejected => "rejected",
        ApplicationStatus::Revoked => "revoked",
    }
}

impl Specification<ClientApplicationView> for ByStatus {
    fn is_satisfied_by(&self, candidate: &ClientApplicationView) -> bool {
        candidate.status == self.0
    }

    fn criteria(&self) -> Criteria {
        Criteria::leaf("status", [status_label(self.0).to_string()])
    }
}

/// Query: all projections satisfying a composed specification.
pub struct FindClientApplications {
    pub specification: SpecRef<ClientApplicationView>,
}

impl fmt::Debug for FindClientApplications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindClientApplications")
            .field("criteria", &self.specification.criteria())
            .finish()
    }
}

impl Query for FindClientApplications {
    type Output = Vec<ClientApplicationView>;
}

/// Snapshot lookup key: aggregate key or external key.
#[derive(Debug, Clone)]
pub enum SnapshotKey {
    Aggregate(AggregateId),
    External(String),
}

/// Query: one projection by snapshot key, absent when never created.
#[derive(Debug, Clone)]
pub struct GetClientApplication {
    pub key: SnapshotKey,
}

impl Query for GetClientApplication {
    type Output = Option<ClientApplicationView>;
}

/// Query handlers backed by the projection store (cache included when the
/// store is wrapped in a `SnapshotCache`).
pub struct ClientApplicationQueries<PS> {
    projections: Arc<PS>,
}

impl<PS> ClientApplicationQueries<PS> {
    pub fn new(projections: Arc<PS>) -> Self {
        Self { projections }
    }
}

impl<PS> Clone for ClientApplicationQueries<PS> {
    fn clone(&self) -> Self {
        Self {
            projections: self.projections.clone(),
        }
    }
}

impl<PS> QueryHandler<FindClientApplications> for ClientApplicationQueries<PS>
where
    PS: ProjectionStore<ClientApplicationView>,
{
    fn handle(
        &self,
        query: FindClientApplications,
    ) -> Result<Vec<ClientApplicationView>, HandlerError> {
        let mut matches: Vec<_> = self
            .projections
            .list()
            .into_iter()
            .filter(|view| query.specification.is_satisfied_by(view))
            .collect();
        matches.sort_by(|a, b| a.external_key.cmp(&b.external_key));
        Ok(matches)
    }
}

impl<PS> QueryHandler<GetClientApplication> for ClientApplicationQueries<PS>
where
    PS: ProjectionStore<ClientApplicationView>,
{
    fn handle(
        &self,
        query: GetClientApplication,
    ) -> Result<Option<ClientApplicationView>, HandlerError> {
        Ok(match query.key {
            SnapshotKey::Aggregate(id) => self.projections.get(id),
            SnapshotKey::External(key) => self.projections.get_by_external_key(&key),
        })
    }
}

/// Register the client-application query handlers.
pub fn register_client_application_queries<PS>(
    bus: &MessageBus,
    projections: Arc<PS>,
) -> Result<(), BusError>
where
    PS: ProjectionStore<ClientApplicationView> + 'static,
{
    let queries = ClientApplicationQueries::new(projections);
    bus.register_query::<FindClientApplications, _>(queries.clone())?;
    bus.register_query::<GetClientApplication, _>(queries)?;
    Ok(())
}
