use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clienthub_core::AggregateId;
use clienthub_messaging::{EventEnvelope, FoldError, ProjectionFold};
use clienthub_onboarding::{
    ApplicationStatus, ClientApplicationEvent, ClientApplicationId, ProductAccess,
};

/// Queryable client-application read model.
///
/// Keyed by aggregate id and by the external key of the requesting party.
/// `version` always equals the target version of the last folded event + 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplicationView {
    pub application_id: ClientApplicationId,
    pub external_key: String,
    pub name: String,
    pub status: ApplicationStatus,
    pub status_reason: Option<String>,
    pub product_access: Vec<ProductAccess>,
    pub version: u64,
    pub last_committed_at: DateTime<Utc>,
}

impl ClientApplicationView {
    /// Replace-by-matching-key, append-if-absent.
    fn upsert_access(&mut self, product_key: &str, scopes: &[String]) {
        match self
            .product_access
            .iter_mut()
            .find(|a| a.product_key == product_key)
        {
            Some(existing) => existing.scopes = scopes.to_vec(),
            None => self.product_access.push(ProductAccess {
                product_key: product_key.to_string(),
                scopes: scopes.to_vec(),
            }),
        }
    }
}

impl ProjectionFold for ClientApplicationView {
    type Ev = ClientApplicationEvent;

    fn fold(current: Option<Self>, envelope: &EventEnvelope<Self::Ev>) -> Result<Self, FoldError> {
        let aggregate_id = envelope.aggregate_id();
        let target = envelope.target_version();

        match (current, envelope.payload()) {
            (None, ClientApplicationEvent::Created(e)) => {
                // A creation event starts the stream; any other target means
                // earlier events were missed.
                if target != 0 {
                    return Err(FoldError::OutOfOrderEvent {
                        aggregate_id,
                        expected: 0,
                        found: target,
                    });
                }

                Ok(Self {
                    application_id: e.application_id,
                    external_key: e.external_key.clone(),
                    name: e.name.clone(),
                    status: ApplicationStatus::Accepted,
                    status_reason: None,
                    product_access: Vec::new(),
                    version: target + 1,
                    last_committed_at: envelope.committed_at(),
                })
            }

            (Some(_), ClientApplicationEvent::Created(_)) => {
                Err(FoldError::AlreadyInitialized { aggregate_id })
            }

            (None, _) => Err(FoldError::MissingProjection { aggregate_id }),

            (Some(view), event) => {
                if target != view.version {
                    return Err(FoldError::OutOfOrderEvent {
                        aggregate_id,
                        expected: view.version,
                        found: target,
                    });
                }

                let mut next = view;
                match event {
                    ClientApplicationEvent::Created(_) => {
                        return Err(FoldError::AlreadyInitialized { aggregate_id });
                    }
                    ClientApplicationEvent::Activated(_) => {
                        next.status = ApplicationStatus::Active;
                    }
                    ClientApplicationEvent::Rejected(e) => {
                        next.status = ApplicationStatus::Rejected;
                        next.status_reason = Some(e.reason.clone());
                    }
                    ClientApplicationEvent::CreationRevoked(e) => {
                        next.status = ApplicationStatus::Revoked;
                        next.status_reason = Some(e.reason.clone());
                    }
                    ClientApplicationEvent::ProductAccessGranted(e) => {
                        next.upsert_access(&e.product_key, &e.scopes);
                    }
                    ClientApplicationEvent::ProductAccessChanged(e) => {
                        next.upsert_access(&e.product_key, &e.scopes);
                    }
                }

                next.version = target + 1;
                next.last_committed_at = envelope.committed_at();
                Ok(next)
            }
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        self.application_id.0
    }

    fn external_key(&self) -> Option<&str> {
        Some(&self.external_key)
    }

    fn version(&self) -> u64 {
        self.version
    }
}
