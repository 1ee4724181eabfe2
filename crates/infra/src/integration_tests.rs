//! Integration tests for the full dispatch pipeline.
//!
//! Command → EventStore → FoldingEngine → ProjectionStore/SnapshotCache,
//! with broadcast to subscribers and bus-routed queries on top.

use std::sync::{Arc, Mutex};

use clienthub_core::{AggregateId, IssuerId, SpecificationExt};
use clienthub_messaging::{
    Command as _, CommandDescriptor, CommandScheduler, DispatchOutcome, DomainEvent, EventEnvelope,
    EventSubscriber, HandlerError, MessageBus,
};
use clienthub_onboarding::{
    ActivateClientApplication, ApplicationStatus, ChangeProductAccess, ClientApplicationEvent,
    CreateClientApplication, GrantProductAccess, RevokeClientApplicationCreation,
};

use crate::event_store::{EventStore, InMemoryEventStore};
use crate::folding::FoldingEngine;
use crate::pipeline::{register_onboarding_commands, CommandPipeline};
use crate::projection_store::{InMemoryProjectionStore, ProjectionStore, SnapshotCache};
use crate::projections::ClientApplicationView;
use crate::queries::{
    register_client_application_queries, ByAggregateKeys, ByExternalKeys, FindClientApplications,
    GetClientApplication, SnapshotKey,
};

type Projections = SnapshotCache<ClientApplicationView, InMemoryProjectionStore<ClientApplicationView>>;

struct Rig {
    bus: Arc<MessageBus>,
    store: Arc<InMemoryEventStore>,
    projections: Arc<Projections>,
}

fn setup() -> Rig {
    let bus = Arc::new(MessageBus::new());
    let store = Arc::new(InMemoryEventStore::new());
    let projections = Arc::new(SnapshotCache::new(InMemoryProjectionStore::new()));
    let folding = Arc::new(FoldingEngine::new(projections.clone()));
    let pipeline = Arc::new(CommandPipeline::new(store.clone(), folding, bus.clone()));

    register_onboarding_commands(&bus, pipeline).unwrap();
    register_client_application_queries(&bus, projections.clone()).unwrap();

    Rig {
        bus,
        store,
        projections,
    }
}

fn create_cmd(aggregate_id: AggregateId, external_key: &str, name: &str) -> CreateClientApplication {
    CreateClientApplication {
        descriptor: CommandDescriptor::new(aggregate_id, IssuerId::new()),
        external_key: external_key.to_string(),
        name: name.to_string(),
    }
}

fn descriptor(aggregate_id: AggregateId) -> CommandDescriptor {
    CommandDescriptor::new(aggregate_id, IssuerId::new())
}

fn accepted_count(outcome: DispatchOutcome) -> usize {
    match outcome {
        DispatchOutcome::Accepted { events_committed } => events_committed,
        DispatchOutcome::Rejected { notifications } => {
            panic!("expected acceptance, got rejection: {notifications:?}")
        }
    }
}

#[test]
fn create_commits_one_event_and_builds_the_projection() {
    let rig = setup();
    let aggregate_id = AggregateId::new();

    let outcome = rig
        .bus
        .dispatch(create_cmd(aggregate_id, "EXT-1", "Acme"))
        .unwrap();
    assert_eq!(accepted_count(outcome), 1);

    let view = rig.projections.get(aggregate_id).unwrap();
    assert_eq!(view.version, 1);
    assert_eq!(view.status, ApplicationStatus::Accepted);
    assert_eq!(view.external_key, "EXT-1");
    assert_eq!(view.name, "Acme");

    // Snapshot lookup by external key is served through the bus.
    let found = rig
        .bus
        .query(GetClientApplication {
            key: SnapshotKey::External("EXT-1".to_string()),
        })
        .unwrap();
    assert_eq!(found.unwrap().version, 1);
}

#[test]
fn activation_increments_the_version_by_exactly_one() {
    let rig = setup();
    let aggregate_id = AggregateId::new();

    rig.bus
        .dispatch(create_cmd(aggregate_id, "EXT-1", "Acme"))
        .unwrap();
    let outcome = rig
        .bus
        .dispatch(ActivateClientApplication {
            descriptor: descriptor(aggregate_id),
        })
        .unwrap();
    assert_eq!(accepted_count(outcome), 1);

    let view = rig.projections.get(aggregate_id).unwrap();
    assert_eq!(view.status, ApplicationStatus::Active);
    assert_eq!(view.version, 2);
}

#[test]
fn revoking_an_active_application_is_rejected_without_new_events() {
    let rig = setup();
    let aggregate_id = AggregateId::new();

    rig.bus
        .dispatch(create_cmd(aggregate_id, "EXT-1", "Acme"))
        .unwrap();
    rig.bus
        .dispatch(ActivateClientApplication {
            descriptor: descriptor(aggregate_id),
        })
        .unwrap();

    let outcome = rig
        .bus
        .dispatch(RevokeClientApplicationCreation {
            descriptor: descriptor(aggregate_id),
            reason: "fraud".to_string(),
        })
        .unwrap();

    match outcome {
        DispatchOutcome::Rejected { notifications } => {
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].key(), "rule");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    // No event was emitted and the projection is unchanged.
    assert_eq!(rig.store.read_stream(aggregate_id).unwrap().len(), 2);
    let view = rig.projections.get(aggregate_id).unwrap();
    assert_eq!(view.version, 2);
    assert_eq!(view.status, ApplicationStatus::Active);
}

#[test]
fn an_invalid_command_never_reaches_the_handler() {
    let rig = setup();
    let aggregate_id = AggregateId::new();

    let command = create_cmd(aggregate_id, "", "");
    assert!(!command.is_valid());

    let outcome = rig.bus.dispatch(command).unwrap();
    match outcome {
        DispatchOutcome::Rejected { notifications } => {
            let keys: Vec<_> = notifications.iter().map(|n| n.key()).collect();
            assert_eq!(keys, vec!["external_key", "name"]);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    assert!(rig.store.read_stream(aggregate_id).unwrap().is_empty());
    assert!(rig.projections.get(aggregate_id).is_none());
}

#[test]
fn composed_specification_narrows_the_query_result() {
    let rig = setup();
    let first = AggregateId::new();
    let second = AggregateId::new();

    rig.bus.dispatch(create_cmd(first, "EXT-1", "Acme")).unwrap();
    rig.bus
        .dispatch(create_cmd(second, "EXT-2", "Globex"))
        .unwrap();

    let spec = ByExternalKeys(vec!["EXT-1".to_string(), "EXT-2".to_string()])
        .and(ByAggregateKeys(vec![first]));
    let matches = rig
        .bus
        .query(FindClientApplications {
            specification: spec.into_ref(),
        })
        .unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].external_key, "EXT-1");
}

#[test]
fn product_access_flow_updates_the_nested_collection_in_place() {
    let rig = setup();
    let aggregate_id = AggregateId::new();

    rig.bus
        .dispatch(create_cmd(aggregate_id, "EXT-1", "Acme"))
        .unwrap();
    rig.bus
        .dispatch(ActivateClientApplication {
            descriptor: descriptor(aggregate_id),
        })
        .unwrap();
    rig.bus
        .dispatch(GrantProductAccess {
            descriptor: descriptor(aggregate_id),
            product_key: "payments".to_string(),
            scopes: vec!["read".to_string()],
        })
        .unwrap();
    rig.bus
        .dispatch(ChangeProductAccess {
            descriptor: descriptor(aggregate_id),
            product_key: "payments".to_string(),
            scopes: vec!["read".to_string(), "write".to_string()],
        })
        .unwrap();

    let view = rig.projections.get(aggregate_id).unwrap();
    assert_eq!(view.version, 4);
    assert_eq!(view.product_access.len(), 1);
    assert_eq!(view.product_access[0].scopes.len(), 2);
}

struct RecordingSubscriber {
    seen: Arc<Mutex<Vec<(String, u64)>>>,
}

impl EventSubscriber<ClientApplicationEvent> for RecordingSubscriber {
    fn on_event(
        &self,
        envelope: &EventEnvelope<ClientApplicationEvent>,
    ) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .expect("subscriber record lock")
            .push((envelope.payload().event_type().to_string(), envelope.target_version()));
        Ok(())
    }
}

#[test]
fn subscribers_observe_committed_events_in_stream_order() {
    let rig = setup();
    let aggregate_id = AggregateId::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    rig.bus
        .subscribe_event::<ClientApplicationEvent, _>(
            "recorder",
            RecordingSubscriber { seen: seen.clone() },
        )
        .unwrap();

    rig.bus
        .dispatch(create_cmd(aggregate_id, "EXT-1", "Acme"))
        .unwrap();
    rig.bus
        .dispatch(ActivateClientApplication {
            descriptor: descriptor(aggregate_id),
        })
        .unwrap();

    let recorded = seen.lock().expect("subscriber record lock").clone();
    assert_eq!(
        recorded,
        vec![
            ("onboarding.client_application.created".to_string(), 0),
            ("onboarding.client_application.activated".to_string(), 1),
        ]
    );
}

#[test]
fn deferred_commands_settle_through_the_same_pipeline() {
    let rig = setup();
    let aggregate_id = AggregateId::new();

    rig.bus
        .dispatch(create_cmd(aggregate_id, "EXT-1", "Acme"))
        .unwrap();

    let scheduler = CommandScheduler::spawn(rig.bus.clone());
    scheduler.schedule(
        ActivateClientApplication {
            descriptor: descriptor(aggregate_id),
        },
        chrono::Utc::now() + chrono::Duration::milliseconds(50),
    );

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    let mut activated = false;
    while std::time::Instant::now() < deadline {
        if let Some(view) = rig.projections.get(aggregate_id) {
            if view.status == ApplicationStatus::Active {
                activated = true;
                break;
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    assert!(activated, "deferred activation never reached the projection");
    scheduler.shutdown();
}

#[test]
fn distinct_aggregates_fold_independently() {
    let rig = setup();
    let ids: Vec<AggregateId> = (0..4).map(|_| AggregateId::new()).collect();

    let mut handles = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        let bus = rig.bus.clone();
        let id = *id;
        handles.push(std::thread::spawn(move || {
            bus.dispatch(create_cmd(id, &format!("EXT-{i}"), "App"))
                .unwrap();
            bus.dispatch(ActivateClientApplication {
                descriptor: descriptor(id),
            })
            .unwrap();
        }));
    }
    for handle in handles {
        handle.join().expect("dispatch thread panicked");
    }

    for id in ids {
        let view = rig.projections.get(id).unwrap();
        assert_eq!(view.version, 2);
        assert_eq!(view.status, ApplicationStatus::Active);
    }
}
