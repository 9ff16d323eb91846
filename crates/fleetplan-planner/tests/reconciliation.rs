use fleetplan_core::{
    AvailabilityZone, CloudProperties, DeploymentManifest, Env, ExistingInstanceState,
    InstanceModel, InstanceState, NetworkAssociation, ReservationKind,
};
use fleetplan_planner::features::state_store::repo::PersistedState;
use fleetplan_planner::Planner;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::IpAddr;

fn record(id: u64, uuid: &str, index: u32, state: InstanceState) -> InstanceModel {
    InstanceModel {
        id,
        uuid: uuid.to_string(),
        deployment: "simple".to_string(),
        instance_group: "web".to_string(),
        index,
        state,
        availability_zone: Some("z1".to_string()),
        vm_type: None,
        stemcell: None,
        vm_env: Env::default(),
        compilation: false,
        vm_cids: vec![format!("vm-{id}")],
    }
}

fn ip(raw: &str) -> IpAddr {
    raw.parse().unwrap()
}

fn state() -> PersistedState {
    let mut existing_states = BTreeMap::new();
    existing_states.insert(
        1,
        ExistingInstanceState {
            agent_id: Some("agent-1".to_string()),
            vm_cid: Some("vm-1".to_string()),
            job_state: Some("running".to_string()),
            ..ExistingInstanceState::default()
        },
    );

    PersistedState {
        instances: vec![
            record(1, "uuid-0", 0, InstanceState::Stopped),
            record(2, "uuid-1", 1, InstanceState::Started),
            record(3, "uuid-5", 5, InstanceState::Started),
        ],
        existing_states,
        network_associations: vec![
            NetworkAssociation {
                instance_id: 1,
                network_name: "default".to_string(),
                address: ip("10.0.0.10"),
                is_static: true,
            },
            NetworkAssociation {
                instance_id: 2,
                network_name: "default".to_string(),
                address: ip("10.0.0.11"),
                is_static: false,
            },
        ],
        availability_zones: vec![
            AvailabilityZone::new("z1", CloudProperties::new()),
            AvailabilityZone::new("z2", CloudProperties::new()),
        ],
        ..PersistedState::default()
    }
}

fn manifest() -> DeploymentManifest {
    serde_json::from_value(json!({
        "name": "simple",
        "instance_groups": [{
            "name": "web",
            "instances": 3,
            "azs": ["z1", "z2"],
            "instance_states": {"uuid-1": "detached"},
            "networks": [
                {"name": "default", "static_ips": ["10.0.0.10", "10.0.0.11", "10.0.0.12"]},
                {"name": "backup"}
            ]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_existing_instances_keep_identity_and_resolve_state() {
    let plan = Planner::from_state(state()).plan(manifest()).await.unwrap();

    let first = plan.instance("web", 0).unwrap();
    assert_eq!(first.uuid().as_deref(), Some("uuid-0"));
    assert_eq!(first.state(), InstanceState::Stopped);
    assert_eq!(
        first.existing_state().and_then(|s| s.agent_id.as_deref()),
        Some("agent-1")
    );

    let second = plan.instance("web", 1).unwrap();
    assert_eq!(second.uuid().as_deref(), Some("uuid-1"));
    assert_eq!(second.state(), InstanceState::Detached);
    assert!(second.existing_state().is_none());
}

#[tokio::test]
async fn test_new_instance_is_started_and_placed_round_robin() {
    let plan = Planner::from_state(state()).plan(manifest()).await.unwrap();

    let third = plan.instance("web", 2).unwrap();
    assert_eq!(third.state(), InstanceState::Started);
    assert!(third.is_bound());
    assert!(third.model().is_none());
    assert_eq!(third.placement().az_name(), Some("z1"));
}

#[tokio::test]
async fn test_reservations_follow_stored_associations() {
    let plan = Planner::from_state(state()).plan(manifest()).await.unwrap();

    let first = plan.instance("web", 0).unwrap();
    let default = first.reservations().find_network("default").unwrap();
    assert!(default.existing);
    assert_eq!(default.kind, ReservationKind::Static);
    assert_eq!(default.address, Some(ip("10.0.0.10")));
    assert!(first.reservations().find_network("backup").is_none());

    let second = plan.instance("web", 1).unwrap();
    let default = second.reservations().find_network("default").unwrap();
    assert_eq!(default.kind, ReservationKind::Dynamic);
    assert_eq!(default.address, Some(ip("10.0.0.11")));
}

#[tokio::test]
async fn test_network_demand_covers_unreserved_networks() {
    let plan = Planner::from_state(state()).plan(manifest()).await.unwrap();

    let existing = &plan.instances[0];
    assert_eq!(existing.network_demand.len(), 1);
    assert_eq!(existing.network_demand[0].network_name, "backup");
    assert_eq!(existing.network_demand[0].kind, ReservationKind::Dynamic);

    let fresh = plan
        .instances
        .iter()
        .find(|planned| planned.instance.index() == 2)
        .unwrap();
    let default = fresh
        .network_demand
        .iter()
        .find(|r| r.network_name == "default")
        .unwrap();
    assert_eq!(default.kind, ReservationKind::Static);
    assert_eq!(default.address, Some(ip("10.0.0.12")));
    assert!(!default.existing);
}

#[tokio::test]
async fn test_records_outside_manifest_are_obsolete() {
    let plan = Planner::from_state(state()).plan(manifest()).await.unwrap();

    assert_eq!(plan.instances.len(), 3);
    assert_eq!(plan.obsolete.len(), 1);
    let obsolete = &plan.obsolete[0];
    assert_eq!(obsolete.index(), 5);
    assert_eq!(obsolete.uuid().as_deref(), Some("uuid-5"));
    assert_eq!(obsolete.placement().az_name(), Some("z1"));
}

#[tokio::test]
async fn test_static_address_held_by_existing_instance_is_not_demanded_again() {
    let state = PersistedState {
        instances: vec![record(1, "uuid-0", 0, InstanceState::Started)],
        network_associations: vec![NetworkAssociation {
            instance_id: 1,
            network_name: "default".to_string(),
            address: ip("10.0.0.11"),
            is_static: true,
        }],
        availability_zones: vec![AvailabilityZone::new("z1", CloudProperties::new())],
        ..PersistedState::default()
    };
    let manifest: DeploymentManifest = serde_json::from_value(json!({
        "name": "simple",
        "instance_groups": [{
            "name": "web",
            "instances": 2,
            "azs": ["z1"],
            "networks": [{"name": "default", "static_ips": ["10.0.0.10", "10.0.0.11"]}]
        }]
    }))
    .unwrap();

    let plan = Planner::from_state(state).plan(manifest).await.unwrap();

    let held: Vec<IpAddr> = plan
        .instances
        .iter()
        .flat_map(|planned| planned.instance.reservations().iter())
        .filter_map(|reservation| reservation.address)
        .collect();
    assert_eq!(held, vec![ip("10.0.0.11")]);

    let fresh = &plan.instances[1];
    assert_eq!(fresh.instance.index(), 1);
    assert_eq!(fresh.network_demand.len(), 1);
    assert_eq!(fresh.network_demand[0].kind, ReservationKind::Static);
    assert_eq!(fresh.network_demand[0].address, Some(ip("10.0.0.10")));
}
