use crate::shared::error::{PlannerError, PlannerResult};
use async_trait::async_trait;
use fleetplan_core::{
    AvailabilityZone, ExistingInstanceState, InstanceModel, LinkProvider, NetworkAssociation,
    StemcellModel, StemcellSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Read access to what earlier applies left behind
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistedStateStore: Send + Sync {
    /// Look up the record occupying one slot of an instance group
    async fn lookup_instance_record(
        &self,
        deployment: &str,
        instance_group: &str,
        index: u32,
    ) -> PlannerResult<Option<InstanceModel>>;

    /// All records stored for a deployment
    async fn list_instance_records(&self, deployment: &str) -> PlannerResult<Vec<InstanceModel>>;

    /// Last agent-reported state for a record
    async fn lookup_existing_state(
        &self,
        record_id: u64,
    ) -> PlannerResult<Option<ExistingInstanceState>>;

    async fn lookup_network_associations(
        &self,
        record: &InstanceModel,
    ) -> PlannerResult<Vec<NetworkAssociation>>;

    async fn lookup_stemcell_models(&self, spec: &StemcellSpec)
        -> PlannerResult<Vec<StemcellModel>>;

    /// Cloud-config entry for a zone name
    async fn lookup_availability_zone_catalog(
        &self,
        name: &str,
    ) -> PlannerResult<Option<AvailabilityZone>>;

    /// Provider declarations of a deployment as of its last apply.
    /// `None` when the deployment is unknown.
    async fn lookup_link_providers(
        &self,
        deployment: &str,
    ) -> PlannerResult<Option<Vec<LinkProvider>>>;
}

/// Serialized form of the store, as read from a state file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub instances: Vec<InstanceModel>,
    #[serde(default)]
    pub existing_states: BTreeMap<u64, ExistingInstanceState>,
    #[serde(default)]
    pub network_associations: Vec<NetworkAssociation>,
    #[serde(default)]
    pub stemcells: Vec<StemcellModel>,
    #[serde(default)]
    pub availability_zones: Vec<AvailabilityZone>,
    /// Providers published by each deployment's last apply.
    #[serde(default)]
    pub deployments: BTreeMap<String, Vec<LinkProvider>>,
}

/// In-memory implementation of the persisted-state store
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    storage: Arc<RwLock<PersistedState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: PersistedState) -> Self {
        Self {
            storage: Arc::new(RwLock::new(state)),
        }
    }

    pub fn insert_instance(&self, record: InstanceModel) -> PlannerResult<()> {
        let mut storage = self.write()?;
        storage
            .instances
            .retain(|existing| existing.id != record.id);
        storage.instances.push(record);
        Ok(())
    }

    pub fn insert_existing_state(
        &self,
        record_id: u64,
        state: ExistingInstanceState,
    ) -> PlannerResult<()> {
        self.write()?.existing_states.insert(record_id, state);
        Ok(())
    }

    pub fn insert_network_association(&self, association: NetworkAssociation) -> PlannerResult<()> {
        self.write()?.network_associations.push(association);
        Ok(())
    }

    pub fn insert_stemcell(&self, stemcell: StemcellModel) -> PlannerResult<()> {
        self.write()?.stemcells.push(stemcell);
        Ok(())
    }

    pub fn insert_availability_zone(&self, az: AvailabilityZone) -> PlannerResult<()> {
        let mut storage = self.write()?;
        storage.availability_zones.retain(|existing| existing.name != az.name);
        storage.availability_zones.push(az);
        Ok(())
    }

    pub fn publish_link_providers(
        &self,
        deployment: &str,
        providers: Vec<LinkProvider>,
    ) -> PlannerResult<()> {
        self.write()?
            .deployments
            .insert(deployment.to_string(), providers);
        Ok(())
    }

    fn read(&self) -> PlannerResult<std::sync::RwLockReadGuard<'_, PersistedState>> {
        self.storage
            .read()
            .map_err(|_| PlannerError::StorageError("Lock poisoned".to_string()))
    }

    fn write(&self) -> PlannerResult<std::sync::RwLockWriteGuard<'_, PersistedState>> {
        self.storage
            .write()
            .map_err(|_| PlannerError::StorageError("Lock poisoned".to_string()))
    }
}

fn stemcell_matches(spec: &StemcellSpec, model: &StemcellModel) -> bool {
    let name_ok = spec.name.as_deref().map_or(true, |name| name == model.name);
    let os_ok = spec.os.as_deref().map_or(true, |os| os == model.os);
    name_ok && os_ok && spec.version == model.version
}

#[async_trait]
impl PersistedStateStore for InMemoryStateStore {
    async fn lookup_instance_record(
        &self,
        deployment: &str,
        instance_group: &str,
        index: u32,
    ) -> PlannerResult<Option<InstanceModel>> {
        let storage = self.read()?;
        Ok(storage
            .instances
            .iter()
            .find(|r| {
                r.deployment == deployment && r.instance_group == instance_group && r.index == index
            })
            .cloned())
    }

    async fn list_instance_records(&self, deployment: &str) -> PlannerResult<Vec<InstanceModel>> {
        let storage = self.read()?;
        let mut records: Vec<InstanceModel> = storage
            .instances
            .iter()
            .filter(|r| r.deployment == deployment)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.instance_group.as_str(), a.index).cmp(&(b.instance_group.as_str(), b.index))
        });
        Ok(records)
    }

    async fn lookup_existing_state(
        &self,
        record_id: u64,
    ) -> PlannerResult<Option<ExistingInstanceState>> {
        Ok(self.read()?.existing_states.get(&record_id).cloned())
    }

    async fn lookup_network_associations(
        &self,
        record: &InstanceModel,
    ) -> PlannerResult<Vec<NetworkAssociation>> {
        let storage = self.read()?;
        Ok(storage
            .network_associations
            .iter()
            .filter(|a| a.instance_id == record.id)
            .cloned()
            .collect())
    }

    async fn lookup_stemcell_models(
        &self,
        spec: &StemcellSpec,
    ) -> PlannerResult<Vec<StemcellModel>> {
        let storage = self.read()?;
        Ok(storage
            .stemcells
            .iter()
            .filter(|model| stemcell_matches(spec, model))
            .cloned()
            .collect())
    }

    async fn lookup_availability_zone_catalog(
        &self,
        name: &str,
    ) -> PlannerResult<Option<AvailabilityZone>> {
        let storage = self.read()?;
        Ok(storage
            .availability_zones
            .iter()
            .find(|az| az.name == name)
            .cloned())
    }

    async fn lookup_link_providers(
        &self,
        deployment: &str,
    ) -> PlannerResult<Option<Vec<LinkProvider>>> {
        Ok(self.read()?.deployments.get(deployment).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::{CloudProperties, Env, InstanceState};

    fn record(id: u64, deployment: &str, group: &str, index: u32) -> InstanceModel {
        InstanceModel {
            id,
            uuid: format!("uuid-{id}"),
            deployment: deployment.to_string(),
            instance_group: group.to_string(),
            index,
            state: InstanceState::Started,
            availability_zone: None,
            vm_type: None,
            stemcell: None,
            vm_env: Env::default(),
            compilation: false,
            vm_cids: vec![],
        }
    }

    #[tokio::test]
    async fn test_lookup_instance_record() {
        let store = InMemoryStateStore::new();
        store.insert_instance(record(1, "simple", "web", 0)).unwrap();
        store.insert_instance(record(2, "other", "web", 0)).unwrap();

        let found = store
            .lookup_instance_record("simple", "web", 0)
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(1));

        let missing = store
            .lookup_instance_record("simple", "web", 1)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_instance_records_is_ordered_and_scoped() {
        let store = InMemoryStateStore::new();
        store.insert_instance(record(3, "simple", "web", 1)).unwrap();
        store.insert_instance(record(1, "simple", "api", 0)).unwrap();
        store.insert_instance(record(2, "simple", "web", 0)).unwrap();
        store.insert_instance(record(4, "other", "web", 0)).unwrap();

        let ids: Vec<u64> = store
            .list_instance_records("simple")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_insert_instance_replaces_same_id() {
        let store = InMemoryStateStore::new();
        store.insert_instance(record(1, "simple", "web", 0)).unwrap();
        let mut updated = record(1, "simple", "web", 0);
        updated.state = InstanceState::Stopped;
        store.insert_instance(updated).unwrap();

        let records = store.list_instance_records("simple").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, InstanceState::Stopped);
    }

    #[tokio::test]
    async fn test_network_associations_by_record() {
        let store = InMemoryStateStore::new();
        for (id, address) in [(1, "192.168.1.10"), (2, "192.168.1.11"), (1, "10.0.0.3")] {
            store
                .insert_network_association(NetworkAssociation {
                    instance_id: id,
                    network_name: "a".to_string(),
                    address: address.parse().unwrap(),
                    is_static: false,
                })
                .unwrap();
        }

        let associations = store
            .lookup_network_associations(&record(1, "simple", "web", 0))
            .await
            .unwrap();
        assert_eq!(associations.len(), 2);
        assert!(associations.iter().all(|a| a.instance_id == 1));
    }

    #[tokio::test]
    async fn test_stemcell_lookup_by_os_or_name() {
        let store = InMemoryStateStore::new();
        store
            .insert_stemcell(StemcellModel {
                name: "bosh-warden-ubuntu-jammy".to_string(),
                os: "ubuntu-jammy".to_string(),
                version: "1.200".to_string(),
                cid: "sc-1".to_string(),
            })
            .unwrap();

        let by_os = StemcellSpec {
            name: None,
            os: Some("ubuntu-jammy".to_string()),
            version: "1.200".to_string(),
        };
        assert_eq!(store.lookup_stemcell_models(&by_os).await.unwrap().len(), 1);

        let other_version = StemcellSpec {
            version: "1.201".to_string(),
            ..by_os
        };
        assert!(store
            .lookup_stemcell_models(&other_version)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_availability_zone_catalog() {
        let store = InMemoryStateStore::new();
        store
            .insert_availability_zone(AvailabilityZone::new("z1", CloudProperties::new()))
            .unwrap();

        assert!(store
            .lookup_availability_zone_catalog("z1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .lookup_availability_zone_catalog("z2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_deployment_has_no_providers() {
        let store = InMemoryStateStore::new();
        store.publish_link_providers("provider_deployment", vec![]).unwrap();

        assert_eq!(
            store
                .lookup_link_providers("provider_deployment")
                .await
                .unwrap(),
            Some(vec![])
        );
        assert!(store
            .lookup_link_providers("missing")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_persisted_state_from_json() {
        let state: PersistedState = serde_json::from_str(
            r#"{
                "instances": [{
                    "id": 1, "uuid": "abc", "deployment": "simple",
                    "instance_group": "web", "index": 0, "state": "stopped"
                }],
                "existing_states": {"1": {"agent_id": "agent-1"}}
            }"#,
        )
        .unwrap();
        assert_eq!(state.instances[0].state, InstanceState::Stopped);
        assert_eq!(
            state.existing_states[&1].agent_id.as_deref(),
            Some("agent-1")
        );
    }
}
