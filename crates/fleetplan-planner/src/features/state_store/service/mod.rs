//! Consistent read of persisted state taken before planning starts.
//!
//! Everything the reconciler and the link resolver need is fetched here, so
//! the planning pass itself never awaits.

use crate::features::state_store::repo::PersistedStateStore;
use crate::shared::error::PlannerResult;
use fleetplan_core::{
    AvailabilityZone, ConsumesDeclaration, DeploymentManifest, ExistingInstanceState,
    InstanceModel, LinkProvider, NetworkAssociation, StemcellModel, StemcellSpec,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    records: BTreeMap<(String, u32), InstanceModel>,
    existing_states: HashMap<u64, ExistingInstanceState>,
    associations: HashMap<u64, Vec<NetworkAssociation>>,
    stemcell_models: HashMap<StemcellSpec, Vec<StemcellModel>>,
    availability_zones: BTreeMap<String, AvailabilityZone>,
    foreign_providers: BTreeMap<String, Vec<LinkProvider>>,
}

impl StateSnapshot {
    pub async fn load(
        store: &dyn PersistedStateStore,
        manifest: &DeploymentManifest,
    ) -> PlannerResult<Self> {
        let mut snapshot = StateSnapshot::default();

        for record in store.list_instance_records(&manifest.name).await? {
            if let Some(state) = store.lookup_existing_state(record.id).await? {
                snapshot.existing_states.insert(record.id, state);
            }

            let associations = store.lookup_network_associations(&record).await?;
            snapshot.associations.insert(record.id, associations);

            if let Some(spec) = record.stemcell.as_ref().filter(|spec| !spec.is_empty()) {
                if !snapshot.stemcell_models.contains_key(spec) {
                    let models = store.lookup_stemcell_models(spec).await?;
                    snapshot.stemcell_models.insert(spec.clone(), models);
                }
            }

            snapshot
                .records
                .insert((record.instance_group.clone(), record.index), record);
        }

        let az_names: BTreeSet<&str> = manifest
            .instance_groups
            .iter()
            .flat_map(|ig| ig.azs.iter().map(String::as_str))
            .collect();
        for name in az_names {
            if let Some(az) = store.lookup_availability_zone_catalog(name).await? {
                snapshot.availability_zones.insert(name.to_string(), az);
            }
        }

        for deployment in referenced_deployments(manifest) {
            match store.lookup_link_providers(&deployment).await? {
                Some(providers) => {
                    debug!(
                        deployment = %manifest.name,
                        target = %deployment,
                        providers = providers.len(),
                        "Loaded providers of referenced deployment"
                    );
                    snapshot.foreign_providers.insert(deployment, providers);
                }
                None => debug!(
                    deployment = %manifest.name,
                    target = %deployment,
                    "Referenced deployment has no stored providers"
                ),
            }
        }

        info!(
            deployment = %manifest.name,
            records = snapshot.records.len(),
            referenced_deployments = snapshot.foreign_providers.len(),
            "Persisted state snapshot loaded"
        );

        Ok(snapshot)
    }

    pub fn record(&self, instance_group: &str, index: u32) -> Option<&InstanceModel> {
        self.records.get(&(instance_group.to_string(), index))
    }

    /// Records ordered by instance group and index.
    pub fn records(&self) -> impl Iterator<Item = &InstanceModel> {
        self.records.values()
    }

    pub fn existing_state(&self, record_id: u64) -> Option<&ExistingInstanceState> {
        self.existing_states.get(&record_id)
    }

    pub fn network_associations(&self, record: &InstanceModel) -> &[NetworkAssociation] {
        self.associations
            .get(&record.id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stemcell_models(&self, spec: &StemcellSpec) -> &[StemcellModel] {
        self.stemcell_models
            .get(spec)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn availability_zone(&self, name: &str) -> Option<&AvailabilityZone> {
        self.availability_zones.get(name)
    }

    /// Providers of other deployments keyed by deployment name.
    pub fn foreign_providers(&self) -> &BTreeMap<String, Vec<LinkProvider>> {
        &self.foreign_providers
    }
}

/// Deployments other than the manifest's own named by an explicit consumer.
fn referenced_deployments(manifest: &DeploymentManifest) -> BTreeSet<String> {
    manifest
        .instance_groups
        .iter()
        .flat_map(|ig| ig.jobs.iter())
        .flat_map(|job| job.consumes.values())
        .filter_map(|decl| match decl {
            ConsumesDeclaration::Explicit {
                deployment: Some(deployment),
                ..
            } if *deployment != manifest.name => Some(deployment.clone()),
            _ => None,
        })
        .collect()
}
