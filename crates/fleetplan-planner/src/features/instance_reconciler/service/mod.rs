//! Builds the in-memory `Instance` for every slot of a deployment.
//!
//! Three cases: a stored record the manifest still wants, a stored record
//! the manifest no longer wants, and a slot with no record yet. All lookups
//! go through the [`StateSnapshot`]; nothing here awaits.

use crate::features::network_reservations::service::NetworkReservationMaterializer;
use crate::features::state_store::service::StateSnapshot;
use crate::shared::types::PlannedInstance;
use fleetplan_core::{
    AvailabilityZone, DeploymentManifest, DesiredInstance, ExistingInstanceState, Instance,
    InstanceGroup, InstanceModel, InstanceState, MergedCloudProperties, PlanError, Placement,
    Result, Stemcell, VmType,
};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, info};

/// Instances of one deployment after reconciliation
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub desired: Vec<PlannedInstance>,
    pub obsolete: Vec<Instance>,
}

pub struct InstanceReconciler<'a> {
    snapshot: &'a StateSnapshot,
}

impl<'a> InstanceReconciler<'a> {
    pub fn new(snapshot: &'a StateSnapshot) -> Self {
        Self { snapshot }
    }

    /// Instance for a stored record whose slot is still desired.
    pub fn fetch_existing(
        &self,
        record: Option<&InstanceModel>,
        existing_state: Option<ExistingInstanceState>,
        instance_group: &InstanceGroup,
        index: u32,
        deployment: &str,
    ) -> Result<Instance> {
        let record = record.ok_or_else(|| {
            PlanError::NotFound(format!(
                "no record for {}/{} in deployment '{}'",
                instance_group.name, index, deployment
            ))
        })?;
        if !instance_group.has_index(index) {
            return Err(PlanError::Configuration(format!(
                "instance group '{}' has {} instances and cannot place index {}",
                instance_group.name, instance_group.instances, index
            )));
        }

        // Manifest wins; the stored state only fills in when it is silent.
        let declared = instance_group.state_for_instance(record);
        let state = declared.unwrap_or(record.state);
        debug!(
            deployment = %deployment,
            instance_group = %instance_group.name,
            index,
            declared = ?declared,
            stored = %record.state,
            state = %state,
            "Fetching existing instance"
        );

        let availability_zone = record
            .availability_zone
            .as_deref()
            .map(AvailabilityZone::from_stored);
        let mut instance = Instance::create_from_instance_group(
            instance_group,
            index,
            state,
            deployment,
            existing_state,
            availability_zone,
        )?;
        self.bind_record(&mut instance, record, deployment)?;
        Ok(instance)
    }

    /// Instance for a stored record whose slot the manifest dropped.
    ///
    /// Placement comes only from the record since there is no group to
    /// consult.
    pub fn fetch_obsolete_existing(
        &self,
        record: Option<&InstanceModel>,
        existing_state: Option<ExistingInstanceState>,
        deployment: &str,
    ) -> Result<Instance> {
        let record = record.ok_or_else(|| {
            PlanError::NotFound(format!(
                "no record for obsolete instance in deployment '{}'",
                deployment
            ))
        })?;
        debug!(
            deployment = %deployment,
            instance_group = %record.instance_group,
            index = record.index,
            "Fetching obsolete existing instance"
        );

        let vm_type = record.vm_type.clone().filter(|vm_type| !is_empty_vm_type(vm_type));

        // Records whose VM was never created carry no usable stemcell.
        let stemcell = match record.stemcell.as_ref() {
            Some(spec) if record.has_vm() && !spec.is_empty() => Some(
                Stemcell::parse(spec)?
                    .with_models(self.snapshot.stemcell_models(spec).to_vec())
                    .with_deployment(record.deployment.clone()),
            ),
            _ => None,
        };

        let availability_zone = record
            .availability_zone
            .as_deref()
            .map(AvailabilityZone::from_stored);
        let cloud_properties =
            MergedCloudProperties::merge(availability_zone.as_ref(), vm_type.as_ref(), &[]);

        let placement = Placement {
            availability_zone,
            vm_type,
            stemcell,
            cloud_properties,
            env: record.vm_env.clone(),
        };

        let mut instance = Instance::new(
            record.instance_group.clone(),
            record.index,
            record.state,
            placement,
            record.deployment.clone(),
            record.compilation,
            existing_state,
        );
        self.bind_record(&mut instance, record, deployment)?;
        Ok(instance)
    }

    /// Instance for a desired slot with no stored record. Always `started`.
    pub fn create(&self, desired: DesiredInstance<'_>, index: u32) -> Result<Instance> {
        debug!(
            deployment = %desired.deployment,
            instance_group = %desired.instance_group.name,
            index,
            az = ?desired.az.map(|az| az.name.as_str()),
            "Creating new desired instance"
        );

        let mut instance = Instance::create_from_instance_group(
            desired.instance_group,
            index,
            InstanceState::Started,
            desired.deployment,
            None,
            desired.az.cloned(),
        )?;
        instance.bind_new_instance_model()?;
        Ok(instance)
    }

    /// Reconcile every slot of the manifest against the snapshot.
    pub fn reconcile(&self, manifest: &DeploymentManifest) -> Result<Reconciliation> {
        let mut reconciliation = Reconciliation::default();
        let mut desired = Vec::new();

        for group in &manifest.instance_groups {
            for index in 0..group.instances {
                let instance = match self.snapshot.record(&group.name, index) {
                    Some(record) => self.fetch_existing(
                        Some(record),
                        self.snapshot.existing_state(record.id).cloned(),
                        group,
                        index,
                        &manifest.name,
                    )?,
                    None => {
                        let az = self.availability_zone_for(group, index)?;
                        self.create(
                            DesiredInstance {
                                instance_group: group,
                                deployment: &manifest.name,
                                az,
                            },
                            index,
                        )?
                    }
                };
                desired.push((group, instance));
            }
        }

        for record in self.snapshot.records() {
            let still_desired = manifest
                .instance_group(&record.instance_group)
                .is_some_and(|group| group.has_index(record.index));
            if still_desired {
                continue;
            }
            reconciliation.obsolete.push(self.fetch_obsolete_existing(
                Some(record),
                self.snapshot.existing_state(record.id).cloned(),
                &manifest.name,
            )?);
        }

        // Obsolete instances keep their addresses until they are torn down.
        let mut held: HashSet<IpAddr> = desired
            .iter()
            .map(|(_, instance)| instance)
            .chain(&reconciliation.obsolete)
            .flat_map(|instance| instance.reservations().iter())
            .filter_map(|reservation| reservation.address)
            .collect();

        for (group, instance) in desired {
            let network_demand =
                NetworkReservationMaterializer::network_demand(group, &instance, &mut held);
            reconciliation.desired.push(PlannedInstance {
                instance,
                network_demand,
            });
        }

        info!(
            deployment = %manifest.name,
            desired = reconciliation.desired.len(),
            obsolete = reconciliation.obsolete.len(),
            "Instances reconciled"
        );

        Ok(reconciliation)
    }

    fn bind_record(
        &self,
        instance: &mut Instance,
        record: &InstanceModel,
        deployment: &str,
    ) -> Result<()> {
        instance.bind_existing_instance_model(record.clone())?;
        let reservations = NetworkReservationMaterializer::create_from_persisted(
            record,
            self.snapshot.network_associations(record),
            deployment,
        );
        instance.bind_existing_reservations(reservations)
    }

    /// Zones are spread round-robin over the group's list by index.
    fn availability_zone_for(
        &self,
        group: &InstanceGroup,
        index: u32,
    ) -> Result<Option<&'a AvailabilityZone>> {
        if group.azs.is_empty() {
            return Ok(None);
        }

        let name = &group.azs[index as usize % group.azs.len()];
        self.snapshot
            .availability_zone(name)
            .map(Some)
            .ok_or_else(|| {
                PlanError::Configuration(format!(
                    "instance group '{}' references availability zone '{}' which is not defined in the cloud config",
                    group.name, name
                ))
            })
    }
}

fn is_empty_vm_type(vm_type: &VmType) -> bool {
    vm_type.name.is_empty() && vm_type.cloud_properties.is_empty()
}
