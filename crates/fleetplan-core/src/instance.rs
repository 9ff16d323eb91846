//! The in-memory instance entity produced by reconciliation.
//!
//! An instance is created once per planning pass and only mutated through
//! its binding operations during that pass. Fields are private so
//! downstream consumers see it read-only.

use crate::manifest::InstanceGroup;
use crate::network::InstanceNetworkReservations;
use crate::placement::{
    AvailabilityZone, Env, MergedCloudProperties, Placement, StemcellSpec, VmType,
};
use crate::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Started,
    Stopped,
    Detached,
    Recreate,
    Restart,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Started => "started",
            InstanceState::Stopped => "stopped",
            InstanceState::Detached => "detached",
            InstanceState::Recreate => "recreate",
            InstanceState::Restart => "restart",
        };
        f.write_str(name)
    }
}

/// Persisted record of an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceModel {
    pub id: u64,
    pub uuid: String,
    pub deployment: String,
    pub instance_group: String,
    pub index: u32,
    pub state: InstanceState,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub vm_type: Option<VmType>,
    #[serde(default)]
    pub stemcell: Option<StemcellSpec>,
    #[serde(default)]
    pub vm_env: Env,
    #[serde(default)]
    pub compilation: bool,
    /// Cloud ids of VMs actually created for this record.
    #[serde(default)]
    pub vm_cids: Vec<String>,
}

impl InstanceModel {
    pub fn has_vm(&self) -> bool {
        !self.vm_cids.is_empty()
    }
}

/// Snapshot of what the agent last reported for an existing instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExistingInstanceState {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub vm_cid: Option<String>,
    #[serde(default)]
    pub job_state: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InstanceBinding {
    Unbound,
    Existing { model: Box<InstanceModel> },
    /// Marked for a new record; the persistence collaborator creates it.
    PendingNew { uuid: Uuid },
}

/// A desired instance with no persisted counterpart yet.
#[derive(Debug, Clone, Copy)]
pub struct DesiredInstance<'a> {
    pub instance_group: &'a InstanceGroup,
    pub deployment: &'a str,
    pub az: Option<&'a AvailabilityZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    instance_group: String,
    index: u32,
    state: InstanceState,
    placement: Placement,
    deployment: String,
    compilation: bool,
    existing_state: Option<ExistingInstanceState>,
    binding: InstanceBinding,
    reservations: InstanceNetworkReservations,
}

impl Instance {
    pub fn new(
        instance_group: impl Into<String>,
        index: u32,
        state: InstanceState,
        placement: Placement,
        deployment: impl Into<String>,
        compilation: bool,
        existing_state: Option<ExistingInstanceState>,
    ) -> Self {
        Self {
            instance_group: instance_group.into(),
            index,
            state,
            placement,
            deployment: deployment.into(),
            compilation,
            existing_state,
            binding: InstanceBinding::Unbound,
            reservations: InstanceNetworkReservations::new(),
        }
    }

    /// Build an instance whose placement comes from its instance group.
    ///
    /// The stemcell is parsed from the group declaration; models are attached
    /// later by the caller if needed.
    pub fn create_from_instance_group(
        instance_group: &InstanceGroup,
        index: u32,
        state: InstanceState,
        deployment: &str,
        existing_state: Option<ExistingInstanceState>,
        availability_zone: Option<AvailabilityZone>,
    ) -> Result<Self> {
        let stemcell = instance_group
            .stemcell
            .as_ref()
            .map(crate::placement::Stemcell::parse)
            .transpose()?;

        let cloud_properties = MergedCloudProperties::merge(
            availability_zone.as_ref(),
            instance_group.vm_type.as_ref(),
            &instance_group.vm_extensions,
        );

        let placement = Placement {
            availability_zone,
            vm_type: instance_group.vm_type.clone(),
            stemcell,
            cloud_properties,
            env: instance_group.env.clone(),
        };

        Ok(Self::new(
            instance_group.name.clone(),
            index,
            state,
            placement,
            deployment,
            false,
            existing_state,
        ))
    }

    pub fn bind_existing_instance_model(&mut self, model: InstanceModel) -> Result<()> {
        if !matches!(self.binding, InstanceBinding::Unbound) {
            return Err(PlanError::AlreadyBound(self.to_string()));
        }
        if model.instance_group != self.instance_group || model.index != self.index {
            return Err(PlanError::Configuration(format!(
                "record {}/{} cannot be bound to instance {}",
                model.instance_group, model.index, self
            )));
        }

        self.binding = InstanceBinding::Existing {
            model: Box::new(model),
        };
        Ok(())
    }

    /// Attach reservations rehydrated from the bound record.
    pub fn bind_existing_reservations(
        &mut self,
        reservations: InstanceNetworkReservations,
    ) -> Result<()> {
        let model_id = match &self.binding {
            InstanceBinding::Existing { model } => model.id,
            _ => {
                return Err(PlanError::Configuration(format!(
                    "instance {} has no persisted record to take reservations from",
                    self
                )))
            }
        };

        let foreign = reservations.record_id().is_some_and(|id| id != model_id)
            || reservations
                .iter()
                .any(|r| r.instance_record_id.is_some_and(|id| id != model_id));
        if foreign {
            return Err(PlanError::Configuration(format!(
                "reservations for instance {} were not derived from record {}",
                self, model_id
            )));
        }

        self.reservations = reservations;
        Ok(())
    }

    pub fn bind_new_instance_model(&mut self) -> Result<Uuid> {
        if !matches!(self.binding, InstanceBinding::Unbound) {
            return Err(PlanError::AlreadyBound(self.to_string()));
        }

        let uuid = Uuid::new_v4();
        self.binding = InstanceBinding::PendingNew { uuid };
        Ok(uuid)
    }

    pub fn instance_group(&self) -> &str {
        &self.instance_group
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn compilation(&self) -> bool {
        self.compilation
    }

    pub fn existing_state(&self) -> Option<&ExistingInstanceState> {
        self.existing_state.as_ref()
    }

    pub fn binding(&self) -> &InstanceBinding {
        &self.binding
    }

    pub fn model(&self) -> Option<&InstanceModel> {
        match &self.binding {
            InstanceBinding::Existing { model } => Some(model),
            _ => None,
        }
    }

    pub fn uuid(&self) -> Option<String> {
        match &self.binding {
            InstanceBinding::Unbound => None,
            InstanceBinding::Existing { model } => Some(model.uuid.clone()),
            InstanceBinding::PendingNew { uuid } => Some(uuid.to_string()),
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.binding, InstanceBinding::Unbound)
    }

    pub fn reservations(&self) -> &InstanceNetworkReservations {
        &self.reservations
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uuid() {
            Some(uuid) => write!(f, "{}/{} ({})", self.instance_group, uuid, self.index),
            None => write!(f, "{}/{}", self.instance_group, self.index),
        }
    }
}
