//! Desired deployment declarations.
//!
//! Manifests arrive here already parsed. Opt-outs and manual links are
//! explicit variants rather than sentinel strings, so the planner can match
//! on them exhaustively.

use crate::instance::{InstanceModel, InstanceState};
use crate::link::{LinkInstance, ManualLink};
use crate::placement::{Env, StemcellSpec, VmExtension, VmType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub name: String,
    #[serde(default)]
    pub instance_groups: Vec<InstanceGroup>,
    /// Release job specifications keyed by job name.
    #[serde(default)]
    pub job_specs: BTreeMap<String, JobSpecification>,
}

impl DeploymentManifest {
    pub fn instance_group(&self, name: &str) -> Option<&InstanceGroup> {
        self.instance_groups.iter().find(|ig| ig.name == name)
    }

    pub fn job_spec(&self, job_name: &str) -> Option<&JobSpecification> {
        self.job_specs.get(job_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDeclaration {
    pub name: String,
    #[serde(default)]
    pub static_ips: Vec<IpAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    pub instances: u32,
    #[serde(default)]
    pub azs: Vec<String>,
    #[serde(default)]
    pub jobs: Vec<JobDeclaration>,
    #[serde(default)]
    pub vm_type: Option<VmType>,
    #[serde(default)]
    pub vm_extensions: Vec<VmExtension>,
    #[serde(default)]
    pub stemcell: Option<StemcellSpec>,
    #[serde(default)]
    pub env: Env,
    #[serde(default)]
    pub networks: Vec<NetworkDeclaration>,
    /// Group-wide desired state.
    #[serde(default)]
    pub state: Option<InstanceState>,
    /// Per-instance desired states keyed by instance uuid or index.
    #[serde(default)]
    pub instance_states: BTreeMap<String, InstanceState>,
}

impl InstanceGroup {
    /// Desired state declared by the manifest for an existing record, if any.
    pub fn state_for_instance(&self, model: &InstanceModel) -> Option<InstanceState> {
        self.instance_states
            .get(&model.uuid)
            .or_else(|| self.instance_states.get(&model.index.to_string()))
            .copied()
            .or(self.state)
    }

    pub fn has_index(&self, index: u32) -> bool {
        index < self.instances
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDeclaration {
    pub name: String,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub provides: BTreeMap<String, ProvidesDeclaration>,
    #[serde(default)]
    pub consumes: BTreeMap<String, ConsumesDeclaration>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvideOptions {
    #[serde(rename = "as", default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub shared: bool,
}

/// Manifest override for a link the job provides.
///
/// `null` or the string `"nil"` in the manifest opts the provider out of
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Option<RawProvides>", into = "Option<ProvideOptions>")]
pub enum ProvidesDeclaration {
    Blocked,
    Provide(ProvideOptions),
}

/// Wire form of [`ProvidesDeclaration`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawProvides {
    Options(ProvideOptions),
    Marker(String),
}

impl TryFrom<Option<RawProvides>> for ProvidesDeclaration {
    type Error = String;

    fn try_from(raw: Option<RawProvides>) -> std::result::Result<Self, Self::Error> {
        match raw {
            None => Ok(ProvidesDeclaration::Blocked),
            Some(RawProvides::Marker(marker)) if marker == "nil" => {
                Ok(ProvidesDeclaration::Blocked)
            }
            Some(RawProvides::Marker(other)) => Err(format!(
                "expected provides options or 'nil', found '{other}'"
            )),
            Some(RawProvides::Options(options)) => Ok(ProvidesDeclaration::Provide(options)),
        }
    }
}

impl From<ProvidesDeclaration> for Option<ProvideOptions> {
    fn from(decl: ProvidesDeclaration) -> Self {
        match decl {
            ProvidesDeclaration::Blocked => None,
            ProvidesDeclaration::Provide(options) => Some(options),
        }
    }
}

/// Wire form of [`ConsumesDeclaration`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConsumes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<LinkInstance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Manifest override for a link the job consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Option<RawConsumes>", into = "Option<RawConsumes>")]
pub enum ConsumesDeclaration {
    Blocked,
    Explicit {
        from: Option<String>,
        deployment: Option<String>,
    },
    Manual(ManualLink),
}

impl TryFrom<Option<RawConsumes>> for ConsumesDeclaration {
    type Error = String;

    fn try_from(raw: Option<RawConsumes>) -> std::result::Result<Self, Self::Error> {
        let Some(raw) = raw else {
            return Ok(ConsumesDeclaration::Blocked);
        };

        let is_manual = raw.instances.is_some() || raw.properties.is_some() || raw.address.is_some();
        if is_manual {
            if raw.from.is_some() || raw.deployment.is_some() {
                return Err(
                    "a manual link cannot be combined with 'from' or 'deployment'".to_string(),
                );
            }
            return Ok(ConsumesDeclaration::Manual(ManualLink {
                instances: raw.instances.unwrap_or_default(),
                properties: raw.properties.unwrap_or_default(),
                address: raw.address,
            }));
        }

        Ok(ConsumesDeclaration::Explicit {
            from: raw.from,
            deployment: raw.deployment,
        })
    }
}

impl From<ConsumesDeclaration> for Option<RawConsumes> {
    fn from(decl: ConsumesDeclaration) -> Self {
        match decl {
            ConsumesDeclaration::Blocked => None,
            ConsumesDeclaration::Explicit { from, deployment } => Some(RawConsumes {
                from,
                deployment,
                ..RawConsumes::default()
            }),
            ConsumesDeclaration::Manual(manual) => Some(RawConsumes {
                instances: Some(manual.instances),
                properties: Some(manual.properties),
                address: manual.address,
                ..RawConsumes::default()
            }),
        }
    }
}

/// A release job's own description of the links it provides and consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpecification {
    pub name: String,
    #[serde(default)]
    pub provides: Vec<ProvidedLinkSpec>,
    #[serde(default)]
    pub consumes: Vec<ConsumedLinkSpec>,
}

impl JobSpecification {
    pub fn provided(&self, link_name: &str) -> Option<&ProvidedLinkSpec> {
        self.provides.iter().find(|p| p.name == link_name)
    }

    pub fn consumed(&self, link_name: &str) -> Option<&ConsumedLinkSpec> {
        self.consumes.iter().find(|c| c.name == link_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedLinkSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub link_type: String,
    /// Job properties exported through the link.
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedLinkSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub link_type: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub prefer_same_instance_group: bool,
}
