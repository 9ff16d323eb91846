//! Placement value objects for an instance.
//!
//! Availability zones, VM types, VM extensions and stemcells are read-only
//! values. The only behaviour here is merging their cloud properties in a
//! fixed order: availability zone, VM type, then each VM extension.

use crate::{PlanError, Result};
use serde::{Deserialize, Serialize};

pub type CloudProperties = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityZone {
    pub name: String,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

impl AvailabilityZone {
    pub fn new(name: impl Into<String>, cloud_properties: CloudProperties) -> Self {
        Self {
            name: name.into(),
            cloud_properties,
        }
    }

    /// Zone rebuilt from a name stored on a persisted record. The catalog is
    /// not consulted because it may have changed since the instance was created.
    pub fn from_stored(name: impl Into<String>) -> Self {
        Self::new(name, CloudProperties::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmType {
    pub name: String,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmExtension {
    pub name: String,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// Stemcell reference as written in a manifest or stored on a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StemcellSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    pub version: String,
}

impl StemcellSpec {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.os.is_none() && self.version.is_empty()
    }
}

/// Uploaded stemcell known to the persisted-state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellModel {
    pub name: String,
    pub os: String,
    pub version: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stemcell {
    pub name: Option<String>,
    pub os: Option<String>,
    pub version: String,
    pub deployment: Option<String>,
    pub models: Vec<StemcellModel>,
}

impl Stemcell {
    pub fn parse(spec: &StemcellSpec) -> Result<Self> {
        if spec.name.is_none() && spec.os.is_none() {
            return Err(PlanError::Configuration(
                "stemcell must specify either 'name' or 'os'".to_string(),
            ));
        }
        if spec.version.is_empty() {
            return Err(PlanError::Configuration(
                "stemcell must specify 'version'".to_string(),
            ));
        }

        Ok(Self {
            name: spec.name.clone(),
            os: spec.os.clone(),
            version: spec.version.clone(),
            deployment: None,
            models: Vec::new(),
        })
    }

    pub fn with_models(mut self, models: Vec<StemcellModel>) -> Self {
        self.models = models;
        self
    }

    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Env(pub CloudProperties);

impl Env {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedCloudProperties(CloudProperties);

impl MergedCloudProperties {
    pub fn merge(
        availability_zone: Option<&AvailabilityZone>,
        vm_type: Option<&VmType>,
        vm_extensions: &[VmExtension],
    ) -> Self {
        let mut merged = CloudProperties::new();

        if let Some(az) = availability_zone {
            merged.extend(az.cloud_properties.clone());
        }
        if let Some(vm_type) = vm_type {
            merged.extend(vm_type.cloud_properties.clone());
        }
        for extension in vm_extensions {
            merged.extend(extension.cloud_properties.clone());
        }

        Self(merged)
    }

    pub fn get(&self) -> &CloudProperties {
        &self.0
    }
}

/// Everything about where and on what an instance runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub availability_zone: Option<AvailabilityZone>,
    pub vm_type: Option<VmType>,
    pub stemcell: Option<Stemcell>,
    pub cloud_properties: MergedCloudProperties,
    pub env: Env,
}

impl Placement {
    pub fn az_name(&self) -> Option<&str> {
        self.availability_zone.as_ref().map(|az| az.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> CloudProperties {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_merge_order_later_sources_win() {
        let az = AvailabilityZone::new("z1", props(json!({"zone": "us-east-1a", "disk": 10})));
        let vm_type = VmType {
            name: "small".to_string(),
            cloud_properties: props(json!({"instance_type": "m1.small", "disk": 20})),
        };
        let extensions = vec![VmExtension {
            name: "lb".to_string(),
            cloud_properties: props(json!({"elbs": ["web"], "disk": 30})),
        }];

        let merged = MergedCloudProperties::merge(Some(&az), Some(&vm_type), &extensions);

        assert_eq!(merged.get().get("zone"), Some(&json!("us-east-1a")));
        assert_eq!(merged.get().get("instance_type"), Some(&json!("m1.small")));
        assert_eq!(merged.get().get("elbs"), Some(&json!(["web"])));
        assert_eq!(merged.get().get("disk"), Some(&json!(30)));
    }

    #[test]
    fn test_merge_without_sources_is_empty() {
        let merged = MergedCloudProperties::merge(None, None, &[]);
        assert!(merged.get().is_empty());
    }

    #[test]
    fn test_stored_zone_has_no_cloud_properties() {
        let az = AvailabilityZone::from_stored("z2");
        assert_eq!(az.name, "z2");
        assert!(az.cloud_properties.is_empty());
    }

    #[test]
    fn test_stemcell_parse_requires_name_or_os() {
        let spec = StemcellSpec {
            name: None,
            os: None,
            version: "3586.1".to_string(),
        };
        assert!(matches!(
            Stemcell::parse(&spec),
            Err(PlanError::Configuration(_))
        ));
    }

    #[test]
    fn test_stemcell_parse_requires_version() {
        let spec = StemcellSpec {
            name: Some("ubuntu-trusty".to_string()),
            os: None,
            version: String::new(),
        };
        assert!(Stemcell::parse(&spec).is_err());
    }

    #[test]
    fn test_stemcell_parse_by_os() {
        let spec = StemcellSpec {
            name: None,
            os: Some("ubuntu-jammy".to_string()),
            version: "1.200".to_string(),
        };
        let stemcell = Stemcell::parse(&spec).unwrap().with_deployment("dep");
        assert_eq!(stemcell.os.as_deref(), Some("ubuntu-jammy"));
        assert_eq!(stemcell.deployment.as_deref(), Some("dep"));
        assert_eq!(stemcell.version, "1.200");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn layer() -> impl Strategy<Value = CloudProperties> {
            prop::collection::btree_map("[a-d]", 0u32..10, 0..4).prop_map(|entries| {
                entries
                    .into_iter()
                    .map(|(key, value)| (key, json!(value)))
                    .collect()
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn property_merge_takes_each_key_from_last_source(
                az_props in layer(),
                vm_props in layer(),
                ext_props in layer(),
            ) {
                let az = AvailabilityZone::new("z1", az_props.clone());
                let vm_type = VmType {
                    name: "small".to_string(),
                    cloud_properties: vm_props.clone(),
                };
                let extension = VmExtension {
                    name: "ext".to_string(),
                    cloud_properties: ext_props.clone(),
                };

                let merged = MergedCloudProperties::merge(Some(&az), Some(&vm_type), &[extension]);

                for (key, value) in merged.get() {
                    let expected = ext_props
                        .get(key)
                        .or_else(|| vm_props.get(key))
                        .or_else(|| az_props.get(key));
                    prop_assert_eq!(Some(value), expected);
                }
                let total = az_props
                    .keys()
                    .chain(vm_props.keys())
                    .chain(ext_props.keys())
                    .collect::<std::collections::BTreeSet<_>>()
                    .len();
                prop_assert_eq!(merged.get().len(), total);
            }
        }
    }
}
