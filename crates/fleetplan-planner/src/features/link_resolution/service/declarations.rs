//! Providers and consumers declared by one deployment's jobs.
//!
//! A job only provides and consumes what its own specification lists. The
//! manifest can rename, share, block or override those links but never add
//! new ones, and co-located jobs never see each other's links implicitly.

use crate::shared::types::PlannedInstance;
use fleetplan_core::{
    ConsumedLinkSpec, ConsumerRef, ConsumerSource, ConsumesDeclaration, DeploymentManifest,
    InstanceGroup, JobDeclaration, JobSpecification, LinkConsumer, LinkDirection, LinkError,
    LinkInstance, LinkProperties, LinkProvider, ProvidedLinkSpec, ProvidesDeclaration,
};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LinkDeclarations {
    pub providers: Vec<LinkProvider>,
    pub consumers: Vec<LinkConsumer>,
    /// Manifest entries naming links the job specification does not declare.
    pub errors: Vec<LinkError>,
}

pub fn collect_links(manifest: &DeploymentManifest, instances: &[PlannedInstance]) -> LinkDeclarations {
    let mut declarations = LinkDeclarations::default();

    for group in &manifest.instance_groups {
        let group_instances = link_instances(group, instances);

        for job in &group.jobs {
            let spec = manifest.job_spec(&job.name);
            collect_undeclared(manifest, group, job, spec, &mut declarations.errors);

            let Some(spec) = spec else {
                debug!(
                    deployment = %manifest.name,
                    instance_group = %group.name,
                    job = %job.name,
                    "Job has no specification, it neither provides nor consumes links"
                );
                continue;
            };

            for provided in &spec.provides {
                declarations.providers.push(provider(
                    &manifest.name,
                    group,
                    job,
                    provided,
                    &group_instances,
                ));
            }
            for consumed in &spec.consumes {
                declarations
                    .consumers
                    .push(consumer(&manifest.name, group, job, consumed));
            }
        }
    }

    debug!(
        deployment = %manifest.name,
        providers = declarations.providers.len(),
        consumers = declarations.consumers.len(),
        "Collected link declarations"
    );

    declarations
}

fn collect_undeclared(
    manifest: &DeploymentManifest,
    group: &InstanceGroup,
    job: &JobDeclaration,
    spec: Option<&JobSpecification>,
    errors: &mut Vec<LinkError>,
) {
    let undeclared = |link_name: &str, direction: LinkDirection| LinkError::Undeclared {
        link: ConsumerRef {
            deployment: manifest.name.clone(),
            instance_group: group.name.clone(),
            job: job.name.clone(),
            link_name: link_name.to_string(),
        },
        direction,
    };

    for name in job.provides.keys() {
        if spec.and_then(|s| s.provided(name)).is_none() {
            errors.push(undeclared(name, LinkDirection::Provided));
        }
    }
    for name in job.consumes.keys() {
        if spec.and_then(|s| s.consumed(name)).is_none() {
            errors.push(undeclared(name, LinkDirection::Consumed));
        }
    }
}

fn provider(
    deployment: &str,
    group: &InstanceGroup,
    job: &JobDeclaration,
    provided: &ProvidedLinkSpec,
    instances: &[LinkInstance],
) -> LinkProvider {
    let (alias, shared, opted_out) = match job.provides.get(&provided.name) {
        Some(ProvidesDeclaration::Blocked) => (None, false, true),
        Some(ProvidesDeclaration::Provide(options)) => {
            (options.alias.clone(), options.shared, false)
        }
        None => (None, false, false),
    };

    let mut properties = LinkProperties::new();
    for path in &provided.properties {
        copy_property(&job.properties, path, &mut properties);
    }

    LinkProvider {
        deployment: deployment.to_string(),
        instance_group: group.name.clone(),
        job: job.name.clone(),
        link_name: provided.name.clone(),
        link_type: provided.link_type.clone(),
        alias,
        shared,
        opted_out,
        properties,
        instances: instances.to_vec(),
    }
}

fn consumer(
    deployment: &str,
    group: &InstanceGroup,
    job: &JobDeclaration,
    consumed: &ConsumedLinkSpec,
) -> LinkConsumer {
    let source = match job.consumes.get(&consumed.name) {
        None => ConsumerSource::Search {
            from: None,
            deployment: None,
        },
        Some(ConsumesDeclaration::Explicit { from, deployment }) => ConsumerSource::Search {
            from: from.clone(),
            deployment: deployment.clone(),
        },
        Some(ConsumesDeclaration::Manual(link)) => ConsumerSource::Manual { link: link.clone() },
        Some(ConsumesDeclaration::Blocked) => ConsumerSource::Blocked,
    };

    LinkConsumer {
        deployment: deployment.to_string(),
        instance_group: group.name.clone(),
        job: job.name.clone(),
        link_name: consumed.name.clone(),
        link_type: consumed.link_type.clone(),
        optional: consumed.optional,
        prefer_same_instance_group: consumed.prefer_same_instance_group,
        source,
    }
}

/// Instance snapshot published with every link the group provides.
///
/// A new instance has no fulfilled reservation yet, so its address falls
/// back to the static address it was assigned in network demand.
fn link_instances(group: &InstanceGroup, instances: &[PlannedInstance]) -> Vec<LinkInstance> {
    let mut members: Vec<_> = instances
        .iter()
        .filter(|planned| planned.instance.instance_group() == group.name)
        .collect();
    members.sort_by_key(|planned| planned.instance.index());

    members
        .iter()
        .enumerate()
        .map(|(position, planned)| {
            let instance = &planned.instance;
            let address = instance.reservations().primary_address().or_else(|| {
                planned
                    .network_demand
                    .iter()
                    .find_map(|reservation| reservation.address)
            });
            LinkInstance {
                name: group.name.clone(),
                index: instance.index(),
                id: instance.uuid(),
                az: instance.placement().az_name().map(ToString::to_string),
                address: address.map(|address| address.to_string()),
                bootstrap: position == 0,
            }
        })
        .collect()
}

/// Copy a dotted property path, keeping its nesting in the destination.
fn copy_property(source: &LinkProperties, path: &str, target: &mut LinkProperties) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = source;
    for segment in parents {
        match current.get(*segment) {
            Some(Value::Object(next)) => current = next,
            _ => return,
        }
    }
    let Some(value) = current.get(*last) else {
        return;
    };

    let mut slot = target;
    for segment in parents {
        let entry = slot
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(LinkProperties::new()));
        if !entry.is_object() {
            *entry = Value::Object(LinkProperties::new());
        }
        match entry {
            Value::Object(next) => slot = next,
            _ => return,
        }
    }
    slot.insert(last.to_string(), value.clone());
}
