pub use fleetplan_core::{
    DeploymentManifest, Instance, InstanceState, LinkProvider, LinkTarget, NetworkReservation,
    ResolvedLink,
};

use serde::Serialize;
use std::fmt;

/// Request to plan one deployment apply
#[derive(Debug, Clone)]
pub struct PlanDeploymentRequest {
    pub manifest: DeploymentManifest,
}

/// A desired instance together with the network capacity it still needs
#[derive(Debug, Clone, Serialize)]
pub struct PlannedInstance {
    pub instance: Instance,
    /// Reservations the allocation collaborator has to fulfil.
    pub network_demand: Vec<NetworkReservation>,
}

/// Output of one planning pass, handed to rendering and convergence
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    pub deployment: String,
    pub instances: Vec<PlannedInstance>,
    pub obsolete: Vec<Instance>,
    /// Providers this deployment publishes once applied.
    pub providers: Vec<LinkProvider>,
    pub links: Vec<ResolvedLink>,
}

impl DeploymentPlan {
    pub fn instance(&self, instance_group: &str, index: u32) -> Option<&Instance> {
        self.instances
            .iter()
            .map(|planned| &planned.instance)
            .find(|i| i.instance_group() == instance_group && i.index() == index)
    }

    /// Links consumed by one job, in resolution order.
    pub fn links_for_job<'a>(
        &'a self,
        instance_group: &'a str,
        job: &'a str,
    ) -> impl Iterator<Item = &'a ResolvedLink> + 'a {
        self.links.iter().filter(move |link| {
            link.consumer.instance_group == instance_group && link.consumer.job == job
        })
    }
}

/// Operator-facing summary of the plan.
impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment '{}'", self.deployment)?;

        writeln!(f, "Instances ({}):", self.instances.len())?;
        for planned in &self.instances {
            let instance = &planned.instance;
            writeln!(
                f,
                "  {} state={} az={} pending_networks={}",
                instance,
                instance.state(),
                instance.placement().az_name().unwrap_or("-"),
                planned.network_demand.len()
            )?;
        }

        if !self.obsolete.is_empty() {
            writeln!(f, "Obsolete ({}):", self.obsolete.len())?;
            for instance in &self.obsolete {
                writeln!(f, "  {}", instance)?;
            }
        }

        writeln!(f, "Links ({}):", self.links.len())?;
        for link in &self.links {
            write!(
                f,
                "  {}/{}.{} -> ",
                link.consumer.instance_group, link.consumer.job, link.consumer.link_name
            )?;
            match &link.target {
                LinkTarget::Provider { provider, .. } => writeln!(f, "{}", provider)?,
                LinkTarget::Manual { .. } => writeln!(f, "manual link")?,
                LinkTarget::Absent => writeln!(f, "nothing")?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::ConsumerRef;

    #[test]
    fn test_display_lists_links_and_skips_empty_obsolete() {
        let plan = DeploymentPlan {
            deployment: "simple".to_string(),
            instances: vec![],
            obsolete: vec![],
            providers: vec![],
            links: vec![ResolvedLink {
                consumer: ConsumerRef {
                    deployment: "simple".to_string(),
                    instance_group: "api_ig".to_string(),
                    job: "api_server".to_string(),
                    link_name: "backup_db".to_string(),
                },
                target: LinkTarget::Absent,
            }],
        };

        assert_eq!(
            plan.to_string(),
            "Deployment 'simple'\nInstances (0):\nLinks (1):\n  api_ig/api_server.backup_db -> nothing\n"
        );
    }
}
