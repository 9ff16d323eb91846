//! Link lookups as seen from a job's templates, and the render report.
//!
//! Templates are rendered elsewhere. This module gives the renderer a view
//! of the links one job consumes and formats its failures the way operators
//! expect to read them.

use crate::shared::types::DeploymentPlan;
use fleetplan_core::ResolvedLink;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Can't find link '{0}'")]
pub struct MissingLinkError(pub String);

/// Links consumed by one job of one instance group
#[derive(Debug, Clone)]
pub struct JobLinks<'a> {
    deployment: &'a str,
    instance_group: &'a str,
    job: &'a str,
    links: Vec<&'a ResolvedLink>,
}

impl<'a> JobLinks<'a> {
    pub fn for_job(plan: &'a DeploymentPlan, instance_group: &'a str, job: &'a str) -> Self {
        Self {
            deployment: &plan.deployment,
            instance_group,
            job,
            links: plan.links_for_job(instance_group, job).collect(),
        }
    }

    pub fn deployment(&self) -> &str {
        self.deployment
    }

    pub fn instance_group(&self) -> &str {
        self.instance_group
    }

    pub fn job(&self) -> &str {
        self.job
    }

    /// The link a template asks for by its declared name. Only links the
    /// job's own specification consumes are reachable.
    pub fn link(&self, name: &str) -> Result<&'a ResolvedLink, MissingLinkError> {
        self.links
            .iter()
            .copied()
            .find(|link| link.consumer.link_name == name)
            .ok_or_else(|| MissingLinkError(name.to_string()))
    }

    /// Whether the link is declared and bound to something.
    pub fn has_link(&self, name: &str) -> bool {
        self.link(name).is_ok_and(|link| !link.is_absent())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error filling in template '{file}' (line {line}: {source})")]
pub struct TemplateError {
    pub file: String,
    pub line: u32,
    pub source: MissingLinkError,
}

/// Every template failure of one render pass, grouped by instance group and
/// job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderErrors {
    instance_groups: BTreeMap<String, BTreeMap<String, Vec<TemplateError>>>,
}

impl RenderErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, instance_group: &str, job: &str, error: TemplateError) {
        self.instance_groups
            .entry(instance_group.to_string())
            .or_default()
            .entry(job.to_string())
            .or_default()
            .push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.instance_groups.is_empty()
    }

    pub fn into_result(self) -> Result<(), RenderErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for RenderErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to render instance groups for deployment. Errors are:")?;
        for (instance_group, jobs) in &self.instance_groups {
            write!(
                f,
                "\n  - Unable to render jobs for instance group '{}'. Errors are:",
                instance_group
            )?;
            for (job, errors) in jobs {
                write!(
                    f,
                    "\n    - Unable to render templates for job '{}'. Errors are:",
                    job
                )?;
                for error in errors {
                    write!(f, "\n      - {}", error)?;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for RenderErrors {}
