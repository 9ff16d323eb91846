//! Link providers, consumers and the bindings between them.
//!
//! Every link failure message starts with the same context sentence naming
//! the link, job, instance group and deployment. Operators grep for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type LinkProperties = serde_json::Map<String, serde_json::Value>;

/// Instance entry in a link payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInstance {
    pub name: String,
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub az: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub bootstrap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    pub deployment: String,
    pub instance_group: String,
    pub job: String,
    pub link_name: String,
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "link '{}' from job '{}' in instance group '{}' in deployment '{}'",
            self.link_name, self.job, self.instance_group, self.deployment
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsumerRef {
    pub deployment: String,
    pub instance_group: String,
    pub job: String,
    pub link_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkProvider {
    pub deployment: String,
    pub instance_group: String,
    pub job: String,
    /// Name declared in the job specification.
    pub link_name: String,
    pub link_type: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub opted_out: bool,
    #[serde(default)]
    pub properties: LinkProperties,
    #[serde(default)]
    pub instances: Vec<LinkInstance>,
}

impl LinkProvider {
    /// The name consumers search for: the alias, or the declared link name.
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.link_name)
    }

    pub fn reference(&self) -> ProviderRef {
        ProviderRef {
            deployment: self.deployment.clone(),
            instance_group: self.instance_group.clone(),
            job: self.job.clone(),
            link_name: self.link_name.clone(),
        }
    }

    pub fn payload(&self) -> LinkPayload {
        LinkPayload {
            deployment: self.deployment.clone(),
            instance_group: self.instance_group.clone(),
            job: self.job.clone(),
            link_type: self.link_type.clone(),
            properties: self.properties.clone(),
            instances: self.instances.clone(),
        }
    }
}

/// Literal link content supplied in the manifest instead of a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualLink {
    #[serde(default)]
    pub instances: Vec<LinkInstance>,
    #[serde(default)]
    pub properties: LinkProperties,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConsumerSource {
    /// Search by type, optionally narrowed by alias and deployment.
    Search {
        from: Option<String>,
        deployment: Option<String>,
    },
    Manual { link: ManualLink },
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConsumer {
    pub deployment: String,
    pub instance_group: String,
    pub job: String,
    /// Name declared in the job specification.
    pub link_name: String,
    pub link_type: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub prefer_same_instance_group: bool,
    pub source: ConsumerSource,
}

impl LinkConsumer {
    pub fn reference(&self) -> ConsumerRef {
        ConsumerRef {
            deployment: self.deployment.clone(),
            instance_group: self.instance_group.clone(),
            job: self.job.clone(),
            link_name: self.link_name.clone(),
        }
    }

    /// Alias named by `from`, or the declared link name for implicit searches.
    pub fn searched_name(&self) -> &str {
        match &self.source {
            ConsumerSource::Search {
                from: Some(from), ..
            } => from,
            _ => &self.link_name,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(
            self.source,
            ConsumerSource::Search {
                from: None,
                deployment: None
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub deployment: String,
    pub instance_group: String,
    pub job: String,
    pub link_type: String,
    pub properties: LinkProperties,
    pub instances: Vec<LinkInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LinkTarget {
    Provider {
        provider: ProviderRef,
        payload: LinkPayload,
    },
    Manual {
        link: ManualLink,
    },
    /// Optional or blocked consumer with nothing bound.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLink {
    pub consumer: ConsumerRef,
    pub target: LinkTarget,
}

impl ResolvedLink {
    pub fn properties(&self) -> Option<&LinkProperties> {
        match &self.target {
            LinkTarget::Provider { payload, .. } => Some(&payload.properties),
            LinkTarget::Manual { link } => Some(&link.properties),
            LinkTarget::Absent => None,
        }
    }

    pub fn instances(&self) -> &[LinkInstance] {
        match &self.target {
            LinkTarget::Provider { payload, .. } => &payload.instances,
            LinkTarget::Manual { link } => &link.instances,
            LinkTarget::Absent => &[],
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.target, LinkTarget::Absent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    Provided,
    Consumed,
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDirection::Provided => f.write_str("provided"),
            LinkDirection::Consumed => f.write_str("consumed"),
        }
    }
}

struct CantResolve<'a> {
    consumer: &'a ConsumerRef,
    searched: &'a str,
}

impl fmt::Display for CantResolve<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Can't resolve link '{}' for job '{}' in instance group '{}' in deployment '{}'",
            self.searched, self.consumer.job, self.consumer.instance_group, self.consumer.deployment
        )
    }
}

fn cant_resolve<'a>(consumer: &'a ConsumerRef, searched: &'a str) -> CantResolve<'a> {
    CantResolve { consumer, searched }
}

fn ambiguous(consumer: &ConsumerRef, link_type: &str, candidates: &[ProviderRef]) -> String {
    let mut message = format!(
        "Multiple providers of type '{}' found for consumer link '{}' in job '{}' in instance group '{}' in deployment '{}'. All of these match:",
        link_type, consumer.link_name, consumer.job, consumer.instance_group, consumer.deployment
    );
    for candidate in candidates {
        message.push_str(&format!("\n     - {}", candidate));
    }
    message
}

fn undeclared(link: &ConsumerRef, direction: &LinkDirection) -> String {
    format!(
        "Job '{}' in instance group '{}' in deployment '{}' does not define link '{}' as {} in its specification",
        link.job, link.instance_group, link.deployment, link.link_name, direction
    )
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("{}", cant_resolve(.consumer, .searched))]
    Unresolved {
        consumer: ConsumerRef,
        searched: String,
    },

    #[error("{}", ambiguous(.consumer, .link_type, .candidates))]
    Ambiguous {
        consumer: ConsumerRef,
        link_type: String,
        candidates: Vec<ProviderRef>,
    },

    #[error(
        "{}: expected link type '{expected}' but provider '{searched}' has type '{}'",
        cant_resolve(.consumer, .searched), .found.join("', '")
    )]
    TypeMismatch {
        consumer: ConsumerRef,
        searched: String,
        expected: String,
        found: Vec<String>,
    },

    #[error(
        "{}: provider in deployment '{target_deployment}' is not shared",
        cant_resolve(.consumer, .searched)
    )]
    CrossDeploymentVisibility {
        consumer: ConsumerRef,
        searched: String,
        target_deployment: String,
    },

    #[error("{}", undeclared(.link, .direction))]
    Undeclared {
        link: ConsumerRef,
        direction: LinkDirection,
    },
}

impl LinkError {
    pub fn error_code(&self) -> &'static str {
        match self {
            LinkError::Unresolved { .. } => "UNRESOLVED_LINK",
            LinkError::Ambiguous { .. } => "AMBIGUOUS_LINK",
            LinkError::TypeMismatch { .. } => "TYPE_MISMATCH",
            LinkError::CrossDeploymentVisibility { .. } => "CROSS_DEPLOYMENT_VISIBILITY",
            LinkError::Undeclared { .. } => "UNDECLARED_LINK",
        }
    }
}

/// Every link failure found in one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkResolutionErrors {
    pub deployment: String,
    pub errors: Vec<LinkError>,
}

impl fmt::Display for LinkResolutionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to resolve links from deployment '{}'. See errors below:",
            self.deployment
        )?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for LinkResolutionErrors {}
