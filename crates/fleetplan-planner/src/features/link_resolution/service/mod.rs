//! Binds every consumer of a deployment to a provider or a literal link.
//!
//! Resolution runs over a complete [`ProviderCatalog`]: ambiguity and
//! opt-out only make sense when every candidate is visible. Failures are
//! collected for the whole deployment and reported together.

pub mod declarations;

use crate::features::link_resolution::repo::ProviderCatalog;
use fleetplan_core::{
    ConsumerSource, LinkConsumer, LinkError, LinkProvider, LinkResolutionErrors, LinkTarget,
    ResolvedLink,
};
use tracing::{debug, info, warn};

pub use declarations::{collect_links, LinkDeclarations};

pub struct LinkResolver<'a> {
    catalog: &'a ProviderCatalog,
}

impl<'a> LinkResolver<'a> {
    pub fn new(catalog: &'a ProviderCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve every consumer of `deployment`. `errors` carries failures
    /// already found while collecting declarations; they are reported
    /// alongside resolution failures.
    pub fn resolve_all(
        &self,
        deployment: &str,
        consumers: &[LinkConsumer],
        mut errors: Vec<LinkError>,
    ) -> Result<Vec<ResolvedLink>, LinkResolutionErrors> {
        let mut resolved = Vec::with_capacity(consumers.len());

        for consumer in consumers {
            match self.resolve(consumer) {
                Ok(link) => {
                    debug!(
                        deployment = %deployment,
                        instance_group = %consumer.instance_group,
                        job = %consumer.job,
                        link = %consumer.link_name,
                        absent = link.is_absent(),
                        "Resolved link"
                    );
                    resolved.push(link);
                }
                Err(err) => {
                    warn!(
                        deployment = %deployment,
                        instance_group = %consumer.instance_group,
                        job = %consumer.job,
                        link = %consumer.link_name,
                        error = %err,
                        "Failed to resolve link"
                    );
                    errors.push(err);
                }
            }
        }

        if !errors.is_empty() {
            return Err(LinkResolutionErrors {
                deployment: deployment.to_string(),
                errors,
            });
        }

        info!(deployment = %deployment, links = resolved.len(), "Links resolved");
        Ok(resolved)
    }

    pub fn resolve(&self, consumer: &LinkConsumer) -> Result<ResolvedLink, LinkError> {
        let target = match &consumer.source {
            ConsumerSource::Manual { link } => LinkTarget::Manual { link: link.clone() },
            ConsumerSource::Blocked => LinkTarget::Absent,
            ConsumerSource::Search { from, deployment } => {
                self.search(consumer, from.as_deref(), deployment.as_deref())?
            }
        };

        Ok(ResolvedLink {
            consumer: consumer.reference(),
            target,
        })
    }

    fn search(
        &self,
        consumer: &LinkConsumer,
        from: Option<&str>,
        deployment: Option<&str>,
    ) -> Result<LinkTarget, LinkError> {
        let target_deployment = deployment.unwrap_or(&consumer.deployment);
        let cross_deployment = target_deployment != consumer.deployment;
        let providers = self.catalog.providers(target_deployment).unwrap_or(&[]);

        // Opted-out providers are gone before anything is counted.
        let named: Vec<&LinkProvider> = providers
            .iter()
            .filter(|p| !p.opted_out)
            .filter(|p| from.map_or(true, |alias| p.alias_or_name() == alias))
            .collect();
        let visible: Vec<&LinkProvider> = named
            .iter()
            .copied()
            .filter(|p| !cross_deployment || p.shared)
            .collect();
        let mut candidates: Vec<&LinkProvider> = visible
            .iter()
            .copied()
            .filter(|p| p.link_type == consumer.link_type)
            .collect();

        if candidates.len() > 1 && consumer.prefer_same_instance_group && !cross_deployment {
            let local: Vec<&LinkProvider> = candidates
                .iter()
                .copied()
                .filter(|p| p.instance_group == consumer.instance_group)
                .collect();
            if !local.is_empty() {
                candidates = local;
            }
        }

        match candidates.as_slice() {
            [provider] => Ok(LinkTarget::Provider {
                provider: provider.reference(),
                payload: provider.payload(),
            }),
            [] => self.no_candidates(consumer, from, target_deployment, &named, &visible),
            many => Err(LinkError::Ambiguous {
                consumer: consumer.reference(),
                link_type: consumer.link_type.clone(),
                candidates: many.iter().map(|p| p.reference()).collect(),
            }),
        }
    }

    fn no_candidates(
        &self,
        consumer: &LinkConsumer,
        from: Option<&str>,
        target_deployment: &str,
        named: &[&LinkProvider],
        visible: &[&LinkProvider],
    ) -> Result<LinkTarget, LinkError> {
        let searched = consumer.searched_name().to_string();

        if from.is_some() && !visible.is_empty() {
            let mut found: Vec<String> = visible.iter().map(|p| p.link_type.clone()).collect();
            found.sort();
            found.dedup();
            return Err(LinkError::TypeMismatch {
                consumer: consumer.reference(),
                searched,
                expected: consumer.link_type.clone(),
                found,
            });
        }

        let hidden = target_deployment != consumer.deployment
            && named.iter().any(|p| p.link_type == consumer.link_type);
        if hidden {
            return Err(LinkError::CrossDeploymentVisibility {
                consumer: consumer.reference(),
                searched,
                target_deployment: target_deployment.to_string(),
            });
        }

        if consumer.optional && from.is_none() {
            return Ok(LinkTarget::Absent);
        }

        Err(LinkError::Unresolved {
            consumer: consumer.reference(),
            searched,
        })
    }
}
