use crate::features::instance_reconciler::service::InstanceReconciler;
use crate::features::link_resolution::repo::ProviderCatalog;
use crate::features::link_resolution::service::{collect_links, LinkResolver};
use crate::features::state_store::repo::PersistedStateStore;
use crate::features::state_store::service::StateSnapshot;
use crate::shared::error::{PlannerError, PlannerResult};
use crate::shared::types::{DeploymentPlan, PlanDeploymentRequest};
use std::sync::Arc;
use tracing::info;

/// Service running one planning pass for a deployment
pub struct PlanningService {
    store: Arc<dyn PersistedStateStore>,
}

impl PlanningService {
    pub fn new(store: Arc<dyn PersistedStateStore>) -> Self {
        Self { store }
    }

    fn validate_request(request: &PlanDeploymentRequest) -> PlannerResult<()> {
        let manifest = &request.manifest;
        if manifest.name.trim().is_empty() {
            return Err(PlannerError::InvalidInput(
                "Deployment name cannot be empty".to_string(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for group in &manifest.instance_groups {
            if !seen.insert(group.name.as_str()) {
                return Err(PlannerError::InvalidInput(format!(
                    "Instance group '{}' is declared more than once",
                    group.name
                )));
            }
        }

        Ok(())
    }

    /// Snapshot, reconcile, collect links, resolve.
    ///
    /// Every read happens while loading the snapshot. The rest of the pass is
    /// synchronous.
    pub async fn plan(&self, request: PlanDeploymentRequest) -> PlannerResult<DeploymentPlan> {
        Self::validate_request(&request)?;
        let manifest = request.manifest;

        let snapshot = StateSnapshot::load(self.store.as_ref(), &manifest).await?;

        let reconciliation = InstanceReconciler::new(&snapshot).reconcile(&manifest)?;

        let declarations = collect_links(&manifest, &reconciliation.desired);
        let catalog = ProviderCatalog::new(
            &manifest.name,
            declarations.providers.clone(),
            snapshot.foreign_providers(),
        );
        let links = LinkResolver::new(&catalog).resolve_all(
            &manifest.name,
            &declarations.consumers,
            declarations.errors,
        )?;

        info!(
            deployment = %manifest.name,
            instances = reconciliation.desired.len(),
            obsolete = reconciliation.obsolete.len(),
            links = links.len(),
            "Deployment planned"
        );

        Ok(DeploymentPlan {
            deployment: manifest.name,
            instances: reconciliation.desired,
            obsolete: reconciliation.obsolete,
            providers: declarations.providers,
            links,
        })
    }
}
