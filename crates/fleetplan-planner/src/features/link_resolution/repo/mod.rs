use fleetplan_core::LinkProvider;
use std::collections::BTreeMap;

/// Read-only view of every provider visible during one resolution pass,
/// keyed by owning deployment
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    deployments: BTreeMap<String, Vec<LinkProvider>>,
}

impl ProviderCatalog {
    /// Catalog with the deployment being planned plus the stored providers
    /// of the deployments it references. The planned deployment's own
    /// entry always comes from `own`, never from storage.
    pub fn new(
        deployment: &str,
        own: Vec<LinkProvider>,
        foreign: &BTreeMap<String, Vec<LinkProvider>>,
    ) -> Self {
        let mut deployments: BTreeMap<String, Vec<LinkProvider>> = foreign
            .iter()
            .filter(|(name, _)| name.as_str() != deployment)
            .map(|(name, providers)| (name.clone(), providers.clone()))
            .collect();
        deployments.insert(deployment.to_string(), own);
        Self { deployments }
    }

    pub fn providers(&self, deployment: &str) -> Option<&[LinkProvider]> {
        self.deployments.get(deployment).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::LinkProperties;

    fn provider(deployment: &str, job: &str) -> LinkProvider {
        LinkProvider {
            deployment: deployment.to_string(),
            instance_group: "db".to_string(),
            job: job.to_string(),
            link_name: "db".to_string(),
            link_type: "db".to_string(),
            alias: None,
            shared: true,
            opted_out: false,
            properties: LinkProperties::new(),
            instances: vec![],
        }
    }

    #[test]
    fn test_own_deployment_ignores_stored_copy() {
        let mut foreign = BTreeMap::new();
        foreign.insert("simple".to_string(), vec![provider("simple", "stale")]);
        foreign.insert("other".to_string(), vec![provider("other", "postgres")]);

        let catalog = ProviderCatalog::new("simple", vec![provider("simple", "fresh")], &foreign);

        let own = catalog.providers("simple").unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].job, "fresh");
        assert_eq!(catalog.providers("other").unwrap()[0].job, "postgres");
        assert!(catalog.providers("missing").is_none());
    }
}
