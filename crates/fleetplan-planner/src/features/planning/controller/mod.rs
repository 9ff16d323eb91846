use crate::features::planning::service::PlanningService;
use crate::shared::types::{DeploymentPlan, PlanDeploymentRequest};
use fleetplan_core::ErrorResponse;
use std::sync::Arc;
use tracing::{error, info};

/// Controller for deployment planning requests
pub struct PlanningController {
    service: Arc<PlanningService>,
}

impl PlanningController {
    pub fn new(service: Arc<PlanningService>) -> Self {
        Self { service }
    }

    /// Handle plan deployment request
    /// Thin wrapper that delegates to service
    pub async fn plan_deployment(
        &self,
        request: PlanDeploymentRequest,
    ) -> Result<DeploymentPlan, ErrorResponse> {
        let deployment = request.manifest.name.clone();
        info!(%deployment, "Received plan deployment request");

        self.service.plan(request).await.map_err(|e| {
            let response: ErrorResponse = e.into();
            error!(%deployment, error_code = %response.error_code, "Planning failed");
            response
        })
    }
}
