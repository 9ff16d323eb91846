pub mod config;
pub mod features;
pub mod shared;

use crate::features::planning::controller::PlanningController;
use crate::features::planning::service::PlanningService;
use crate::features::state_store::repo::{InMemoryStateStore, PersistedState};
use fleetplan_core::{DeploymentManifest, ErrorResponse};
use std::sync::Arc;

pub use crate::shared::error::{PlannerError, PlannerResult};
pub use crate::shared::types::{DeploymentPlan, PlanDeploymentRequest, PlannedInstance};

/// Planner wired to an in-memory store seeded from a state file
pub struct Planner {
    controller: PlanningController,
}

impl Planner {
    pub fn from_state(state: PersistedState) -> Self {
        let store = Arc::new(InMemoryStateStore::from_state(state));
        let service = Arc::new(PlanningService::new(store));
        Self {
            controller: PlanningController::new(service),
        }
    }

    pub async fn plan(&self, manifest: DeploymentManifest) -> Result<DeploymentPlan, ErrorResponse> {
        self.controller
            .plan_deployment(PlanDeploymentRequest { manifest })
            .await
    }
}
