pub mod instance;
pub mod link;
pub mod manifest;
pub mod network;
pub mod placement;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use instance::{
    DesiredInstance, ExistingInstanceState, Instance, InstanceBinding, InstanceModel,
    InstanceState,
};
pub use link::{
    ConsumerRef, ConsumerSource, LinkConsumer, LinkDirection, LinkError, LinkInstance,
    LinkPayload, LinkProperties, LinkProvider, LinkResolutionErrors, LinkTarget, ManualLink,
    ProviderRef, ResolvedLink,
};
pub use manifest::{
    ConsumedLinkSpec, ConsumesDeclaration, DeploymentManifest, InstanceGroup, JobDeclaration,
    JobSpecification, NetworkDeclaration, ProvideOptions, ProvidedLinkSpec, ProvidesDeclaration,
};
pub use network::{
    InstanceNetworkReservations, NetworkAssociation, NetworkReservation, ReservationKind,
};
pub use placement::{
    AvailabilityZone, CloudProperties, Env, MergedCloudProperties, Placement, Stemcell,
    StemcellModel, StemcellSpec, VmExtension, VmType,
};

/// Errors raised while materializing the deployment plan
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("Instance record not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Instance already bound: {0}")]
    AlreadyBound(String),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    LinkResolution(#[from] LinkResolutionErrors),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PlanError {
    /// Stable code surfaced to operators alongside the message.
    pub fn error_code(&self) -> &'static str {
        match self {
            PlanError::NotFound(_) => "NOT_FOUND",
            PlanError::Configuration(_) => "CONFIGURATION_ERROR",
            PlanError::AlreadyBound(_) => "ALREADY_BOUND",
            PlanError::Link(err) => err.error_code(),
            PlanError::LinkResolution(_) => "LINK_RESOLUTION_FAILED",
            PlanError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&PlanError> for ErrorResponse {
    fn from(err: &PlanError) -> Self {
        let response = ErrorResponse::new(err.error_code(), err.to_string());

        match err {
            PlanError::LinkResolution(report) => {
                let mut details = HashMap::new();
                details.insert("deployment".to_string(), report.deployment.clone());
                details.insert("violations".to_string(), report.errors.len().to_string());
                response.with_details(details)
            }
            _ => response,
        }
    }
}

impl From<PlanError> for ErrorResponse {
    fn from(err: PlanError) -> Self {
        ErrorResponse::from(&err)
    }
}
