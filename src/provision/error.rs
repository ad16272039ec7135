//! Provisioning errors

use super::pipeline::Step;
use crate::azure::AzureError;
use thiserror::Error;

/// Why a provisioning run did not complete
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid provisioning request, missing: {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    #[error("session precondition failed: {0}")]
    Authentication(#[source] AzureError),

    #[error("{step} failed: {source}")]
    ResourceCreation {
        step: Step,
        #[source]
        source: AzureError,
    },

    #[error("no image found for {publisher}/{offer}/{sku} in {location}")]
    ImageNotFound {
        location: String,
        publisher: String,
        offer: String,
        sku: String,
    },
}

impl ProvisionError {
    /// Step the run stopped at; `None` when no step was attempted
    pub fn step(&self) -> Option<Step> {
        match self {
            ProvisionError::ResourceCreation { step, .. } => Some(*step),
            ProvisionError::ImageNotFound { .. } => Some(Step::ResolveVmImage),
            ProvisionError::Validation { .. } | ProvisionError::Authentication(_) => None,
        }
    }

    /// Collaborator error behind the failure, if any
    pub fn azure_error(&self) -> Option<&AzureError> {
        match self {
            ProvisionError::ResourceCreation { source, .. } => Some(source),
            ProvisionError::Authentication(source) => Some(source),
            _ => None,
        }
    }
}
