use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{GenerationPhase, Id};

/// A single rejected configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Every violation found in one configuration, in discovery order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigErrors {
    pub violations: Vec<FieldViolation>,
}

impl ConfigErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(GalaxyError::Config(self))
        }
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum GalaxyError {
    #[error("Invalid configuration: {0}")]
    Config(ConfigErrors),

    #[error("Requested {requested} sectors but at least {minimum} are required")]
    Capacity { requested: u32, minimum: u32 },

    #[error("Galaxy {galaxy_id} is already being modified")]
    ConcurrentGeneration { galaxy_id: Id },

    #[error("Generation failed during {phase}: {cause}")]
    GenerationFailed { phase: GenerationPhase, cause: String },

    #[error("Connectivity invariant violated: {components} components, {unreachable} unreachable sectors")]
    ConnectivityInvariantViolation { components: usize, unreachable: usize },

    #[error("Galaxy has {} occupied sectors", .occupied_sectors.len())]
    DependencyConflict { occupied_sectors: Vec<Id> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Galaxy {galaxy_id} is not complete")]
    GalaxyNotReady { galaxy_id: Id },

    #[error("Invalid warp tunnel: {0}")]
    InvalidTunnel(String),

    #[error("Warp tunnel between {source_sector_id} and {target_sector_id} already exists")]
    DuplicateTunnel {
        source_sector_id: Id,
        target_sector_id: Id,
    },

    #[error("Job {job_id} was cancelled")]
    JobCancelled { job_id: Id },

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl GalaxyError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        GalaxyError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wraps a mid-job error as a phase failure. Phase failures and
    /// cancellations pass through unchanged.
    pub fn in_phase(self, phase: GenerationPhase) -> Self {
        match self {
            GalaxyError::GenerationFailed { .. } | GalaxyError::JobCancelled { .. } => self,
            other => GalaxyError::GenerationFailed {
                phase,
                cause: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, GalaxyError>;
