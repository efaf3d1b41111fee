use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(JobState::Pending),
            "RUNNING" => Some(JobState::Running),
            "COMPLETED" => Some(JobState::Completed),
            "FAILED" => Some(JobState::Failed),
            "CANCELLED" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Generate,
    Expand,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Expand => "expand",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generate" => Some(JobKind::Generate),
            "expand" => Some(JobKind::Expand),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Validating,
    AllocatingRegions,
    PartitioningClusters,
    SynthesizingSectors,
    BuildingConnectivity,
    AttachingFeatures,
    Finalizing,
}

impl GenerationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPhase::Validating => "validating",
            GenerationPhase::AllocatingRegions => "allocating_regions",
            GenerationPhase::PartitioningClusters => "partitioning_clusters",
            GenerationPhase::SynthesizingSectors => "synthesizing_sectors",
            GenerationPhase::BuildingConnectivity => "building_connectivity",
            GenerationPhase::AttachingFeatures => "attaching_features",
            GenerationPhase::Finalizing => "finalizing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validating" => Some(GenerationPhase::Validating),
            "allocating_regions" => Some(GenerationPhase::AllocatingRegions),
            "partitioning_clusters" => Some(GenerationPhase::PartitioningClusters),
            "synthesizing_sectors" => Some(GenerationPhase::SynthesizingSectors),
            "building_connectivity" => Some(GenerationPhase::BuildingConnectivity),
            "attaching_features" => Some(GenerationPhase::AttachingFeatures),
            "finalizing" => Some(GenerationPhase::Finalizing),
            _ => None,
        }
    }

    /// Progress band `[start, end)` a phase occupies in the overall percentage.
    pub fn progress_band(&self) -> (u8, u8) {
        match self {
            GenerationPhase::Validating => (0, 2),
            GenerationPhase::AllocatingRegions => (2, 5),
            GenerationPhase::PartitioningClusters => (5, 10),
            GenerationPhase::SynthesizingSectors => (10, 45),
            GenerationPhase::BuildingConnectivity => (45, 80),
            GenerationPhase::AttachingFeatures => (80, 95),
            GenerationPhase::Finalizing => (95, 100),
        }
    }
}

impl std::fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Id,
    pub galaxy_id: Id,
    pub kind: JobKind,
    pub phase: GenerationPhase,
    pub state: JobState,
    pub progress_percentage: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub error: Option<String>,
    pub cancel_requested: bool,
}

impl GenerationJob {
    pub fn new(galaxy_id: Id, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            galaxy_id,
            kind,
            phase: GenerationPhase::Validating,
            state: JobState::Pending,
            progress_percentage: 0,
            created_at: now,
            updated_at: now,
            heartbeat_at: now,
            error: None,
            cancel_requested: false,
        }
    }

    /// The caller-facing result of the job.
    pub fn outcome(&self) -> JobOutcome {
        match self.state {
            JobState::Pending | JobState::Running => JobOutcome::InProgress {
                phase: self.phase,
                progress_percentage: self.progress_percentage,
            },
            JobState::Completed => JobOutcome::Success {
                galaxy_id: self.galaxy_id.clone(),
            },
            JobState::Cancelled => JobOutcome::Cancelled,
            JobState::Failed => JobOutcome::GenerationFailed {
                phase: self.phase,
                cause: self.error.clone().unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    InProgress {
        phase: GenerationPhase,
        progress_percentage: u8,
    },
    Success {
        galaxy_id: Id,
    },
    Cancelled,
    GenerationFailed {
        phase: GenerationPhase,
        cause: String,
    },
}

/// Partial update written after every chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobUpdate {
    pub phase: Option<GenerationPhase>,
    pub state: Option<JobState>,
    pub progress_percentage: Option<u8>,
    pub error: Option<String>,
}

/// What observers are told after every chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub job_id: Id,
    pub galaxy_id: Id,
    pub kind: JobKind,
    pub phase: GenerationPhase,
    pub state: JobState,
    pub progress_percentage: u8,
}

impl JobProgress {
    pub fn from_job(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id.clone(),
            galaxy_id: job.galaxy_id.clone(),
            kind: job.kind,
            phase: job.phase,
            state: job.state,
            progress_percentage: job.progress_percentage,
        }
    }
}
