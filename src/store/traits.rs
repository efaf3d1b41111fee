use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    Cluster, ClusterFilter, Galaxy, GalaxySnapshot, GalaxyStatistics, GenerationJob, Id, JobUpdate,
    Page, Region, Sector, SectorFeatures, SectorFilter, WarpTunnel,
};

/// Rows removed by a teardown or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RowCounts {
    pub galaxies: u64,
    pub regions: u64,
    pub clusters: u64,
    pub sectors: u64,
    pub warp_tunnels: u64,
    pub jobs: u64,
}

impl RowCounts {
    pub fn structural(&self) -> u64 {
        self.galaxies + self.regions + self.clusters + self.sectors + self.warp_tunnels
    }
}

/// Everything `commit_job` applies atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCommit {
    pub galaxy_id: Id,
    /// Sectors added to each region by this job.
    pub region_additions: Vec<(Id, u32)>,
    pub total_sectors: u32,
    pub statistics: GalaxyStatistics,
}

#[async_trait::async_trait]
pub trait GalaxyStore: Send + Sync {
    /// Insert a DRAFT galaxy together with the job that will build it.
    async fn create_generation(&self, galaxy: &Galaxy, job: &GenerationJob) -> Result<()>;
    async fn get_galaxy(&self, id: &Id) -> Result<Option<Galaxy>>;
    async fn list_galaxies(&self) -> Result<Vec<Galaxy>>;
    async fn list_draft_galaxies(&self) -> Result<Vec<Galaxy>>;
    /// Remove the galaxy, its whole subtree and its jobs in one transaction.
    async fn delete_galaxy(&self, id: &Id) -> Result<RowCounts>;
}

#[async_trait::async_trait]
pub trait StructureStore: Send + Sync {
    async fn insert_regions(&self, job_id: &Id, regions: &[Region]) -> Result<()>;
    async fn insert_clusters(&self, job_id: &Id, clusters: &[Cluster]) -> Result<()>;
    async fn insert_sectors(&self, job_id: &Id, sectors: &[Sector]) -> Result<()>;
    async fn insert_warp_tunnels(&self, job_id: &Id, tunnels: &[WarpTunnel]) -> Result<()>;
    async fn update_sector_features(&self, features: &[SectorFeatures]) -> Result<()>;
    /// Sectors written by a job that has not been committed.
    async fn uncommitted_sector_ids(&self, job_id: &Id) -> Result<Vec<Id>>;
    /// Publish the job's rows, apply region counts, mark the galaxy COMPLETE
    /// and the job COMPLETED.
    async fn commit_job(&self, job_id: &Id, commit: &JobCommit) -> Result<()>;
    /// Delete the job's uncommitted rows, and the galaxy itself if it is
    /// still a draft. The job row is kept.
    async fn rollback_job(&self, job_id: &Id) -> Result<RowCounts>;
}

/// Reads. Only committed rows of COMPLETE galaxies are visible.
#[async_trait::async_trait]
pub trait NavigationStore: Send + Sync {
    async fn list_regions(&self, galaxy_id: &Id) -> Result<Vec<Region>>;
    async fn list_clusters(&self, galaxy_id: &Id, filter: &ClusterFilter) -> Result<Page<Cluster>>;
    async fn list_sectors(&self, galaxy_id: &Id, filter: &SectorFilter) -> Result<Page<Sector>>;
    async fn get_sector(&self, galaxy_id: &Id, sector_number: i32) -> Result<Option<Sector>>;
    async fn get_sector_by_id(&self, sector_id: &Id) -> Result<Option<Sector>>;
    async fn list_sector_tunnels(&self, sector_id: &Id) -> Result<Vec<WarpTunnel>>;
    async fn load_snapshot(&self, galaxy_id: &Id) -> Result<GalaxySnapshot>;
    /// Tunnel joining the two sectors in either direction.
    async fn find_tunnel(&self, a: &Id, b: &Id) -> Result<Option<WarpTunnel>>;
    /// Insert an already committed tunnel and bump the galaxy's tunnel count.
    async fn insert_manual_tunnel(&self, tunnel: &WarpTunnel) -> Result<()>;
}

#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &GenerationJob) -> Result<()>;
    async fn get_job(&self, id: &Id) -> Result<Option<GenerationJob>>;
    async fn list_jobs_for_galaxy(&self, galaxy_id: &Id) -> Result<Vec<GenerationJob>>;
    /// Apply `update`, refresh the heartbeat and return the new row.
    async fn update_job(&self, id: &Id, update: &JobUpdate) -> Result<Option<GenerationJob>>;
    /// Flag a non-terminal job for cancellation. False if it already finished.
    async fn request_cancel(&self, id: &Id) -> Result<bool>;
    async fn is_cancel_requested(&self, id: &Id) -> Result<bool>;
    /// PENDING or RUNNING jobs whose heartbeat is older than `cutoff`.
    async fn list_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<GenerationJob>>;
}

pub trait Store: GalaxyStore + StructureStore + NavigationStore + JobStore + Send + Sync {}
