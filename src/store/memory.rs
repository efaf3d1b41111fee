use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{
    Cluster, ClusterFilter, Galaxy, GalaxySnapshot, GenerationJob, GenerationPhase,
    GenerationStatus, Id, JobState, JobUpdate, Page, Region, Sector, SectorFeatures, SectorFilter,
    WarpTunnel,
};
use crate::store::traits::{
    GalaxyStore, JobCommit, JobStore, NavigationStore, RowCounts, Store, StructureStore,
};

/// A structural row plus the job that wrote it.
#[derive(Debug, Clone)]
struct Tracked<T> {
    row: T,
    job_id: Option<Id>,
    committed: bool,
}

impl<T> Tracked<T> {
    fn pending(row: T, job_id: &Id) -> Self {
        Self {
            row,
            job_id: Some(job_id.clone()),
            committed: false,
        }
    }

    fn written_by(&self, job_id: &Id) -> bool {
        self.job_id.as_ref() == Some(job_id)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    galaxies: Vec<Galaxy>,
    regions: Vec<Tracked<Region>>,
    clusters: Vec<Tracked<Cluster>>,
    sectors: Vec<Tracked<Sector>>,
    tunnels: Vec<Tracked<WarpTunnel>>,
    jobs: HashMap<Id, GenerationJob>,
}

impl MemoryState {
    fn galaxy(&self, id: &Id) -> Option<&Galaxy> {
        self.galaxies.iter().find(|g| &g.id == id)
    }

    fn is_visible(&self, galaxy_id: &Id) -> bool {
        self.galaxy(galaxy_id).map(Galaxy::is_complete).unwrap_or(false)
    }

    fn visible_sectors<'a>(&'a self, galaxy_id: &'a Id) -> impl Iterator<Item = &'a Sector> + 'a {
        let visible = self.is_visible(galaxy_id);
        self.sectors
            .iter()
            .filter(move |t| visible && t.committed && &t.row.galaxy_id == galaxy_id)
            .map(|t| &t.row)
    }

    /// Remove every structural row matching `doomed`, children first.
    fn purge<F>(&mut self, doomed: F) -> RowCounts
    where
        F: Fn(&Id, Option<&Id>, bool) -> bool,
    {
        let mut counts = RowCounts::default();
        let before = self.tunnels.len();
        self.tunnels
            .retain(|t| !doomed(&t.row.galaxy_id, t.job_id.as_ref(), t.committed));
        counts.warp_tunnels = (before - self.tunnels.len()) as u64;

        let before = self.sectors.len();
        self.sectors
            .retain(|t| !doomed(&t.row.galaxy_id, t.job_id.as_ref(), t.committed));
        counts.sectors = (before - self.sectors.len()) as u64;

        let before = self.clusters.len();
        self.clusters
            .retain(|t| !doomed(&t.row.galaxy_id, t.job_id.as_ref(), t.committed));
        counts.clusters = (before - self.clusters.len()) as u64;

        let before = self.regions.len();
        self.regions
            .retain(|t| !doomed(&t.row.galaxy_id, t.job_id.as_ref(), t.committed));
        counts.regions = (before - self.regions.len()) as u64;
        counts
    }
}

/// Store backed by process memory. One lock guards every table, so each
/// method behaves like a single transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of structural rows (galaxy, region, cluster, sector, tunnel) for a galaxy,
    /// committed or not.
    pub async fn structural_row_count(&self, galaxy_id: &Id) -> usize {
        let state = self.state.read().await;
        state.galaxies.iter().filter(|g| &g.id == galaxy_id).count()
            + state.regions.iter().filter(|t| &t.row.galaxy_id == galaxy_id).count()
            + state.clusters.iter().filter(|t| &t.row.galaxy_id == galaxy_id).count()
            + state.sectors.iter().filter(|t| &t.row.galaxy_id == galaxy_id).count()
            + state.tunnels.iter().filter(|t| &t.row.galaxy_id == galaxy_id).count()
    }
}

#[async_trait::async_trait]
impl GalaxyStore for InMemoryStore {
    async fn create_generation(&self, galaxy: &Galaxy, job: &GenerationJob) -> Result<()> {
        let mut state = self.state.write().await;
        if state.galaxy(&galaxy.id).is_some() {
            return Err(anyhow!("Galaxy {} already exists", galaxy.id));
        }
        state.galaxies.push(galaxy.clone());
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_galaxy(&self, id: &Id) -> Result<Option<Galaxy>> {
        Ok(self.state.read().await.galaxy(id).cloned())
    }

    async fn list_galaxies(&self) -> Result<Vec<Galaxy>> {
        let mut galaxies = self.state.read().await.galaxies.clone();
        galaxies.sort_by_key(|g| g.created_at);
        Ok(galaxies)
    }

    async fn list_draft_galaxies(&self) -> Result<Vec<Galaxy>> {
        let state = self.state.read().await;
        Ok(state
            .galaxies
            .iter()
            .filter(|g| g.generation_status == GenerationStatus::Draft)
            .cloned()
            .collect())
    }

    async fn delete_galaxy(&self, id: &Id) -> Result<RowCounts> {
        let mut state = self.state.write().await;
        let mut counts = state.purge(|galaxy_id, _, _| galaxy_id == id);

        let before = state.galaxies.len();
        state.galaxies.retain(|g| &g.id != id);
        counts.galaxies = (before - state.galaxies.len()) as u64;

        let before = state.jobs.len();
        state.jobs.retain(|_, job| &job.galaxy_id != id);
        counts.jobs = (before - state.jobs.len()) as u64;
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl StructureStore for InMemoryStore {
    async fn insert_regions(&self, job_id: &Id, regions: &[Region]) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .regions
            .extend(regions.iter().cloned().map(|r| Tracked::pending(r, job_id)));
        Ok(())
    }

    async fn insert_clusters(&self, job_id: &Id, clusters: &[Cluster]) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .clusters
            .extend(clusters.iter().cloned().map(|c| Tracked::pending(c, job_id)));
        Ok(())
    }

    async fn insert_sectors(&self, job_id: &Id, sectors: &[Sector]) -> Result<()> {
        let mut state = self.state.write().await;
        for sector in sectors {
            let clash = state.sectors.iter().any(|t| {
                t.row.galaxy_id == sector.galaxy_id && t.row.sector_number == sector.sector_number
            });
            if clash {
                return Err(anyhow!(
                    "Sector number {} already exists in galaxy {}",
                    sector.sector_number,
                    sector.galaxy_id
                ));
            }
        }
        state
            .sectors
            .extend(sectors.iter().cloned().map(|s| Tracked::pending(s, job_id)));
        Ok(())
    }

    async fn insert_warp_tunnels(&self, job_id: &Id, tunnels: &[WarpTunnel]) -> Result<()> {
        let mut state = self.state.write().await;
        let mut pairs: HashSet<(Id, Id)> = state.tunnels.iter().map(|t| t.row.pair_key()).collect();
        for tunnel in tunnels {
            if tunnel.source_sector_id == tunnel.target_sector_id {
                return Err(anyhow!("Warp tunnel {} is a self-loop", tunnel.id));
            }
            if !pairs.insert(tunnel.pair_key()) {
                return Err(anyhow!("Warp tunnel {} duplicates an existing pair", tunnel.id));
            }
        }
        state
            .tunnels
            .extend(tunnels.iter().cloned().map(|t| Tracked::pending(t, job_id)));
        Ok(())
    }

    async fn update_sector_features(&self, features: &[SectorFeatures]) -> Result<()> {
        let mut state = self.state.write().await;
        let by_sector: HashMap<&Id, &SectorFeatures> =
            features.iter().map(|f| (&f.sector_id, f)).collect();
        for tracked in state.sectors.iter_mut() {
            if let Some(feature) = by_sector.get(&tracked.row.id) {
                tracked.row.has_port = feature.port_id.is_some();
                tracked.row.has_planet = feature.planet_id.is_some();
                tracked.row.port_id = feature.port_id.clone();
                tracked.row.planet_id = feature.planet_id.clone();
            }
        }
        Ok(())
    }

    async fn uncommitted_sector_ids(&self, job_id: &Id) -> Result<Vec<Id>> {
        let state = self.state.read().await;
        Ok(state
            .sectors
            .iter()
            .filter(|t| t.written_by(job_id) && !t.committed)
            .map(|t| t.row.id.clone())
            .collect())
    }

    async fn commit_job(&self, job_id: &Id, commit: &JobCommit) -> Result<()> {
        let mut state = self.state.write().await;
        if state.galaxy(&commit.galaxy_id).is_none() {
            return Err(anyhow!("Galaxy {} not found", commit.galaxy_id));
        }

        for t in state.regions.iter_mut().filter(|t| t.written_by(job_id)) {
            t.committed = true;
        }
        for t in state.clusters.iter_mut().filter(|t| t.written_by(job_id)) {
            t.committed = true;
        }
        for t in state.sectors.iter_mut().filter(|t| t.written_by(job_id)) {
            t.committed = true;
        }
        for t in state.tunnels.iter_mut().filter(|t| t.written_by(job_id)) {
            t.committed = true;
        }
        for (region_id, added) in &commit.region_additions {
            if let Some(t) = state.regions.iter_mut().find(|t| &t.row.id == region_id) {
                t.row.target_sector_count += added;
            }
        }
        if let Some(galaxy) = state.galaxies.iter_mut().find(|g| g.id == commit.galaxy_id) {
            galaxy.generation_status = GenerationStatus::Complete;
            galaxy.total_sectors = commit.total_sectors;
            galaxy.statistics = commit.statistics;
        }
        if let Some(job) = state.jobs.get_mut(job_id) {
            let now = Utc::now();
            job.state = JobState::Completed;
            job.phase = GenerationPhase::Finalizing;
            job.progress_percentage = 100;
            job.updated_at = now;
            job.heartbeat_at = now;
        }
        Ok(())
    }

    async fn rollback_job(&self, job_id: &Id) -> Result<RowCounts> {
        let mut state = self.state.write().await;
        let mut counts = state.purge(|_, writer, committed| writer == Some(job_id) && !committed);

        let galaxy_id = state.jobs.get(job_id).map(|job| job.galaxy_id.clone());
        if let Some(galaxy_id) = galaxy_id {
            let is_draft = state
                .galaxy(&galaxy_id)
                .map(|g| g.generation_status == GenerationStatus::Draft)
                .unwrap_or(false);
            if is_draft {
                let orphans = state.purge(|owner, _, _| owner == &galaxy_id);
                counts.regions += orphans.regions;
                counts.clusters += orphans.clusters;
                counts.sectors += orphans.sectors;
                counts.warp_tunnels += orphans.warp_tunnels;
                state.galaxies.retain(|g| g.id != galaxy_id);
                counts.galaxies = 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl NavigationStore for InMemoryStore {
    async fn list_regions(&self, galaxy_id: &Id) -> Result<Vec<Region>> {
        let state = self.state.read().await;
        if !state.is_visible(galaxy_id) {
            return Ok(Vec::new());
        }
        Ok(state
            .regions
            .iter()
            .filter(|t| t.committed && &t.row.galaxy_id == galaxy_id)
            .map(|t| t.row.clone())
            .collect())
    }

    async fn list_clusters(&self, galaxy_id: &Id, filter: &ClusterFilter) -> Result<Page<Cluster>> {
        let state = self.state.read().await;
        let visible = state.is_visible(galaxy_id);
        let clusters: Vec<Cluster> = state
            .clusters
            .iter()
            .filter(|t| visible && t.committed && &t.row.galaxy_id == galaxy_id)
            .filter(|t| {
                filter
                    .region_id
                    .as_ref()
                    .map(|r| &t.row.region_id == r)
                    .unwrap_or(true)
            })
            .map(|t| t.row.clone())
            .collect();
        Ok(Page::from_all(clusters, filter.limit, filter.offset))
    }

    async fn list_sectors(&self, galaxy_id: &Id, filter: &SectorFilter) -> Result<Page<Sector>> {
        let state = self.state.read().await;
        let mut sectors: Vec<Sector> = state
            .visible_sectors(galaxy_id)
            .filter(|s| filter.region_id.as_ref().map(|r| &s.region_id == r).unwrap_or(true))
            .filter(|s| filter.cluster_id.as_ref().map(|c| &s.cluster_id == c).unwrap_or(true))
            .cloned()
            .collect();
        sectors.sort_by_key(|s| s.sector_number);
        Ok(Page::from_all(sectors, filter.limit, filter.offset))
    }

    async fn get_sector(&self, galaxy_id: &Id, sector_number: i32) -> Result<Option<Sector>> {
        let state = self.state.read().await;
        let sector = state
            .visible_sectors(galaxy_id)
            .find(|s| s.sector_number == sector_number)
            .cloned();
        Ok(sector)
    }

    async fn get_sector_by_id(&self, sector_id: &Id) -> Result<Option<Sector>> {
        let state = self.state.read().await;
        Ok(state
            .sectors
            .iter()
            .find(|t| t.committed && &t.row.id == sector_id && state.is_visible(&t.row.galaxy_id))
            .map(|t| t.row.clone()))
    }

    async fn list_sector_tunnels(&self, sector_id: &Id) -> Result<Vec<WarpTunnel>> {
        let state = self.state.read().await;
        Ok(state
            .tunnels
            .iter()
            .filter(|t| t.committed && state.is_visible(&t.row.galaxy_id))
            .filter(|t| &t.row.source_sector_id == sector_id || &t.row.target_sector_id == sector_id)
            .map(|t| t.row.clone())
            .collect())
    }

    async fn load_snapshot(&self, galaxy_id: &Id) -> Result<GalaxySnapshot> {
        let state = self.state.read().await;
        if !state.is_visible(galaxy_id) {
            return Ok(GalaxySnapshot::default());
        }
        let committed = |owner: &Id, committed: bool| committed && owner == galaxy_id;
        let mut sectors: Vec<Sector> = state
            .sectors
            .iter()
            .filter(|t| committed(&t.row.galaxy_id, t.committed))
            .map(|t| t.row.clone())
            .collect();
        sectors.sort_by_key(|s| s.sector_number);

        Ok(GalaxySnapshot {
            regions: state
                .regions
                .iter()
                .filter(|t| committed(&t.row.galaxy_id, t.committed))
                .map(|t| t.row.clone())
                .collect(),
            clusters: state
                .clusters
                .iter()
                .filter(|t| committed(&t.row.galaxy_id, t.committed))
                .map(|t| t.row.clone())
                .collect(),
            sectors,
            tunnels: state
                .tunnels
                .iter()
                .filter(|t| committed(&t.row.galaxy_id, t.committed))
                .map(|t| t.row.clone())
                .collect(),
        })
    }

    async fn find_tunnel(&self, a: &Id, b: &Id) -> Result<Option<WarpTunnel>> {
        let state = self.state.read().await;
        let key = crate::model::pair_key(a, b);
        Ok(state
            .tunnels
            .iter()
            .find(|t| t.row.pair_key() == key)
            .map(|t| t.row.clone()))
    }

    async fn insert_manual_tunnel(&self, tunnel: &WarpTunnel) -> Result<()> {
        let mut state = self.state.write().await;
        let key = tunnel.pair_key();
        if state.tunnels.iter().any(|t| t.row.pair_key() == key) {
            return Err(anyhow!("Warp tunnel {} duplicates an existing pair", tunnel.id));
        }
        state.tunnels.push(Tracked {
            row: tunnel.clone(),
            job_id: None,
            committed: true,
        });
        if let Some(galaxy) = state.galaxies.iter_mut().find(|g| g.id == tunnel.galaxy_id) {
            galaxy.statistics.warp_tunnel_count += 1;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryStore {
    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        self.state.write().await.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &Id) -> Result<Option<GenerationJob>> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }

    async fn list_jobs_for_galaxy(&self, galaxy_id: &Id) -> Result<Vec<GenerationJob>> {
        let state = self.state.read().await;
        let mut jobs: Vec<GenerationJob> = state
            .jobs
            .values()
            .filter(|job| &job.galaxy_id == galaxy_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn update_job(&self, id: &Id, update: &JobUpdate) -> Result<Option<GenerationJob>> {
        let mut state = self.state.write().await;
        let Some(job) = state.jobs.get_mut(id) else {
            return Ok(None);
        };
        if let Some(phase) = update.phase {
            job.phase = phase;
        }
        if let Some(job_state) = update.state {
            job.state = job_state;
        }
        if let Some(progress) = update.progress_percentage {
            job.progress_percentage = progress;
        }
        if let Some(error) = &update.error {
            job.error = Some(error.clone());
        }
        let now = Utc::now();
        job.updated_at = now;
        job.heartbeat_at = now;
        Ok(Some(job.clone()))
    }

    async fn request_cancel(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(id) {
            Some(job) if !job.state.is_terminal() => {
                job.cancel_requested = true;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_cancel_requested(&self, id: &Id) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .get(id)
            .map(|job| job.cancel_requested)
            .unwrap_or(false))
    }

    async fn list_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<GenerationJob>> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| !job.state.is_terminal() && job.heartbeat_at < cutoff)
            .cloned()
            .collect())
    }
}

impl Store for InMemoryStore {}
