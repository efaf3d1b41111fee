//! Background generation jobs.
//!
//! `GalaxyEngine` is the operational surface. Structural work for a galaxy
//! runs under a per-galaxy lock in a spawned task; the task reports progress
//! after every chunk, polls the persisted cancel flag at the same points and
//! rolls back every row it wrote when it fails or is cancelled.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::collaborators::{DetachedFeatureFactory, FeatureFactory, NoOccupants, OccupancyLookup};
use crate::config::GenerationSettings;
use crate::error::{GalaxyError, Result};
use crate::logic::allocate::RegionAllocator;
use crate::logic::connectivity::{ConnectivityBuilder, SectorNode, StabilityPolicy};
use crate::logic::features::FeatureAttacher;
use crate::logic::partition::{ClusterPartitioner, ClusterPlan};
use crate::logic::synthesize::SectorSynthesizer;
use crate::logic::validate::{ConfigValidator, ValidatedConfig};
use crate::model::{
    cluster_name, Cluster, EnhancedGalaxyConfig, Galaxy, GalaxyBlueprint, GalaxyStatistics,
    GenerationConfig, GenerationJob, GenerationPhase, Id, JobKind, JobProgress, JobState,
    JobUpdate, Region, RegionKind, RegionOverride, Sector, WarpTunnel,
};
use crate::store::traits::{JobCommit, RowCounts, Store};

/// Galaxies with a structural operation in flight in this process.
#[derive(Debug, Clone, Default)]
pub struct GalaxyLocks {
    held: Arc<Mutex<HashSet<Id>>>,
}

impl GalaxyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `galaxy_id`, or fail if another operation holds it.
    pub fn try_acquire(&self, galaxy_id: &Id) -> Result<GalaxyGuard> {
        let mut held = self.held.lock();
        if !held.insert(galaxy_id.clone()) {
            return Err(GalaxyError::ConcurrentGeneration {
                galaxy_id: galaxy_id.clone(),
            });
        }
        Ok(GalaxyGuard {
            locks: self.clone(),
            galaxy_id: galaxy_id.clone(),
        })
    }

    pub fn is_held(&self, galaxy_id: &Id) -> bool {
        self.held.lock().contains(galaxy_id)
    }
}

/// Releases the galaxy lock when dropped.
#[derive(Debug)]
pub struct GalaxyGuard {
    locks: GalaxyLocks,
    galaxy_id: Id,
}

impl Drop for GalaxyGuard {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.galaxy_id);
    }
}

/// Receives every progress update a job writes.
#[async_trait::async_trait]
pub trait JobObserver: Send + Sync {
    async fn on_progress(&self, progress: &JobProgress);
}

#[derive(Debug, Default, Clone)]
pub struct LoggingObserver;

#[async_trait::async_trait]
impl JobObserver for LoggingObserver {
    async fn on_progress(&self, progress: &JobProgress) {
        info!(
            "Job {} ({}) for galaxy {}: {} {}%",
            progress.job_id,
            progress.state.as_str(),
            progress.galaxy_id,
            progress.phase,
            progress.progress_percentage
        );
    }
}

/// Returned as soon as a generation job has been accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationTicket {
    pub galaxy_id: Id,
    pub job_id: Id,
}

pub struct GalaxyEngine<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) locks: GalaxyLocks,
    pub(crate) features: Arc<dyn FeatureFactory>,
    pub(crate) occupancy: Arc<dyn OccupancyLookup>,
    pub(crate) observer: Arc<dyn JobObserver>,
    pub(crate) settings: GenerationSettings,
}

impl<S: Store> Clone for GalaxyEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
            features: self.features.clone(),
            occupancy: self.occupancy.clone(),
            observer: self.observer.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Store + 'static> GalaxyEngine<S> {
    pub fn new(store: Arc<S>, settings: GenerationSettings) -> Self {
        Self {
            store,
            locks: GalaxyLocks::new(),
            features: Arc::new(DetachedFeatureFactory),
            occupancy: Arc::new(NoOccupants),
            observer: Arc::new(LoggingObserver),
            settings,
        }
    }

    pub fn with_feature_factory(mut self, features: Arc<dyn FeatureFactory>) -> Self {
        self.features = features;
        self
    }

    pub fn with_occupancy(mut self, occupancy: Arc<dyn OccupancyLookup>) -> Self {
        self.occupancy = occupancy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn locks(&self) -> &GalaxyLocks {
        &self.locks
    }

    /// Validate `config` and start building a new galaxy in the background.
    pub async fn generate(
        &self,
        name: &str,
        num_sectors: u32,
        config: GenerationConfig,
    ) -> Result<GenerationTicket> {
        self.start_generation(name, num_sectors, &config, &BTreeMap::new())
            .await
    }

    /// Same engine as `generate`, with per-region overrides.
    pub async fn generate_enhanced(&self, request: EnhancedGalaxyConfig) -> Result<GenerationTicket> {
        self.start_generation(
            &request.name,
            request.total_sectors,
            &request.config,
            &request.region_overrides,
        )
        .await
    }

    async fn start_generation(
        &self,
        name: &str,
        num_sectors: u32,
        config: &GenerationConfig,
        region_overrides: &BTreeMap<String, RegionOverride>,
    ) -> Result<GenerationTicket> {
        let validated = ConfigValidator::validate(
            name,
            num_sectors,
            config,
            region_overrides,
            self.settings.max_sectors,
        )?;

        let galaxy = Galaxy::new_draft(
            validated.name.clone(),
            validated.num_sectors,
            validated.distribution.clone(),
            validated.blueprint.clone(),
        );
        let guard = self.locks.try_acquire(&galaxy.id)?;
        let job = GenerationJob::new(galaxy.id.clone(), JobKind::Generate);
        self.store.create_generation(&galaxy, &job).await?;
        info!(
            "Accepted generation of galaxy '{}' ({}) with {} sectors as job {}",
            galaxy.name, galaxy.id, galaxy.total_sectors, job.id
        );

        let ticket = GenerationTicket {
            galaxy_id: galaxy.id.clone(),
            job_id: job.id.clone(),
        };
        let mut run = JobRun::new(self.clone(), &job);
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = run.generate(&validated).await;
            run.finish(outcome).await;
        });
        Ok(ticket)
    }

    pub async fn get_job(&self, job_id: &Id) -> Result<GenerationJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| GalaxyError::not_found("job", job_id))
    }

    pub async fn list_jobs(&self, galaxy_id: &Id) -> Result<Vec<GenerationJob>> {
        Ok(self.store.list_jobs_for_galaxy(galaxy_id).await?)
    }

    /// Ask a running job to stop at its next chunk boundary.
    pub async fn cancel_job(&self, job_id: &Id) -> Result<GenerationJob> {
        let job = self.get_job(job_id).await?;
        if self.store.request_cancel(job_id).await? {
            info!("Cancellation requested for job {}", job_id);
            return self.get_job(job_id).await;
        }
        Ok(job)
    }

    /// Poll until the job is terminal and its galaxy lock is released.
    pub async fn await_job(&self, job_id: &Id, timeout: Duration) -> Result<GenerationJob> {
        let poll = async {
            loop {
                let job = self.get_job(job_id).await?;
                if job.state.is_terminal() && !self.locks.is_held(&job.galaxy_id) {
                    return Ok::<_, GalaxyError>(job);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            GalaxyError::Store(anyhow::anyhow!(
                "Timed out after {:?} waiting for job {}",
                timeout,
                job_id
            ))
        })?
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Cluster rows for one region, named from `first_index` onward.
pub(crate) fn build_clusters(region: &Region, plans: Vec<ClusterPlan>, first_index: usize) -> Vec<Cluster> {
    plans
        .into_iter()
        .enumerate()
        .map(|(i, plan)| {
            Cluster::new(
                region.galaxy_id.clone(),
                region.id.clone(),
                cluster_name(&region.name, first_index + i),
                plan.cluster_type,
                plan.bounds,
                plan.sector_count,
            )
        })
        .collect()
}

/// Fill every cluster, numbering sectors consecutively from `first_number`.
pub(crate) fn synthesize_sectors(
    blueprint: &GalaxyBlueprint,
    regions: &[Region],
    clusters: &[Cluster],
    first_number: i32,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Sector>> {
    let region_names: HashMap<&str, &str> = regions
        .iter()
        .map(|r| (r.id.as_str(), r.name.as_str()))
        .collect();
    let mut synthesizer = SectorSynthesizer::new(&blueprint.config, rng);
    let mut next_number = first_number;
    let mut sectors = Vec::new();

    for cluster in clusters {
        let region_override = region_names
            .get(cluster.region_id.as_str())
            .and_then(|name| blueprint.override_for(name));
        let filled = synthesizer.synthesize_cluster(cluster, region_override, next_number);
        if filled.len() != cluster.target_sector_count as usize {
            return Err(GalaxyError::GenerationFailed {
                phase: GenerationPhase::SynthesizingSectors,
                cause: format!(
                    "{} has room for {} of {} sectors",
                    cluster.name,
                    filled.len(),
                    cluster.target_sector_count
                ),
            });
        }
        next_number += filled.len() as i32;
        sectors.extend(filled);
    }
    Ok(sectors)
}

/// Release the features of a job's uncommitted sectors, then drop its rows.
pub(crate) async fn rollback_job<S: Store>(
    store: &S,
    features: &dyn FeatureFactory,
    job_id: &Id,
) -> anyhow::Result<RowCounts> {
    let sector_ids = store.uncommitted_sector_ids(job_id).await?;
    if !sector_ids.is_empty() {
        if let Err(err) = features.remove_features(&sector_ids).await {
            warn!("Failed to release features of job {}: {:#}", job_id, err);
        }
    }
    store
        .rollback_job(job_id)
        .await
        .with_context(|| format!("Failed to roll back job {}", job_id))
}

/// One structural job from first phase to terminal state.
pub(crate) struct JobRun<S: Store> {
    pub(crate) engine: GalaxyEngine<S>,
    pub(crate) job_id: Id,
    pub(crate) galaxy_id: Id,
    pub(crate) phase: GenerationPhase,
}

impl<S: Store + 'static> JobRun<S> {
    pub(crate) fn new(engine: GalaxyEngine<S>, job: &GenerationJob) -> Self {
        Self {
            engine,
            job_id: job.id.clone(),
            galaxy_id: job.galaxy_id.clone(),
            phase: job.phase,
        }
    }

    pub(crate) async fn enter(&mut self, phase: GenerationPhase) -> Result<()> {
        self.phase = phase;
        self.report(phase.progress_band().0).await
    }

    /// Report `done` of `total` units of the current phase.
    pub(crate) async fn advance(&self, done: usize, total: usize) -> Result<()> {
        let (start, end) = self.phase.progress_band();
        let span = usize::from(end - start);
        let within = if total == 0 {
            span
        } else {
            span * done.min(total) / total
        };
        self.report(start + within as u8).await
    }

    async fn report(&self, progress: u8) -> Result<()> {
        let update = JobUpdate {
            phase: Some(self.phase),
            state: Some(JobState::Running),
            progress_percentage: Some(progress),
            error: None,
        };
        if let Some(job) = self.engine.store.update_job(&self.job_id, &update).await? {
            self.engine
                .observer
                .on_progress(&JobProgress::from_job(&job))
                .await;
        }
        if self.engine.store.is_cancel_requested(&self.job_id).await? {
            return Err(GalaxyError::JobCancelled {
                job_id: self.job_id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) async fn write_sectors(&self, sectors: &[Sector]) -> Result<()> {
        let chunk_size = self.engine.settings.chunk_size.max(1);
        let mut written = 0;
        for chunk in sectors.chunks(chunk_size) {
            self.engine.store.insert_sectors(&self.job_id, chunk).await?;
            written += chunk.len();
            self.advance(written, sectors.len()).await?;
        }
        Ok(())
    }

    pub(crate) async fn write_tunnels(&self, tunnels: &[WarpTunnel]) -> Result<()> {
        let chunk_size = self.engine.settings.chunk_size.max(1);
        let mut written = 0;
        for chunk in tunnels.chunks(chunk_size) {
            self.engine
                .store
                .insert_warp_tunnels(&self.job_id, chunk)
                .await?;
            written += chunk.len();
            self.advance(written, tunnels.len()).await?;
        }
        Ok(())
    }

    /// Place ports and planets on `sectors`. Returns (ports, planets) created.
    pub(crate) async fn attach_features(
        &self,
        sectors: &[Sector],
        clusters: &[Cluster],
        regions: &[Region],
        blueprint: &GalaxyBlueprint,
        rng: &mut ChaCha8Rng,
    ) -> Result<(u32, u32)> {
        let densities = FeatureAttacher::densities(regions, blueprint);
        let placements = FeatureAttacher::plan(sectors, clusters, &densities, rng);
        let chunk_size = self.engine.settings.chunk_size.max(1);

        let (mut ports, mut planets) = (0, 0);
        let mut done = 0;
        for chunk in placements.chunks(chunk_size) {
            let features = FeatureAttacher::attach(self.engine.features.as_ref(), chunk).await?;
            ports += features.iter().filter(|f| f.port_id.is_some()).count() as u32;
            planets += features.iter().filter(|f| f.planet_id.is_some()).count() as u32;
            self.engine.store.update_sector_features(&features).await?;
            done += chunk.len();
            self.advance(done, placements.len()).await?;
        }
        Ok((ports, planets))
    }

    /// Build a new galaxy from a validated configuration.
    pub(crate) async fn generate(&mut self, validated: &ValidatedConfig) -> Result<JobCommit> {
        let blueprint = &validated.blueprint;
        let config = &blueprint.config;
        let mut rng = seeded_rng(config.seed);

        self.enter(GenerationPhase::Validating).await?;

        self.enter(GenerationPhase::AllocatingRegions).await?;
        let allocations = RegionAllocator::allocate(validated.num_sectors, &validated.distribution)?;

        self.enter(GenerationPhase::PartitioningClusters).await?;
        let region_counts: Vec<(RegionKind, u32)> = allocations
            .iter()
            .map(|a| (RegionKind::from_name(&a.name), a.sector_count))
            .collect();
        let plans = ClusterPartitioner::plan_galaxy(&region_counts, config.connectivity, &mut rng);

        let mut regions = Vec::with_capacity(allocations.len());
        let mut clusters = Vec::new();
        for (allocation, plan) in allocations.iter().zip(plans) {
            let region = Region::new(
                self.galaxy_id.clone(),
                allocation.name.clone(),
                allocation.ratio,
                allocation.sector_count,
                plan.bounds,
            );
            clusters.extend(build_clusters(&region, plan.clusters, 0));
            regions.push(region);
        }
        self.engine.store.insert_regions(&self.job_id, &regions).await?;
        self.engine.store.insert_clusters(&self.job_id, &clusters).await?;
        self.advance(1, 1).await?;

        self.enter(GenerationPhase::SynthesizingSectors).await?;
        let sectors = synthesize_sectors(blueprint, &regions, &clusters, 1, &mut rng)?;
        self.write_sectors(&sectors).await?;

        self.enter(GenerationPhase::BuildingConnectivity).await?;
        let nodes: Vec<SectorNode> = sectors
            .iter()
            .map(|sector| SectorNode::from_sector(sector, true))
            .collect();
        let policy = StabilityPolicy::new(&regions, blueprint);
        let tunnels = ConnectivityBuilder::new(
            &mut rng,
            config.connectivity,
            config.warp_tunnel_probability,
            &policy,
        )
        .build(&self.galaxy_id, &nodes, &[])?
        .into_tunnels();
        self.write_tunnels(&tunnels).await?;

        self.enter(GenerationPhase::AttachingFeatures).await?;
        let (ports, planets) = self
            .attach_features(&sectors, &clusters, &regions, blueprint, &mut rng)
            .await?;

        self.enter(GenerationPhase::Finalizing).await?;
        Ok(JobCommit {
            galaxy_id: self.galaxy_id.clone(),
            region_additions: Vec::new(),
            total_sectors: validated.num_sectors,
            statistics: GalaxyStatistics {
                total_sectors: sectors.len() as u32,
                port_count: ports,
                planet_count: planets,
                warp_tunnel_count: tunnels.len() as u32,
                cluster_count: clusters.len() as u32,
            },
        })
    }

    /// Commit a finished run, or roll it back and record why it stopped.
    pub(crate) async fn finish(mut self, outcome: Result<JobCommit>) {
        let result = match outcome {
            Ok(commit) => {
                self.phase = GenerationPhase::Finalizing;
                self.engine
                    .store
                    .commit_job(&self.job_id, &commit)
                    .await
                    .map_err(GalaxyError::from)
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!("Job {} completed galaxy {}", self.job_id, self.galaxy_id);
                if let Ok(Some(job)) = self.engine.store.get_job(&self.job_id).await {
                    self.engine
                        .observer
                        .on_progress(&JobProgress::from_job(&job))
                        .await;
                }
            }
            Err(GalaxyError::JobCancelled { .. }) => {
                info!("Job {} cancelled during {}", self.job_id, self.phase);
                self.abort(JobState::Cancelled, None).await;
            }
            Err(err) => {
                let (phase, cause) = match err.in_phase(self.phase) {
                    GalaxyError::GenerationFailed { phase, cause } => (phase, cause),
                    other => (self.phase, other.to_string()),
                };
                self.phase = phase;
                error!("Job {} failed during {}: {}", self.job_id, phase, cause);
                self.abort(JobState::Failed, Some(format!("{}: {}", phase, cause)))
                    .await;
            }
        }
    }

    async fn abort(&self, state: JobState, error: Option<String>) {
        match rollback_job(
            self.engine.store.as_ref(),
            self.engine.features.as_ref(),
            &self.job_id,
        )
        .await
        {
            Ok(counts) => info!(
                "Rolled back job {}: {} structural rows removed",
                self.job_id,
                counts.structural()
            ),
            Err(err) => error!("{:#}", err),
        }

        let update = JobUpdate {
            phase: Some(self.phase),
            state: Some(state),
            progress_percentage: None,
            error,
        };
        match self.engine.store.update_job(&self.job_id, &update).await {
            Ok(Some(job)) => {
                self.engine
                    .observer
                    .on_progress(&JobProgress::from_job(&job))
                    .await
            }
            Ok(None) => warn!("Job {} disappeared before it could be closed", self.job_id),
            Err(err) => error!("Failed to close job {}: {:#}", self.job_id, err),
        }
    }
}
