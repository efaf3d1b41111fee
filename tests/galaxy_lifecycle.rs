use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use galaxy_forge::collaborators::{FeatureFactory, OccupancyLookup};
use galaxy_forge::config::GenerationSettings;
use galaxy_forge::logic::{verify_tunnels, GalaxyEngine, JobObserver};
use galaxy_forge::model::{
    Connectivity, EnhancedGalaxyConfig, GenerationConfig, GenerationPhase, GenerationStatus, Id,
    JobProgress, JobState, Range, RegionDistribution, RegionOverride, SectorFilter, TunnelKind,
};
use galaxy_forge::store::{GalaxyStore, InMemoryStore, JobStore, NavigationStore};
use galaxy_forge::GalaxyError;

const WAIT: Duration = Duration::from_secs(10);

fn settings(chunk_size: usize) -> GenerationSettings {
    GenerationSettings {
        chunk_size,
        ..GenerationSettings::default()
    }
}

fn three_regions() -> GenerationConfig {
    GenerationConfig {
        seed: Some(42),
        ..GenerationConfig::default()
    }
    .with_distribution(
        RegionDistribution::new()
            .with("core", 50)
            .with("border", 30)
            .with("frontier", 20),
    )
}

async fn generated(engine: &GalaxyEngine<InMemoryStore>, num_sectors: u32) -> Id {
    let ticket = engine
        .generate("Andromeda", num_sectors, three_regions())
        .await
        .unwrap();
    let job = engine.await_job(&ticket.job_id, WAIT).await.unwrap();
    assert_eq!(job.state, JobState::Completed, "job error: {:?}", job.error);
    ticket.galaxy_id
}

async fn region_sector_counts(engine: &GalaxyEngine<InMemoryStore>, galaxy_id: &Id) -> Vec<(String, usize)> {
    let mut counts = Vec::new();
    for region in engine.list_regions(galaxy_id).await.unwrap() {
        let filter = SectorFilter {
            region_id: Some(region.id.clone()),
            ..SectorFilter::default()
        };
        let page = engine.list_sectors(galaxy_id, &filter).await.unwrap();
        counts.push((region.name, page.total));
    }
    counts
}

async fn assert_connected(store: &InMemoryStore, galaxy_id: &Id) {
    let snapshot = store.load_snapshot(galaxy_id).await.unwrap();
    let ids: Vec<Id> = snapshot.sectors.iter().map(|s| s.id.clone()).collect();
    verify_tunnels(&ids, &snapshot.tunnels).unwrap();
}

#[tokio::test]
async fn test_generate_allocates_regions_and_connects_every_sector() {
    let store = InMemoryStore::new();
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500));

    let galaxy_id = generated(&engine, 20).await;

    let galaxy = engine.get_galaxy(&galaxy_id).await.unwrap();
    assert_eq!(galaxy.generation_status, GenerationStatus::Complete);
    assert_eq!(galaxy.total_sectors, 20);
    assert_eq!(galaxy.statistics.total_sectors, 20);
    assert!(galaxy.statistics.warp_tunnel_count >= 19);

    let counts = region_sector_counts(&engine, &galaxy_id).await;
    assert_eq!(
        counts,
        vec![
            ("core".to_string(), 10),
            ("border".to_string(), 6),
            ("frontier".to_string(), 4),
        ]
    );

    let numbers: HashSet<i32> = engine
        .list_sectors(&galaxy_id, &SectorFilter::default())
        .await
        .unwrap()
        .items
        .iter()
        .map(|s| s.sector_number)
        .collect();
    assert_eq!(numbers, (1..=20).collect::<HashSet<i32>>());

    assert_connected(&store, &galaxy_id).await;
}

#[tokio::test]
async fn test_add_sectors_to_named_region() {
    let store = InMemoryStore::new();
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500));
    let galaxy_id = generated(&engine, 20).await;

    let job_id = engine
        .add_sectors(&galaxy_id, 5, Some("border"), None)
        .await
        .unwrap();
    let job = engine.await_job(&job_id, WAIT).await.unwrap();
    assert_eq!(job.state, JobState::Completed, "job error: {:?}", job.error);

    let counts = region_sector_counts(&engine, &galaxy_id).await;
    assert_eq!(counts[0], ("core".to_string(), 10));
    assert_eq!(counts[1], ("border".to_string(), 11));
    assert_eq!(counts[2], ("frontier".to_string(), 4));

    let galaxy = engine.get_galaxy(&galaxy_id).await.unwrap();
    assert_eq!(galaxy.total_sectors, 25);
    assert_eq!(galaxy.statistics.total_sectors, 25);

    for number in 21..=25 {
        let sector = engine.get_sector(&galaxy_id, number).await.unwrap();
        assert_eq!(sector.region_id, engine.list_regions(&galaxy_id).await.unwrap()[1].id);
    }
    assert_connected(&store, &galaxy_id).await;
}

#[tokio::test]
async fn test_add_sectors_rejects_unknown_region_and_missing_galaxy() {
    let engine = GalaxyEngine::new(Arc::new(InMemoryStore::new()), settings(500));
    let galaxy_id = generated(&engine, 20).await;

    let err = engine
        .add_sectors(&galaxy_id, 5, Some("nowhere"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GalaxyError::Config(_)));

    let err = engine
        .add_sectors(&"missing".to_string(), 5, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GalaxyError::NotFound { .. }));
}

struct CancelDuring {
    store: InMemoryStore,
    phase: GenerationPhase,
}

#[async_trait::async_trait]
impl JobObserver for CancelDuring {
    async fn on_progress(&self, progress: &JobProgress) {
        if progress.phase == self.phase && progress.state == JobState::Running {
            self.store.request_cancel(&progress.job_id).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_cancel_rolls_back_every_row() {
    let store = InMemoryStore::new();
    let observer = CancelDuring {
        store: store.clone(),
        phase: GenerationPhase::BuildingConnectivity,
    };
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(5))
        .with_observer(Arc::new(observer));

    let ticket = engine
        .generate("Doomed", 20, three_regions())
        .await
        .unwrap();
    let job = engine.await_job(&ticket.job_id, WAIT).await.unwrap();

    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.phase, GenerationPhase::BuildingConnectivity);
    assert_eq!(store.structural_row_count(&ticket.galaxy_id).await, 0);
    assert!(matches!(
        engine.get_galaxy(&ticket.galaxy_id).await,
        Err(GalaxyError::NotFound { .. })
    ));
}

struct FirstSectorOccupied;

#[async_trait::async_trait]
impl OccupancyLookup for FirstSectorOccupied {
    async fn occupied_sectors(&self, sector_ids: &[Id]) -> anyhow::Result<Vec<Id>> {
        Ok(sector_ids.iter().take(1).cloned().collect())
    }
}

#[tokio::test]
async fn test_clear_galaxy_respects_occupancy_unless_forced() {
    let store = InMemoryStore::new();
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500))
        .with_occupancy(Arc::new(FirstSectorOccupied));
    let galaxy_id = generated(&engine, 20).await;

    let err = engine.clear_galaxy(&galaxy_id, false).await.unwrap_err();
    match err {
        GalaxyError::DependencyConflict { occupied_sectors } => {
            assert_eq!(occupied_sectors.len(), 1)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.structural_row_count(&galaxy_id).await > 0);

    let report = engine.clear_galaxy(&galaxy_id, true).await.unwrap();
    assert_eq!(report.forced_sectors.len(), 1);
    assert_eq!(report.removed.sectors, 20);
    assert_eq!(store.structural_row_count(&galaxy_id).await, 0);
    assert!(engine.list_jobs(&galaxy_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_structural_operations_are_exclusive_per_galaxy() {
    let engine = GalaxyEngine::new(Arc::new(InMemoryStore::new()), settings(500));
    let galaxy_id = generated(&engine, 20).await;

    let guard = engine.locks().try_acquire(&galaxy_id).unwrap();
    let err = engine
        .add_sectors(&galaxy_id, 5, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GalaxyError::ConcurrentGeneration { .. }));
    let err = engine.clear_galaxy(&galaxy_id, false).await.unwrap_err();
    assert!(matches!(err, GalaxyError::ConcurrentGeneration { .. }));

    drop(guard);
    assert!(engine.clear_galaxy(&galaxy_id, false).await.is_ok());
}

#[tokio::test]
async fn test_invalid_config_persists_nothing() {
    let engine = GalaxyEngine::new(Arc::new(InMemoryStore::new()), settings(500));
    let config = GenerationConfig::default().with_distribution(
        RegionDistribution::new()
            .with("core", 50)
            .with("border", 30)
            .with("frontier", 10),
    );

    let err = engine.generate("Broken", 20, config).await.unwrap_err();
    match err {
        GalaxyError::Config(errors) => assert!(errors.has_field("region_distribution")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(engine.list_galaxies().await.unwrap().is_empty());
    assert!(engine.store().list_draft_galaxies().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dense_galaxies_carry_more_tunnels_than_sparse() {
    let engine = GalaxyEngine::new(Arc::new(InMemoryStore::new()), settings(500));

    let mut tunnel_counts = Vec::new();
    for (name, connectivity) in [("Sparse", Connectivity::Sparse), ("Dense", Connectivity::Dense)] {
        let config = GenerationConfig {
            connectivity,
            ..three_regions()
        };
        let ticket = engine.generate(name, 200, config).await.unwrap();
        let job = engine.await_job(&ticket.job_id, WAIT).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        let galaxy = engine.get_galaxy(&ticket.galaxy_id).await.unwrap();
        tunnel_counts.push(galaxy.statistics.warp_tunnel_count);
    }

    assert!(tunnel_counts[0] >= 199);
    assert!(tunnel_counts[0] < tunnel_counts[1]);
}

#[tokio::test]
async fn test_manual_tunnels_and_navigation() {
    let engine = GalaxyEngine::new(Arc::new(InMemoryStore::new()), settings(500));
    let galaxy_id = generated(&engine, 20).await;

    let first = engine.get_sector(&galaxy_id, 1).await.unwrap();
    let neighbours = engine.adjacent_sectors(&galaxy_id, 1).await.unwrap();
    assert!(!neighbours.is_empty());

    let err = engine
        .create_warp_tunnel(&galaxy_id, &first.id, &first.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GalaxyError::InvalidTunnel(_)));

    // Reversed endpoints still name the same tunnel.
    let err = engine
        .create_warp_tunnel(&galaxy_id, &neighbours[0].id, &first.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GalaxyError::DuplicateTunnel { .. }));

    let neighbour_ids: HashSet<&Id> = neighbours.iter().map(|s| &s.id).collect();
    let stranger = engine
        .list_sectors(&galaxy_id, &SectorFilter::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .find(|s| s.id != first.id && !neighbour_ids.contains(&s.id))
        .unwrap();

    let before = engine.get_galaxy(&galaxy_id).await.unwrap().statistics;
    let tunnel = engine
        .create_warp_tunnel(&galaxy_id, &first.id, &stranger.id, None)
        .await
        .unwrap();
    assert_eq!(tunnel.stability, 0.75);
    assert_eq!(tunnel.kind, TunnelKind::Artificial);
    let after = engine.get_galaxy(&galaxy_id).await.unwrap().statistics;
    assert_eq!(after.warp_tunnel_count, before.warp_tunnel_count + 1);

    let path = engine
        .shortest_path(&galaxy_id, 1, stranger.sector_number)
        .await
        .unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].id, first.id);
    assert_eq!(path[1].id, stranger.id);
}

#[tokio::test]
async fn test_add_sectors_without_region_follows_declared_ratios() {
    let store = InMemoryStore::new();
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500));
    let galaxy_id = generated(&engine, 20).await;

    let job_id = engine.add_sectors(&galaxy_id, 10, None, None).await.unwrap();
    let job = engine.await_job(&job_id, WAIT).await.unwrap();
    assert_eq!(job.state, JobState::Completed, "job error: {:?}", job.error);

    let counts = region_sector_counts(&engine, &galaxy_id).await;
    assert_eq!(
        counts,
        vec![
            ("core".to_string(), 15),
            ("border".to_string(), 9),
            ("frontier".to_string(), 6),
        ]
    );

    let galaxy = engine.get_galaxy(&galaxy_id).await.unwrap();
    assert_eq!(galaxy.total_sectors, 30);
    assert_eq!(galaxy.statistics.total_sectors, 30);
    assert_connected(&store, &galaxy_id).await;
}

#[tokio::test]
async fn test_enhanced_overrides_shape_region() {
    let store = InMemoryStore::new();
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500));

    let core = RegionOverride {
        hazard: Some(Range::new(0, 2)),
        stability: Some(Range::new(0.1, 0.2)),
        port_density: Some(1.0),
        ..RegionOverride::default()
    };
    let mut region_overrides = BTreeMap::new();
    region_overrides.insert("core".to_string(), core.clone());
    let request = EnhancedGalaxyConfig {
        name: "Shaped".to_string(),
        total_sectors: 40,
        config: three_regions(),
        region_overrides,
    };

    let ticket = engine.generate_enhanced(request).await.unwrap();
    let job = engine.await_job(&ticket.job_id, WAIT).await.unwrap();
    assert_eq!(job.state, JobState::Completed, "job error: {:?}", job.error);

    let regions = engine.list_regions(&ticket.galaxy_id).await.unwrap();
    let core_id = regions.iter().find(|r| r.name == "core").unwrap().id.clone();

    let snapshot = store.load_snapshot(&ticket.galaxy_id).await.unwrap();
    let core_sectors: Vec<_> = snapshot
        .sectors
        .iter()
        .filter(|s| s.region_id == core_id)
        .collect();
    assert_eq!(core_sectors.len(), 20);
    assert!(core_sectors.iter().all(|s| s.hazard_level <= 2));
    assert!(core_sectors.iter().all(|s| s.has_port && s.port_id.is_some()));

    let core_ids: HashSet<&Id> = core_sectors.iter().map(|s| &s.id).collect();
    let internal: Vec<_> = snapshot
        .tunnels
        .iter()
        .filter(|t| core_ids.contains(&t.source_sector_id) && core_ids.contains(&t.target_sector_id))
        .collect();
    assert!(!internal.is_empty());
    for tunnel in internal {
        assert!(
            (0.1..=0.2).contains(&tunnel.stability),
            "core tunnel stability {} outside override",
            tunnel.stability
        );
    }

    let galaxy = engine.get_galaxy(&ticket.galaxy_id).await.unwrap();
    assert_eq!(galaxy.generation_config.region_overrides.get("core"), Some(&core));
}

#[derive(Default)]
struct PortsRefused {
    removals: AtomicUsize,
}

#[async_trait::async_trait]
impl FeatureFactory for PortsRefused {
    async fn create_port(&self, _sector_id: &Id, _class_hint: &str) -> anyhow::Result<Id> {
        Err(anyhow::anyhow!("port authority unavailable"))
    }

    async fn create_planet(&self, sector_id: &Id, _type_hint: &str) -> anyhow::Result<Id> {
        Ok(format!("planet-{}", sector_id))
    }

    async fn remove_features(&self, _sector_ids: &[Id]) -> anyhow::Result<()> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_feature_factory_failure_rolls_back_generation() {
    let store = InMemoryStore::new();
    let factory = Arc::new(PortsRefused::default());
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500))
        .with_feature_factory(factory.clone());

    let config = GenerationConfig {
        port_density: 1.0,
        ..three_regions()
    };
    let ticket = engine.generate("Portless", 20, config).await.unwrap();
    let job = engine.await_job(&ticket.job_id, WAIT).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.phase, GenerationPhase::AttachingFeatures);
    let error = job.error.unwrap_or_default();
    assert!(error.contains("port authority unavailable"), "error: {}", error);

    assert_eq!(store.structural_row_count(&ticket.galaxy_id).await, 0);
    assert!(factory.removals.load(Ordering::SeqCst) >= 1);
}

struct ListDuring {
    viewer: GalaxyEngine<InMemoryStore>,
    store: InMemoryStore,
    seen: parking_lot::Mutex<Option<(usize, usize)>>,
}

#[async_trait::async_trait]
impl JobObserver for ListDuring {
    async fn on_progress(&self, progress: &JobProgress) {
        if progress.phase != GenerationPhase::BuildingConnectivity
            || progress.state != JobState::Running
            || self.seen.lock().is_some()
        {
            return;
        }
        let listed = self.viewer.list_galaxies().await.unwrap().len();
        let stored = self.store.list_galaxies().await.unwrap().len();
        *self.seen.lock() = Some((listed, stored));
    }
}

#[tokio::test]
async fn test_list_galaxies_hides_drafts() {
    let store = InMemoryStore::new();
    let observer = Arc::new(ListDuring {
        viewer: GalaxyEngine::new(Arc::new(store.clone()), settings(500)),
        store: store.clone(),
        seen: parking_lot::Mutex::new(None),
    });
    let engine = GalaxyEngine::new(Arc::new(store.clone()), settings(500))
        .with_observer(observer.clone());

    let galaxy_id = generated(&engine, 20).await;

    // While building, the draft exists but is not listed.
    assert_eq!(*observer.seen.lock(), Some((0, 1)));

    let listed = engine.list_galaxies().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, galaxy_id);
    assert_eq!(listed[0].generation_status, GenerationStatus::Complete);
}
