pub mod allocate;
pub mod connectivity;
pub mod expand;
pub mod features;
pub mod jobs;
pub mod mutate;
pub mod navigation;
pub mod partition;
pub mod reaper;
pub mod synthesize;
pub mod validate;

pub use allocate::{RegionAllocation, RegionAllocator};
pub use connectivity::{
    verify_connected, verify_tunnels, ConnectivityBuilder, ConnectivityPlan, SectorNode,
    StabilityPolicy, UnionFind,
};
pub use expand::IncrementalExpander;
pub use features::{FeatureAttacher, FeatureDensity, FeaturePlacement};
pub use jobs::{
    GalaxyEngine, GalaxyGuard, GalaxyLocks, GenerationTicket, JobObserver, LoggingObserver,
};
pub use mutate::{ClearReport, DEFAULT_MANUAL_STABILITY};
pub use navigation::bfs_path;
pub use partition::{ClusterPartitioner, ClusterPlan, RegionPlan};
pub use reaper::{spawn_reaper, JobReaper, ReapReport};
pub use synthesize::SectorSynthesizer;
pub use validate::{ConfigValidator, ValidatedConfig};
