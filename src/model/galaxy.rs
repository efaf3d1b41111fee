use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    generate_id, Cluster, GalaxyBlueprint, Id, Region, RegionDistribution, Sector, WarpTunnel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Draft,
    Complete,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Draft => "DRAFT",
            GenerationStatus::Complete => "COMPLETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(GenerationStatus::Draft),
            "COMPLETE" => Some(GenerationStatus::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GalaxyStatistics {
    pub total_sectors: u32,
    pub port_count: u32,
    pub planet_count: u32,
    pub warp_tunnel_count: u32,
    pub cluster_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    pub id: Id,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub region_distribution: RegionDistribution,
    pub generation_config: GalaxyBlueprint,
    pub generation_status: GenerationStatus,
    /// Requested sector count, including every committed expansion.
    pub total_sectors: u32,
    pub statistics: GalaxyStatistics,
}

impl Galaxy {
    pub fn new_draft(
        name: String,
        total_sectors: u32,
        region_distribution: RegionDistribution,
        generation_config: GalaxyBlueprint,
    ) -> Self {
        Self {
            id: generate_id(),
            name,
            created_at: Utc::now(),
            region_distribution,
            generation_config,
            generation_status: GenerationStatus::Draft,
            total_sectors,
            statistics: GalaxyStatistics::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.generation_status == GenerationStatus::Complete
    }
}

/// The committed structure of one galaxy, loaded for expansion and navigation.
#[derive(Debug, Clone, Default)]
pub struct GalaxySnapshot {
    pub regions: Vec<Region>,
    pub clusters: Vec<Cluster>,
    pub sectors: Vec<Sector>,
    pub tunnels: Vec<WarpTunnel>,
}

impl GalaxySnapshot {
    pub fn max_sector_number(&self) -> i32 {
        self.sectors
            .iter()
            .map(|sector| sector.sector_number)
            .max()
            .unwrap_or(0)
    }

    pub fn statistics(&self) -> GalaxyStatistics {
        GalaxyStatistics {
            total_sectors: self.sectors.len() as u32,
            port_count: self.sectors.iter().filter(|s| s.has_port).count() as u32,
            planet_count: self.sectors.iter().filter(|s| s.has_planet).count() as u32,
            warp_tunnel_count: self.tunnels.len() as u32,
            cluster_count: self.clusters.len() as u32,
        }
    }
}
