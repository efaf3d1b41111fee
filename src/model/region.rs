use serde::{Deserialize, Serialize};

use crate::model::{generate_id, BoundingBox, ClusterType, Id, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Core,
    Border,
    Frontier,
    Unaligned,
}

impl RegionKind {
    /// Kind implied by a region's declared name.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "core" | "federation" => RegionKind::Core,
            "border" => RegionKind::Border,
            "frontier" => RegionKind::Frontier,
            _ => RegionKind::Unaligned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::Core => "core",
            RegionKind::Border => "border",
            RegionKind::Frontier => "frontier",
            RegionKind::Unaligned => "unaligned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "core" => Some(RegionKind::Core),
            "border" => Some(RegionKind::Border),
            "frontier" => Some(RegionKind::Frontier),
            "unaligned" => Some(RegionKind::Unaligned),
            _ => None,
        }
    }

    pub fn security_level(&self) -> f64 {
        match self {
            RegionKind::Core => 0.9,
            RegionKind::Border => 0.5,
            RegionKind::Frontier => 0.2,
            RegionKind::Unaligned => 0.35,
        }
    }

    pub fn controlling_faction(&self) -> Option<&'static str> {
        match self {
            RegionKind::Core => Some("terran_federation"),
            RegionKind::Border => Some("mercantile_guild"),
            RegionKind::Frontier => Some("frontier_coalition"),
            RegionKind::Unaligned => None,
        }
    }

    /// Stability range used for tunnels touching this region when nothing overrides it.
    pub fn default_stability(&self) -> Range<f64> {
        match self {
            RegionKind::Core => Range::new(0.85, 1.0),
            RegionKind::Border => Range::new(0.65, 0.95),
            RegionKind::Frontier => Range::new(0.5, 0.8),
            RegionKind::Unaligned => Range::new(0.5, 0.9),
        }
    }

    pub fn cluster_types(&self) -> &'static [ClusterType] {
        match self {
            RegionKind::Core => &[
                ClusterType::PopulationCenter,
                ClusterType::TradeHub,
                ClusterType::Standard,
            ],
            RegionKind::Border => &[
                ClusterType::TradeHub,
                ClusterType::ResourceRich,
                ClusterType::MilitaryZone,
                ClusterType::Contested,
                ClusterType::Standard,
            ],
            RegionKind::Frontier | RegionKind::Unaligned => &[
                ClusterType::FrontierOutpost,
                ClusterType::ResourceRich,
                ClusterType::SpecialInterest,
                ClusterType::Contested,
                ClusterType::Standard,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Id,
    pub galaxy_id: Id,
    pub name: String,
    pub kind: RegionKind,
    /// Declared percentage share of the galaxy.
    pub ratio: u32,
    pub target_sector_count: u32,
    pub security_level: f64,
    pub controlling_faction: Option<String>,
    pub bounds: BoundingBox,
}

impl Region {
    pub fn new(galaxy_id: Id, name: String, ratio: u32, target_sector_count: u32, bounds: BoundingBox) -> Self {
        let kind = RegionKind::from_name(&name);
        Self {
            id: generate_id(),
            galaxy_id,
            name,
            kind,
            ratio,
            target_sector_count,
            security_level: kind.security_level(),
            controlling_faction: kind.controlling_faction().map(str::to_string),
            bounds,
        }
    }
}
