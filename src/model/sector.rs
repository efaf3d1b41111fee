use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Coordinates, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorType {
    Normal,
    Nebula,
    BlackHole,
    AsteroidField,
}

impl SectorType {
    pub const ALL: [SectorType; 4] = [
        SectorType::Normal,
        SectorType::AsteroidField,
        SectorType::Nebula,
        SectorType::BlackHole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectorType::Normal => "normal",
            SectorType::Nebula => "nebula",
            SectorType::BlackHole => "black_hole",
            SectorType::AsteroidField => "asteroid_field",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(SectorType::Normal),
            "nebula" => Some(SectorType::Nebula),
            "black_hole" => Some(SectorType::BlackHole),
            "asteroid_field" => Some(SectorType::AsteroidField),
            _ => None,
        }
    }

    /// Hazard before jitter.
    pub fn base_hazard(&self) -> i32 {
        match self {
            SectorType::Normal => 1,
            SectorType::AsteroidField => 5,
            SectorType::Nebula => 5,
            SectorType::BlackHole => 9,
        }
    }

    /// Planet type handed to the planet factory.
    pub fn planet_hint(&self) -> &'static str {
        match self {
            SectorType::Normal => "terran",
            SectorType::AsteroidField => "barren",
            SectorType::Nebula => "gas_giant",
            SectorType::BlackHole => "volcanic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRichness {
    Poor,
    Average,
    Rich,
    Abundant,
}

impl ResourceRichness {
    pub const ALL: [ResourceRichness; 4] = [
        ResourceRichness::Poor,
        ResourceRichness::Average,
        ResourceRichness::Rich,
        ResourceRichness::Abundant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceRichness::Poor => "poor",
            ResourceRichness::Average => "average",
            ResourceRichness::Rich => "rich",
            ResourceRichness::Abundant => "abundant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "poor" => Some(ResourceRichness::Poor),
            "average" => Some(ResourceRichness::Average),
            "rich" => Some(ResourceRichness::Rich),
            "abundant" => Some(ResourceRichness::Abundant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: Id,
    pub galaxy_id: Id,
    pub region_id: Id,
    pub cluster_id: Id,
    pub sector_number: i32,
    pub name: String,
    pub coordinates: Coordinates,
    pub sector_type: SectorType,
    pub hazard_level: u8,
    pub resource_richness: ResourceRichness,
    pub has_port: bool,
    pub has_planet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planet_id: Option<Id>,
}

impl Sector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        galaxy_id: Id,
        region_id: Id,
        cluster_id: Id,
        sector_number: i32,
        coordinates: Coordinates,
        sector_type: SectorType,
        hazard_level: u8,
        resource_richness: ResourceRichness,
    ) -> Self {
        Self {
            id: generate_id(),
            galaxy_id,
            region_id,
            cluster_id,
            sector_number,
            name: format!("Sector {}", sector_number),
            coordinates,
            sector_type,
            hazard_level,
            resource_richness,
            has_port: false,
            has_planet: false,
            port_id: None,
            planet_id: None,
        }
    }
}

/// Feature references recorded on a sector after the factories answered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectorFeatures {
    pub sector_id: Id,
    pub port_id: Option<Id>,
    pub planet_id: Option<Id>,
}
