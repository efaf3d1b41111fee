use serde::{Deserialize, Serialize};

use crate::model::{generate_id, BoundingBox, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    PopulationCenter,
    TradeHub,
    ResourceRich,
    MilitaryZone,
    FrontierOutpost,
    Contested,
    SpecialInterest,
    Standard,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::PopulationCenter => "population_center",
            ClusterType::TradeHub => "trade_hub",
            ClusterType::ResourceRich => "resource_rich",
            ClusterType::MilitaryZone => "military_zone",
            ClusterType::FrontierOutpost => "frontier_outpost",
            ClusterType::Contested => "contested",
            ClusterType::SpecialInterest => "special_interest",
            ClusterType::Standard => "standard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "population_center" => Some(ClusterType::PopulationCenter),
            "trade_hub" => Some(ClusterType::TradeHub),
            "resource_rich" => Some(ClusterType::ResourceRich),
            "military_zone" => Some(ClusterType::MilitaryZone),
            "frontier_outpost" => Some(ClusterType::FrontierOutpost),
            "contested" => Some(ClusterType::Contested),
            "special_interest" => Some(ClusterType::SpecialInterest),
            "standard" => Some(ClusterType::Standard),
            _ => None,
        }
    }

    /// Port classes that fit this cluster, first one preferred.
    pub fn port_classes(&self) -> &'static [&'static str] {
        match self {
            ClusterType::PopulationCenter => &["trading", "corporate", "diplomatic"],
            ClusterType::TradeHub => &["trading", "corporate"],
            ClusterType::ResourceRich => &["mining", "industrial", "outpost"],
            ClusterType::SpecialInterest => &["scientific", "outpost"],
            ClusterType::MilitaryZone => &["military", "shipyard"],
            ClusterType::FrontierOutpost => &["outpost", "black_market"],
            ClusterType::Contested => &["trading", "outpost", "black_market"],
            ClusterType::Standard => &["trading", "outpost"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Id,
    pub galaxy_id: Id,
    pub region_id: Id,
    pub name: String,
    pub cluster_type: ClusterType,
    pub bounds: BoundingBox,
    pub target_sector_count: u32,
    /// Committed sectors currently in the cluster.
    pub sector_count: u32,
}

impl Cluster {
    pub fn new(
        galaxy_id: Id,
        region_id: Id,
        name: String,
        cluster_type: ClusterType,
        bounds: BoundingBox,
        target_sector_count: u32,
    ) -> Self {
        Self {
            id: generate_id(),
            galaxy_id,
            region_id,
            name,
            cluster_type,
            bounds,
            target_sector_count,
            sector_count: target_sector_count,
        }
    }
}

/// Spreadsheet-style suffix: 0 → A, 25 → Z, 26 → AA, 27 → AB.
pub fn cluster_suffix(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn cluster_name(region_name: &str, index: usize) -> String {
    let mut chars = region_name.chars();
    let title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{} Cluster {}", title, cluster_suffix(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_suffix_wraps_past_z() {
        assert_eq!(cluster_suffix(0), "A");
        assert_eq!(cluster_suffix(25), "Z");
        assert_eq!(cluster_suffix(26), "AA");
        assert_eq!(cluster_suffix(27), "AB");
        assert_eq!(cluster_suffix(51), "AZ");
        assert_eq!(cluster_suffix(52), "BA");
    }

    #[test]
    fn test_cluster_name() {
        assert_eq!(cluster_name("border", 1), "Border Cluster B");
    }
}
