use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{Range, ResourceRichness};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceDistribution {
    #[default]
    Balanced,
    Clustered,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardLevels {
    Low,
    #[default]
    Moderate,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Sparse,
    #[default]
    Normal,
    Dense,
}

impl Connectivity {
    /// Preferred number of sectors per cluster. Denser graphs use smaller clusters.
    pub fn target_cluster_size(&self) -> u32 {
        match self {
            Connectivity::Sparse => 16,
            Connectivity::Normal => 10,
            Connectivity::Dense => 6,
        }
    }

    /// Share of the sector count added as extra tunnels on top of the spanning tree.
    pub fn extra_edge_ratio(&self) -> (f64, f64) {
        match self {
            Connectivity::Sparse => (0.0, 0.05),
            Connectivity::Normal => (0.10, 0.20),
            Connectivity::Dense => (0.30, 0.50),
        }
    }
}

/// Region name → percentage share, kept in declaration order.
///
/// Declaration order matters: the allocator breaks remainder ties with it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionDistribution {
    entries: Vec<(String, u32)>,
}

impl RegionDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a region. Returns false when the name was already declared.
    pub fn push(&mut self, name: impl Into<String>, percentage: u32) -> bool {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return false;
        }
        self.entries.push((name, percentage));
        true
    }

    pub fn with(mut self, name: impl Into<String>, percentage: u32) -> Self {
        self.push(name, percentage);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(name, pct)| (name.as_str(), *pct))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, pct)| *pct)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, pct)| *pct as u64).sum()
    }

    /// Standard three-region layout: federation / border / frontier.
    pub fn standard(federation_share: u32) -> Self {
        let frontier = 100i64 - federation_share as i64 - 35;
        Self::new()
            .with("federation", federation_share)
            .with("border", 35)
            .with("frontier", frontier.max(0) as u32)
    }
}

impl Serialize for RegionDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, pct) in &self.entries {
            map.serialize_entry(name, pct)?;
        }
        map.end()
    }
}

struct RegionDistributionVisitor;

impl<'de> Visitor<'de> for RegionDistributionVisitor {
    type Value = RegionDistribution;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of region name to integer percentage")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut distribution = RegionDistribution::new();
        while let Some((name, pct)) = access.next_entry::<String, u32>()? {
            if !distribution.push(name.clone(), pct) {
                return Err(serde::de::Error::custom(format!(
                    "region '{}' declared twice",
                    name
                )));
            }
        }
        Ok(distribution)
    }
}

impl<'de> Deserialize<'de> for RegionDistribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RegionDistributionVisitor)
    }
}

fn default_port_density() -> f64 {
    0.15
}

fn default_planet_density() -> f64 {
    0.25
}

fn default_warp_tunnel_probability() -> f64 {
    0.1
}

/// Declarative generation settings accepted by `generate` and `add_sectors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_distribution: Option<RegionDistribution>,
    #[serde(default)]
    pub resource_distribution: ResourceDistribution,
    #[serde(default)]
    pub hazard_levels: HazardLevels,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default = "default_port_density")]
    pub port_density: f64,
    #[serde(default = "default_planet_density")]
    pub planet_density: f64,
    #[serde(default = "default_warp_tunnel_probability")]
    pub warp_tunnel_probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_territory_size: Option<u32>,
    /// Tunnel stability bounds. Each region kind has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_range: Option<Range<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            region_distribution: None,
            resource_distribution: ResourceDistribution::default(),
            hazard_levels: HazardLevels::default(),
            connectivity: Connectivity::default(),
            port_density: default_port_density(),
            planet_density: default_planet_density(),
            warp_tunnel_probability: default_warp_tunnel_probability(),
            faction_territory_size: None,
            stability_range: None,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn with_distribution(mut self, distribution: RegionDistribution) -> Self {
        self.region_distribution = Some(distribution);
        self
    }

    /// The distribution that will actually be used: explicit ratios, then the
    /// faction territory layout, then the 25/35/40 default.
    pub fn effective_distribution(&self) -> RegionDistribution {
        if let Some(distribution) = &self.region_distribution {
            return distribution.clone();
        }
        RegionDistribution::standard(self.faction_territory_size.unwrap_or(25))
    }
}

/// Per-region tuning applied on top of the galaxy-wide config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazard: Option<Range<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub richness: Option<Range<ResourceRichness>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<Range<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_density: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planet_density: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedGalaxyConfig {
    pub name: String,
    pub total_sectors: u32,
    #[serde(default)]
    pub config: GenerationConfig,
    #[serde(default)]
    pub region_overrides: BTreeMap<String, RegionOverride>,
}

/// Everything persisted on the galaxy row describing how it was built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GalaxyBlueprint {
    pub config: GenerationConfig,
    #[serde(default)]
    pub region_overrides: BTreeMap<String, RegionOverride>,
}

impl GalaxyBlueprint {
    pub fn override_for(&self, region_name: &str) -> Option<&RegionOverride> {
        self.region_overrides.get(region_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_distribution_keeps_declaration_order() {
        let json = r#"{"core": 50, "border": 30, "frontier": 20}"#;
        let distribution: RegionDistribution = serde_json::from_str(json).unwrap();

        let names: Vec<&str> = distribution.names().collect();
        assert_eq!(names, vec!["core", "border", "frontier"]);
        assert_eq!(distribution.total(), 100);
    }

    #[test]
    fn test_region_distribution_rejects_duplicates() {
        let json = r#"{"core": 50, "core": 50}"#;
        assert!(serde_json::from_str::<RegionDistribution>(json).is_err());
    }

    #[test]
    fn test_generation_config_defaults() {
        let config: GenerationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.connectivity, Connectivity::Normal);
        assert_eq!(config.port_density, 0.15);

        let distribution = config.effective_distribution();
        assert_eq!(distribution.get("federation"), Some(25));
        assert_eq!(distribution.get("border"), Some(35));
        assert_eq!(distribution.get("frontier"), Some(40));
    }

    #[test]
    fn test_faction_territory_size_sets_federation_share() {
        let config = GenerationConfig {
            faction_territory_size: Some(40),
            ..GenerationConfig::default()
        };
        let distribution = config.effective_distribution();
        assert_eq!(distribution.get("federation"), Some(40));
        assert_eq!(distribution.get("frontier"), Some(25));
    }
}
