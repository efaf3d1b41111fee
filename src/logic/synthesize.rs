use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::model::{
    Cluster, ClusterType, Coordinates, GenerationConfig, HazardLevels, Range, RegionOverride,
    ResourceDistribution, ResourceRichness, Sector, SectorType,
};

/// Random placements tried before scanning the block for a free cell.
const PLACEMENT_ATTEMPTS: usize = 32;

/// Chance that a clustered draw copies a neighbour instead of rolling fresh.
const NEIGHBOUR_COPY_PROBABILITY: f64 = 0.7;

/// Type weights (normal, asteroid field, nebula, black hole) per hazard policy.
fn type_weights(hazard_levels: HazardLevels) -> [u32; 4] {
    match hazard_levels {
        HazardLevels::Low => [80, 12, 6, 2],
        HazardLevels::Moderate => [65, 15, 14, 6],
        HazardLevels::High => [50, 16, 22, 12],
        HazardLevels::Extreme => [35, 15, 30, 20],
    }
}

/// Extra type weight a cluster's theme adds on top of the hazard policy.
fn cluster_bias(cluster_type: ClusterType) -> [u32; 4] {
    match cluster_type {
        ClusterType::PopulationCenter | ClusterType::TradeHub | ClusterType::MilitaryZone => {
            [25, 0, 0, 0]
        }
        ClusterType::ResourceRich => [0, 30, 0, 0],
        ClusterType::SpecialInterest => [0, 0, 10, 12],
        ClusterType::FrontierOutpost => [0, 0, 12, 6],
        ClusterType::Contested | ClusterType::Standard => [0, 0, 0, 0],
    }
}

pub struct SectorSynthesizer<'a> {
    config: &'a GenerationConfig,
    rng: &'a mut ChaCha8Rng,
}

impl<'a> SectorSynthesizer<'a> {
    pub fn new(config: &'a GenerationConfig, rng: &'a mut ChaCha8Rng) -> Self {
        Self { config, rng }
    }

    /// Build every sector of one cluster, numbering from `first_number`.
    pub fn synthesize_cluster(
        &mut self,
        cluster: &Cluster,
        region_override: Option<&RegionOverride>,
        first_number: i32,
    ) -> Vec<Sector> {
        let hazard_range = region_override
            .and_then(|o| o.hazard)
            .unwrap_or(Range::new(0, 10));
        let richness_range = region_override
            .and_then(|o| o.richness)
            .unwrap_or(Range::new(ResourceRichness::Poor, ResourceRichness::Abundant));
        let mut tiers: Vec<ResourceRichness> = ResourceRichness::ALL
            .iter()
            .copied()
            .filter(|tier| *tier >= richness_range.min && *tier <= richness_range.max)
            .collect();
        if tiers.is_empty() {
            tiers = ResourceRichness::ALL.to_vec();
        }

        let count = cluster.target_sector_count as usize;
        let mut bag = self.richness_bag(&tiers, count);
        let mut occupied = HashSet::with_capacity(count);
        let mut sectors: Vec<Sector> = Vec::with_capacity(count);

        for i in 0..count {
            let Some(coordinates) = self.place(cluster, &occupied) else {
                break;
            };
            occupied.insert(coordinates);

            let sector_type = self.sample_type(cluster.cluster_type);
            let hazard_level = self.hazard_for(sector_type, &hazard_range);
            let resource_richness = match self.config.resource_distribution {
                ResourceDistribution::Balanced => match bag.pop() {
                    Some(tier) => tier,
                    None => self.uniform_tier(&tiers),
                },
                ResourceDistribution::Random => self.uniform_tier(&tiers),
                ResourceDistribution::Clustered => {
                    self.neighbour_tier(&sectors, &coordinates, &tiers)
                }
            };

            sectors.push(Sector::new(
                cluster.galaxy_id.clone(),
                cluster.region_id.clone(),
                cluster.id.clone(),
                first_number + i as i32,
                coordinates,
                sector_type,
                hazard_level,
                resource_richness,
            ));
        }

        sectors
    }

    fn sample_type(&mut self, cluster_type: ClusterType) -> SectorType {
        let bias = cluster_bias(cluster_type);
        let mut weights = type_weights(self.config.hazard_levels);
        for (weight, extra) in weights.iter_mut().zip(bias) {
            *weight += extra;
        }
        let total: u32 = weights.iter().sum();
        let mut roll = self.rng.gen_range(0..total);
        for (sector_type, weight) in SectorType::ALL.iter().zip(weights) {
            if roll < weight {
                return *sector_type;
            }
            roll -= weight;
        }
        SectorType::Normal
    }

    fn hazard_for(&mut self, sector_type: SectorType, range: &Range<u8>) -> u8 {
        let jitter = self.rng.gen_range(-1..=1);
        let hazard = (sector_type.base_hazard() + jitter).clamp(0, 10) as u8;
        range.clamp(hazard)
    }

    /// Shuffle bag with tier counts differing by at most one.
    fn richness_bag(&mut self, tiers: &[ResourceRichness], count: usize) -> Vec<ResourceRichness> {
        let mut bag: Vec<ResourceRichness> = tiers.iter().copied().cycle().take(count).collect();
        bag.shuffle(self.rng);
        bag
    }

    fn uniform_tier(&mut self, tiers: &[ResourceRichness]) -> ResourceRichness {
        tiers
            .choose(self.rng)
            .copied()
            .unwrap_or(ResourceRichness::Average)
    }

    /// Copy the tier of one of the one or two nearest sectors already placed.
    fn neighbour_tier(
        &mut self,
        placed: &[Sector],
        coordinates: &Coordinates,
        tiers: &[ResourceRichness],
    ) -> ResourceRichness {
        if placed.is_empty() || !self.rng.gen_bool(NEIGHBOUR_COPY_PROBABILITY) {
            return self.uniform_tier(tiers);
        }
        let mut nearest: Vec<&Sector> = placed.iter().collect();
        nearest.sort_by_key(|sector| sector.coordinates.distance_squared(coordinates));
        let window = self.rng.gen_range(1..=2).min(nearest.len());
        let pick = self.rng.gen_range(0..window);
        nearest[pick].resource_richness
    }

    /// Rejection-sample a free cell, then fall back to scanning the block.
    fn place(&mut self, cluster: &Cluster, occupied: &HashSet<Coordinates>) -> Option<Coordinates> {
        let bounds = cluster.bounds;
        if bounds.volume() == 0 {
            return None;
        }
        for _ in 0..PLACEMENT_ATTEMPTS {
            let candidate = Coordinates::new(
                self.rng.gen_range(bounds.min.x..bounds.max.x),
                self.rng.gen_range(bounds.min.y..bounds.max.y),
                self.rng.gen_range(bounds.min.z..bounds.max.z),
            );
            if !occupied.contains(&candidate) {
                return Some(candidate);
            }
        }
        for x in bounds.min.x..bounds.max.x {
            for y in bounds.min.y..bounds.max.y {
                for z in bounds.min.z..bounds.max.z {
                    let candidate = Coordinates::new(x, y, z);
                    if !occupied.contains(&candidate) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}
