use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::collaborators::FeatureFactory;
use crate::error::{GalaxyError, Result};
use crate::model::{
    Cluster, ClusterType, GalaxyBlueprint, GenerationPhase, Id, Region, Sector, SectorFeatures,
};

/// Factory refusals fail the job in the feature phase.
fn factory_failure(what: &str, sector_id: &Id, err: anyhow::Error) -> GalaxyError {
    GalaxyError::GenerationFailed {
        phase: GenerationPhase::AttachingFeatures,
        cause: format!("Failed to create {} in sector {}: {:#}", what, sector_id, err),
    }
}

/// Port and planet probability for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureDensity {
    pub port: f64,
    pub planet: f64,
}

/// What a single sector should receive.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePlacement {
    pub sector_id: Id,
    pub port_class: Option<&'static str>,
    pub planet_type: Option<&'static str>,
}

pub struct FeatureAttacher;

impl FeatureAttacher {
    /// Region densities, with region overrides taking precedence.
    pub fn densities(regions: &[Region], blueprint: &GalaxyBlueprint) -> HashMap<Id, FeatureDensity> {
        regions
            .iter()
            .map(|region| {
                let region_override = blueprint.override_for(&region.name);
                let density = FeatureDensity {
                    port: region_override
                        .and_then(|o| o.port_density)
                        .unwrap_or(blueprint.config.port_density),
                    planet: region_override
                        .and_then(|o| o.planet_density)
                        .unwrap_or(blueprint.config.planet_density),
                };
                (region.id.clone(), density)
            })
            .collect()
    }

    /// Independent Bernoulli draws for every sector.
    pub fn plan(
        sectors: &[Sector],
        clusters: &[Cluster],
        densities: &HashMap<Id, FeatureDensity>,
        rng: &mut ChaCha8Rng,
    ) -> Vec<FeaturePlacement> {
        let cluster_types: HashMap<&str, ClusterType> = clusters
            .iter()
            .map(|c| (c.id.as_str(), c.cluster_type))
            .collect();

        sectors
            .iter()
            .filter_map(|sector| {
                let density = densities.get(&sector.region_id)?;
                let wants_port = rng.gen_bool(density.port.clamp(0.0, 1.0));
                let wants_planet = rng.gen_bool(density.planet.clamp(0.0, 1.0));
                if !wants_port && !wants_planet {
                    return None;
                }
                let cluster_type = cluster_types
                    .get(sector.cluster_id.as_str())
                    .copied()
                    .unwrap_or(ClusterType::Standard);
                let port_class = if wants_port {
                    cluster_type.port_classes().choose(rng).copied()
                } else {
                    None
                };
                Some(FeaturePlacement {
                    sector_id: sector.id.clone(),
                    port_class,
                    planet_type: wants_planet.then(|| sector.sector_type.planet_hint()),
                })
            })
            .collect()
    }

    /// Ask the factories for every placement in `chunk`.
    pub async fn attach(
        factory: &dyn FeatureFactory,
        chunk: &[FeaturePlacement],
    ) -> Result<Vec<SectorFeatures>> {
        let mut features = Vec::with_capacity(chunk.len());
        for placement in chunk {
            let port_id = match placement.port_class {
                Some(class) => Some(
                    factory
                        .create_port(&placement.sector_id, class)
                        .await
                        .map_err(|err| factory_failure("port", &placement.sector_id, err))?,
                ),
                None => None,
            };
            let planet_id = match placement.planet_type {
                Some(kind) => Some(
                    factory
                        .create_planet(&placement.sector_id, kind)
                        .await
                        .map_err(|err| factory_failure("planet", &placement.sector_id, err))?,
                ),
                None => None,
            };
            features.push(SectorFeatures {
                sector_id: placement.sector_id.clone(),
                port_id,
                planet_id,
            });
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::DetachedFeatureFactory;
    use crate::model::{
        BoundingBox, Coordinates, GenerationConfig, RegionOverride, ResourceRichness, SectorType,
    };
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn sectors(region_id: &str, count: usize) -> Vec<Sector> {
        (0..count)
            .map(|i| {
                Sector::new(
                    "g".to_string(),
                    region_id.to_string(),
                    "c".to_string(),
                    i as i32 + 1,
                    Coordinates::new(i as i32, 0, 0),
                    SectorType::Normal,
                    1,
                    ResourceRichness::Average,
                )
            })
            .collect()
    }

    fn region(name: &str) -> Region {
        Region::new(
            "g".to_string(),
            name.to_string(),
            50,
            10,
            BoundingBox::with_size(Coordinates::new(0, 0, 0), 1, 1, 1),
        )
    }

    #[test]
    fn test_region_override_density_wins() {
        let core = region("core");
        let border = region("border");
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "core".to_string(),
            RegionOverride {
                port_density: Some(1.0),
                ..RegionOverride::default()
            },
        );
        let blueprint = GalaxyBlueprint {
            config: GenerationConfig::default(),
            region_overrides: overrides,
        };

        let densities = FeatureAttacher::densities(&[core.clone(), border.clone()], &blueprint);
        assert_eq!(densities[&core.id].port, 1.0);
        assert_eq!(densities[&border.id].port, 0.15);
    }

    #[test]
    fn test_zero_and_full_density() {
        let region_id = "r".to_string();
        let all = sectors(&region_id, 40);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut densities = HashMap::new();
        densities.insert(region_id.clone(), FeatureDensity { port: 1.0, planet: 0.0 });
        let placements = FeatureAttacher::plan(&all, &[], &densities, &mut rng);
        assert_eq!(placements.len(), 40);
        assert!(placements.iter().all(|p| p.port_class.is_some() && p.planet_type.is_none()));

        densities.insert(region_id, FeatureDensity { port: 0.0, planet: 0.0 });
        assert!(FeatureAttacher::plan(&all, &[], &densities, &mut rng).is_empty());
    }

    #[tokio::test]
    async fn test_attach_returns_references() {
        let placement = FeaturePlacement {
            sector_id: "s1".to_string(),
            port_class: Some("trading"),
            planet_type: Some("terran"),
        };
        let features = FeatureAttacher::attach(&DetachedFeatureFactory, &[placement])
            .await
            .unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].port_id.is_some());
        assert!(features[0].planet_id.is_some());
    }

    struct NoPlanets;

    #[async_trait::async_trait]
    impl FeatureFactory for NoPlanets {
        async fn create_port(&self, _sector_id: &Id, _class_hint: &str) -> anyhow::Result<Id> {
            Ok("port".to_string())
        }

        async fn create_planet(&self, _sector_id: &Id, _type_hint: &str) -> anyhow::Result<Id> {
            Err(anyhow::anyhow!("planet registry offline"))
        }

        async fn remove_features(&self, _sector_ids: &[Id]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_factory_failure_is_a_feature_phase_failure() {
        let placement = FeaturePlacement {
            sector_id: "s7".to_string(),
            port_class: Some("trading"),
            planet_type: Some("terran"),
        };
        let err = FeatureAttacher::attach(&NoPlanets, &[placement])
            .await
            .unwrap_err();
        match err {
            GalaxyError::GenerationFailed { phase, cause } => {
                assert_eq!(phase, GenerationPhase::AttachingFeatures);
                assert!(cause.contains("s7"));
                assert!(cause.contains("planet registry offline"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
