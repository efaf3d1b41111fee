use log::info;

use crate::error::{ConfigErrors, GalaxyError, Result};
use crate::logic::allocate::RegionAllocator;
use crate::logic::connectivity::{ConnectivityBuilder, SectorNode, StabilityPolicy};
use crate::logic::jobs::{build_clusters, seeded_rng, synthesize_sectors, GalaxyEngine, JobRun};
use crate::logic::partition::ClusterPartitioner;
use crate::logic::validate::ConfigValidator;
use crate::model::{
    BoundingBox, Galaxy, GenerationConfig, GenerationJob, GenerationPhase, Id, JobKind, Region,
    RegionKind,
};
use crate::store::traits::{JobCommit, Store};

/// Grows a complete galaxy by whole new clusters attached to its graph.
pub struct IncrementalExpander;

impl IncrementalExpander {
    /// Sectors each region receives. A named region takes everything;
    /// otherwise the count is spread by the regions' declared ratios and
    /// regions that would get nothing are left out.
    pub fn spread(regions: &[Region], num_sectors: u32, region: Option<&str>) -> Result<Vec<(Id, u32)>> {
        if let Some(name) = region {
            let target = regions.iter().find(|r| r.name == name).ok_or_else(|| {
                let mut errors = ConfigErrors::new();
                errors.push("region", format!("'{}' is not a region of this galaxy", name));
                GalaxyError::Config(errors)
            })?;
            return Ok(vec![(target.id.clone(), num_sectors)]);
        }

        let ratios: Vec<u32> = regions.iter().map(|r| r.ratio).collect();
        Ok(regions
            .iter()
            .zip(RegionAllocator::allocate_proportional(num_sectors, &ratios))
            .filter(|(_, count)| *count > 0)
            .map(|(region, count)| (region.id.clone(), count))
            .collect())
    }
}

/// Everything an expansion job needs, fixed when the request is accepted.
#[derive(Debug, Clone)]
pub(crate) struct ExpansionRequest {
    pub galaxy: Galaxy,
    pub additions: Vec<(Id, u32)>,
    pub config: Option<GenerationConfig>,
}

impl<S: Store + 'static> GalaxyEngine<S> {
    /// Add `num_sectors` to a complete galaxy in the background. Returns the job id.
    pub async fn add_sectors(
        &self,
        galaxy_id: &Id,
        num_sectors: u32,
        region: Option<&str>,
        config: Option<GenerationConfig>,
    ) -> Result<Id> {
        let guard = self.locks.try_acquire(galaxy_id)?;
        let galaxy = self
            .store
            .get_galaxy(galaxy_id)
            .await?
            .ok_or_else(|| GalaxyError::not_found("galaxy", galaxy_id))?;
        if !galaxy.is_complete() {
            return Err(GalaxyError::GalaxyNotReady {
                galaxy_id: galaxy_id.clone(),
            });
        }

        let mut errors = ConfigErrors::new();
        if num_sectors == 0 {
            errors.push("num_sectors", "must be at least 1");
        } else if galaxy.total_sectors.saturating_add(num_sectors) > self.settings.max_sectors {
            errors.push(
                "num_sectors",
                format!(
                    "galaxy would grow to {} sectors, above the maximum of {}",
                    galaxy.total_sectors.saturating_add(num_sectors),
                    self.settings.max_sectors
                ),
            );
        }
        if let Some(config) = &config {
            if let Err(GalaxyError::Config(found)) = ConfigValidator::validate_settings(config) {
                errors.violations.extend(found.violations);
            }
        }
        errors.into_result()?;

        let regions = self.store.list_regions(galaxy_id).await?;
        let additions = IncrementalExpander::spread(&regions, num_sectors, region)?;

        let job = GenerationJob::new(galaxy_id.clone(), JobKind::Expand);
        self.store.create_job(&job).await?;
        info!(
            "Accepted expansion of galaxy {} by {} sectors as job {}",
            galaxy_id, num_sectors, job.id
        );

        let request = ExpansionRequest {
            galaxy,
            additions,
            config,
        };
        let mut run = JobRun::new(self.clone(), &job);
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = run.expand(request).await;
            run.finish(outcome).await;
        });
        Ok(job.id)
    }
}

impl<S: Store + 'static> JobRun<S> {
    /// New clusters go into an annex beside the existing volume, numbered past
    /// the current maximum, and the tunnel builder attaches them to the
    /// committed graph.
    pub(crate) async fn expand(&mut self, request: ExpansionRequest) -> Result<JobCommit> {
        let ExpansionRequest {
            galaxy,
            additions,
            config,
        } = request;
        let mut blueprint = galaxy.generation_config.clone();
        if let Some(config) = config {
            blueprint.config = config;
        }

        self.enter(GenerationPhase::Validating).await?;
        let snapshot = self.engine.store.load_snapshot(&galaxy.id).await?;
        let mut rng = seeded_rng(
            blueprint
                .config
                .seed
                .map(|seed| seed.wrapping_add(snapshot.sectors.len() as u64)),
        );

        self.enter(GenerationPhase::AllocatingRegions).await?;
        let mut targets: Vec<(&Region, u32)> = Vec::with_capacity(additions.len());
        for (region_id, count) in &additions {
            let region = snapshot
                .regions
                .iter()
                .find(|r| &r.id == region_id)
                .ok_or_else(|| GalaxyError::not_found("region", region_id))?;
            targets.push((region, *count));
        }

        self.enter(GenerationPhase::PartitioningClusters).await?;
        let occupied: Vec<BoundingBox> = snapshot
            .regions
            .iter()
            .map(|r| r.bounds)
            .chain(snapshot.clusters.iter().map(|c| c.bounds))
            .collect();
        let region_counts: Vec<(RegionKind, u32)> =
            targets.iter().map(|(region, count)| (region.kind, *count)).collect();
        let plans = ClusterPartitioner::plan_annex(
            &occupied,
            &region_counts,
            blueprint.config.connectivity,
            &mut rng,
        );

        let mut clusters = Vec::new();
        for ((region, _), plan) in targets.iter().zip(plans) {
            let existing = snapshot
                .clusters
                .iter()
                .filter(|c| c.region_id == region.id)
                .count();
            clusters.extend(build_clusters(region, plan.clusters, existing));
        }
        self.engine.store.insert_clusters(&self.job_id, &clusters).await?;
        self.advance(1, 1).await?;

        self.enter(GenerationPhase::SynthesizingSectors).await?;
        let sectors = synthesize_sectors(
            &blueprint,
            &snapshot.regions,
            &clusters,
            snapshot.max_sector_number() + 1,
            &mut rng,
        )?;
        self.write_sectors(&sectors).await?;

        self.enter(GenerationPhase::BuildingConnectivity).await?;
        let nodes: Vec<SectorNode> = snapshot
            .sectors
            .iter()
            .map(|sector| SectorNode::from_sector(sector, false))
            .chain(sectors.iter().map(|sector| SectorNode::from_sector(sector, true)))
            .collect();
        let policy = StabilityPolicy::new(&snapshot.regions, &blueprint);
        let tunnels = ConnectivityBuilder::new(
            &mut rng,
            blueprint.config.connectivity,
            blueprint.config.warp_tunnel_probability,
            &policy,
        )
        .build(&galaxy.id, &nodes, &snapshot.tunnels)?
        .into_tunnels();
        self.write_tunnels(&tunnels).await?;

        self.enter(GenerationPhase::AttachingFeatures).await?;
        let (ports, planets) = self
            .attach_features(&sectors, &clusters, &snapshot.regions, &blueprint, &mut rng)
            .await?;

        self.enter(GenerationPhase::Finalizing).await?;
        let mut statistics = snapshot.statistics();
        statistics.total_sectors += sectors.len() as u32;
        statistics.port_count += ports;
        statistics.planet_count += planets;
        statistics.warp_tunnel_count += tunnels.len() as u32;
        statistics.cluster_count += clusters.len() as u32;

        let added: u32 = additions.iter().map(|(_, count)| count).sum();
        Ok(JobCommit {
            galaxy_id: galaxy.id.clone(),
            region_additions: additions,
            total_sectors: galaxy.total_sectors + added,
            statistics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinates;

    fn regions() -> Vec<Region> {
        let bounds = BoundingBox::with_size(Coordinates::new(0, 0, 0), 2, 2, 2);
        vec![
            Region::new("g".to_string(), "core".to_string(), 50, 10, bounds),
            Region::new("g".to_string(), "border".to_string(), 30, 6, bounds),
            Region::new("g".to_string(), "frontier".to_string(), 20, 4, bounds),
        ]
    }

    #[test]
    fn test_named_region_takes_everything() {
        let regions = regions();
        let spread = IncrementalExpander::spread(&regions, 5, Some("border")).unwrap();
        assert_eq!(spread, vec![(regions[1].id.clone(), 5)]);
    }

    #[test]
    fn test_unknown_region_is_a_config_error() {
        let err = IncrementalExpander::spread(&regions(), 5, Some("rim")).unwrap_err();
        match err {
            GalaxyError::Config(errors) => assert!(errors.has_field("region")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_proportional_spread_skips_empty_regions() {
        let regions = regions();
        let spread = IncrementalExpander::spread(&regions, 1, None).unwrap();
        assert_eq!(spread, vec![(regions[0].id.clone(), 1)]);

        let spread = IncrementalExpander::spread(&regions, 10, None).unwrap();
        let counts: Vec<u32> = spread.iter().map(|(_, c)| *c).collect();
        assert_eq!(counts, vec![5, 3, 2]);
    }
}
