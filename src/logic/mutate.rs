use log::{info, warn};
use serde::Serialize;

use crate::error::{ConfigErrors, GalaxyError, Result};
use crate::logic::jobs::GalaxyEngine;
use crate::model::{turn_cost, Id, Sector, TunnelKind, TunnelSpan, WarpTunnel};
use crate::store::traits::{RowCounts, Store};

/// Stability given to a manual tunnel when the caller names none.
pub const DEFAULT_MANUAL_STABILITY: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearReport {
    pub galaxy_id: Id,
    pub removed: RowCounts,
    /// Occupied sectors that were removed because `force` was set.
    pub forced_sectors: Vec<Id>,
}

impl<S: Store + 'static> GalaxyEngine<S> {
    /// Tear down a galaxy and everything under it. Occupied sectors block the
    /// teardown unless `force` is set.
    pub async fn clear_galaxy(&self, galaxy_id: &Id, force: bool) -> Result<ClearReport> {
        let _guard = self.locks.try_acquire(galaxy_id)?;
        if self.store.get_galaxy(galaxy_id).await?.is_none() {
            return Err(GalaxyError::not_found("galaxy", galaxy_id));
        }

        let mut sector_ids: Vec<Id> = self
            .store
            .load_snapshot(galaxy_id)
            .await?
            .sectors
            .into_iter()
            .map(|sector| sector.id)
            .collect();
        for job in self.store.list_jobs_for_galaxy(galaxy_id).await? {
            sector_ids.extend(self.store.uncommitted_sector_ids(&job.id).await?);
        }

        let occupied = self.occupancy.occupied_sectors(&sector_ids).await?;
        if !occupied.is_empty() {
            if !force {
                return Err(GalaxyError::DependencyConflict {
                    occupied_sectors: occupied,
                });
            }
            warn!(
                "Force-clearing galaxy {} with {} occupied sectors",
                galaxy_id,
                occupied.len()
            );
        }

        if !sector_ids.is_empty() {
            self.features.remove_features(&sector_ids).await?;
        }
        let removed = self.store.delete_galaxy(galaxy_id).await?;
        info!(
            "Cleared galaxy {}: {} sectors, {} tunnels, {} jobs removed",
            galaxy_id, removed.sectors, removed.warp_tunnels, removed.jobs
        );

        Ok(ClearReport {
            galaxy_id: galaxy_id.clone(),
            removed,
            forced_sectors: occupied,
        })
    }

    /// Insert a single tunnel between two committed sectors of one galaxy.
    pub async fn create_warp_tunnel(
        &self,
        galaxy_id: &Id,
        source_sector_id: &Id,
        target_sector_id: &Id,
        stability: Option<f64>,
    ) -> Result<WarpTunnel> {
        if source_sector_id == target_sector_id {
            return Err(GalaxyError::InvalidTunnel(format!(
                "sector {} cannot connect to itself",
                source_sector_id
            )));
        }
        let stability = stability.unwrap_or(DEFAULT_MANUAL_STABILITY);
        if !(0.0..=1.0).contains(&stability) {
            let mut errors = ConfigErrors::new();
            errors.push("stability", "must be within [0, 1]");
            return Err(GalaxyError::Config(errors));
        }

        let _guard = self.locks.try_acquire(galaxy_id)?;
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

        let source = self.sector_in_galaxy(galaxy_id, source_sector_id).await?;
        let target = self.sector_in_galaxy(galaxy_id, target_sector_id).await?;

        if self
            .store
            .find_tunnel(&source.id, &target.id)
            .await?
            .is_some()
        {
            return Err(GalaxyError::DuplicateTunnel {
                source_sector_id: source.id,
                target_sector_id: target.id,
            });
        }

        let distance = source.coordinates.distance(&target.coordinates);
        let tunnel = WarpTunnel::new(
            galaxy_id.clone(),
            source.id.clone(),
            target.id.clone(),
            stability,
            TunnelSpan::Manual,
            turn_cost(
                distance,
                source.hazard_level.max(target.hazard_level),
                TunnelKind::Artificial,
            ),
        )
        .with_kind(TunnelKind::Artificial);
        self.store.insert_manual_tunnel(&tunnel).await?;
        info!(
            "Manual warp tunnel {} joins sectors {} and {} in galaxy {}",
            tunnel.id, source.sector_number, target.sector_number, galaxy_id
        );
        Ok(tunnel)
    }

    async fn sector_in_galaxy(&self, galaxy_id: &Id, sector_id: &Id) -> Result<Sector> {
        let sector = self
            .store
            .get_sector_by_id(sector_id)
            .await?
            .ok_or_else(|| GalaxyError::not_found("sector", sector_id))?;
        if &sector.galaxy_id != galaxy_id {
            return Err(GalaxyError::InvalidTunnel(format!(
                "sector {} belongs to another galaxy",
                sector_id
            )));
        }
        Ok(sector)
    }
}
