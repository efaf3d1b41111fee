//! Interfaces to systems that own ports, planets and player locations.
//!
//! The engine only decides placement and records the returned references; the
//! economic state behind a port or planet lives with its owner.

use anyhow::Result;
use log::debug;

use crate::model::{generate_id, Id};

#[async_trait::async_trait]
pub trait FeatureFactory: Send + Sync {
    async fn create_port(&self, sector_id: &Id, class_hint: &str) -> Result<Id>;
    async fn create_planet(&self, sector_id: &Id, type_hint: &str) -> Result<Id>;
    /// Remove every port and planet attached to the given sectors.
    async fn remove_features(&self, sector_ids: &[Id]) -> Result<()>;
}

#[async_trait::async_trait]
pub trait OccupancyLookup: Send + Sync {
    /// Sectors among `sector_ids` that currently hold a player or ship.
    async fn occupied_sectors(&self, sector_ids: &[Id]) -> Result<Vec<Id>>;
}

/// Mints references without a backing economy service.
#[derive(Debug, Default, Clone)]
pub struct DetachedFeatureFactory;

#[async_trait::async_trait]
impl FeatureFactory for DetachedFeatureFactory {
    async fn create_port(&self, sector_id: &Id, class_hint: &str) -> Result<Id> {
        let port_id = generate_id();
        debug!("Port {} ({}) placed in sector {}", port_id, class_hint, sector_id);
        Ok(port_id)
    }

    async fn create_planet(&self, sector_id: &Id, type_hint: &str) -> Result<Id> {
        let planet_id = generate_id();
        debug!("Planet {} ({}) placed in sector {}", planet_id, type_hint, sector_id);
        Ok(planet_id)
    }

    async fn remove_features(&self, sector_ids: &[Id]) -> Result<()> {
        debug!("Released features for {} sectors", sector_ids.len());
        Ok(())
    }
}

/// Reports every sector as empty.
#[derive(Debug, Default, Clone)]
pub struct NoOccupants;

#[async_trait::async_trait]
impl OccupancyLookup for NoOccupants {
    async fn occupied_sectors(&self, _sector_ids: &[Id]) -> Result<Vec<Id>> {
        Ok(Vec::new())
    }
}
