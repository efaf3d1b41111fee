use std::collections::{HashMap, VecDeque};

use crate::error::{GalaxyError, Result};
use crate::logic::jobs::GalaxyEngine;
use crate::model::{
    Cluster, ClusterFilter, Galaxy, Id, Page, Region, Sector, SectorFilter, WarpTunnel,
};
use crate::store::traits::Store;

/// Fewest-hop route between two sectors, inclusive of both ends.
pub fn bfs_path<'a>(tunnels: &'a [WarpTunnel], from: &'a Id, to: &'a Id) -> Option<Vec<&'a Id>> {
    let mut adjacency: HashMap<&Id, Vec<&Id>> = HashMap::new();
    for tunnel in tunnels {
        adjacency
            .entry(&tunnel.source_sector_id)
            .or_default()
            .push(&tunnel.target_sector_id);
        adjacency
            .entry(&tunnel.target_sector_id)
            .or_default()
            .push(&tunnel.source_sector_id);
    }

    let mut previous: HashMap<&Id, &Id> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    previous.insert(from, from);
    while let Some(current) = queue.pop_front() {
        if current == to {
            let mut path = vec![current];
            let mut cursor = current;
            while cursor != from {
                cursor = previous[cursor];
                path.push(cursor);
            }
            path.reverse();
            return Some(path);
        }
        for &next in adjacency.get(current).map(Vec::as_slice).unwrap_or_default() {
            if !previous.contains_key(next) {
                previous.insert(next, current);
                queue.push_back(next);
            }
        }
    }
    None
}

impl<S: Store + 'static> GalaxyEngine<S> {
    pub async fn get_galaxy(&self, galaxy_id: &Id) -> Result<Galaxy> {
        self.store
            .get_galaxy(galaxy_id)
            .await?
            .ok_or_else(|| GalaxyError::not_found("galaxy", galaxy_id))
    }

    /// Complete galaxies only. A draft is still reachable by id for polling.
    pub async fn list_galaxies(&self) -> Result<Vec<Galaxy>> {
        let galaxies = self.store.list_galaxies().await?;
        Ok(galaxies.into_iter().filter(Galaxy::is_complete).collect())
    }

    /// The galaxy, provided it exists and is complete.
    async fn readable(&self, galaxy_id: &Id) -> Result<Galaxy> {
        let galaxy = self.get_galaxy(galaxy_id).await?;
        if !galaxy.is_complete() {
            return Err(GalaxyError::GalaxyNotReady {
                galaxy_id: galaxy_id.clone(),
            });
        }
        Ok(galaxy)
    }

    pub async fn list_regions(&self, galaxy_id: &Id) -> Result<Vec<Region>> {
        self.readable(galaxy_id).await?;
        Ok(self.store.list_regions(galaxy_id).await?)
    }

    pub async fn list_clusters(&self, galaxy_id: &Id, filter: &ClusterFilter) -> Result<Page<Cluster>> {
        self.readable(galaxy_id).await?;
        Ok(self.store.list_clusters(galaxy_id, filter).await?)
    }

    pub async fn list_sectors(&self, galaxy_id: &Id, filter: &SectorFilter) -> Result<Page<Sector>> {
        self.readable(galaxy_id).await?;
        Ok(self.store.list_sectors(galaxy_id, filter).await?)
    }

    pub async fn get_sector(&self, galaxy_id: &Id, sector_number: i32) -> Result<Sector> {
        self.readable(galaxy_id).await?;
        self.store
            .get_sector(galaxy_id, sector_number)
            .await?
            .ok_or_else(|| GalaxyError::not_found("sector", sector_number.to_string()))
    }

    /// Sectors one tunnel away, by sector number.
    pub async fn adjacent_sectors(&self, galaxy_id: &Id, sector_number: i32) -> Result<Vec<Sector>> {
        let sector = self.get_sector(galaxy_id, sector_number).await?;
        let mut neighbours = Vec::new();
        for tunnel in self.store.list_sector_tunnels(&sector.id).await? {
            if let Some(other) = tunnel.other_end(&sector.id) {
                if let Some(neighbour) = self.store.get_sector_by_id(other).await? {
                    neighbours.push(neighbour);
                }
            }
        }
        neighbours.sort_by_key(|s| s.sector_number);
        neighbours.dedup_by_key(|s| s.sector_number);
        Ok(neighbours)
    }

    pub async fn shortest_path(&self, galaxy_id: &Id, from: i32, to: i32) -> Result<Vec<Sector>> {
        self.readable(galaxy_id).await?;
        let snapshot = self.store.load_snapshot(galaxy_id).await?;
        let by_number: HashMap<i32, &Sector> =
            snapshot.sectors.iter().map(|s| (s.sector_number, s)).collect();
        let start = by_number
            .get(&from)
            .ok_or_else(|| GalaxyError::not_found("sector", from.to_string()))?;
        let goal = by_number
            .get(&to)
            .ok_or_else(|| GalaxyError::not_found("sector", to.to_string()))?;

        let route = bfs_path(&snapshot.tunnels, &start.id, &goal.id).ok_or_else(|| {
            GalaxyError::not_found("path", format!("{} -> {}", from, to))
        })?;
        let by_id: HashMap<&Id, &Sector> = snapshot.sectors.iter().map(|s| (&s.id, s)).collect();
        Ok(route
            .into_iter()
            .filter_map(|id| by_id.get(id).map(|s| (*s).clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TunnelSpan;

    fn tunnel(a: &str, b: &str) -> WarpTunnel {
        WarpTunnel::new(
            "g".to_string(),
            a.to_string(),
            b.to_string(),
            0.9,
            TunnelSpan::Cluster,
            1,
        )
    }

    #[test]
    fn test_bfs_prefers_fewest_hops() {
        let tunnels = vec![
            tunnel("a", "b"),
            tunnel("b", "c"),
            tunnel("c", "d"),
            tunnel("d", "a"),
        ];
        let from = "a".to_string();
        let to = "d".to_string();
        let path = bfs_path(&tunnels, &from, &to).unwrap();
        assert_eq!(path, vec![&from, &to]);
    }

    #[test]
    fn test_bfs_walks_tunnels_in_both_directions() {
        let tunnels = vec![tunnel("b", "a"), tunnel("c", "b")];
        let from = "a".to_string();
        let to = "c".to_string();
        let path: Vec<&str> = bfs_path(&tunnels, &from, &to)
            .unwrap()
            .into_iter()
            .map(String::as_str)
            .collect();
        assert_eq!(path, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_bfs_reports_unreachable() {
        let tunnels = vec![tunnel("a", "b")];
        let from = "a".to_string();
        let to = "z".to_string();
        assert!(bfs_path(&tunnels, &from, &to).is_none());

        let path = bfs_path(&tunnels, &from, &from).unwrap();
        assert_eq!(path, vec![&from]);
    }
}
