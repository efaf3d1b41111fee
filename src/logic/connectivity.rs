//! Warp-tunnel graph construction.
//!
//! Phase A runs a randomized Kruskal over three candidate tiers: pairs inside a
//! cluster, representative pairs between clusters of one region, then the few
//! closest cluster pairs between regions. A final sweep joins anything the
//! tiers left apart, so the tree always spans. Phase B overlays shortcuts.
//! The result is checked with an independent union-find before it is returned.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::{GalaxyError, Result};
use crate::model::{
    turn_cost, Connectivity, Coordinates, GalaxyBlueprint, Id, Range, Region, Sector, TunnelKind,
    TunnelSpan, WarpTunnel,
};

/// Same-region clusters each cluster is offered to in tier two.
const REGION_NEIGHBOURS: usize = 6;

/// Closest cluster pairs considered between every two regions.
const CROSS_REGION_PAIRS: usize = 3;

/// Hazard above which tunnel stability is pulled toward the range minimum.
const HAZARDOUS: u8 = 5;

/// Disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    components: usize,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            components: n,
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Returns true when `a` and `b` were in different sets.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        self.components -= 1;
        true
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn largest_component(&mut self) -> usize {
        (0..self.parent.len())
            .map(|x| {
                let root = self.find(x);
                self.size[root]
            })
            .max()
            .unwrap_or(0)
    }
}

/// A sector as seen by the graph builder.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorNode {
    pub id: Id,
    pub region_id: Id,
    pub cluster_id: Id,
    pub coordinates: Coordinates,
    pub hazard_level: u8,
    /// False for sectors that already belong to a committed graph.
    pub is_new: bool,
}

impl SectorNode {
    pub fn from_sector(sector: &Sector, is_new: bool) -> Self {
        Self {
            id: sector.id.clone(),
            region_id: sector.region_id.clone(),
            cluster_id: sector.cluster_id.clone(),
            coordinates: sector.coordinates,
            hazard_level: sector.hazard_level,
            is_new,
        }
    }
}

/// Stability range per region, taken from region overrides, the galaxy-wide
/// range or the region kind, in that order.
#[derive(Debug, Clone, Default)]
pub struct StabilityPolicy {
    by_region: HashMap<Id, (Range<f64>, f64)>,
}

impl StabilityPolicy {
    pub fn new(regions: &[Region], blueprint: &GalaxyBlueprint) -> Self {
        let by_region = regions
            .iter()
            .map(|region| {
                let range = blueprint
                    .override_for(&region.name)
                    .and_then(|o| o.stability)
                    .or(blueprint.config.stability_range)
                    .unwrap_or_else(|| region.kind.default_stability());
                (region.id.clone(), (range, region.security_level))
            })
            .collect();
        Self { by_region }
    }

    /// The less secure endpoint decides.
    pub fn range_for(&self, a_region: &str, b_region: &str) -> Range<f64> {
        let a = self.by_region.get(a_region);
        let b = self.by_region.get(b_region);
        match (a, b) {
            (Some((ra, sa)), Some((rb, sb))) => {
                if sb < sa {
                    *rb
                } else {
                    *ra
                }
            }
            (Some((range, _)), None) | (None, Some((range, _))) => *range,
            (None, None) => Range::new(0.5, 1.0),
        }
    }
}

/// Tunnels produced by one build, split by phase.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityPlan {
    pub spanning: Vec<WarpTunnel>,
    pub extra: Vec<WarpTunnel>,
}

impl ConnectivityPlan {
    pub fn len(&self) -> usize {
        self.spanning.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_tunnels(self) -> Vec<WarpTunnel> {
        let mut tunnels = self.spanning;
        tunnels.extend(self.extra);
        tunnels
    }
}

struct ClusterGroup {
    region: usize,
    members: Vec<usize>,
    centroid: (f64, f64, f64),
    has_new: bool,
}

struct Candidate {
    a: usize,
    b: usize,
    weight: f64,
    span: TunnelSpan,
}

pub struct ConnectivityBuilder<'a> {
    rng: &'a mut ChaCha8Rng,
    connectivity: Connectivity,
    warp_tunnel_probability: f64,
    stability: &'a StabilityPolicy,
}

impl<'a> ConnectivityBuilder<'a> {
    pub fn new(
        rng: &'a mut ChaCha8Rng,
        connectivity: Connectivity,
        warp_tunnel_probability: f64,
        stability: &'a StabilityPolicy,
    ) -> Self {
        Self {
            rng,
            connectivity,
            warp_tunnel_probability,
            stability,
        }
    }

    /// Connect `nodes`. Nodes marked as existing are joined by `existing`
    /// tunnels already; only pairs touching a new node are added.
    pub fn build(
        &mut self,
        galaxy_id: &Id,
        nodes: &[SectorNode],
        existing: &[WarpTunnel],
    ) -> Result<ConnectivityPlan> {
        let n = nodes.len();
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();

        let mut uf = UnionFind::new(n);
        let mut pairs: HashSet<(usize, usize)> = HashSet::new();
        let mut existing_edges = Vec::with_capacity(existing.len());
        for tunnel in existing {
            let (Some(&a), Some(&b)) = (
                index.get(tunnel.source_sector_id.as_str()),
                index.get(tunnel.target_sector_id.as_str()),
            ) else {
                continue;
            };
            uf.union(a, b);
            pairs.insert(ordered(a, b));
            existing_edges.push((a, b));
        }

        let (clusters, region_count) = group_clusters(nodes);

        let mut plan = ConnectivityPlan::default();

        // Phase A
        let tiers = [
            self.cluster_candidates(nodes, &clusters),
            self.region_candidates(nodes, &clusters),
            self.cross_region_candidates(nodes, &clusters, region_count),
        ];
        for mut candidates in tiers {
            candidates.sort_by(|x, y| x.weight.total_cmp(&y.weight));
            for candidate in candidates {
                if uf.union(candidate.a, candidate.b) {
                    pairs.insert(ordered(candidate.a, candidate.b));
                    let tunnel = self.tunnel(galaxy_id, &nodes[candidate.a], &nodes[candidate.b], candidate.span);
                    plan.spanning.push(tunnel);
                }
            }
        }
        self.join_remaining(galaxy_id, nodes, &mut uf, &mut pairs, &mut plan);

        // Phase B
        self.add_shortcuts(galaxy_id, nodes, &mut pairs, &mut plan);

        let mut edges = existing_edges;
        for tunnel in plan.spanning.iter().chain(plan.extra.iter()) {
            if let (Some(&a), Some(&b)) = (
                index.get(tunnel.source_sector_id.as_str()),
                index.get(tunnel.target_sector_id.as_str()),
            ) {
                edges.push((a, b));
            }
        }
        verify_connected(n, &edges)?;

        debug!(
            "Galaxy {}: {} spanning and {} extra tunnels over {} sectors",
            galaxy_id,
            plan.spanning.len(),
            plan.extra.len(),
            n
        );
        Ok(plan)
    }

    fn jitter(&mut self) -> f64 {
        self.rng.gen_range(0.8..1.25)
    }

    fn cluster_candidates(&mut self, nodes: &[SectorNode], clusters: &[ClusterGroup]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for cluster in clusters.iter().filter(|c| c.has_new) {
            for (&a, &b) in cluster.members.iter().tuple_combinations() {
                if !nodes[a].is_new && !nodes[b].is_new {
                    continue;
                }
                let weight = nodes[a].coordinates.distance(&nodes[b].coordinates) * self.jitter();
                candidates.push(Candidate {
                    a,
                    b,
                    weight,
                    span: TunnelSpan::Cluster,
                });
            }
        }
        candidates
    }

    fn region_candidates(&mut self, nodes: &[SectorNode], clusters: &[ClusterGroup]) -> Vec<Candidate> {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut candidates = Vec::new();
        for (ci, cluster) in clusters.iter().enumerate() {
            let mut neighbours: Vec<(usize, f64)> = clusters
                .iter()
                .enumerate()
                .filter(|(di, other)| {
                    *di != ci && other.region == cluster.region && (cluster.has_new || other.has_new)
                })
                .map(|(di, other)| (di, centroid_distance(cluster.centroid, other.centroid)))
                .collect();
            neighbours.sort_by(|x, y| x.1.total_cmp(&y.1));

            for (di, _) in neighbours.into_iter().take(REGION_NEIGHBOURS) {
                if !seen.insert(ordered(ci, di)) {
                    continue;
                }
                let (a, b) = representatives(nodes, cluster, &clusters[di]);
                let weight = nodes[a].coordinates.distance(&nodes[b].coordinates) * self.jitter();
                candidates.push(Candidate {
                    a,
                    b,
                    weight,
                    span: TunnelSpan::Region,
                });
            }
        }
        candidates
    }

    fn cross_region_candidates(
        &mut self,
        nodes: &[SectorNode],
        clusters: &[ClusterGroup],
        region_count: usize,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for r1 in 0..region_count {
            for r2 in r1 + 1..region_count {
                let mut cluster_pairs: Vec<(usize, usize, f64)> = Vec::new();
                for (ci, c) in clusters.iter().enumerate().filter(|(_, c)| c.region == r1) {
                    for (di, d) in clusters.iter().enumerate().filter(|(_, d)| d.region == r2) {
                        if c.has_new || d.has_new {
                            cluster_pairs.push((ci, di, centroid_distance(c.centroid, d.centroid)));
                        }
                    }
                }
                cluster_pairs.sort_by(|x, y| x.2.total_cmp(&y.2));

                for (ci, di, _) in cluster_pairs.into_iter().take(CROSS_REGION_PAIRS) {
                    let (a, b) = representatives(nodes, &clusters[ci], &clusters[di]);
                    let weight = nodes[a].coordinates.distance(&nodes[b].coordinates) * self.jitter();
                    candidates.push(Candidate {
                        a,
                        b,
                        weight,
                        span: TunnelSpan::Galaxy,
                    });
                }
            }
        }
        candidates
    }

    /// Attach every leftover component to the largest one by its closest pair.
    fn join_remaining(
        &mut self,
        galaxy_id: &Id,
        nodes: &[SectorNode],
        uf: &mut UnionFind,
        pairs: &mut HashSet<(usize, usize)>,
        plan: &mut ConnectivityPlan,
    ) {
        while uf.components() > 1 {
            let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
            for i in 0..nodes.len() {
                components.entry(uf.find(i)).or_default().push(i);
            }
            let Some(main_root) = components
                .iter()
                .max_by_key(|(root, members)| (members.len(), std::cmp::Reverse(**root)))
                .map(|(root, _)| *root)
            else {
                return;
            };
            let main = components.get(&main_root).cloned().unwrap_or_default();

            let mut others: Vec<Vec<usize>> = components
                .into_iter()
                .filter(|(root, _)| *root != main_root)
                .map(|(_, members)| members)
                .collect();
            others.sort_by_key(|members| members[0]);

            for members in others {
                let a = members[0];
                let Some(&b) = main.iter().min_by_key(|&&m| {
                    nodes[a].coordinates.distance_squared(&nodes[m].coordinates)
                }) else {
                    continue;
                };
                if uf.union(a, b) {
                    pairs.insert(ordered(a, b));
                    let tunnel = self.tunnel(galaxy_id, &nodes[a], &nodes[b], TunnelSpan::Galaxy);
                    plan.spanning.push(tunnel);
                }
            }
        }
    }

    fn add_shortcuts(
        &mut self,
        galaxy_id: &Id,
        nodes: &[SectorNode],
        pairs: &mut HashSet<(usize, usize)>,
        plan: &mut ConnectivityPlan,
    ) {
        let n = nodes.len();
        let new_nodes: Vec<usize> = (0..n).filter(|&i| nodes[i].is_new).collect();
        if new_nodes.is_empty() || n < 2 {
            return;
        }

        let (low, high) = self.connectivity.extra_edge_ratio();
        let ratio = self.rng.gen_range(low..=high);
        let available = n * (n - 1) / 2 - pairs.len().min(n * (n - 1) / 2);
        let target = ((ratio * new_nodes.len() as f64).round() as usize).min(available);

        let max_attempts = target * 30 + 50;
        let mut attempts = 0;
        while plan.extra.len() < target && attempts < max_attempts {
            attempts += 1;
            let Some(&a) = new_nodes.choose(self.rng) else {
                return;
            };

            let roll: f64 = self.rng.gen();
            let same_region_share = self.warp_tunnel_probability
                + (1.0 - self.warp_tunnel_probability) * 0.7;
            let b = if roll < self.warp_tunnel_probability {
                self.pick_partner(nodes, a, |x, y| x.region_id != y.region_id)
            } else if roll < same_region_share {
                self.pick_partner(nodes, a, |x, y| {
                    x.region_id == y.region_id && x.cluster_id != y.cluster_id
                })
            } else {
                None
            };
            let b = match b {
                Some(b) => b,
                None => self.rng.gen_range(0..n),
            };

            if a == b || pairs.contains(&ordered(a, b)) {
                continue;
            }
            pairs.insert(ordered(a, b));
            let span = span_between(&nodes[a], &nodes[b]);
            let tunnel = self.tunnel(galaxy_id, &nodes[a], &nodes[b], span);
            plan.extra.push(tunnel);
        }
    }

    /// Closest of up to three random nodes matching `accept`.
    fn pick_partner<F>(&mut self, nodes: &[SectorNode], a: usize, accept: F) -> Option<usize>
    where
        F: Fn(&SectorNode, &SectorNode) -> bool,
    {
        let mut found: Vec<usize> = Vec::with_capacity(3);
        for _ in 0..12 {
            let b = self.rng.gen_range(0..nodes.len());
            if b != a && accept(&nodes[a], &nodes[b]) {
                found.push(b);
                if found.len() == 3 {
                    break;
                }
            }
        }
        found
            .into_iter()
            .min_by_key(|&b| nodes[a].coordinates.distance_squared(&nodes[b].coordinates))
    }

    fn sample_kind(&mut self) -> TunnelKind {
        let total: u32 = TunnelKind::ALL.iter().map(TunnelKind::weight).sum();
        let mut roll = self.rng.gen_range(0..total);
        for kind in TunnelKind::ALL {
            if roll < kind.weight() {
                return kind;
            }
            roll -= kind.weight();
        }
        TunnelKind::Standard
    }

    fn tunnel(&mut self, galaxy_id: &Id, a: &SectorNode, b: &SectorNode, span: TunnelSpan) -> WarpTunnel {
        let kind = self.sample_kind();
        let range = kind.narrow(self.stability.range_for(&a.region_id, &b.region_id));
        let (low, high) = (range.min, range.max);
        let mut stability = self.rng.gen_range(low..=high);
        let hazard = a.hazard_level.max(b.hazard_level);
        if hazard > HAZARDOUS {
            stability = low + (stability - low) * 0.5;
        }
        let distance = a.coordinates.distance(&b.coordinates);
        WarpTunnel::new(
            galaxy_id.clone(),
            a.id.clone(),
            b.id.clone(),
            stability,
            span,
            turn_cost(distance, hazard, kind),
        )
        .with_kind(kind)
    }
}

/// Fails with `ConnectivityInvariantViolation` unless `edges` connect all `n` nodes.
pub fn verify_connected(n: usize, edges: &[(usize, usize)]) -> Result<()> {
    if n <= 1 {
        return Ok(());
    }
    let mut uf = UnionFind::new(n);
    for &(a, b) in edges {
        uf.union(a, b);
    }
    if uf.components() == 1 {
        return Ok(());
    }
    let largest = uf.largest_component();
    Err(GalaxyError::ConnectivityInvariantViolation {
        components: uf.components(),
        unreachable: n - largest,
    })
}

/// Same check over persisted rows.
pub fn verify_tunnels(sector_ids: &[Id], tunnels: &[WarpTunnel]) -> Result<()> {
    let index: HashMap<&str, usize> = sector_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let edges: Vec<(usize, usize)> = tunnels
        .iter()
        .filter_map(|t| {
            Some((
                *index.get(t.source_sector_id.as_str())?,
                *index.get(t.target_sector_id.as_str())?,
            ))
        })
        .collect();
    verify_connected(sector_ids.len(), &edges)
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn span_between(a: &SectorNode, b: &SectorNode) -> TunnelSpan {
    if a.cluster_id == b.cluster_id {
        TunnelSpan::Cluster
    } else if a.region_id == b.region_id {
        TunnelSpan::Region
    } else {
        TunnelSpan::Galaxy
    }
}

fn centroid_distance(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)).sqrt()
}

fn distance_to(point: &Coordinates, centroid: (f64, f64, f64)) -> f64 {
    centroid_distance(
        (point.x as f64, point.y as f64, point.z as f64),
        centroid,
    )
}

/// Member of `c` nearest `d`'s centroid and member of `d` nearest `c`'s.
fn representatives(nodes: &[SectorNode], c: &ClusterGroup, d: &ClusterGroup) -> (usize, usize) {
    let nearest = |members: &[usize], target: (f64, f64, f64)| {
        members
            .iter()
            .copied()
            .min_by(|&x, &y| {
                distance_to(&nodes[x].coordinates, target)
                    .total_cmp(&distance_to(&nodes[y].coordinates, target))
            })
            .unwrap_or(members[0])
    };
    (nearest(&c.members, d.centroid), nearest(&d.members, c.centroid))
}

/// Group nodes by cluster in order of first appearance.
fn group_clusters(nodes: &[SectorNode]) -> (Vec<ClusterGroup>, usize) {
    let mut region_index: HashMap<&str, usize> = HashMap::new();
    let mut cluster_index: HashMap<&str, usize> = HashMap::new();
    let mut clusters: Vec<ClusterGroup> = Vec::new();

    for (i, node) in nodes.iter().enumerate() {
        let next_region = region_index.len();
        let region = *region_index.entry(node.region_id.as_str()).or_insert(next_region);
        let next_cluster = clusters.len();
        let ci = *cluster_index.entry(node.cluster_id.as_str()).or_insert(next_cluster);
        if ci == clusters.len() {
            clusters.push(ClusterGroup {
                region,
                members: Vec::new(),
                centroid: (0.0, 0.0, 0.0),
                has_new: false,
            });
        }
        let cluster = &mut clusters[ci];
        cluster.members.push(i);
        cluster.has_new |= node.is_new;
    }

    for cluster in &mut clusters {
        let count = cluster.members.len() as f64;
        let (sx, sy, sz) = cluster.members.iter().fold((0.0, 0.0, 0.0), |acc, &m| {
            let c = nodes[m].coordinates;
            (acc.0 + c.x as f64, acc.1 + c.y as f64, acc.2 + c.z as f64)
        });
        cluster.centroid = (sx / count, sy / count, sz / count);
    }

    (clusters, region_index.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn node(id: usize, region: usize, cluster: usize, is_new: bool) -> SectorNode {
        SectorNode {
            id: format!("s{}", id),
            region_id: format!("r{}", region),
            cluster_id: format!("c{}", cluster),
            coordinates: Coordinates::new(cluster as i32 * 10 + (id % 4) as i32, (id / 4 % 4) as i32, (id / 16) as i32),
            hazard_level: (id % 11) as u8,
            is_new,
        }
    }

    /// `clusters_per_region` clusters of `per_cluster` sectors in each region.
    fn layout(regions: usize, clusters_per_region: usize, per_cluster: usize) -> Vec<SectorNode> {
        let mut nodes = Vec::new();
        let mut id = 0;
        for r in 0..regions {
            for c in 0..clusters_per_region {
                for _ in 0..per_cluster {
                    nodes.push(node(id, r, r * clusters_per_region + c, true));
                    id += 1;
                }
            }
        }
        nodes
    }

    fn build(nodes: &[SectorNode], existing: &[WarpTunnel], connectivity: Connectivity, seed: u64) -> ConnectivityPlan {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let policy = StabilityPolicy::default();
        ConnectivityBuilder::new(&mut rng, connectivity, 0.2, &policy)
            .build(&"g".to_string(), nodes, existing)
            .unwrap()
    }

    #[test]
    fn test_spanning_tree_has_n_minus_one_edges() {
        let nodes = layout(3, 2, 5);
        let plan = build(&nodes, &[], Connectivity::Normal, 1);

        assert_eq!(plan.spanning.len(), nodes.len() - 1);
        let ids: Vec<Id> = nodes.iter().map(|n| n.id.clone()).collect();
        verify_tunnels(&ids, &plan.spanning).unwrap();
    }

    #[test]
    fn test_no_self_loops_or_duplicate_pairs() {
        let nodes = layout(2, 3, 6);
        let plan = build(&nodes, &[], Connectivity::Dense, 2);

        let mut seen = HashSet::new();
        for tunnel in plan.spanning.iter().chain(plan.extra.iter()) {
            assert_ne!(tunnel.source_sector_id, tunnel.target_sector_id);
            assert!(seen.insert(tunnel.pair_key()));
            assert!((0.0..=1.0).contains(&tunnel.stability));
            assert!(tunnel.turn_cost >= 1);
        }
    }

    #[test]
    fn test_local_tunnels_are_preferred() {
        let nodes = layout(3, 3, 8);
        let plan = build(&nodes, &[], Connectivity::Sparse, 3);

        let cluster_edges = plan.spanning.iter().filter(|t| t.span == TunnelSpan::Cluster).count();
        let galaxy_edges = plan.spanning.iter().filter(|t| t.span == TunnelSpan::Galaxy).count();
        // 9 clusters of 8 need 7 internal edges each; the 3 regions need 2 links.
        assert_eq!(cluster_edges, 9 * 7);
        assert_eq!(galaxy_edges, 2);
    }

    #[test]
    fn test_dense_adds_more_shortcuts_than_sparse() {
        let nodes = layout(3, 4, 10);
        let sparse = build(&nodes, &[], Connectivity::Sparse, 4);
        let dense = build(&nodes, &[], Connectivity::Dense, 4);

        assert!(sparse.extra.len() <= 6);
        assert!(dense.extra.len() >= 36);
        assert!(sparse.extra.len() < dense.extra.len());
    }

    #[test]
    fn test_attach_mode_joins_new_sectors_to_existing_graph() {
        let mut nodes = layout(2, 2, 5);
        let first = build(&nodes, &[], Connectivity::Normal, 5);
        let existing = first.into_tunnels();
        for node in &mut nodes {
            node.is_new = false;
        }

        let start = nodes.len();
        for i in 0..5 {
            nodes.push(node(start + i, 1, 99, true));
        }
        let plan = build(&nodes, &existing, Connectivity::Normal, 6);

        assert_eq!(plan.spanning.len(), 5);
        for tunnel in plan.spanning.iter().chain(plan.extra.iter()) {
            let touches_new = [&tunnel.source_sector_id, &tunnel.target_sector_id]
                .iter()
                .any(|id| nodes.iter().any(|n| &n.id == *id && n.is_new));
            assert!(touches_new);
        }

        let ids: Vec<Id> = nodes.iter().map(|n| n.id.clone()).collect();
        let mut all = existing.clone();
        all.extend(plan.into_tunnels());
        verify_tunnels(&ids, &all).unwrap();
    }

    #[test]
    fn test_verify_connected_reports_unreachable() {
        let err = verify_connected(5, &[(0, 1), (1, 2)]).unwrap_err();
        assert!(matches!(
            err,
            GalaxyError::ConnectivityInvariantViolation {
                components: 3,
                unreachable: 2
            }
        ));
    }

    #[test]
    fn test_hazardous_endpoints_lower_stability() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let policy = StabilityPolicy::default();
        let mut builder = ConnectivityBuilder::new(&mut rng, Connectivity::Normal, 0.1, &policy);
        let safe = node(0, 0, 0, true);
        let mut risky = node(1, 0, 0, true);
        risky.hazard_level = 9;

        for _ in 0..50 {
            let tunnel = builder.tunnel(&"g".to_string(), &safe, &risky, TunnelSpan::Cluster);
            let band = tunnel.kind.narrow(Range::new(0.5, 1.0));
            let midpoint = band.min + (band.max - band.min) * 0.5;
            assert!(tunnel.stability >= band.min - f64::EPSILON);
            assert!(tunnel.stability <= midpoint + f64::EPSILON);
        }
    }

    #[test]
    fn test_tunnel_kinds_follow_weights_and_bands() {
        let nodes = layout(3, 4, 10);
        let plan = build(&nodes, &[], Connectivity::Dense, 12);
        let tunnels = plan.into_tunnels();

        let mut counts: HashMap<TunnelKind, usize> = HashMap::new();
        for tunnel in &tunnels {
            *counts.entry(tunnel.kind).or_default() += 1;
            let band = tunnel.kind.narrow(Range::new(0.5, 1.0));
            assert!(tunnel.stability >= band.min - f64::EPSILON);
            assert!(tunnel.stability <= band.max + f64::EPSILON);
        }
        let standard = counts.get(&TunnelKind::Standard).copied().unwrap_or(0);
        assert!(standard * 5 > tunnels.len() * 2);
        assert!(counts.len() >= 3);
    }

    #[test]
    fn test_region_stability_range_bounds_every_kind() {
        let mut rng = ChaCha8Rng::seed_from_u64(19);
        let policy = StabilityPolicy::default();
        let mut builder = ConnectivityBuilder::new(&mut rng, Connectivity::Normal, 0.1, &policy);
        let a = node(0, 0, 0, true);
        let b = node(4, 0, 0, true);

        for _ in 0..200 {
            let tunnel = builder.tunnel(&"g".to_string(), &a, &b, TunnelSpan::Cluster);
            assert!((0.5..=1.0).contains(&tunnel.stability));
        }
    }

    proptest! {
        #[test]
        fn prop_graph_is_always_connected(
            regions in 1usize..4,
            clusters in 1usize..4,
            per_cluster in 1usize..9,
            seed in any::<u64>(),
        ) {
            let nodes = layout(regions, clusters, per_cluster);
            let plan = build(&nodes, &[], Connectivity::Normal, seed);

            prop_assert_eq!(plan.spanning.len(), nodes.len() - 1);
            let ids: Vec<Id> = nodes.iter().map(|n| n.id.clone()).collect();
            prop_assert!(verify_tunnels(&ids, &plan.into_tunnels()).is_ok());
        }
    }
}
