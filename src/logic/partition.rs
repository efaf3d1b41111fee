//! Spatial layout of regions and clusters.
//!
//! Every cluster gets its own box with room for three cells per sector. Boxes
//! are combined pairwise by recursive guillotine cuts, so a region's volume is
//! split into disjoint cluster blocks and the galaxy volume into disjoint
//! region blocks. Sectors of one cluster therefore sit next to each other.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::model::{BoundingBox, ClusterType, Connectivity, Coordinates, RegionKind};

/// Free cells reserved per sector.
const CELLS_PER_SECTOR: i64 = 3;

/// Empty cells left between the existing galaxy and an annex.
const ANNEX_GAP: i32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPlan {
    pub bounds: BoundingBox,
    pub sector_count: u32,
    pub cluster_type: ClusterType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlan {
    pub bounds: BoundingBox,
    pub clusters: Vec<ClusterPlan>,
}

pub struct ClusterPartitioner;

impl ClusterPartitioner {
    /// Even split of `count` into `ceil(count / target)` clusters.
    pub fn cluster_sizes(count: u32, connectivity: Connectivity) -> Vec<u32> {
        if count == 0 {
            return Vec::new();
        }
        let target = connectivity.target_cluster_size();
        let clusters = count.div_ceil(target);
        let base = count / clusters;
        let extra = count % clusters;
        (0..clusters).map(|i| base + u32::from(i < extra)).collect()
    }

    /// Lay out every region of a new galaxy starting at the origin.
    pub fn plan_galaxy(
        region_counts: &[(RegionKind, u32)],
        connectivity: Connectivity,
        rng: &mut ChaCha8Rng,
    ) -> Vec<RegionPlan> {
        Self::plan_at(Coordinates::new(0, 0, 0), region_counts, connectivity, rng)
    }

    /// Lay out regions in a fresh annex beyond `existing`, used by expansion.
    pub fn plan_annex(
        existing: &[BoundingBox],
        region_counts: &[(RegionKind, u32)],
        connectivity: Connectivity,
        rng: &mut ChaCha8Rng,
    ) -> Vec<RegionPlan> {
        let origin_x = existing
            .iter()
            .map(|bounds| bounds.max.x)
            .max()
            .unwrap_or(0)
            + ANNEX_GAP;
        Self::plan_at(Coordinates::new(origin_x, 0, 0), region_counts, connectivity, rng)
    }

    fn plan_at(
        origin: Coordinates,
        region_counts: &[(RegionKind, u32)],
        connectivity: Connectivity,
        rng: &mut ChaCha8Rng,
    ) -> Vec<RegionPlan> {
        let mut cluster_layouts = Vec::with_capacity(region_counts.len());
        let mut region_extents = Vec::with_capacity(region_counts.len());

        for (_, count) in region_counts {
            let sizes = Self::cluster_sizes(*count, connectivity);
            let extents: Vec<[i32; 3]> = sizes.iter().map(|size| block_extent(*size)).collect();
            let (region_extent, offsets) = pack(&extents);
            region_extents.push(region_extent);
            cluster_layouts.push((sizes, extents, offsets));
        }

        let (_, region_offsets) = pack(&region_extents);

        region_counts
            .iter()
            .zip(cluster_layouts)
            .zip(region_extents.iter().zip(region_offsets))
            .map(|(((kind, _), (sizes, extents, offsets)), (region_extent, region_offset))| {
                let region_origin = shift(origin, region_offset);
                let clusters = sizes
                    .iter()
                    .zip(extents.iter().zip(offsets))
                    .map(|(size, (extent, offset))| ClusterPlan {
                        bounds: sized_box(shift(region_origin, offset), *extent),
                        sector_count: *size,
                        cluster_type: kind
                            .cluster_types()
                            .choose(rng)
                            .copied()
                            .unwrap_or(ClusterType::Standard),
                    })
                    .collect();
                RegionPlan {
                    bounds: sized_box(region_origin, *region_extent),
                    clusters,
                }
            })
            .collect()
    }
}

/// Near-cubic block with at least `CELLS_PER_SECTOR` cells per sector.
fn block_extent(sector_count: u32) -> [i32; 3] {
    let cells = (sector_count.max(1) as i64) * CELLS_PER_SECTOR;
    let side = (cells as f64).cbrt().ceil().max(1.0) as i64;
    let depth = (cells + side * side - 1) / (side * side);
    [side as i32, side as i32, depth.max(1) as i32]
}

/// Combine blocks by recursive halving. Returns the enclosing extent and the
/// offset of each block inside it.
fn pack(extents: &[[i32; 3]]) -> ([i32; 3], Vec<[i32; 3]>) {
    match extents.len() {
        0 => ([0, 0, 0], Vec::new()),
        1 => (extents[0], vec![[0, 0, 0]]),
        len => {
            let (left_extent, left_offsets) = pack(&extents[..len / 2]);
            let (right_extent, right_offsets) = pack(&extents[len / 2..]);

            // Stack along the axis that keeps the result closest to a cube.
            let axis = (0..3)
                .min_by_key(|&axis| {
                    (0..3)
                        .map(|a| {
                            if a == axis {
                                left_extent[a] + right_extent[a]
                            } else {
                                left_extent[a].max(right_extent[a])
                            }
                        })
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);

            let mut combined = [0; 3];
            for a in 0..3 {
                combined[a] = if a == axis {
                    left_extent[a] + right_extent[a]
                } else {
                    left_extent[a].max(right_extent[a])
                };
            }

            let mut offsets = left_offsets;
            offsets.extend(right_offsets.into_iter().map(|mut offset| {
                offset[axis] += left_extent[axis];
                offset
            }));
            (combined, offsets)
        }
    }
}

fn shift(origin: Coordinates, offset: [i32; 3]) -> Coordinates {
    Coordinates::new(origin.x + offset[0], origin.y + offset[1], origin.z + offset[2])
}

fn sized_box(origin: Coordinates, extent: [i32; 3]) -> BoundingBox {
    BoundingBox::with_size(origin, extent[0], extent[1], extent[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_cluster_sizes_are_even() {
        assert_eq!(ClusterPartitioner::cluster_sizes(10, Connectivity::Normal), vec![10]);
        assert_eq!(ClusterPartitioner::cluster_sizes(23, Connectivity::Normal), vec![8, 8, 7]);
        assert_eq!(ClusterPartitioner::cluster_sizes(13, Connectivity::Dense), vec![5, 4, 4]);
        assert!(ClusterPartitioner::cluster_sizes(0, Connectivity::Sparse).is_empty());
    }

    #[test]
    fn test_denser_connectivity_means_more_clusters() {
        let sparse = ClusterPartitioner::cluster_sizes(100, Connectivity::Sparse).len();
        let dense = ClusterPartitioner::cluster_sizes(100, Connectivity::Dense).len();
        assert!(dense > sparse);
    }

    #[test]
    fn test_cluster_boxes_are_disjoint_and_roomy() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let plans = ClusterPartitioner::plan_galaxy(
            &[
                (RegionKind::Core, 57),
                (RegionKind::Border, 31),
                (RegionKind::Frontier, 12),
            ],
            Connectivity::Dense,
            &mut rng,
        );

        let clusters: Vec<&ClusterPlan> = plans.iter().flat_map(|r| r.clusters.iter()).collect();
        for (i, a) in clusters.iter().enumerate() {
            assert!(a.bounds.volume() >= a.sector_count as i64 * CELLS_PER_SECTOR);
            for b in clusters.iter().skip(i + 1) {
                assert!(!a.bounds.overlaps(&b.bounds));
            }
        }

        for region in &plans {
            for cluster in &region.clusters {
                assert!(cluster.bounds.min.x >= region.bounds.min.x);
                assert!(cluster.bounds.max.x <= region.bounds.max.x);
            }
        }
        let total: u32 = clusters.iter().map(|c| c.sector_count).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_annex_sits_beyond_existing_space() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let existing = ClusterPartitioner::plan_galaxy(
            &[(RegionKind::Core, 20)],
            Connectivity::Normal,
            &mut rng,
        );
        let existing_boxes: Vec<BoundingBox> = existing[0].clusters.iter().map(|c| c.bounds).collect();

        let annex = ClusterPartitioner::plan_annex(
            &existing_boxes,
            &[(RegionKind::Core, 5)],
            Connectivity::Normal,
            &mut rng,
        );
        for cluster in &annex[0].clusters {
            for old in &existing_boxes {
                assert!(!cluster.bounds.overlaps(old));
            }
        }
    }
}
