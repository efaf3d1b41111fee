use crate::error::{GalaxyError, Result};
use crate::model::RegionDistribution;

/// Per-region share of a sector budget, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionAllocation {
    pub name: String,
    pub ratio: u32,
    pub sector_count: u32,
}

pub struct RegionAllocator;

impl RegionAllocator {
    /// Split `total` across the declared regions so the counts sum to `total`
    /// exactly and every region gets at least one sector.
    pub fn allocate(total: u32, distribution: &RegionDistribution) -> Result<Vec<RegionAllocation>> {
        let regions = distribution.len() as u32;
        if regions == 0 || total < regions {
            return Err(GalaxyError::Capacity {
                requested: total,
                minimum: regions.max(1),
            });
        }

        let weights: Vec<u64> = distribution.iter().map(|(_, pct)| pct as u64).collect();
        let mut counts = largest_remainder(total as u64, &weights);
        ensure_minimum_one(&mut counts);

        Ok(distribution
            .iter()
            .zip(counts)
            .map(|((name, ratio), count)| RegionAllocation {
                name: name.to_string(),
                ratio,
                sector_count: count as u32,
            })
            .collect())
    }

    /// Like `allocate` but regions may receive zero sectors. Used to spread an
    /// expansion over existing regions.
    pub fn allocate_proportional(total: u32, weights: &[u32]) -> Vec<u32> {
        let weights: Vec<u64> = weights.iter().map(|w| *w as u64).collect();
        largest_remainder(total as u64, &weights)
            .into_iter()
            .map(|count| count as u32)
            .collect()
    }
}

/// Largest-remainder apportionment. Ties go to the earlier entry.
fn largest_remainder(total: u64, weights: &[u64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let weight_sum: u64 = weights.iter().sum();
    if weight_sum == 0 {
        // No preference expressed: spread evenly.
        let n = weights.len() as u64;
        return (0..n)
            .map(|i| total / n + u64::from(i < total % n))
            .collect();
    }

    let mut counts: Vec<u64> = weights.iter().map(|w| total * w / weight_sum).collect();
    let assigned: u64 = counts.iter().sum();

    // Remainders are compared as numerators over the shared denominator.
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = (total * weights[a]) % weight_sum;
        let rb = (total * weights[b]) % weight_sum;
        rb.cmp(&ra).then(a.cmp(&b))
    });

    for &index in order.iter().take((total - assigned) as usize) {
        counts[index] += 1;
    }
    counts
}

/// Move single sectors from the largest regions into empty ones.
fn ensure_minimum_one(counts: &mut [u64]) {
    for index in 0..counts.len() {
        if counts[index] > 0 {
            continue;
        }
        let donor = counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 1)
            .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
            .map(|(i, _)| i);
        if let Some(donor) = donor {
            counts[donor] -= 1;
            counts[index] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counts(total: u32, distribution: &RegionDistribution) -> Vec<u32> {
        RegionAllocator::allocate(total, distribution)
            .unwrap()
            .into_iter()
            .map(|a| a.sector_count)
            .collect()
    }

    #[test]
    fn test_exact_split() {
        let distribution = RegionDistribution::new()
            .with("core", 50)
            .with("border", 30)
            .with("frontier", 20);
        assert_eq!(counts(20, &distribution), vec![10, 6, 4]);
    }

    #[test]
    fn test_remainders_go_to_largest_fraction_then_declaration_order() {
        let distribution = RegionDistribution::new()
            .with("a", 33)
            .with("b", 33)
            .with("c", 34);
        // 10 * .33 = 3.3, 3.3, 3.4 -> floors 3,3,3 and the leftover goes to c
        assert_eq!(counts(10, &distribution), vec![3, 3, 4]);

        let even = RegionDistribution::new().with("a", 50).with("b", 50);
        // 3 * .5 = 1.5 each, tie resolved by order
        assert_eq!(counts(3, &even), vec![2, 1]);
    }

    #[test]
    fn test_every_region_gets_a_sector() {
        let distribution = RegionDistribution::new()
            .with("core", 98)
            .with("border", 1)
            .with("frontier", 1);
        assert_eq!(counts(3, &distribution), vec![1, 1, 1]);

        let distribution = RegionDistribution::new().with("core", 100).with("empty", 0);
        assert_eq!(counts(5, &distribution), vec![4, 1]);
    }

    #[test]
    fn test_capacity_error_when_regions_outnumber_sectors() {
        let distribution = RegionDistribution::new()
            .with("core", 50)
            .with("border", 30)
            .with("frontier", 20);
        let err = RegionAllocator::allocate(2, &distribution).unwrap_err();
        assert!(matches!(err, GalaxyError::Capacity { requested: 2, minimum: 3 }));
    }

    #[test]
    fn test_proportional_allows_zero() {
        assert_eq!(RegionAllocator::allocate_proportional(1, &[50, 30, 20]), vec![1, 0, 0]);
        assert_eq!(RegionAllocator::allocate_proportional(5, &[50, 30, 20]), vec![3, 1, 1]);
    }

    fn ratios() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0u32..=100, 1..8).prop_filter_map("needs positive sum", |raw| {
            let sum: u32 = raw.iter().sum();
            if sum == 0 {
                return None;
            }
            // Rescale to 100 and push the rounding error onto the first entry.
            let mut scaled: Vec<u32> = raw.iter().map(|r| r * 100 / sum).collect();
            let diff = 100 - scaled.iter().sum::<u32>();
            scaled[0] += diff;
            Some(scaled)
        })
    }

    proptest! {
        #[test]
        fn prop_counts_sum_exactly(ratios in ratios(), extra in 0u32..5000) {
            let mut distribution = RegionDistribution::new();
            for (i, r) in ratios.iter().enumerate() {
                distribution.push(format!("r{}", i), *r);
            }
            let total = ratios.len() as u32 + extra;
            let allocation = RegionAllocator::allocate(total, &distribution).unwrap();

            let sum: u32 = allocation.iter().map(|a| a.sector_count).sum();
            prop_assert_eq!(sum, total);
            prop_assert!(allocation.iter().all(|a| a.sector_count >= 1));
        }
    }
}
