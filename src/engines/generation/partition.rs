//! Global ranking and re-slicing of the exchanged population.
//!
//! Every rank holds the same contributions after an exchange, so every rank
//! sorting them with the same total order and cutting the same stride recovers
//! a consistent, non-overlapping share without further communication.

use crate::error::{IdSortError, Result};
use std::cmp::Ordering;

/// Outcome of one sort-and-slice round.
#[derive(Debug, Clone)]
pub struct Redistribution<G> {
    /// This rank's new local population, fittest first.
    pub slice: Vec<G>,
    /// Fitness of the fittest genome in the whole pool.
    pub global_best: Option<f64>,
    pub pool_size: usize,
}

/// Checks that every rank contributed the same number of genomes and returns
/// that number. Each rank sees the same contributions, so they all agree.
pub fn check_uniform<G>(contributions: &[Vec<G>], rank: usize) -> Result<usize> {
    let expected = contributions.first().map(Vec::len).unwrap_or(0);
    if let Some((offender, other)) = contributions
        .iter()
        .enumerate()
        .find(|(_, c)| c.len() != expected)
    {
        return Err(IdSortError::CollectiveDesync {
            rank,
            reason: format!(
                "rank 0 contributed {} genomes but rank {} contributed {}",
                expected,
                offender,
                other.len()
            ),
        });
    }
    Ok(expected)
}

/// Flatten the contributions and sort ascending by fitness.
///
/// Equal fitness is broken by originating rank, then by position within that
/// rank's contribution, so the order is total and the same on every rank.
pub fn sort_pool<G, F>(contributions: Vec<Vec<G>>, fitness: F) -> Vec<G>
where
    F: Fn(&G) -> f64,
{
    let mut keyed: Vec<(f64, usize, usize, G)> = contributions
        .into_iter()
        .enumerate()
        .flat_map(|(origin, genomes)| {
            genomes
                .into_iter()
                .enumerate()
                .map(move |(index, genome)| (origin, index, genome))
        })
        .map(|(origin, index, genome)| (fitness(&genome), origin, index, genome))
        .collect();

    keyed.sort_by(|a, b| compare_keys((a.0, a.1, a.2), (b.0, b.1, b.2)));
    keyed.into_iter().map(|(_, _, _, genome)| genome).collect()
}

fn compare_keys(a: (f64, usize, usize), b: (f64, usize, usize)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then(a.1.cmp(&b.1))
        .then(a.2.cmp(&b.2))
}

/// `sorted[slice_size * rank .. slice_size * (rank + 1)]`.
pub fn partition<G>(sorted: Vec<G>, rank: usize, slice_size: usize) -> Result<Vec<G>> {
    let start = slice_size * rank;
    let end = start + slice_size;
    if sorted.len() < end {
        return Err(IdSortError::CollectiveDesync {
            rank,
            reason: format!(
                "pool of {} genomes cannot fill slot [{}, {})",
                sorted.len(),
                start,
                end
            ),
        });
    }
    Ok(sorted.into_iter().skip(start).take(slice_size).collect())
}

/// Rank-indexed contiguous slicing of the globally sorted pool.
#[derive(Debug, Clone, Copy)]
pub struct PopulationPartitioner {
    pub slice_size: usize,
    pub participant_count: usize,
}

impl PopulationPartitioner {
    pub fn new(slice_size: usize, participant_count: usize) -> Self {
        Self {
            slice_size,
            participant_count,
        }
    }

    /// Validate, sort and slice the result of one exchange for `rank`.
    pub fn redistribute<G, F>(
        &self,
        contributions: Vec<Vec<G>>,
        rank: usize,
        fitness: F,
    ) -> Result<Redistribution<G>>
    where
        F: Fn(&G) -> f64,
    {
        if contributions.len() != self.participant_count {
            return Err(IdSortError::CollectiveDesync {
                rank,
                reason: format!(
                    "exchange returned {} contributions for {} ranks",
                    contributions.len(),
                    self.participant_count
                ),
            });
        }
        check_uniform(&contributions, rank)?;

        let sorted = sort_pool(contributions, &fitness);
        let pool_size = sorted.len();
        // Every rank's slot must fit, not only ours
        if pool_size < self.slice_size * self.participant_count {
            return Err(IdSortError::CollectiveDesync {
                rank,
                reason: format!(
                    "pool of {} genomes is smaller than {} ranks x {}",
                    pool_size, self.participant_count, self.slice_size
                ),
            });
        }
        let global_best = sorted.first().map(&fitness);
        let slice = partition(sorted, rank, self.slice_size)?;

        Ok(Redistribution {
            slice,
            global_best,
            pool_size,
        })
    }
}
