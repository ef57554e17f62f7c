use super::collective::Collective;
use super::collective::Participants;
use super::strategy::DivisionStrategy;
use std::sync::Arc;

/// A handle onto one rank of a process pool.
///
/// Ranks are partitioned into contiguous groups; loop division
/// strategies map onto either the group tier (PoolParallel interleaves
/// cells over groups) or the process tier (GroupParallel interleaves
/// atoms over the processes of one group). A pool built without any
/// shared collective is the single-rank serial pool, for which every
/// collective operation is the identity.
pub struct ProcessPool {
    rank: usize,
    size: usize,
    group: usize,
    group_rank: usize,
    group_size: usize,
    n_groups: usize,
    shared: Option<Arc<Collective>>,
}

impl Default for ProcessPool {
    fn default() -> Self {
        Self::serial()
    }
}

impl ProcessPool {
    /// the single-rank pool; all collectives are identity
    pub fn serial() -> Self {
        Self {
            rank: 0,
            size: 1,
            group: 0,
            group_rank: 0,
            group_size: 1,
            n_groups: 1,
            shared: None,
        }
    }

    /// Build an in-process team of `size` ranks split into `n_groups`
    /// contiguous groups, one handle per rank. Handles are intended to be
    /// moved onto scoped threads; collectives block until every
    /// participating rank arrives.
    pub fn team(size: usize, n_groups: usize) -> Vec<Self> {
        let shared = Arc::new(Collective::new(size, n_groups));
        let group_size = size / n_groups;
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                group: rank / group_size,
                group_rank: rank % group_size,
                group_size,
                n_groups,
                shared: Some(shared.clone()),
            })
            .collect()
    }

    pub fn world_rank(&self) -> usize {
        self.rank
    }

    pub fn n_world_processes(&self) -> usize {
        self.size
    }

    pub fn is_world_master(&self) -> bool {
        self.rank == 0
    }

    pub fn is_master(&self) -> bool {
        self.rank == 0
    }

    /// (start, stride) for an interleaved loop under the given strategy
    pub fn interleave(&self, strategy: DivisionStrategy) -> (usize, usize) {
        match strategy {
            DivisionStrategy::Serial => (0, 1),
            DivisionStrategy::PoolParallel => (self.group, self.n_groups),
            DivisionStrategy::GroupParallel => (self.group_rank, self.group_size),
        }
    }

    /// Strategy for a loop nested inside one already divided by `outer`,
    /// collapsing to Serial once the outer division has consumed all
    /// available ranks.
    pub fn sub_division_strategy(&self, outer: DivisionStrategy) -> DivisionStrategy {
        match outer {
            DivisionStrategy::PoolParallel if self.group_size > 1 => DivisionStrategy::GroupParallel,
            _ => DivisionStrategy::Serial,
        }
    }

    fn participants(&self, strategy: DivisionStrategy) -> Option<Participants> {
        match strategy {
            DivisionStrategy::Serial => None,
            DivisionStrategy::PoolParallel => Some(Participants::All),
            DivisionStrategy::GroupParallel => Some(Participants::Group(self.group)),
        }
    }

    /// in-place sum over exactly the ranks implied by the strategy
    pub fn all_sum(&self, buffer: &mut [f64], strategy: DivisionStrategy) {
        if let Some(shared) = &self.shared {
            if let Some(participants) = self.participants(strategy) {
                shared.sum(buffer, self.rank, participants);
            }
        }
    }

    /// copy the root rank's buffer to every rank in the pool
    pub fn broadcast(&self, buffer: &mut [f64], root: usize) {
        if let Some(shared) = &self.shared {
            shared.broadcast(buffer, self.rank, root, Participants::All);
        }
    }

    /// assert that all ranks hold the same value; divergence is fatal to
    /// the caller, which should unwind the whole pool
    pub fn equality(&self, value: f64) -> bool {
        match &self.shared {
            Some(shared) => shared.equality(value, self.rank, Participants::All),
            None => true,
        }
    }

    pub fn decide_true(&self) -> bool {
        self.decide(Some(true))
    }

    pub fn decide_false(&self) -> bool {
        self.decide(Some(false))
    }

    /// receive the master's decision
    pub fn decision(&self) -> bool {
        self.decide(None)
    }

    fn decide(&self, choice: Option<bool>) -> bool {
        match &self.shared {
            Some(shared) => shared.decide(choice, Participants::All),
            None => choice.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_pool_is_identity() {
        let pool = ProcessPool::serial();
        let mut buffer = [3.5];
        pool.all_sum(&mut buffer, DivisionStrategy::PoolParallel);
        assert_eq!(buffer[0], 3.5);
        assert!(pool.equality(1.0));
        assert!(pool.is_world_master());
        assert_eq!(pool.interleave(DivisionStrategy::PoolParallel), (0, 1));
    }

    #[test]
    fn interleave_splits_tiers() {
        let team = ProcessPool::team(4, 2);
        assert_eq!(team[0].interleave(DivisionStrategy::PoolParallel), (0, 2));
        assert_eq!(team[3].interleave(DivisionStrategy::PoolParallel), (1, 2));
        assert_eq!(team[0].interleave(DivisionStrategy::GroupParallel), (0, 2));
        assert_eq!(team[1].interleave(DivisionStrategy::GroupParallel), (1, 2));
        assert_eq!(team[2].interleave(DivisionStrategy::Serial), (0, 1));
    }

    #[test]
    fn sub_division_collapses_when_groups_are_single_ranks() {
        let wide = ProcessPool::team(4, 2);
        assert_eq!(
            wide[0].sub_division_strategy(DivisionStrategy::PoolParallel),
            DivisionStrategy::GroupParallel
        );
        let narrow = ProcessPool::team(4, 4);
        assert_eq!(
            narrow[0].sub_division_strategy(DivisionStrategy::PoolParallel),
            DivisionStrategy::Serial
        );
        assert_eq!(
            wide[0].sub_division_strategy(DivisionStrategy::GroupParallel),
            DivisionStrategy::Serial
        );
    }

    #[test]
    fn strided_loop_with_all_sum_recovers_serial_total() {
        let total: f64 = (0..100).map(|n| n as f64).sum();
        let team = ProcessPool::team(4, 4);
        std::thread::scope(|scope| {
            for pool in &team {
                scope.spawn(move || {
                    let (start, stride) = pool.interleave(DivisionStrategy::PoolParallel);
                    let mut local = [(start..100).step_by(stride).map(|n| n as f64).sum::<f64>()];
                    pool.all_sum(&mut local, DivisionStrategy::PoolParallel);
                    assert!((local[0] - total).abs() < 1e-12);
                });
            }
        });
    }
}
