/// How a loop is divided between the ranks of a pool.
///
/// PoolParallel interleaves the outer loop over the pool's process
/// groups; GroupParallel interleaves over the processes within one
/// group; Serial runs every iteration on every rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisionStrategy {
    Serial,
    PoolParallel,
    GroupParallel,
}

impl std::fmt::Display for DivisionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::PoolParallel => write!(f, "pool-parallel"),
            Self::GroupParallel => write!(f, "group-parallel"),
        }
    }
}
