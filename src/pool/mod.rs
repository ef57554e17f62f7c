pub mod collective;
pub mod pool;
pub mod strategy;

pub use collective::Collective;
pub use pool::ProcessPool;
pub use strategy::DivisionStrategy;
