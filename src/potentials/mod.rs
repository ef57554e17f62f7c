pub mod map;
pub mod pairpotential;
pub mod shortrange;

pub use map::PotentialMap;
pub use pairpotential::PairPotential;
pub use shortrange::ShortRange;
pub use shortrange::TruncationScheme;
