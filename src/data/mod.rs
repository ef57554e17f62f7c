pub mod gridded;
pub mod histogram;

pub use gridded::Data1D;
pub use gridded::Data2D;
pub use gridded::Data3D;
pub use histogram::Histogram1D;
pub use histogram::Histogram2D;
pub use histogram::Histogram3D;
