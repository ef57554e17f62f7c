use crate::data::Data1D;
use crate::data::Data2D;
use crate::data::Data3D;
use crate::data::Histogram1D;
use crate::data::Histogram2D;
use crate::data::Histogram3D;
use std::any::Any;

/// A value that can live in a GenericList: type-erased at rest, named by
/// a stable class string, and serialisable for the restart file.
pub trait Storable: std::fmt::Debug + Send + Sync {
    fn class_name(&self) -> &'static str;
    fn payload(&self) -> serde_json::Value;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

macro_rules! storable {
    ($type:ty, $class:literal) => {
        impl Storable for $type {
            fn class_name(&self) -> &'static str {
                $class
            }
            fn payload(&self) -> serde_json::Value {
                serde_json::to_value(self).expect("storable values serialise")
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
    };
}

storable!(bool, "Bool");
storable!(i64, "Int");
storable!(f64, "Double");
storable!(String, "String");
storable!(Vec<f64>, "VectorDouble");
storable!(Data1D, "Data1D");
storable!(Data2D, "Data2D");
storable!(Data3D, "Data3D");
storable!(Histogram1D, "Histogram1D");
storable!(Histogram2D, "Histogram2D");
storable!(Histogram3D, "Histogram3D");

/// One named entry of a GenericList: flags, a write-version counter and
/// the type-erased data.
#[derive(Debug)]
pub struct GenericItem {
    version: u64,
    flags: u32,
    data: Box<dyn Storable>,
}

impl GenericItem {
    pub fn new(data: Box<dyn Storable>, flags: u32) -> Self {
        Self {
            version: 0,
            flags,
            data,
        }
    }

    /// rebuild with an explicit version, as read back from a restart file
    pub fn with_version(data: Box<dyn Storable>, flags: u32, version: u64) -> Self {
        Self {
            version,
            flags,
            data,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    pub fn class_name(&self) -> &'static str {
        self.data.class_name()
    }

    pub fn payload(&self) -> serde_json::Value {
        self.data.payload()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data.as_any_mut().downcast_mut::<T>()
    }
}
