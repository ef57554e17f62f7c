use super::item::GenericItem;
use super::item::Storable;
use std::collections::BTreeMap;

/// persist this item into the restart file
pub const IN_RESTART_FILE: u32 = 1;

/// The versioned, named blackboard shared between modules and procedure
/// nodes.
///
/// Entries are keyed by a composite of prefix and name; retrievals with
/// a mismatched type are logged errors that fall back to a default
/// rather than failures. Mutable retrievals bump the per-item version.
/// The underlying map is ordered so restart output is deterministic.
#[derive(Debug, Default)]
pub struct GenericList {
    items: BTreeMap<String, GenericItem>,
}

impl GenericList {
    /// composite key of a (name, prefix) pair
    pub fn key(name: &str, prefix: &str) -> String {
        match prefix.is_empty() {
            true => name.to_string(),
            false => format!("{}/{}", prefix, name),
        }
    }

    pub fn contains(&self, name: &str, prefix: &str) -> bool {
        self.items.contains_key(&Self::key(name, prefix))
    }

    pub fn remove(&mut self, name: &str, prefix: &str) -> bool {
        self.items.remove(&Self::key(name, prefix)).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a new default-valued item. An existing entry under the same
    /// key is a caller error; it is reported and treated as a realise.
    pub fn add<T: Storable + Default + 'static>(&mut self, name: &str, prefix: &str, flags: u32) -> &mut T {
        if self.contains(name, prefix) {
            log::warn!("item '{}' already exists in the list", Self::key(name, prefix));
        }
        self.realise(name, prefix, flags)
    }

    /// Create-or-return a mutable item, bumping its version and updating
    /// its flags. A type mismatch on an existing entry is reported and
    /// the entry is replaced with a default of the requested type.
    pub fn realise<T: Storable + Default + 'static>(&mut self, name: &str, prefix: &str, flags: u32) -> &mut T {
        let key = Self::key(name, prefix);
        let item = self
            .items
            .entry(key.clone())
            .or_insert_with(|| GenericItem::new(Box::new(T::default()), flags));
        item.set_flags(flags);
        item.bump_version();
        if item.downcast_ref::<T>().is_none() {
            log::error!("item '{}' exists but is a {}, not the requested type; resetting", key, item.class_name());
            let version = item.version();
            *item = GenericItem::with_version(Box::new(T::default()), flags, version);
        }
        self.items
            .get_mut(&key)
            .expect("entry just inserted")
            .downcast_mut::<T>()
            .expect("entry just reset to requested type")
    }

    /// Read-only value of a named item, or the supplied default when the
    /// item is missing or of the wrong type.
    pub fn value<T: Storable + Clone + 'static>(&self, name: &str, prefix: &str, default: T) -> T {
        match self.items.get(&Self::key(name, prefix)) {
            None => {
                log::debug!("no item named '{}' in the list; returning default", Self::key(name, prefix));
                default
            }
            Some(item) => match item.downcast_ref::<T>() {
                Some(value) => value.clone(),
                None => {
                    log::error!(
                        "item '{}' is a {}, not the requested type; returning default",
                        Self::key(name, prefix),
                        item.class_name(),
                    );
                    default
                }
            },
        }
    }

    /// Mutable access to an existing item, bumping its version. Missing
    /// items yield nothing; type mismatches are reported.
    pub fn retrieve<T: Storable + 'static>(&mut self, name: &str, prefix: &str) -> Option<&mut T> {
        let key = Self::key(name, prefix);
        let item = self.items.get_mut(&key)?;
        if item.downcast_ref::<T>().is_none() {
            log::error!("item '{}' is a {}, not the requested type", key, item.class_name());
            return None;
        }
        item.bump_version();
        item.downcast_mut::<T>()
    }

    pub fn version(&self, name: &str, prefix: &str) -> Option<u64> {
        self.items.get(&Self::key(name, prefix)).map(|item| item.version())
    }

    pub fn items(&self) -> impl Iterator<Item = (&String, &GenericItem)> {
        self.items.iter()
    }

    pub fn items_with_flag(&self, flag: u32) -> impl Iterator<Item = (&String, &GenericItem)> {
        self.items.iter().filter(move |(_, item)| item.flags() & flag != 0)
    }

    /// install a fully-formed item under a composite key, replacing any
    /// existing entry (restart-file reads come through here)
    pub fn insert_item(&mut self, key: String, item: GenericItem) {
        self.items.insert(key, item);
    }
}
