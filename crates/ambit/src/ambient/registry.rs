//! Process-wide intern table: value type -> slot key.
//!
//! Shared by every branch. Sibling branches may intern a type they have never
//! seen at the same moment, so lookups take a read lock and only first-time
//! insertions take the write lock.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key of one ambient slot inside a branch's slot table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct SlotKey(u32);

impl SlotKey {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Default)]
struct Interned {
    keys: HashMap<TypeId, SlotKey>,
    /// Type name per key, indexed by `SlotKey::index`.
    names: Vec<&'static str>,
}

#[derive(Default)]
pub struct SlotRegistry {
    interned: RwLock<Interned>,
}

static REGISTRY: LazyLock<SlotRegistry> = LazyLock::new(SlotRegistry::default);

/// The registry shared by all branches in this process.
pub fn registry() -> &'static SlotRegistry {
    &REGISTRY
}

impl SlotRegistry {
    /// Slot key for `V`, allocating one on first use.
    pub fn intern<V: 'static>(&self) -> SlotKey {
        let id = TypeId::of::<V>();
        if let Some(&key) = self.read().keys.get(&id) {
            return key;
        }

        let mut interned = self.write();
        // Another branch may have won the race between the two locks.
        if let Some(&key) = interned.keys.get(&id) {
            return key;
        }
        let key = SlotKey(interned.names.len() as u32);
        interned.names.push(type_name::<V>());
        interned.keys.insert(id, key);
        log::trace!("interned ambient slot {} for {}", key.0, type_name::<V>());
        key
    }

    /// Slot key for `V` if any branch has ever stored one.
    pub fn lookup<V: 'static>(&self) -> Option<SlotKey> {
        self.read().keys.get(&TypeId::of::<V>()).copied()
    }

    /// Type name recorded for `key`.
    pub fn name(&self, key: SlotKey) -> Option<&'static str> {
        self.read().names.get(key.0 as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Interning never panics mid-update, so a poisoned table is still whole.
    fn read(&self) -> RwLockReadGuard<'_, Interned> {
        self.interned.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Interned> {
        self.interned.write().unwrap_or_else(PoisonError::into_inner)
    }
}
