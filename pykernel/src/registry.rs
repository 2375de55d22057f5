use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::class::{ClassId, NativeClass, WeakClass};
use crate::{Clash, ClashMode, InterpreterError, Representation, TypeFactory};

struct Entry {
    class: WeakClass,
    rep: Arc<Representation>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.class.is_live()
    }
}

/// Memoizing map from native class to its [`Representation`].
///
/// Keys are held weakly, so a class nothing else refers to can still be
/// reclaimed. The map lock is only ever held for the map operation itself
/// and never while waiting on the [`TypeFactory`].
pub struct TypeRegistry {
    map: RwLock<AHashMap<ClassId, Entry>>,
}

impl TypeRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(AHashMap::with_capacity(capacity)),
        }
    }

    /// The published representation of `class`, if there is one.
    pub fn lookup(&self, class: &NativeClass) -> Option<Arc<Representation>> {
        let map = self.map.read();
        map.get(&class.id())
            .filter(|entry| entry.is_live())
            .map(|entry| entry.rep.clone())
    }

    /// The representation of `class`, asking `factory` to find or create
    /// one on a miss.
    pub fn get(
        &self,
        class: &NativeClass,
        factory: &TypeFactory,
    ) -> Result<Arc<Representation>, InterpreterError> {
        if let Some(rep) = self.lookup(class) {
            return Ok(rep);
        }
        // The read lock is gone: the factory may block, and it publishes
        // into this map.
        factory.find_or_create(class)
    }

    /// Publish a batch of bindings. Either every binding is added or, if
    /// any class is already bound, none is.
    pub fn register_all(
        &self,
        bindings: &[(NativeClass, Arc<Representation>)],
    ) -> Result<(), Clash> {
        let mut map = self.map.write();
        for (class, _) in bindings {
            if let Some(existing) = map.get(&class.id()).filter(|entry| entry.is_live()) {
                return Err(Clash::new(
                    ClashMode::Existing,
                    class.name().clone(),
                    Some(existing.rep.to_string()),
                ));
            }
        }
        for (class, rep) in bindings {
            map.insert(
                class.id(),
                Entry {
                    class: class.downgrade(),
                    rep: rep.clone(),
                },
            );
        }
        Ok(())
    }

    /// Drop entries whose class has been reclaimed. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|_, entry| entry.is_live());
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
