use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::Value;

#[derive(Default)]
struct DictInner {
    entries: Vec<(Arc<str>, Value)>,
    index: AHashMap<Arc<str>, usize>,
}

impl DictInner {
    fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn insert(&mut self, key: Arc<str>, value: Value) -> Option<Value> {
        if let Some(&i) = self.index.get(&*key) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        let i = self.index.remove(key)?;
        let (_, value) = self.entries.remove(i);
        for (_, slot) in self.index.iter_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }
}

/// A string-keyed, insertion-ordered namespace. Used for type attributes
/// and instance dictionaries.
#[derive(Default)]
pub struct Dict(RwLock<DictInner>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.read().index.contains_key(key)
    }

    pub fn insert(&self, key: impl Into<Arc<str>>, value: Value) -> Option<Value> {
        self.0.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        self.0.read().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of the entries in insertion order.
    pub fn items(&self) -> Vec<(Arc<str>, Value)> {
        self.0.read().entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_across_removal() {
        let dict = Dict::new();
        dict.insert("a", Value::int(1));
        dict.insert("b", Value::int(2));
        dict.insert("c", Value::int(3));
        assert!(dict.remove("a").is_some());
        dict.insert("d", Value::int(4));
        let keys: Vec<String> = dict.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "c", "d"]);
        assert_eq!(dict.get("c").and_then(|v| v.as_int()), Some(3));
    }

    #[test]
    fn replacing_keeps_position() {
        let dict = Dict::new();
        dict.insert("x", Value::int(1));
        dict.insert("y", Value::int(2));
        let old = dict.insert("x", Value::int(10));
        assert_eq!(old.and_then(|v| v.as_int()), Some(1));
        assert_eq!(dict.keys()[0].as_ref(), "x");
        assert_eq!(dict.len(), 2);
        assert!(dict.remove("missing").is_none());
    }
}
