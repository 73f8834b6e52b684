//=========================================================================
// Type Buckets
//=========================================================================
//
// One-to-many map from a concrete type to weak entries, with derived-type
// lookup.
//
// Each bucket remembers the base types its key is assignable to. A
// derived query for `T` visits the exact bucket first, then every other
// bucket whose key lists `T` among its bases. The list of those keys is
// computed lazily per requested type and dropped on every insert/remove.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

//=== Internal Dependencies ===============================================

use crate::core::node::TypeKey;

//=== BucketEntry =========================================================

/// A weak entry that may have gone stale since it was inserted.
pub(crate) trait BucketEntry {
    type Handle;

    /// Returns a strong handle when the referent is still alive and valid.
    fn resolve(&self) -> Option<Self::Handle>;
}

//=== Bucket ==============================================================

struct Bucket<E> {
    key: TypeKey,
    bases: Vec<TypeId>,
    entries: Vec<E>,
}

impl<E: BucketEntry> Bucket<E> {
    /// First live entry. Dead entries ahead of it are dropped.
    fn first_live(&mut self) -> Option<E::Handle> {
        while let Some(entry) = self.entries.first() {
            match entry.resolve() {
                Some(handle) => return Some(handle),
                None => {
                    self.entries.remove(0);
                }
            }
        }
        None
    }

    /// Every live entry, dropping dead ones on the way.
    fn collect_live(&mut self, out: &mut Vec<E::Handle>) {
        self.entries.retain(|entry| match entry.resolve() {
            Some(handle) => {
                out.push(handle);
                true
            }
            None => false,
        });
    }
}

//=== TypeBuckets =========================================================

pub(crate) struct TypeBuckets<E> {
    buckets: HashMap<TypeId, Bucket<E>>,
    assignable: HashMap<TypeId, Rc<[TypeId]>>,
}

impl<E: BucketEntry> TypeBuckets<E> {
    pub(crate) fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            assignable: HashMap::new(),
        }
    }

    //--- Mutation ---------------------------------------------------------

    pub(crate) fn insert(&mut self, key: TypeKey, bases: &[TypeKey], entry: E) {
        self.buckets
            .entry(key.id)
            .or_insert_with(|| Bucket {
                key,
                bases: bases.iter().map(|base| base.id).collect(),
                entries: Vec::new(),
            })
            .entries
            .push(entry);

        self.assignable.clear();
    }

    /// Removes every entry of bucket `key` matching `matches`. An emptied
    /// bucket is deleted.
    pub(crate) fn remove(&mut self, key: TypeId, matches: impl Fn(&E) -> bool) -> bool {
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return false;
        };

        let before = bucket.entries.len();
        bucket.entries.retain(|entry| !matches(entry));
        let removed = bucket.entries.len() != before;

        if bucket.entries.is_empty() {
            self.buckets.remove(&key);
        }

        self.assignable.clear();
        removed
    }

    /// Drops every dead entry and every emptied bucket.
    pub(crate) fn prune(&mut self) -> usize {
        let mut dropped = 0;
        let mut scratch = Vec::new();

        for bucket in self.buckets.values_mut() {
            let before = bucket.entries.len();
            bucket.collect_live(&mut scratch);
            dropped += before - bucket.entries.len();
            scratch.clear();
        }

        let bucket_count = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.entries.is_empty());
        if self.buckets.len() != bucket_count {
            self.assignable.clear();
        }

        dropped
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.assignable.clear();
    }

    //--- Queries ----------------------------------------------------------

    pub(crate) fn first(&mut self, target: TypeId, include_derived: bool) -> Option<E::Handle> {
        if let Some(handle) = self.buckets.get_mut(&target).and_then(Bucket::first_live) {
            return Some(handle);
        }
        if !include_derived {
            return None;
        }

        let keys = self.assignable_keys(target);
        keys.iter()
            .find_map(|key| self.buckets.get_mut(key).and_then(Bucket::first_live))
    }

    pub(crate) fn all(&mut self, target: TypeId, include_derived: bool) -> Vec<E::Handle> {
        let mut out = Vec::new();

        if let Some(bucket) = self.buckets.get_mut(&target) {
            bucket.collect_live(&mut out);
        }
        if !include_derived {
            return out;
        }

        let keys = self.assignable_keys(target);
        for key in keys.iter() {
            if let Some(bucket) = self.buckets.get_mut(key) {
                bucket.collect_live(&mut out);
            }
        }
        out
    }

    /// Keys of buckets other than `target` that are assignable to it,
    /// ordered by type name.
    fn assignable_keys(&mut self, target: TypeId) -> Rc<[TypeId]> {
        if let Some(keys) = self.assignable.get(&target) {
            return Rc::clone(keys);
        }

        let mut matches: Vec<&Bucket<E>> = self
            .buckets
            .iter()
            .filter(|(key, bucket)| **key != target && bucket.bases.contains(&target))
            .map(|(_, bucket)| bucket)
            .collect();
        matches.sort_by(|a, b| a.key.name.cmp(b.key.name));

        let keys: Rc<[TypeId]> = matches.iter().map(|bucket| bucket.key.id).collect();
        self.assignable.insert(target, Rc::clone(&keys));
        keys
    }

    //--- Introspection ----------------------------------------------------

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// `(type name, entry count)` per bucket, sorted by name.
    pub(crate) fn summary(&self) -> Vec<(&'static str, usize)> {
        let mut rows: Vec<_> = self
            .buckets
            .values()
            .map(|bucket| (bucket.key.name, bucket.entries.len()))
            .collect();
        rows.sort();
        rows
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Weak;

    impl BucketEntry for Weak<u32> {
        type Handle = Rc<u32>;

        fn resolve(&self) -> Option<Rc<u32>> {
            self.upgrade()
        }
    }

    struct Base;
    struct Left;
    struct Right;

    fn buckets() -> TypeBuckets<Weak<u32>> {
        TypeBuckets::new()
    }

    #[test]
    fn exact_bucket_comes_before_derived_buckets() {
        let mut b = buckets();
        let base = Rc::new(1);
        let right = Rc::new(3);
        let left = Rc::new(2);

        b.insert(TypeKey::of::<Right>(), &[TypeKey::of::<Base>()], Rc::downgrade(&right));
        b.insert(TypeKey::of::<Left>(), &[TypeKey::of::<Base>()], Rc::downgrade(&left));
        b.insert(TypeKey::of::<Base>(), &[], Rc::downgrade(&base));

        let all: Vec<u32> = b.all(TypeId::of::<Base>(), true).iter().map(|v| **v).collect();
        assert_eq!(all, vec![1, 2, 3]);

        let exact: Vec<u32> = b.all(TypeId::of::<Base>(), false).iter().map(|v| **v).collect();
        assert_eq!(exact, vec![1]);

        assert_eq!(b.first(TypeId::of::<Base>(), true).as_deref(), Some(&1));
    }

    #[test]
    fn derived_lookup_without_exact_bucket() {
        let mut b = buckets();
        let left = Rc::new(2);
        b.insert(TypeKey::of::<Left>(), &[TypeKey::of::<Base>()], Rc::downgrade(&left));

        assert!(b.first(TypeId::of::<Base>(), false).is_none());
        assert_eq!(b.first(TypeId::of::<Base>(), true).as_deref(), Some(&2));
    }

    #[test]
    fn assignable_cache_is_invalidated_on_insert() {
        let mut b = buckets();
        let left = Rc::new(2);
        b.insert(TypeKey::of::<Left>(), &[TypeKey::of::<Base>()], Rc::downgrade(&left));
        assert_eq!(b.all(TypeId::of::<Base>(), true).len(), 1);

        let right = Rc::new(3);
        b.insert(TypeKey::of::<Right>(), &[TypeKey::of::<Base>()], Rc::downgrade(&right));
        assert_eq!(b.all(TypeId::of::<Base>(), true).len(), 2);
    }

    #[test]
    fn reads_drop_dead_entries() {
        let mut b = buckets();
        let dead = Rc::new(1);
        let alive = Rc::new(2);
        b.insert(TypeKey::of::<Left>(), &[], Rc::downgrade(&dead));
        b.insert(TypeKey::of::<Left>(), &[], Rc::downgrade(&alive));
        drop(dead);

        assert_eq!(b.first(TypeId::of::<Left>(), false).as_deref(), Some(&2));
        assert_eq!(b.summary(), vec![("Left", 1)]);
    }

    #[test]
    fn removing_the_last_entry_deletes_the_bucket() {
        let mut b = buckets();
        let value = Rc::new(7);
        let weak = Rc::downgrade(&value);
        b.insert(TypeKey::of::<Left>(), &[], weak.clone());

        assert!(b.remove(TypeId::of::<Left>(), |e| Weak::ptr_eq(e, &weak)));
        assert_eq!(b.bucket_count(), 0);
        assert!(!b.remove(TypeId::of::<Left>(), |_| true));
    }

    #[test]
    fn prune_drops_empty_buckets() {
        let mut b = buckets();
        let value = Rc::new(7);
        b.insert(TypeKey::of::<Left>(), &[], Rc::downgrade(&value));
        drop(value);

        assert_eq!(b.prune(), 1);
        assert_eq!(b.bucket_count(), 0);
    }
}
