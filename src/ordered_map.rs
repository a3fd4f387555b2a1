//! OrderedMap: insertion-ordered entry storage with stable handles, indexed
//! by fingerprint.
//!
//! Entries live in a generational slot map. A hash table over slot keys is
//! the fingerprint index, and a `BTreeMap` from insertion sequence number to
//! slot key records iteration order. All three are updated within a single
//! call, so the index never points at a missing entry.

use crate::error::InsertError;
use crate::fingerprint::Fingerprint;
use crate::key::CompositeKey;
use core::hash::BuildHasher;
use core::ops::Bound;
use hashbrown::hash_table::Entry as TableEntry;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::hash_map::RandomState;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Handle(DefaultKey);

#[derive(Debug)]
struct Entry<V> {
    key: CompositeKey,
    fingerprint: Fingerprint,
    value: V,
    hash: u64,
    seq: u64,
}

pub(crate) struct OrderedMap<V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>,
    order: BTreeMap<u64, DefaultKey>,
    // Never reset, so cursors keep making progress across `clear`.
    next_seq: u64,
}

impl<V, S> OrderedMap<V, S>
where
    S: BuildHasher,
{
    pub(crate) fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity_and_key(capacity),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn find(&self, fingerprint: &Fingerprint) -> Option<Handle> {
        let hash = self.hasher.hash_one(fingerprint);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.fingerprint == *fingerprint)
                    .unwrap_or(false)
            })
            .map(|&k| Handle(k))
    }

    /// Insert or overwrite. An overwrite keeps the entry's key and position
    /// and returns the previous value; `make_key` only runs on insert.
    pub(crate) fn upsert<F>(&mut self, fingerprint: Fingerprint, make_key: F, value: V) -> (Handle, Option<V>)
    where
        F: FnOnce() -> CompositeKey,
    {
        let hash = self.hasher.hash_one(&fingerprint);
        match self.index.entry(
            hash,
            |&kk| {
                self.slots
                    .get(kk)
                    .map(|e| e.fingerprint == fingerprint)
                    .unwrap_or(false)
            },
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            TableEntry::Occupied(o) => {
                let k = *o.get();
                let previous = core::mem::replace(&mut self.slots[k].value, value);
                (Handle(k), Some(previous))
            }
            TableEntry::Vacant(v) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let k = self.slots.insert(Entry {
                    key: make_key(),
                    fingerprint,
                    value,
                    hash,
                    seq,
                });
                let _ = v.insert(k);
                self.order.insert(seq, k);
                (Handle(k), None)
            }
        }
    }

    /// Insert only if the fingerprint is absent; otherwise leave the map
    /// unchanged.
    pub(crate) fn insert_unique<F>(&mut self, fingerprint: Fingerprint, make_key: F, value: V) -> Result<&mut V, InsertError>
    where
        F: FnOnce() -> CompositeKey,
    {
        if self.find(&fingerprint).is_some() {
            return Err(InsertError::DuplicateKey);
        }
        let (handle, _) = self.upsert(fingerprint, make_key, value);
        Ok(&mut self.slots[handle.0].value)
    }

    pub(crate) fn remove(&mut self, handle: Handle) -> Option<(CompositeKey, V)> {
        let k = handle.0;
        let entry = self.slots.remove(k)?;
        if let Ok(o) = self.index.find_entry(entry.hash, |&kk| kk == k) {
            o.remove();
        }
        self.order.remove(&entry.seq);
        Some((entry.key, entry.value))
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.order.clear();
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        let slots = &self.slots;
        self.index
            .shrink_to_fit(|&kk| slots.get(kk).map(|e| e.hash).unwrap_or(0));
    }

    pub(crate) fn value(&self, h: Handle) -> Option<&V> {
        self.slots.get(h.0).map(|e| &e.value)
    }

    pub(crate) fn value_mut(&mut self, h: Handle) -> Option<&mut V> {
        self.slots.get_mut(h.0).map(|e| &mut e.value)
    }

    pub(crate) fn entry(&self, h: Handle) -> Option<(&CompositeKey, &V)> {
        self.slots.get(h.0).map(|e| (&e.key, &e.value))
    }

    /// First live entry inserted after sequence number `after` (or the first
    /// entry overall), with its sequence number.
    pub(crate) fn next_after(&self, after: Option<u64>) -> Option<(u64, Handle)> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.order
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(&seq, &k)| (seq, Handle(k)))
    }

    /// Keep entries for which `f` returns true, visiting in insertion order.
    pub(crate) fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&CompositeKey, &mut V) -> bool,
    {
        let slots = &mut self.slots;
        let index = &mut self.index;
        self.order.retain(|_, &mut k| {
            let keep = match slots.get_mut(k) {
                Some(e) => f(&e.key, &mut e.value),
                None => false,
            };
            if !keep {
                if let Some(e) = slots.remove(k) {
                    if let Ok(o) = index.find_entry(e.hash, |&kk| kk == k) {
                        o.remove();
                    }
                }
            }
            keep
        });
    }

    pub(crate) fn iter(&self) -> Iter<'_, V> {
        Iter {
            order: self.order.values(),
            slots: &self.slots,
        }
    }

    pub(crate) fn into_entries(self) -> IntoIter<V> {
        IntoIter {
            order: self.order.into_values(),
            slots: self.slots,
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.index.len(), self.slots.len());
        assert_eq!(self.order.len(), self.slots.len());
        for (&seq, &k) in &self.order {
            let e = self.slots.get(k).expect("order points at live slot");
            assert_eq!(e.seq, seq);
            assert!(seq < self.next_seq);
            assert_eq!(self.find(&e.fingerprint), Some(Handle(k)));
        }
    }
}

/// Insertion-ordered iterator over `(key, value)` pairs.
pub(crate) struct Iter<'a, V> {
    order: btree_map::Values<'a, u64, DefaultKey>,
    slots: &'a SlotMap<DefaultKey, Entry<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a CompositeKey, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let slots = self.slots;
        self.order
            .find_map(|&k| slots.get(k))
            .map(|e| (&e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.order.len()))
    }
}

impl<'a, V> Clone for Iter<'a, V> {
    fn clone(&self) -> Self {
        Iter {
            order: self.order.clone(),
            slots: self.slots,
        }
    }
}

/// Owning insertion-ordered iterator.
pub(crate) struct IntoIter<V> {
    order: btree_map::IntoValues<u64, DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>,
}

impl<V> Iterator for IntoIter<V> {
    type Item = (CompositeKey, V);

    fn next(&mut self) -> Option<Self::Item> {
        let slots = &mut self.slots;
        self.order
            .find_map(|k| slots.remove(k))
            .map(|e| (e.key, e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.order.len()))
    }
}
