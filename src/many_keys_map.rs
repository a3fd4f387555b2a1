//! ManyKeysMap: public map keyed by composite keys.

use crate::error::{InsertError, WrongMap};
use crate::fingerprint;
use crate::identity::IdentityRegistry;
use crate::key::{CompositeKey, KeyPart};
use crate::ordered_map::{self, Handle, OrderedMap};
use core::fmt;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use std::collections::hash_map::RandomState;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(0);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct OwnerId(u64);

impl OwnerId {
    fn next() -> Self {
        OwnerId(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A map whose keys are sequences of [`KeyPart`]s.
///
/// Primitive parts match by value (`NaN` matches `NaN`, `0.0` matches
/// `-0.0`); objects and symbols match only themselves. Entries iterate in
/// insertion order, and overwriting a key keeps its position.
///
/// ```
/// use many_keys_map::{key, ManyKeysMap, ObjectRef};
///
/// let target = ObjectRef::new(());
/// let mut handlers = ManyKeysMap::new();
/// handlers
///     .set(&key![&target, "click"], 1)
///     .set(&key![&target, "keypress"], 2);
///
/// assert_eq!(handlers.get(&key![&target, "click"]), Some(&1));
/// assert_eq!(handlers.get(&key![ObjectRef::new(()), "click"]), None);
/// assert_eq!(handlers.len(), 2);
/// ```
pub struct ManyKeysMap<V, S = RandomState> {
    entries: OrderedMap<V, S>,
    identities: IdentityRegistry,
    owner: OwnerId,
}

impl<V> ManyKeysMap<V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Build from optional initial pairs; `None` yields an empty map.
    pub fn from_pairs<I, K>(pairs: Option<I>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[KeyPart]>,
    {
        let mut map = Self::new();
        if let Some(pairs) = pairs {
            map.extend(pairs);
        }
        map
    }
}

impl<V> Default for ManyKeysMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> ManyKeysMap<V, S>
where
    S: BuildHasher,
{
    /// Descriptor used in `Debug` output.
    pub const TYPE_TAG: &'static str = "ManyKeysMap";

    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            entries: OrderedMap::with_capacity_and_hasher(capacity, hasher),
            identities: IdentityRegistry::new(),
            owner: OwnerId::next(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, key: &[KeyPart]) -> Option<Handle> {
        let fingerprint = fingerprint::resolve(&self.identities, key)?;
        self.entries.find(&fingerprint)
    }

    /// Insert or overwrite, returning the map for chaining.
    pub fn set(&mut self, key: &[KeyPart], value: V) -> &mut Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite, returning the previous value.
    ///
    /// The first insert of a key stores a copy of `key`; later overwrites
    /// keep that copy and the entry's position.
    pub fn insert(&mut self, key: &[KeyPart], value: V) -> Option<V> {
        let fingerprint = fingerprint::resolve_or_mint(&mut self.identities, key);
        let (_, previous) = self
            .entries
            .upsert(fingerprint, || CompositeKey::copy_from(key), value);
        previous
    }

    /// Insert only if no equal key is present.
    pub fn try_insert(&mut self, key: &[KeyPart], value: V) -> Result<&mut V, InsertError> {
        let fingerprint = fingerprint::resolve_or_mint(&mut self.identities, key);
        self.entries
            .insert_unique(fingerprint, || CompositeKey::copy_from(key), value)
    }

    pub fn get(&self, key: &[KeyPart]) -> Option<&V> {
        self.find(key).and_then(|h| self.entries.value(h))
    }

    pub fn get_mut(&mut self, key: &[KeyPart]) -> Option<&mut V> {
        let h = self.find(key)?;
        self.entries.value_mut(h)
    }

    /// Stored key and value; the stored key is the map's own copy.
    pub fn get_key_value(&self, key: &[KeyPart]) -> Option<(&CompositeKey, &V)> {
        self.find(key).and_then(|h| self.entries.entry(h))
    }

    pub fn contains_key(&self, key: &[KeyPart]) -> bool {
        self.find(key).is_some()
    }

    pub fn remove_entry(&mut self, key: &[KeyPart]) -> Option<(CompositeKey, V)> {
        let h = self.find(key)?;
        self.entries.remove(h)
    }

    pub fn remove(&mut self, key: &[KeyPart]) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Remove the entry for `key`; false if there was none.
    pub fn delete(&mut self, key: &[KeyPart]) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Remove every entry and forget every identity seen so far.
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.identities.clear();
        tracing::debug!(removed, "cleared many-keys map");
    }

    /// Drop identity records for objects that no longer exist and release
    /// spare index capacity.
    pub fn shrink_to_fit(&mut self) {
        self.identities.shrink_to_fit();
        self.entries.shrink_to_fit();
    }

    /// Keep only entries for which `f` returns true, in insertion order.
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&CompositeKey, &mut V) -> bool,
    {
        self.entries.retain(f);
    }

    /// Call `f(value, key)` for every entry in insertion order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&V, &CompositeKey),
    {
        for (k, v) in self.iter() {
            f(v, k);
        }
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: self.entries.iter(),
            remaining: self.entries.len(),
        }
    }

    pub fn keys(&self) -> Keys<'_, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, V> {
        Values { inner: self.iter() }
    }

    /// A position in this map's entry order that does not borrow the map.
    ///
    /// The map may be changed between calls to [`Cursor::next_entry`]:
    /// entries removed before being reached are skipped, and entries added
    /// meanwhile are visited until the cursor reports the end.
    ///
    /// ```
    /// use many_keys_map::{key, ManyKeysMap};
    ///
    /// let mut m = ManyKeysMap::new();
    /// m.set(&key!["a"], 1).set(&key!["b"], 2).set(&key!["c"], 3);
    ///
    /// let mut seen = Vec::new();
    /// let mut cursor = m.cursor();
    /// while let Some(v) = cursor.next_entry(&m).unwrap().map(|(_, v)| *v) {
    ///     seen.push(v);
    ///     if v == 1 {
    ///         m.delete(&key!["b"]);
    ///         m.set(&key!["d"], 4);
    ///     }
    /// }
    /// assert_eq!(seen, vec![1, 3, 4]);
    /// ```
    pub fn cursor(&self) -> Cursor {
        Cursor {
            owner: self.owner,
            after: None,
            done: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }
}

/// Live iteration position over a [`ManyKeysMap`].
#[derive(Clone, Debug)]
pub struct Cursor {
    owner: OwnerId,
    after: Option<u64>,
    // Set once the end is reached; later inserts are not visited.
    done: bool,
}

impl Cursor {
    /// Advance to the next live entry of `map`.
    ///
    /// Once this returns `Ok(None)` the cursor is finished and keeps
    /// returning `Ok(None)`, even if entries are added afterwards.
    ///
    /// Fails with [`WrongMap`] if `map` is not the map that created this
    /// cursor.
    pub fn next_entry<'m, V, S>(
        &mut self,
        map: &'m ManyKeysMap<V, S>,
    ) -> Result<Option<(CompositeKey, &'m V)>, WrongMap>
    where
        S: BuildHasher,
    {
        if self.owner != map.owner {
            return Err(WrongMap);
        }
        if self.done {
            return Ok(None);
        }
        let Some((seq, handle)) = map.entries.next_after(self.after) else {
            self.done = true;
            return Ok(None);
        };
        self.after = Some(seq);
        Ok(map.entries.entry(handle).map(|(k, v)| (k.clone(), v)))
    }
}

impl<V, S> fmt::Debug for ManyKeysMap<V, S>
where
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::TYPE_TAG)?;
        f.write_str(" ")?;
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Extend<(K, V)> for ManyKeysMap<V, S>
where
    K: AsRef<[KeyPart]>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k.as_ref(), v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ManyKeysMap<V>
where
    K: AsRef<[KeyPart]>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

/// Insertion-ordered iterator over `(key, value)` pairs.
pub struct Iter<'a, V> {
    inner: ordered_map::Iter<'a, V>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a CompositeKey, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
            remaining: self.remaining,
        }
    }
}

pub struct Keys<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> Iterator for Keys<'a, V> {
    type Item = &'a CompositeKey;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Keys<'_, V> {}
impl<V> FusedIterator for Keys<'_, V> {}

impl<V> Clone for Keys<'_, V> {
    fn clone(&self) -> Self {
        Keys {
            inner: self.inner.clone(),
        }
    }
}

pub struct Values<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {}
impl<V> FusedIterator for Values<'_, V> {}

impl<V> Clone for Values<'_, V> {
    fn clone(&self) -> Self {
        Values {
            inner: self.inner.clone(),
        }
    }
}

/// Owning insertion-ordered iterator.
pub struct IntoIter<V> {
    inner: ordered_map::IntoIter<V>,
}

impl<V> Iterator for IntoIter<V> {
    type Item = (CompositeKey, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, V, S> IntoIterator for &'a ManyKeysMap<V, S>
where
    S: BuildHasher,
{
    type Item = (&'a CompositeKey, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<V, S> IntoIterator for ManyKeysMap<V, S>
where
    S: BuildHasher,
{
    type Item = (CompositeKey, V);
    type IntoIter = IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.entries.into_entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{ObjectRef, Symbol};

    /// Invariant: the token table keeps symbols after their entries are
    /// deleted, and clear empties it.
    #[test]
    fn token_table_leaks_until_clear() {
        let obj = ObjectRef::new(());
        let sym = Symbol::new("symbol");
        let mut m: ManyKeysMap<&str> = [
            (key!["-"].to_vec(), "first"),
            (key![&obj].to_vec(), "fourth"),
            (key![&obj, &obj].to_vec(), "fifth"),
            (key![&sym].to_vec(), "sixth"),
            (key![&sym, &obj].to_vec(), "seventh"),
        ]
        .into_iter()
        .collect();
        assert_eq!(m.identities().token_count(), 1);

        assert!(m.delete(&key![&sym]));
        assert!(m.delete(&key![&sym, &obj]));
        assert_eq!(m.len(), 3);
        assert_eq!(m.identities().token_count(), 1);

        m.set(&key![KeyPart::Null, Symbol::new("1")], "null");
        assert_eq!(m.identities().token_count(), 3);

        m.clear();
        assert_eq!(m.len(), 0);
        assert_eq!(m.identities().token_count(), 0);
        assert_eq!(m.identities().object_count(), 0);
        m.clear();
        assert_eq!(m.len(), 0);
    }

    /// Invariant: read-only operations never mint identities.
    #[test]
    fn lookups_do_not_register_identities() {
        let mut m = ManyKeysMap::new();
        m.set(&key!["a"], 1);
        let stranger = ObjectRef::new(());
        assert!(!m.contains_key(&key![&stranger]));
        assert_eq!(m.get(&key![Symbol::anonymous()]), None);
        assert!(!m.delete(&key![KeyPart::Null]));
        assert_eq!(m.identities().object_count(), 0);
        assert_eq!(m.identities().token_count(), 0);
    }

    /// Invariant: identities of dropped objects are released by shrink_to_fit
    /// once their entries are gone.
    #[test]
    fn shrink_releases_dead_identities() {
        let mut m = ManyKeysMap::new();
        let keep = ObjectRef::new(());
        m.set(&key![&keep], 0);
        for i in 0..10 {
            let o = ObjectRef::new(i);
            m.set(&key![&o], i);
            assert!(m.delete(&key![&o]));
        }
        assert_eq!(m.identities().object_count(), 11);
        m.shrink_to_fit();
        assert_eq!(m.identities().object_count(), 1);
        assert_eq!(m.get(&key![&keep]), Some(&0));
    }

    /// Invariant: stored entries keep their key objects alive.
    #[test]
    fn entries_keep_key_objects_alive() {
        let mut m = ManyKeysMap::new();
        let rc = std::rc::Rc::new(5u8);
        let weak = std::rc::Rc::downgrade(&rc);
        m.set(&key![ObjectRef::from_rc(rc)], "v");
        m.shrink_to_fit();
        assert!(weak.upgrade().is_some());
        assert_eq!(m.identities().object_count(), 1);

        m.clear();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn debug_output_carries_type_tag() {
        let mut m = ManyKeysMap::new();
        m.set(&key!["a", 1], true);
        let text = format!("{:?}", m);
        assert!(text.starts_with("ManyKeysMap {"), "{text}");
        assert!(text.contains("Str(\"a\")"), "{text}");
    }
}
