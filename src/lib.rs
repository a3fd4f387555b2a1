//! many-keys-map: a single-threaded map keyed by sequences of values,
//! where primitive parts match by value and reference parts by identity.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: look up a whole tuple of heterogeneous values as one key in
//!   amortized O(1), without holding on to the caller's key buffer.
//! - Layers:
//!   - IdentityRegistry: gives every object, symbol and `Null` seen in a
//!     written key a stable `IdentityTag`. Objects are recorded weakly;
//!     symbols strongly.
//!   - fingerprint: resolves a key sequence to a `Fingerprint`, an
//!     injective byte encoding with identity tags in place of references.
//!     Read mode never mints and gives up at the first untagged reference;
//!     write mode mints.
//!   - OrderedMap<V, S>: structural layer. Generational slots hold
//!     `(CompositeKey, Fingerprint, V)`; a hash table over slot keys is the
//!     fingerprint index and a sequence-number tree gives insertion order.
//!   - ManyKeysMap<V, S>: public API tying the three together.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` because key parts hold `Rc`.
//! - The stored key is the map's own `CompositeKey`, copied on first
//!   insert; later writes with an equal key reuse it.
//! - Index, slots and order change together inside one call, so an index
//!   entry always has a backing value.
//!
//! Identity records
//! - Object records hold a `Weak`, which pins the allocation but not the
//!   value. An address therefore cannot be reused while its record exists,
//!   and dead records are swept when the table doubles or on
//!   `shrink_to_fit`.
//! - Symbol records (and the private `Null` token) are strong and stay until
//!   `clear`, even after every entry using them is removed.
//! - Tags come from a per-map counter that is never reset.
//!
//! Iteration
//! - `iter`/`keys`/`values` borrow the map and follow insertion order.
//! - `Cursor` holds only the last visited sequence number, so the map can be
//!   mutated between steps: removed entries are skipped, new ones visited.
//!   A cursor that has returned the end stays finished.
//!
//! Notes and non-goals
//! - No ordering beyond insertion order; no persistence; no internal locking.
//! - Passing a non-sequence key is a type error, not a runtime error.

/// Build a `[KeyPart; N]` from values convertible into [`KeyPart`].
///
/// ```
/// use many_keys_map::{key, KeyPart};
///
/// let k = key!["a", 1, true, KeyPart::Null];
/// assert_eq!(k.len(), 4);
/// assert_eq!(k[1], KeyPart::Number(1.0));
/// ```
#[macro_export]
macro_rules! key {
    () => {{
        let parts: [$crate::KeyPart; 0] = [];
        parts
    }};
    ($($part:expr),+ $(,)?) => {
        [$($crate::KeyPart::from($part)),+]
    };
}

pub mod error;
mod fingerprint;
mod identity;
pub mod key;
mod many_keys_map;
mod ordered_map;
mod ordered_map_proptest;

// Public surface
pub use error::{InsertError, WrongMap};
pub use key::{CompositeKey, KeyPart, ObjectRef, Symbol};
pub use many_keys_map::{Cursor, IntoIter, Iter, Keys, ManyKeysMap, Values};
