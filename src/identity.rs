//! Identity tagging for reference key parts.
//!
//! Every object, symbol or `Null` seen in a key gets a tag the first time a
//! key containing it is written. Objects are held weakly; symbols (and the
//! private `Null` token) are held strongly until `clear`.

use crate::key::{ObjectRef, Symbol};
use core::any::Any;
use core::fmt;
use hashbrown::HashMap;
use std::rc::Weak;

/// The object table is swept of dead identities once it grows to this many
/// entries, and then again whenever it doubles.
const MIN_SWEEP_THRESHOLD: usize = 64;

/// Process-unique name for one reference identity within a registry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IdentityTag(u64);

impl IdentityTag {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IdentityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@@mkm-ref-{}@@", self.0)
    }
}

/// A key part that is tracked by identity.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Identity<'a> {
    Object(&'a ObjectRef),
    Token(&'a Symbol),
    Null,
}

struct ObjectSlot {
    // Keeps the allocation (not the value) alive, so the address key cannot
    // be reused by another object while this slot exists.
    weak: Weak<dyn Any>,
    tag: IdentityTag,
}

pub(crate) struct IdentityRegistry {
    objects: HashMap<usize, ObjectSlot>,
    tokens: HashMap<Symbol, IdentityTag>,
    null_token: Symbol,
    next_id: u64,
    sweep_threshold: usize,
}

impl IdentityRegistry {
    pub(crate) fn new() -> Self {
        Self {
            objects: HashMap::new(),
            tokens: HashMap::new(),
            null_token: Symbol::new("null"),
            next_id: 0,
            sweep_threshold: MIN_SWEEP_THRESHOLD,
        }
    }

    /// Tag previously assigned to `id`, or `None` if it was never tagged.
    pub(crate) fn lookup(&self, id: Identity<'_>) -> Option<IdentityTag> {
        match id {
            Identity::Object(obj) => self.objects.get(&obj.addr()).map(|slot| {
                debug_assert!(slot.weak.strong_count() > 0);
                slot.tag
            }),
            Identity::Token(sym) => self.tokens.get(sym).copied(),
            Identity::Null => self.tokens.get(&self.null_token).copied(),
        }
    }

    /// Tag for `id`, minting and recording a fresh one on first sight.
    pub(crate) fn tag_or_mint(&mut self, id: Identity<'_>) -> IdentityTag {
        if let Some(tag) = self.lookup(id) {
            return tag;
        }
        let tag = IdentityTag(self.next_id);
        self.next_id += 1;
        match id {
            Identity::Object(obj) => {
                self.objects.insert(
                    obj.addr(),
                    ObjectSlot {
                        weak: obj.downgrade(),
                        tag,
                    },
                );
                if self.objects.len() >= self.sweep_threshold {
                    self.sweep();
                }
            }
            Identity::Token(sym) => {
                self.tokens.insert(sym.clone(), tag);
            }
            Identity::Null => {
                self.tokens.insert(self.null_token.clone(), tag);
            }
        }
        tracing::trace!(%tag, "minted identity tag");
        tag
    }

    /// Drop object slots whose object is no longer alive.
    pub(crate) fn sweep(&mut self) {
        let before = self.objects.len();
        self.objects.retain(|_, slot| slot.weak.strong_count() > 0);
        self.sweep_threshold = (self.objects.len() * 2).max(MIN_SWEEP_THRESHOLD);
        tracing::debug!(
            before,
            after = self.objects.len(),
            "swept dead object identities"
        );
    }

    /// Forget every identity. Tags are never reissued afterwards.
    pub(crate) fn clear(&mut self) {
        self.objects.clear();
        self.tokens.clear();
        self.sweep_threshold = MIN_SWEEP_THRESHOLD;
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.sweep();
        self.objects.shrink_to_fit();
        self.tokens.shrink_to_fit();
    }

    #[cfg(test)]
    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub(crate) fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("objects", &self.objects.len())
            .field("tokens", &self.tokens.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
