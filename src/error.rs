//! Error types.

use thiserror::Error;

/// Returned by `try_insert` when an equal composite key is already present.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum InsertError {
    #[error("an entry with an equal composite key already exists")]
    DuplicateKey,
}

/// Owner-mismatch error: a `Cursor` was used with a map other than the one
/// that created it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("cursor was created by a different ManyKeysMap")]
pub struct WrongMap;
