//! In-memory backend.
//!
//! Everything lives in `BTreeMap`s behind a single `parking_lot::RwLock`.
//! Identities are assigned from per-entity counters starting at 1, so the
//! first node created is node 1. Uniqueness constraints are checked under
//! the write lock and reported as `BackendError::UniqueViolation`.
//!
//! [`MemoryInventory`] is a matching in-memory [`ResourceInventory`](crate::core::ResourceInventory).

mod backend;
mod storage;

pub use backend::{MemoryBackend, MemoryInventory};
