//! The persistence layer behind the group store.
//!
//! [`GroupDb`] is the only way group records are read or written. The
//! production implementation lives in [`crate::model::mongodb`]; the
//! in-memory one is used by tests and local development.

use rocket::futures::stream::BoxStream;

use crate::error::Result;
use crate::model::group::{CandidateId, CandidateMap, Group, GroupId};

mod memory;

pub use memory::MemoryGroupDb;

/// A live feed of a group's candidates.
///
/// The first item is the state at the time the feed was opened, and one more
/// item follows every change. `None` means the group no longer exists; no
/// items follow it.
pub type ChangeFeed = BoxStream<'static, Result<Option<CandidateMap>>>;

#[rocket::async_trait]
pub trait GroupDb: Send + Sync {
    /// Is there a live group with this ID?
    async fn exists(&self, gid: &GroupId) -> Result<bool>;

    /// Write a whole group in one operation, unless its ID is already taken.
    /// Returns false (and writes nothing) if the ID is taken.
    async fn insert_new(&self, group: &Group) -> Result<bool>;

    /// Read the candidate sub-tree of a group.
    async fn candidates(&self, gid: &GroupId) -> Result<Option<CandidateMap>>;

    /// Remove a group. Removing a missing group is not an error.
    async fn delete(&self, gid: &GroupId) -> Result<()>;

    /// Atomically add one vote to a candidate and return the new tally.
    /// Returns `None`, changing nothing, if the group or candidate is missing.
    async fn increment_votes(&self, gid: &GroupId, rid: &CandidateId) -> Result<Option<u64>>;

    /// Open a [`ChangeFeed`] on a group. The feed releases its listener when
    /// dropped.
    async fn watch(&self, gid: &GroupId) -> Result<ChangeFeed>;
}
