use std::sync::Arc;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::model::db::{ChangeFeed, GroupDb};

use super::{CandidateId, CandidateMap, Group, GroupId};

/// How many IDs to draw before giving up on finding a free one.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Source of candidate group IDs.
pub type IdSource = Arc<dyn Fn() -> GroupId + Send + Sync>;

/// Owner of all group records.
///
/// Nothing else writes groups to the database; this is cheap to clone and is
/// placed in managed state.
#[derive(Clone)]
pub struct GroupStore {
    db: Arc<dyn GroupDb>,
    id_source: IdSource,
}

impl GroupStore {
    pub fn new(db: Arc<dyn GroupDb>) -> Self {
        Self::with_id_source(db, Arc::new(GroupId::random))
    }

    /// Use a custom ID source instead of uniformly random IDs.
    pub fn with_id_source(db: Arc<dyn GroupDb>, id_source: IdSource) -> Self {
        Self { db, id_source }
    }

    /// Draw an ID without checking whether it is taken.
    pub fn generate(&self) -> GroupId {
        (self.id_source)()
    }

    /// Is this ID unused by any live group?
    pub async fn is_free(&self, gid: &GroupId) -> Result<bool> {
        Ok(!self.db.exists(gid).await?)
    }

    /// Draw IDs until one is free.
    ///
    /// Another `create` may still claim the ID before it is written; `create`
    /// handles that case.
    pub async fn allocate(&self) -> Result<GroupId> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let gid = self.generate();
            if self.is_free(&gid).await? {
                return Ok(gid);
            }
            debug!("Group ID {gid} is taken, drawing again");
        }
        Err(Error::ResourceExhausted(format!(
            "No free group ID after {MAX_ALLOCATION_ATTEMPTS} attempts"
        )))
    }

    /// Create a group holding the given candidates, all written at once.
    pub async fn create(&self, candidates: CandidateMap) -> Result<GroupId> {
        let mut group = Group {
            id: self.allocate().await?,
            candidates,
        };
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            if self.db.insert_new(&group).await? {
                info!(
                    "Created group {} with {} candidates",
                    group.id,
                    group.candidates.len()
                );
                return Ok(group.id);
            }
            debug!("Group ID {} claimed concurrently, reallocating", group.id);
            group.id = self.allocate().await?;
        }
        Err(Error::ResourceExhausted(format!(
            "Group IDs kept being claimed concurrently after {MAX_ALLOCATION_ATTEMPTS} attempts"
        )))
    }

    /// The candidates of a group.
    pub async fn get(&self, gid: &GroupId) -> Result<CandidateMap> {
        self.db
            .candidates(gid)
            .await?
            .ok_or_else(|| Error::not_found(format!("Group '{gid}'")))
    }

    /// Delete a group. Deleting a missing group succeeds.
    pub async fn delete(&self, gid: &GroupId) -> Result<()> {
        self.db.delete(gid).await?;
        info!("Deleted group {gid}");
        Ok(())
    }

    /// Add one vote to a candidate, returning its new tally.
    pub async fn vote(&self, gid: &GroupId, rid: &CandidateId) -> Result<u64> {
        if let Some(votes) = self.db.increment_votes(gid, rid).await? {
            debug!("Group {gid} candidate {rid} now has {votes} votes");
            return Ok(votes);
        }
        if self.db.exists(gid).await? {
            Err(Error::not_found(format!("Candidate '{rid}' in group '{gid}'")))
        } else {
            Err(Error::not_found(format!("Group '{gid}'")))
        }
    }

    /// Open a change feed on a group's candidates.
    pub async fn watch(&self, gid: &GroupId) -> Result<ChangeFeed> {
        self.db.watch(gid).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::seq::SliceRandom;
    use rocket::futures::future::join_all;
    use rocket::tokio;

    use super::*;
    use crate::model::db::MemoryGroupDb;
    use crate::model::group::Candidate;

    fn memory_store() -> GroupStore {
        GroupStore::new(Arc::new(MemoryGroupDb::new()))
    }

    #[rocket::async_test]
    async fn create_then_get_round_trips() {
        let store = memory_store();
        let candidates = Candidate::example_map();

        let gid = store.create(candidates.clone()).await.unwrap();
        let fetched = store.get(&gid).await.unwrap();

        assert_eq!(fetched, candidates);
        assert!(fetched.values().all(|c| c.votes == 0));
        assert!(!store.is_free(&gid).await.unwrap());
    }

    #[rocket::async_test]
    async fn lookups_ignore_case() {
        let store = memory_store();
        let gid = store.create(Candidate::example_map()).await.unwrap();

        let shouted = GroupId::normalize(&gid.to_uppercase());
        assert_eq!(store.get(&shouted).await.unwrap().len(), 2);
        let votes = store
            .vote(&shouted, &CandidateId::normalize("A1"))
            .await
            .unwrap();
        assert_eq!(votes, 1);
    }

    #[rocket::async_test]
    async fn get_missing_group_is_not_found() {
        let store = memory_store();
        let result = store.get(&GroupId::normalize("nope00")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[rocket::async_test]
    async fn vote_on_missing_candidate_is_not_found_and_changes_nothing() {
        let store = memory_store();
        let candidates = Candidate::example_map();
        let gid = store.create(candidates.clone()).await.unwrap();

        let result = store.vote(&gid, &CandidateId::normalize("c1")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.get(&gid).await.unwrap(), candidates);

        let result = store
            .vote(&GroupId::normalize("nope00"), &CandidateId::normalize("a1"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[rocket::async_test]
    async fn delete_is_idempotent() {
        let store = memory_store();
        let gid = store.create(Candidate::example_map()).await.unwrap();

        store.delete(&gid).await.unwrap();
        store.delete(&gid).await.unwrap();
        assert!(matches!(store.get(&gid).await, Err(Error::NotFound(_))));
        assert!(store.is_free(&gid).await.unwrap());
    }

    #[rocket::async_test]
    async fn concurrent_votes_are_never_lost() {
        const VOTERS: u64 = 100;

        let store = memory_store();
        let gid = store.create(Candidate::example_map()).await.unwrap();
        let a1 = CandidateId::normalize("a1");

        let handles = (0..VOTERS).map(|_| {
            let store = store.clone();
            let gid = gid.clone();
            let a1 = a1.clone();
            tokio::spawn(async move { store.vote(&gid, &a1).await.unwrap() })
        });
        let mut tallies: Vec<u64> = join_all(handles)
            .await
            .into_iter()
            .map(|tally| tally.unwrap())
            .collect();

        // Every voter saw a distinct prior value.
        tallies.sort_unstable();
        assert_eq!(tallies, (1..=VOTERS).collect::<Vec<_>>());

        let candidates = store.get(&gid).await.unwrap();
        assert_eq!(candidates[&a1].votes, VOTERS);
        assert_eq!(candidates[&CandidateId::normalize("b1")].votes, 0);
    }

    #[rocket::async_test]
    async fn concurrent_creates_get_distinct_ids() {
        // A tiny ID space makes collisions near-certain without re-checking.
        let pool: Vec<GroupId> = (0..60)
            .map(|n| GroupId::normalize(&format!("g{n:05}")))
            .collect();
        let id_source: IdSource =
            Arc::new(move || pool.choose(&mut rand::thread_rng()).unwrap().clone());
        let store = GroupStore::with_id_source(Arc::new(MemoryGroupDb::new()), id_source);

        let creates = (0..20).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.create(Candidate::example_map()).await.unwrap() })
        });
        let ids: Vec<GroupId> = join_all(creates)
            .await
            .into_iter()
            .map(|gid| gid.unwrap())
            .collect();

        let distinct: HashSet<_> = ids.iter().map(|gid| gid.to_lowercase()).collect();
        assert_eq!(distinct.len(), ids.len());
    }

    #[rocket::async_test]
    async fn allocation_gives_up_when_every_draw_is_taken() {
        let draws = Arc::new(AtomicUsize::new(0));
        let counter = draws.clone();
        let id_source: IdSource = Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            GroupId::normalize("aaaaaa")
        });
        let store = GroupStore::with_id_source(Arc::new(MemoryGroupDb::new()), id_source);

        store.create(Candidate::example_map()).await.unwrap();
        draws.store(0, Ordering::Relaxed);

        let result = store.create(Candidate::example_map()).await;
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
        assert_eq!(draws.load(Ordering::Relaxed), MAX_ALLOCATION_ATTEMPTS);
    }
}
