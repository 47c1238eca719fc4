use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use rocket::futures::{stream, StreamExt};
use rocket::tokio::sync::{
    broadcast::{self, error::RecvError},
    RwLock,
};

use super::{ChangeFeed, GroupDb};
use crate::error::Result;
use crate::model::group::{CandidateId, CandidateMap, Group, GroupId};

/// How many unread changes a watcher may fall behind before it has to
/// re-read the group.
const CHANNEL_BUFFER: usize = 64;

type Groups = Arc<RwLock<HashMap<GroupId, CandidateMap>>>;
type Watchers = HashMap<GroupId, broadcast::Sender<Option<CandidateMap>>>;

fn lock(watchers: &Mutex<Watchers>) -> MutexGuard<'_, Watchers> {
    // Nothing panics while holding this lock, but don't cascade if it ever does.
    watchers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One feed's receiver. The last listener to go closes the group's channel.
struct Listener {
    gid: GroupId,
    rx: Option<broadcast::Receiver<Option<CandidateMap>>>,
    watchers: Arc<Mutex<Watchers>>,
}

impl Listener {
    async fn recv(&mut self) -> std::result::Result<Option<CandidateMap>, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // Drop the receiver under the lock, so concurrent drops and new
        // subscriptions see a consistent receiver count.
        let mut watchers = lock(&self.watchers);
        drop(self.rx.take());
        let unused = watchers
            .get(&self.gid)
            .map_or(false, |tx| tx.receiver_count() == 0);
        if unused {
            watchers.remove(&self.gid);
        }
    }
}

/// A process-local [`GroupDb`].
///
/// Every mutation takes the write lock and publishes the new state before
/// releasing it, and watchers subscribe under the read lock, so a watcher
/// sees every change exactly once.
#[derive(Clone, Default)]
pub struct MemoryGroupDb {
    groups: Groups,
    watchers: Arc<Mutex<Watchers>>,
}

impl MemoryGroupDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored groups.
    pub async fn len(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Number of feeds currently listening to a group.
    pub fn watchers(&self, gid: &GroupId) -> usize {
        self.lock_watchers()
            .get(gid)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of groups with a channel open for watchers.
    pub fn watched_groups(&self) -> usize {
        self.lock_watchers().len()
    }

    fn lock_watchers(&self) -> MutexGuard<'_, Watchers> {
        lock(&self.watchers)
    }

    /// Send the new state of a group to its watchers.
    /// Must be called while holding the groups write lock.
    fn publish(&self, gid: &GroupId, state: Option<CandidateMap>) {
        let mut watchers = self.lock_watchers();
        let Some(tx) = watchers.get(gid) else {
            return;
        };
        let gone = state.is_none();
        // Sending only fails when nobody is listening any more.
        if tx.send(state).is_err() || gone {
            watchers.remove(gid);
        }
    }
}

#[rocket::async_trait]
impl GroupDb for MemoryGroupDb {
    async fn exists(&self, gid: &GroupId) -> Result<bool> {
        Ok(self.groups.read().await.contains_key(gid))
    }

    async fn insert_new(&self, group: &Group) -> Result<bool> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Ok(false);
        }
        groups.insert(group.id.clone(), group.candidates.clone());
        self.publish(&group.id, Some(group.candidates.clone()));
        Ok(true)
    }

    async fn candidates(&self, gid: &GroupId) -> Result<Option<CandidateMap>> {
        Ok(self.groups.read().await.get(gid).cloned())
    }

    async fn delete(&self, gid: &GroupId) -> Result<()> {
        let mut groups = self.groups.write().await;
        if groups.remove(gid).is_some() {
            self.publish(gid, None);
        }
        Ok(())
    }

    async fn increment_votes(&self, gid: &GroupId, rid: &CandidateId) -> Result<Option<u64>> {
        let mut groups = self.groups.write().await;
        let Some(candidates) = groups.get_mut(gid) else {
            return Ok(None);
        };
        let Some(candidate) = candidates.get_mut(rid) else {
            return Ok(None);
        };
        candidate.votes += 1;
        let votes = candidate.votes;
        let snapshot = candidates.clone();
        self.publish(gid, Some(snapshot));
        Ok(Some(votes))
    }

    async fn watch(&self, gid: &GroupId) -> Result<ChangeFeed> {
        let groups = self.groups.read().await;
        let Some(initial) = groups.get(gid).cloned() else {
            return Ok(stream::once(async { Result::Ok(None) }).boxed());
        };
        let rx = self
            .lock_watchers()
            .entry(gid.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_BUFFER).0)
            .subscribe();
        drop(groups);
        let listener = Listener {
            gid: gid.clone(),
            rx: Some(rx),
            watchers: self.watchers.clone(),
        };

        let changes = stream::unfold(
            (listener, self.groups.clone(), gid.clone()),
            |(mut listener, groups, gid)| async move {
                let state = match listener.recv().await {
                    Ok(state) => state,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Watcher on group {gid} lagged by {skipped} changes, re-reading");
                        groups.read().await.get(&gid).cloned()
                    }
                    Err(RecvError::Closed) => return None,
                };
                Some((Result::Ok(state), (listener, groups, gid)))
            },
        );

        Ok(stream::once(async move { Result::Ok(Some(initial)) })
            .chain(changes)
            .boxed())
    }
}
