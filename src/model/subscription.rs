//! Live candidate snapshots for realtime clients.
//!
//! Each connection gets its own [`Subscription`], which owns the only
//! listener registered for it. The listener is released as soon as the
//! subscription detaches: when the group is deleted, when
//! [`Subscription::unsubscribe`] is called, or when the subscription is
//! dropped because the client went away.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{ready, Context, Poll};

use log::{debug, error, info};
use rocket::futures::{Stream, StreamExt};

use crate::error::{Error, Result};
use crate::model::db::ChangeFeed;
use crate::model::group::{CandidateMap, GroupId, GroupStore};

/// A unique identifier for a subscription within this process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    fn next() -> Self {
        static SUBSCRIPTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(SUBSCRIPTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Listening, and yielding a snapshot per change.
    Attached,
    /// Finished for good. No listener is registered.
    Detached,
}

type Registry = Arc<Mutex<HashMap<SubscriptionId, GroupId>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<SubscriptionId, GroupId>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Hands out subscriptions and keeps track of the live ones.
#[derive(Clone)]
pub struct SubscriptionHub {
    store: GroupStore,
    registry: Registry,
}

impl SubscriptionHub {
    pub fn new(store: GroupStore) -> Self {
        Self {
            store,
            registry: Default::default(),
        }
    }

    /// Start listening to a group. The first item of the subscription is the
    /// group's current state.
    pub async fn subscribe(&self, gid: &GroupId) -> Result<Subscription> {
        let mut feed = self.store.watch(gid).await?;
        let initial = match feed.next().await {
            Some(Ok(Some(candidates))) => candidates,
            Some(Err(err)) => return Err(err),
            Some(Ok(None)) | None => return Err(Error::not_found(format!("Group '{gid}'"))),
        };

        let id = SubscriptionId::next();
        lock(&self.registry).insert(id, gid.clone());
        info!("Subscription {id} attached to group {gid}");

        Ok(Subscription {
            id,
            gid: gid.clone(),
            state: SubscriptionState::Attached,
            initial: Some(initial),
            feed: Some(feed),
            registry: self.registry.clone(),
        })
    }

    /// Number of attached subscriptions.
    pub fn active(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Number of attached subscriptions to one group.
    pub fn active_for(&self, gid: &GroupId) -> usize {
        lock(&self.registry)
            .values()
            .filter(|subscribed| *subscribed == gid)
            .count()
    }
}

/// One client's view of one group: a stream of full candidate snapshots.
///
/// The stream ends once the subscription is detached.
pub struct Subscription {
    id: SubscriptionId,
    gid: GroupId,
    state: SubscriptionState,
    initial: Option<CandidateMap>,
    feed: Option<ChangeFeed>,
    registry: Registry,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Release the listener. Calling this again does nothing.
    pub fn unsubscribe(&mut self) {
        if self.state == SubscriptionState::Detached {
            return;
        }
        self.state = SubscriptionState::Detached;
        self.initial = None;
        self.feed = None;
        lock(&self.registry).remove(&self.id);
        debug!("Subscription {} detached from group {}", self.id, self.gid);
    }
}

impl Stream for Subscription {
    type Item = CandidateMap;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(initial) = this.initial.take() {
            return Poll::Ready(Some(initial));
        }
        let Some(feed) = this.feed.as_mut() else {
            return Poll::Ready(None);
        };
        match ready!(feed.poll_next_unpin(cx)) {
            Some(Ok(Some(snapshot))) => Poll::Ready(Some(snapshot)),
            Some(Ok(None)) | None => {
                info!("Group {} is gone, ending subscription {}", this.gid, this.id);
                this.unsubscribe();
                Poll::Ready(None)
            }
            Some(Err(err)) => {
                error!("Subscription {} lost its feed: {err}", this.id);
                this.unsubscribe();
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use rocket::futures::FutureExt;

    use super::*;
    use crate::model::db::MemoryGroupDb;
    use crate::model::group::{Candidate, CandidateId};

    async fn setup() -> (MemoryGroupDb, GroupStore, SubscriptionHub, GroupId) {
        let db = MemoryGroupDb::new();
        let store = GroupStore::new(Arc::new(db.clone()));
        let hub = SubscriptionHub::new(store.clone());
        let gid = store.create(Candidate::example_map()).await.unwrap();
        (db, store, hub, gid)
    }

    #[rocket::async_test]
    async fn delivers_initial_then_one_per_vote_then_detaches_on_delete() {
        let (db, store, hub, gid) = setup().await;
        let a1 = CandidateId::normalize("a1");

        let mut subscription = hub.subscribe(&gid).await.unwrap();
        assert_eq!(subscription.state(), SubscriptionState::Attached);
        assert_eq!(hub.active_for(&gid), 1);

        let initial = subscription.next().await.unwrap();
        assert_eq!(initial, Candidate::example_map());
        assert!(subscription.next().now_or_never().is_none());

        store.vote(&gid, &a1).await.unwrap();
        let voted = subscription.next().await.unwrap();
        assert_eq!(voted[&a1].votes, 1);
        assert!(subscription.next().now_or_never().is_none());

        store.delete(&gid).await.unwrap();
        assert_eq!(subscription.next().await, None);
        assert_eq!(subscription.state(), SubscriptionState::Detached);
        assert_eq!(subscription.next().await, None);
        assert_eq!(hub.active(), 0);
        assert_eq!(db.watchers(&gid), 0);
    }

    #[rocket::async_test]
    async fn every_subscriber_gets_every_change() {
        let (_db, store, hub, gid) = setup().await;
        let b1 = CandidateId::normalize("b1");

        let mut first = hub.subscribe(&gid).await.unwrap();
        let mut second = hub.subscribe(&gid).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(hub.active_for(&gid), 2);

        store.vote(&gid, &b1).await.unwrap();
        store.vote(&gid, &b1).await.unwrap();

        for subscription in [&mut first, &mut second] {
            subscription.next().await.unwrap();
            assert_eq!(subscription.next().await.unwrap()[&b1].votes, 1);
            assert_eq!(subscription.next().await.unwrap()[&b1].votes, 2);
        }
    }

    #[rocket::async_test]
    async fn dropping_releases_the_listener() {
        let (db, _store, hub, gid) = setup().await;

        let subscription = hub.subscribe(&gid).await.unwrap();
        assert_eq!(db.watchers(&gid), 1);

        drop(subscription);
        assert_eq!(hub.active(), 0);
        assert_eq!(db.watchers(&gid), 0);
    }

    #[rocket::async_test]
    async fn unsubscribe_is_idempotent() {
        let (db, store, hub, gid) = setup().await;
        let other = hub.subscribe(&gid).await.unwrap();
        let mut subscription = hub.subscribe(&gid).await.unwrap();

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(subscription.state(), SubscriptionState::Detached);
        assert_eq!(hub.active(), 1);
        assert_eq!(db.watchers(&gid), 1);

        // Nothing more is delivered, not even the pending initial snapshot.
        store
            .vote(&gid, &CandidateId::normalize("a1"))
            .await
            .unwrap();
        assert_eq!(subscription.next().await, None);

        drop(subscription);
        assert_eq!(hub.active(), 1);
        drop(other);
        assert_eq!(hub.active(), 0);
    }

    #[rocket::async_test]
    async fn subscribing_to_a_missing_group_is_not_found() {
        let (_db, _store, hub, _gid) = setup().await;
        let result = hub.subscribe(&GroupId::normalize("nope00")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(hub.active(), 0);
    }
}
