use log::debug;
use mongodb::{
    bson::{doc, Document},
    change_stream::event::OperationType,
    error::{Error as DbError, ErrorKind, WriteFailure},
    options::{
        ChangeStreamOptions, CountOptions, FindOneAndUpdateOptions, FindOneOptions,
        FullDocumentType, ReturnDocument,
    },
    Collection, Database,
};
use rocket::futures::{future, stream, StreamExt};

use crate::error::Result;
use crate::model::db::{ChangeFeed, GroupDb};
use crate::model::group::{CandidateId, CandidateMap, Group, GroupId};

const GROUPS: &str = "groups";

/// The mongodb crate doesn't provide error code constants.
const DUPLICATE_KEY: i32 = 11000;

/// A [`GroupDb`] backed by a MongoDB collection, one document per group.
///
/// Watching requires change streams, so the server must be a replica set.
#[derive(Clone)]
pub struct MongoGroupDb {
    groups: Collection<Group>,
}

impl MongoGroupDb {
    pub fn from_db(db: &Database) -> Self {
        Self {
            groups: db.collection(GROUPS),
        }
    }
}

fn id_filter(gid: &GroupId) -> Document {
    doc! { "_id": gid.as_str() }
}

/// Return true if the given error is a duplicate key write error.
fn is_duplicate_key_error(err: &DbError) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    false
}

/// Build the filter and update that add one vote to a candidate.
///
/// The filter only matches if the candidate exists, so a single
/// `findOneAndUpdate` both checks and increments. Returns `None` if the
/// candidate ID could never be a stored key.
fn vote_filter_and_update(gid: &GroupId, rid: &CandidateId) -> Option<(Document, Document)> {
    if rid.is_empty() || rid.contains('.') || rid.starts_with('$') {
        return None;
    }
    let candidate_path = format!("candidates.{rid}");

    let mut filter = id_filter(gid);
    filter.insert(candidate_path.as_str(), doc! { "$exists": true });

    let mut increment = Document::new();
    increment.insert(format!("{candidate_path}.votes"), 1_i64);
    let update = doc! { "$inc": increment };

    Some((filter, update))
}

#[rocket::async_trait]
impl GroupDb for MongoGroupDb {
    async fn exists(&self, gid: &GroupId) -> Result<bool> {
        let options = CountOptions::builder().limit(1).build();
        let count = self.groups.count_documents(id_filter(gid), options).await?;
        Ok(count > 0)
    }

    async fn insert_new(&self, group: &Group) -> Result<bool> {
        match self.groups.insert_one(group, None).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key_error(&err) => {
                debug!("Group ID {} already taken", group.id);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn candidates(&self, gid: &GroupId) -> Result<Option<CandidateMap>> {
        let options = FindOneOptions::builder()
            .projection(doc! { "candidates": 1 })
            .build();
        let group = self.groups.find_one(id_filter(gid), options).await?;
        Ok(group.map(|group| group.candidates))
    }

    async fn delete(&self, gid: &GroupId) -> Result<()> {
        self.groups.delete_one(id_filter(gid), None).await?;
        Ok(())
    }

    async fn increment_votes(&self, gid: &GroupId, rid: &CandidateId) -> Result<Option<u64>> {
        let Some((filter, update)) = vote_filter_and_update(gid, rid) else {
            return Ok(None);
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let group = self
            .groups
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(group.and_then(|group| group.candidates.get(rid).map(|c| c.votes)))
    }

    async fn watch(&self, gid: &GroupId) -> Result<ChangeFeed> {
        // Open the change stream before reading, so no change can slip in between.
        let pipeline = [doc! { "$match": { "documentKey._id": gid.as_str() } }];
        let options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .build();
        let changes = self.groups.watch(pipeline, options).await?;

        let initial = self.candidates(gid).await?;
        if initial.is_none() {
            return Ok(stream::once(future::ready(Result::Ok(None))).boxed());
        }

        let changes = changes.map(|event| -> Result<Option<CandidateMap>> {
            let event = event?;
            Ok(match event.operation_type {
                OperationType::Insert | OperationType::Update | OperationType::Replace => {
                    // Empty if the group was deleted before the lookup ran.
                    event.full_document.map(|group| group.candidates)
                }
                _ => None,
            })
        });

        let feed = stream::once(future::ready(Result::Ok(initial)))
            .chain(changes)
            .scan(false, |gone, state| {
                if *gone {
                    return future::ready(None);
                }
                *gone = matches!(state, Ok(None));
                future::ready(Some(state))
            });
        Ok(feed.boxed())
    }
}
