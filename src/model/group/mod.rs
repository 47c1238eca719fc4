mod candidate;
mod id;
mod store;

pub use candidate::{Candidate, CandidateMap, Group};
pub use id::{normalize_id, CandidateId, GroupId, ALPHABET, LENGTH};
pub use store::{GroupStore, IdSource, MAX_ALLOCATION_ATTEMPTS};
