use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::{CandidateId, GroupId};

/// A group's candidates, keyed by candidate ID. This is also the snapshot
/// format pushed to realtime subscribers.
pub type CandidateMap = BTreeMap<CandidateId, Candidate>;

/// One restaurant in a group, with its vote tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub categories: Vec<String>,
    #[serde(default)]
    pub price: String,
    pub rating: f64,
    pub review_count: u64,
    #[serde(default)]
    pub image_url: String,
    pub url: String,
    pub votes: u64,
}

/// A group as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: GroupId,
    pub candidates: CandidateMap,
}

#[cfg(test)]
impl Candidate {
    /// An unvoted candidate with plausible fields.
    pub fn example(id: &str, name: &str) -> Self {
        Self {
            id: CandidateId::normalize(id),
            name: name.to_string(),
            categories: vec!["Pizza".to_string(), "Italian".to_string()],
            price: "$$".to_string(),
            rating: 4.5,
            review_count: 120,
            image_url: format!("https://img.example.com/{id}.jpg"),
            url: format!("https://www.example.com/biz/{id}"),
            votes: 0,
        }
    }

    /// A map of two example candidates, `a1` and `b1`.
    pub fn example_map() -> CandidateMap {
        [Self::example("a1", "A"), Self::example("b1", "B")]
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect()
    }
}
