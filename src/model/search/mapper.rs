use log::warn;
use serde::Deserialize;

use crate::model::group::{Candidate, CandidateId, CandidateMap};

/// A business as returned by the search provider. Anything may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawBusiness {
    pub id: Option<String>,
    pub name: Option<String>,
    pub categories: Option<Vec<RawCategory>>,
    pub price: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawCategory {
    pub title: Option<String>,
}

/// The outcome of mapping a batch of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCandidates {
    pub candidates: CandidateMap,
    /// Entries that were incomplete or repeated an earlier ID.
    pub dropped: usize,
}

/// Turn raw search results into fresh, unvoted candidates.
pub fn map(raw: Vec<RawBusiness>) -> MappedCandidates {
    let mut candidates = CandidateMap::new();
    let mut dropped = 0;

    for business in raw {
        let Some(candidate) = to_candidate(business) else {
            dropped += 1;
            continue;
        };
        if candidates.contains_key(&candidate.id) {
            warn!("Dropping duplicate search result '{}'", candidate.id);
            dropped += 1;
            continue;
        }
        candidates.insert(candidate.id.clone(), candidate);
    }

    if dropped > 0 {
        warn!("Dropped {dropped} unusable search results");
    }
    MappedCandidates {
        candidates,
        dropped,
    }
}

fn to_candidate(business: RawBusiness) -> Option<Candidate> {
    let id = business.id.filter(|id| !id.trim().is_empty())?;
    Some(Candidate {
        id: CandidateId::normalize(&id),
        name: business.name?,
        categories: business
            .categories
            .unwrap_or_default()
            .into_iter()
            .filter_map(|category| category.title)
            .collect(),
        price: business.price.unwrap_or_default(),
        rating: business.rating?,
        review_count: business.review_count?,
        image_url: business.image_url.unwrap_or_default(),
        url: business.url?,
        votes: 0,
    })
}

#[cfg(test)]
impl RawBusiness {
    pub fn example(id: &str, name: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            categories: Some(vec![
                RawCategory {
                    title: Some("Pizza".to_string()),
                },
                RawCategory {
                    title: Some("Italian".to_string()),
                },
            ]),
            price: Some("$$".to_string()),
            rating: Some(4.5),
            review_count: Some(120),
            image_url: Some(format!("https://img.example.com/{id}.jpg")),
            url: Some(format!("https://www.example.com/biz/{id}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn maps_fields_and_starts_unvoted() {
        let mapped = map(vec![
            RawBusiness::example("a1", "A"),
            RawBusiness::example("b1", "B"),
        ]);

        assert_eq!(mapped.dropped, 0);
        assert_eq!(mapped.candidates, Candidate::example_map());
    }

    #[test]
    fn incomplete_entries_are_dropped_not_fatal() {
        let no_name = RawBusiness {
            name: None,
            ..RawBusiness::example("c1", "C")
        };
        let no_id = RawBusiness {
            id: Some("  ".to_string()),
            ..RawBusiness::example("d1", "D")
        };
        let no_price = RawBusiness {
            price: None,
            categories: None,
            ..RawBusiness::example("e1", "E")
        };

        let mapped = map(vec![no_name, no_id, no_price]);

        assert_eq!(mapped.dropped, 2);
        let e1 = &mapped.candidates[&CandidateId::normalize("e1")];
        assert_eq!(e1.price, "");
        assert!(e1.categories.is_empty());
    }

    #[test]
    fn ids_are_normalized_and_deduplicated() {
        let mapped = map(vec![
            RawBusiness::example("Gary-Danko", "Gary Danko"),
            RawBusiness::example("gary-danko", "Gary Danko again"),
        ]);

        assert_eq!(mapped.dropped, 1);
        let gary = &mapped.candidates[&CandidateId::normalize("gary-danko")];
        assert_eq!(gary.id.as_str(), "gary-danko");
        assert_eq!(gary.name, "Gary Danko");
    }

    #[test]
    fn deserializes_provider_json_and_ignores_extra_fields() {
        let raw = r#"{
            "id": "WavvLdfdP6g8aZTtbBQHTw",
            "alias": "gary-danko-san-francisco",
            "name": "Gary Danko",
            "categories": [{"alias": "newamerican", "title": "American (New)"}],
            "price": "$$$$",
            "rating": 4.5,
            "review_count": 5296,
            "image_url": "https://example.com/o.jpg",
            "url": "https://www.example.com/biz/gary-danko",
            "is_closed": false,
            "distance": 1.2
        }"#;
        let business: RawBusiness = serde_json::from_str(raw).unwrap();

        let mapped = map(vec![business]);
        let gary = &mapped.candidates[&CandidateId::normalize("WavvLdfdP6g8aZTtbBQHTw")];
        assert_eq!(gary.categories, vec!["American (New)".to_string()]);
        assert_eq!(gary.review_count, 5296);
        assert_eq!(gary.votes, 0);
    }
}
