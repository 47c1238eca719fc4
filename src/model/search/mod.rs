//! Finding restaurants to seed a group with.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::Result;

pub mod mapper;
mod price;
mod yelp;

pub use mapper::{map, MappedCandidates, RawBusiness, RawCategory};
pub use price::{PriceError, PriceTiers, MAX_TIER};
pub use yelp::{YelpSearch, DEFAULT_YELP_URL};

/// What every group is seeded from: open restaurants near a location.
pub const SEARCH_TERM: &str = "food";
pub const SEARCH_LIMIT: u32 = 10;

/// A query for candidate businesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub location: String,
    pub price: PriceTiers,
    pub limit: u32,
    pub open_now: bool,
}

impl SearchQuery {
    /// The query used when creating a group.
    pub fn for_group(location: &str, price: PriceTiers) -> Self {
        Self {
            term: SEARCH_TERM.to_string(),
            location: location.trim().to_string(),
            price,
            limit: SEARCH_LIMIT,
            open_now: true,
        }
    }
}

/// An external business search service.
#[rocket::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawBusiness>>;
}

/// The search provider in managed state.
#[derive(Clone)]
pub struct BusinessSearch(Arc<dyn SearchProvider>);

impl BusinessSearch {
    pub fn new(provider: impl SearchProvider + 'static) -> Self {
        Self(Arc::new(provider))
    }
}

impl Deref for BusinessSearch {
    type Target = dyn SearchProvider;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}
