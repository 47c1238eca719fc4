use log::debug;
use reqwest::Client;
use serde::Deserialize;

use super::{RawBusiness, SearchProvider, SearchQuery};
use crate::error::Result;

pub const DEFAULT_YELP_URL: &str = "https://api.yelp.com/v3/businesses/search";

/// The Yelp Fusion business search API.
pub struct YelpSearch {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct YelpResponse {
    #[serde(default)]
    businesses: Vec<RawBusiness>,
}

impl YelpSearch {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    fn query_params(query: &SearchQuery) -> [(&'static str, String); 5] {
        [
            ("term", query.term.clone()),
            ("location", query.location.clone()),
            ("limit", query.limit.to_string()),
            ("price", query.price.to_query_value()),
            ("open_now", query.open_now.to_string()),
        ]
    }
}

#[rocket::async_trait]
impl SearchProvider for YelpSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawBusiness>> {
        debug!("Searching Yelp: {query:?}");
        let response: YelpResponse = self
            .client
            .get(&self.url)
            .bearer_auth(&self.api_key)
            .query(&Self::query_params(query))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Yelp returned {} businesses", response.businesses.len());
        Ok(response.businesses)
    }
}
