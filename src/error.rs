use log::{error, warn};
use mongodb::error::Error as DbError;
use reqwest::Error as SearchError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::search::PriceError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Group store unavailable: {0}")]
    Db(#[from] DbError),
    #[error("Search provider failed: {0}")]
    Search(#[from] SearchError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Bad request: {0}")]
    Price(#[from] PriceError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(why: impl Into<String>) -> Self {
        Self::BadRequest(why.into())
    }

    /// The HTTP status this error is reported as.
    pub fn status(&self) -> Status {
        match self {
            Self::BadRequest(_) | Self::Price(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
            Self::Search(_) => Status::BadGateway,
            Self::Db(_) | Self::ResourceExhausted(_) => Status::ServiceUnavailable,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
