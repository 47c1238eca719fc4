use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

/// Number of symbols in a group ID.
pub const LENGTH: usize = 6;

/// The symbols a group ID is drawn from.
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Normalize an identifier received from outside the server.
///
/// Every lookup goes through this, so an ID that differs only in case
/// always refers to the same group or candidate.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The short code naming a live group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Draw a fresh ID from the thread-local RNG.
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    /// Draw a fresh ID: `LENGTH` independent, uniform picks from `ALPHABET`.
    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let symbol_dist = Uniform::from(0..ALPHABET.len());
        let id = (0..LENGTH)
            .map(|_| ALPHABET[symbol_dist.sample(rng)] as char)
            .collect();
        Self(id)
    }

    pub fn normalize(raw: &str) -> Self {
        Self(normalize_id(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for GroupId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> FromParam<'a> for GroupId {
    type Error = Infallible;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Ok(Self::normalize(param))
    }
}

/// The key of a candidate within its group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn normalize(raw: &str) -> Self {
        Self(normalize_id(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for CandidateId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> FromParam<'a> for CandidateId {
    type Error = Infallible;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Ok(Self::normalize(param))
    }
}
