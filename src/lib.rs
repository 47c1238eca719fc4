#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::model::{group::GroupStore, search::BusinessSearch, subscription::SubscriptionHub};

pub mod api;
pub mod config;
pub mod cors;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;

/// Assemble the server from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .mount("/", cors::routes())
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .attach(config::SearchFairing)
        .attach(cors::CorsFairing)
}

/// Assemble the server around an existing store and search provider.
pub fn rocket_for_store_and_search(store: GroupStore, search: BusinessSearch) -> Rocket<Build> {
    let hub = SubscriptionHub::new(store.clone());
    rocket::build()
        .mount("/", api::routes())
        .mount("/", cors::routes())
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(cors::CorsFairing)
        .manage(store)
        .manage(hub)
        .manage(search)
}
