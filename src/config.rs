use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use mongodb::{bson::doc, Client as MongoClient};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    db::{GroupDb, MemoryGroupDb},
    group::GroupStore,
    mongodb::MongoGroupDb,
    search::{BusinessSearch, YelpSearch, DEFAULT_YELP_URL},
    subscription::SubscriptionHub,
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_allowed_origins")]
    allowed_origins: Vec<String>,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_heartbeat_secs() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Config {
    /// Browser origins allowed to call the API.
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    /// How often an idle realtime stream sends a keep-alive comment.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!(
            "Allowing origins {:?}, heartbeat every {}s",
            config.allowed_origins, config.heartbeat_secs
        );
        Ok(rocket.manage(config))
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "picky".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database, and
/// places a [`GroupStore`] and a [`SubscriptionHub`] over it into managed
/// state. Without a `db_uri`, groups are kept in memory instead.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let db: Arc<dyn GroupDb> = match config.db_uri {
            Some(uri) => {
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(&config.db_name);
                // The driver connects lazily, so make sure someone is there.
                if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
                    error!("Failed to connect to database: {e}");
                    return Err(rocket);
                }
                info!("...database connection online!");
                Arc::new(MongoGroupDb::from_db(&db))
            }
            None => {
                warn!("`db_uri` not set, groups will only live as long as this process");
                Arc::new(MemoryGroupDb::new())
            }
        };

        let store = GroupStore::new(db);
        let hub = SubscriptionHub::new(store.clone());
        Ok(rocket.manage(store).manage(hub))
    }
}

/// Configuration for the business search provider.
#[derive(Deserialize)]
struct SearchConfig {
    // non-secrets
    #[serde(default = "default_yelp_url")]
    yelp_url: String,
    #[serde(default = "default_search_timeout_secs")]
    search_timeout_secs: u64,
    // secrets
    yelp_api_key: String,
}

fn default_yelp_url() -> String {
    DEFAULT_YELP_URL.to_string()
}

fn default_search_timeout_secs() -> u64 {
    10
}

/// A fairing that loads the search config and places a Yelp-backed
/// [`BusinessSearch`] into managed state.
pub struct SearchFairing;

#[rocket::async_trait]
impl Fairing for SearchFairing {
    fn info(&self) -> Info {
        Info {
            name: "Yelp search",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<SearchConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load search config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the client.
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(config.search_timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build HTTP client: {e}");
                return Err(rocket);
            }
        };
        info!("Loaded search config, querying {}", config.yelp_url);

        let search = YelpSearch::new(client, config.yelp_url, config.yelp_api_key);
        Ok(rocket.manage(BusinessSearch::new(search)))
    }
}

#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.allowed_origins(), ["http://localhost:3000"]);
        assert_eq!(config.heartbeat(), Duration::from_secs(15));

        let db: DbConfig = Figment::new().extract().unwrap();
        assert_eq!(db.db_name, "picky");
        assert!(db.db_uri.is_none());
    }

    #[test]
    fn search_config_needs_a_key() {
        assert!(Figment::new().extract::<SearchConfig>().is_err());

        let config: SearchConfig = Figment::new()
            .merge(Serialized::default("yelp_api_key", "secret"))
            .extract()
            .unwrap();
        assert_eq!(config.yelp_url, DEFAULT_YELP_URL);
        assert_eq!(config.search_timeout_secs, 10);
    }

    #[test]
    fn origins_must_match_exactly() {
        let config: Config = Figment::new()
            .merge(Serialized::default(
                "allowed_origins",
                ["https://picky.example.com"],
            ))
            .extract()
            .unwrap();
        assert!(config.is_allowed_origin("https://picky.example.com"));
        assert!(!config.is_allowed_origin("http://localhost:3000"));
        assert!(!config.is_allowed_origin("https://picky.example.com.evil.net"));
    }
}
