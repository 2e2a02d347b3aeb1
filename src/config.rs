use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::ledger::VoteLedger;
use crate::store::{MemoryStore, MongoStore, Store};

/// Where the ledger keeps its documents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Mongodb,
    /// Process memory. Nothing survives a restart.
    Memory,
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_top_candidates() -> usize {
    3
}

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default)]
    identity_issuer: Option<String>,
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
    #[serde(default = "default_top_candidates")]
    top_candidates: usize,
    #[serde(default)]
    storage: StorageBackend,
    // secrets
    identity_secret: String,
}

impl Config {
    /// Secret key the identity provider signs its tokens with.
    pub fn identity_secret(&self) -> &[u8] {
        self.identity_secret.as_bytes()
    }

    /// Required `iss` claim of identity tokens, if any.
    pub fn identity_issuer(&self) -> Option<&str> {
        self.identity_issuer.as_deref()
    }

    /// How long any single store call may take before it is reported as unavailable.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Candidates shown per category in standings when the caller does not say.
    pub fn top_candidates(&self) -> usize {
        self.top_candidates
    }

    pub fn storage(&self) -> StorageBackend {
        self.storage
    }

    /// A ledger over `store` with this config's limits.
    pub fn ledger(&self, store: Arc<dyn Store>) -> VoteLedger {
        VoteLedger::new(store, self.store_timeout(), self.top_candidates())
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

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

fn default_db_name() -> String {
    "awards".to_string()
}

fn default_db_transactions() -> bool {
    true
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    /// Commit votes in multi-document transactions. Needs a replica set.
    #[serde(default = "default_db_transactions")]
    db_transactions: bool,
    // secrets
    db_uri: String,
}

/// A fairing that opens the configured store, performs any setup necessary,
/// and places a [`VoteLedger`] over it into managed state.
///
/// Must be attached after [`ConfigFairing`].
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Vote store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.state::<Config>() {
            Some(config) => config.clone(),
            None => {
                error!("Store requested before the application config was loaded");
                return Err(rocket);
            }
        };

        let store: Arc<dyn Store> = match config.storage() {
            StorageBackend::Memory => {
                warn!("Using in-memory storage, nothing will persist");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::Mongodb => {
                // Load the config.
                let db_config = match rocket.figment().extract::<DbConfig>() {
                    Ok(db_config) => db_config,
                    Err(e) => {
                        error!("Failed to load database config");
                        rocket::config::pretty_print_error(e);
                        return Err(rocket);
                    }
                };
                info!("Loaded database config, connecting...");
                if !db_config.db_transactions {
                    warn!("Database transactions disabled, votes commit behind the identity flag");
                }

                // Connect and ensure the required indexes exist.
                let store = match MongoStore::connect(
                    &db_config.db_uri,
                    &db_config.db_name,
                    db_config.db_transactions,
                )
                .await
                {
                    Ok(store) => store,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                info!("...database connection online!");
                Arc::new(store)
            }
        };

        // Manage the state.
        rocket = rocket.manage(config.ledger(store));
        Ok(rocket)
    }
}


#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn defaults_fill_optional_keys() {
        let figment = Figment::new().merge(Serialized::default("identity_secret", "s3cret"));
        let config = figment.extract::<Config>().unwrap();
        assert_eq!(config.identity_secret(), b"s3cret");
        assert_eq!(config.identity_issuer(), None);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.top_candidates(), 3);
        assert_eq!(config.storage(), StorageBackend::Mongodb);
    }

    #[test]
    fn secret_is_required() {
        let figment = Figment::new().merge(Serialized::default("storage", "memory"));
        assert!(figment.extract::<Config>().is_err());
    }

    #[test]
    fn db_defaults() {
        let figment =
            Figment::new().merge(Serialized::default("db_uri", "mongodb://localhost:27017"));
        let db_config = figment.extract::<DbConfig>().unwrap();
        assert_eq!(db_config.db_name, "awards");
        assert!(db_config.db_transactions);
    }
}
