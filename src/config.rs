use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    roster::Roster,
    storage::{
        graph::{GraphClient, GraphConfig, GraphTokenList, GraphVoteList},
        spreadsheet::{TokenSheet, VoteSheet},
        Storage, TokenStore, VoteLedger,
    },
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Deserialize)]
pub struct Config {
    // non-secrets
    session_ttl: u32,
    max_selections: usize,
    candidates_path: PathBuf,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of a voting session cookie in seconds.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Most candidates a single ballot may select.
    pub fn max_selections(&self) -> usize {
        self.max_selections
    }

    /// Roster spreadsheet, read once at startup.
    pub fn candidates_path(&self) -> &Path {
        &self.candidates_path
    }

    /// Secret key used to sign session JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

#[cfg(test)]
impl Config {
    pub fn example() -> Self {
        Self {
            session_ttl: 3600,
            max_selections: 6,
            candidates_path: PathBuf::from("CANDIDATOS.csv"),
            jwt_secret: "test-secret".to_string(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
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
        if config.max_selections == 0 {
            error!("`max_selections` must be at least 1");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// A fairing that loads the roster once, logs its fingerprint and places it
/// into managed state. A roster that cannot be loaded aborts launch.
/// Must be attached after [`ConfigFairing`].
pub struct RosterFairing;

#[rocket::async_trait]
impl Fairing for RosterFairing {
    fn info(&self) -> Info {
        Info {
            name: "Roster",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let path = rocket
            .state::<Config>()
            .map(|config| config.candidates_path().to_path_buf());
        let path = match path {
            Some(path) => path,
            None => {
                error!("Roster requires the application config to be loaded first");
                return Err(rocket);
            }
        };
        let roster = match Roster::load(&path) {
            Ok(roster) => roster,
            Err(e) => {
                error!("{e}");
                return Err(rocket);
            }
        };
        if roster.is_empty() {
            warn!("Roster {} has no candidates", path.display());
        }
        info!(
            "Loaded {} candidates from {} (sha256 {})",
            roster.len(),
            path.display(),
            roster.fingerprint()
        );

        rocket = rocket.manage(roster);
        Ok(rocket)
    }
}

/// Which storage backend holds tokens and votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Spreadsheet,
    Remote,
}

#[derive(Deserialize)]
struct StorageConfig {
    backend: Backend,
}

/// Configuration for the local spreadsheet backend.
#[derive(Deserialize)]
struct SpreadsheetConfig {
    tokens_path: PathBuf,
    votes_path: PathBuf,
}

/// A fairing that loads the storage config, opens the configured backend
/// and places a [`Storage`] into managed state.
pub struct StorageFairing;

#[rocket::async_trait]
impl Fairing for StorageFairing {
    fn info(&self) -> Info {
        Info {
            name: "Storage",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StorageConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load storage config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let (tokens, ledger) = match config.backend {
            Backend::Spreadsheet => {
                let config = match rocket.figment().extract::<SpreadsheetConfig>() {
                    Ok(config) => config,
                    Err(e) => {
                        error!("Failed to load spreadsheet config");
                        rocket::config::pretty_print_error(e);
                        return Err(rocket);
                    }
                };
                let tokens = match TokenSheet::open(config.tokens_path) {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        error!("{e}");
                        return Err(rocket);
                    }
                };
                info!("Recording votes in {}", config.votes_path.display());
                let ledger = VoteSheet::new(config.votes_path);
                (
                    Arc::new(tokens) as Arc<dyn TokenStore>,
                    Arc::new(ledger) as Arc<dyn VoteLedger>,
                )
            }
            Backend::Remote => {
                let config = match rocket.figment().extract::<GraphConfig>() {
                    Ok(config) => config,
                    Err(e) => {
                        error!("Failed to load list API config");
                        rocket::config::pretty_print_error(e);
                        return Err(rocket);
                    }
                };
                let client = match GraphClient::new(config) {
                    Ok(client) => Arc::new(client),
                    Err(e) => {
                        error!("Failed to build list API client: {e}");
                        return Err(rocket);
                    }
                };
                info!("Using remote lists for tokens and votes");
                (
                    Arc::new(GraphTokenList::new(client.clone())) as Arc<dyn TokenStore>,
                    Arc::new(GraphVoteList::new(client)) as Arc<dyn VoteLedger>,
                )
            }
        };

        // Manage the state.
        rocket = rocket.manage(Storage::new(tokens, ledger));
        Ok(rocket)
    }
}
