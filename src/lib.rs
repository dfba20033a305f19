#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use config::{ConfigFairing, RosterFairing, StorageFairing};
use logging::LoggerFairing;

pub use config::Config;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

#[cfg(test)]
mod testing;

/// Build the server from `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    attach(rocket::build())
}

fn attach(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(RosterFairing)
        .attach(StorageFairing)
        .mount("/", api::routes())
}

/// A server reading the given test data instead of the configured files.
#[cfg(test)]
pub(crate) fn rocket_for_data_dir(data: &testing::DataDir) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("backend", "spreadsheet"))
        .merge(("candidates_path", data.candidates_path()))
        .merge(("tokens_path", data.tokens_path()))
        .merge(("votes_path", data.votes_path()));
    attach(rocket::custom(figment))
}
