use std::env;

use chrono::Duration;
use dotenvy::dotenv;
use eyre::{eyre, Result, WrapErr};
use log::LevelFilter;

use crate::manager::SyncSettings;
use crate::repos::SeasonsSource;

pub const DEFAULT_TRAKT_URL: &str = "https://api.trakt.tv";
pub const DEFAULT_TMDB_URL: &str = "https://api.themoviedb.org/3";

#[derive(Clone, Debug)]
pub struct TraktConfig {
    pub base_url: String,
    pub client_id: String,
    /// OAuth bearer token. Without one the session starts logged out.
    pub access_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub trakt: TraktConfig,
    pub tmdb: TmdbConfig,
    pub seasons_source: SeasonsSource,
    pub followed_shows_max_age: Duration,
    pub log_file: String,
    pub log_level: LevelFilter,
}

impl Config {
    /// Read from the environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Config> {
        dotenv().ok();
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| eyre!("{} must be set.", key));
        let optional = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let seasons_source = match optional("SEASONS_SOURCE") {
            Some(source) => source.parse().map_err(|e: String| eyre!(e))?,
            None => SeasonsSource::default(),
        };

        let followed_shows_max_age = match optional("FOLLOWED_SHOWS_MAX_AGE_HOURS") {
            Some(hours) => Duration::hours(
                hours
                    .parse()
                    .wrap_err("FOLLOWED_SHOWS_MAX_AGE_HOURS must be a number of hours")?,
            ),
            None => SyncSettings::default().followed_shows_max_age,
        };

        let log_level = match optional("LOG_LEVEL") {
            Some(level) => level
                .parse()
                .map_err(|_| eyre!("LOG_LEVEL '{}' is not a log level", level))?,
            None => LevelFilter::Debug,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            trakt: TraktConfig {
                base_url: optional("TRAKT_URL").unwrap_or_else(|| DEFAULT_TRAKT_URL.to_string()),
                client_id: required("TRAKT_CLIENT_ID")?,
                access_token: optional("TRAKT_ACCESS_TOKEN"),
            },
            tmdb: TmdbConfig {
                base_url: optional("TMDB_URL").unwrap_or_else(|| DEFAULT_TMDB_URL.to_string()),
                api_key: optional("TMDB_API_KEY"),
            },
            seasons_source,
            followed_shows_max_age,
            log_file: optional("LOG_FILE").unwrap_or_else(|| "tivi_sync.log".to_string()),
            log_level,
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            seasons_source: self.seasons_source,
            followed_shows_max_age: self.followed_shows_max_age,
            ..SyncSettings::default()
        }
    }
}
