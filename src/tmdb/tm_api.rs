use governor::Quota;
use nonzero_ext::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TmdbConfig;
use crate::error::{Result, SyncError};
use crate::http::ApiClient;

const APP_USER_AGENT: &str = "tivi-sync";
// TMDb allows ~40 requests per 10s
const RATE_LIMIT: u32 = 4u32;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TmdbNetwork {
    pub name: Option<String>,
    pub logo_path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TmdbSeasonSummary {
    pub id: i32,
    pub season_number: i32,
}

// tv/<id>
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TmdbTvShow {
    pub id: i32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub homepage: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub networks: Vec<TmdbNetwork>,
    #[serde(default)]
    pub seasons: Vec<TmdbSeasonSummary>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TmdbEpisode {
    pub id: i32,
    pub episode_number: Option<i32>,
    pub name: Option<String>,
    pub overview: Option<String>,
    /// `YYYY-MM-DD`, sometimes empty.
    pub air_date: Option<String>,
    pub still_path: Option<String>,
}

// tv/<id>/season/<n>
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TmdbSeason {
    pub id: i32,
    pub season_number: Option<i32>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub episodes: Vec<TmdbEpisode>,
}

/// themoviedb.org API v3. Without an API key every call fails with `NoData`.
pub struct TmdbApi {
    api: ApiClient,
    api_key: Option<String>,
}

impl TmdbApi {
    pub fn new(config: &TmdbConfig) -> Result<TmdbApi> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(TmdbApi {
            api: ApiClient::new(client, &config.base_url, Quota::per_second(nonzero!(RATE_LIMIT))),
            api_key: config.api_key.clone(),
        })
    }

    fn key(&self) -> Result<Vec<(&'static str, String)>> {
        self.api_key
            .clone()
            .map(|key| vec![("api_key", key)])
            .ok_or_else(|| SyncError::NoData("TMDb (no API key configured)".to_string()))
    }

    pub async fn tv_show(&self, tmdb_id: i32) -> Result<TmdbTvShow> {
        self.api
            .get_json(&format!("tv/{}", tmdb_id), &self.key()?)
            .await
    }

    pub async fn tv_season(&self, tmdb_id: i32, season: i32) -> Result<TmdbSeason> {
        self.api
            .get_json(&format!("tv/{}/season/{}", tmdb_id, season), &self.key()?)
            .await
    }

    pub async fn tv_episode(&self, tmdb_id: i32, season: i32, episode: i32) -> Result<TmdbEpisode> {
        self.api
            .get_json(
                &format!("tv/{}/season/{}/episode/{}", tmdb_id, season, episode),
                &self.key()?,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_season_with_episodes() {
        let text = r#"{
            "_id": "5a1f",
            "air_date": "2017-12-01",
            "episodes": [
                {"air_date": "2017-12-01", "episode_number": 1, "id": 1376142, "name": "Secrets",
                 "overview": "", "still_path": "/still.jpg", "vote_average": 7.9},
                {"air_date": "", "episode_number": 2, "id": 1376143, "name": "Lies", "still_path": null}
            ],
            "name": "Season 1",
            "overview": "",
            "id": 94054,
            "poster_path": "/poster.jpg",
            "season_number": 1
        }"#;
        let season: TmdbSeason = serde_json::from_str(text).unwrap();
        assert_eq!(season.id, 94054);
        assert_eq!(season.episodes.len(), 2);
        assert_eq!(season.episodes[1].air_date.as_deref(), Some(""));
        assert!(season.episodes[1].still_path.is_none());
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let api = TmdbApi::new(&TmdbConfig {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: None,
        })
        .unwrap();
        assert!(matches!(api.key(), Err(SyncError::NoData(_))));
    }
}
