use chrono::{DateTime, Utc};
use governor::Quota;
use nonzero_ext::*;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::config::TraktConfig;
use crate::error::{Result, SyncError};
use crate::http::ApiClient;

const APP_USER_AGENT: &str = "tivi-sync";
// 3/sec stays well under 1000 per 5min
const RATE_LIMIT: u32 = 3u32;

pub const FOLLOWED_LIST_NAME: &str = "Following";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ApiIDs {
    pub trakt: Option<i32>,
    pub slug: Option<String>,
    pub imdb: Option<String>,
    pub tmdb: Option<i32>,
    // skipping tvdb/tvrage
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ApiAirs {
    pub day: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
}

// shows/<id>?extended=full
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ApiShowDetails {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub ids: ApiIDs,
    pub overview: Option<String>,
    pub first_aired: Option<DateTime<Utc>>,
    pub airs: Option<ApiAirs>,
    pub runtime: Option<i32>,
    pub certification: Option<String>,
    pub network: Option<String>,
    pub country: Option<String>,
    pub homepage: Option<String>,
    pub status: Option<String>,
    pub rating: Option<f32>,
    pub votes: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ApiEpisode {
    pub season: Option<i32>,
    pub number: Option<i32>,
    pub title: Option<String>,
    pub ids: ApiIDs,
    pub overview: Option<String>,
    pub rating: Option<f32>,
    pub votes: Option<i32>,
    pub first_aired: Option<DateTime<Utc>>,
}

// shows/<id>/seasons?extended=full,episodes
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ApiSeasonDetails {
    pub number: Option<i32>,
    pub ids: ApiIDs,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub network: Option<String>,
    pub rating: Option<f32>,
    pub votes: Option<i32>,
    pub episode_count: Option<i32>,
    pub aired_episodes: Option<i32>,
    #[serde(default)]
    pub episodes: Vec<ApiEpisode>,
}

// sync/history/shows/<id>
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiHistoryItem {
    pub id: i64,
    pub watched_at: DateTime<Utc>,
    pub episode: Option<ApiEpisode>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ApiListIDs {
    pub trakt: i64,
    pub slug: Option<String>,
}

// users/me/lists
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ApiList {
    pub name: String,
    pub ids: ApiListIDs,
}

#[derive(Serialize, Debug)]
pub struct ApiNewList<'a> {
    pub name: &'a str,
    pub privacy: &'a str,
}

// users/me/lists/<id>/items/shows
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiListItem {
    pub id: i64,
    pub listed_at: Option<DateTime<Utc>>,
    pub show: Option<ApiShowDetails>,
}

#[derive(Serialize, Debug, Default)]
pub struct ApiShowIds {
    pub ids: ApiIDs,
}

#[derive(Serialize, Debug, Default)]
pub struct ApiListItemsBody {
    pub shows: Vec<ApiShowIds>,
}

#[derive(Serialize, Debug)]
pub struct ApiWatchedEpisode {
    pub ids: ApiIDs,
    pub watched_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Default)]
pub struct ApiHistoryBody {
    pub episodes: Vec<ApiWatchedEpisode>,
}

#[derive(Serialize, Debug, Default)]
pub struct ApiHistoryRemoveBody {
    pub ids: Vec<i64>,
}

/// Creates a single HTTP client to use for trakt.tv requests
fn establish_http_client(config: &TraktConfig) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        "Content-Type",
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert("trakt-api-version", header::HeaderValue::from_static("2"));
    headers.insert(
        "trakt-api-key",
        header::HeaderValue::from_str(&config.client_id)
            .map_err(|_| SyncError::Config("TRAKT_CLIENT_ID is not a valid header".to_string()))?,
    );

    if let Some(token) = &config.access_token {
        let bearer = format!("Bearer {}", token);
        headers.insert(
            "Authorization",
            header::HeaderValue::from_str(&bearer)
                .map_err(|_| SyncError::Config("TRAKT_ACCESS_TOKEN is not a valid header".to_string()))?,
        );
    }

    Ok(Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(headers)
        .build()?)
}

/// trakt.tv API v2, rate limited and retrying.
pub struct TraktApi {
    api: ApiClient,
}

impl TraktApi {
    pub fn new(config: &TraktConfig) -> Result<TraktApi> {
        let client = establish_http_client(config)?;
        Ok(TraktApi {
            api: ApiClient::new(
                client,
                &config.base_url,
                Quota::per_second(nonzero!(RATE_LIMIT)),
            ),
        })
    }

    pub async fn show_summary(&self, id: &str) -> Result<ApiShowDetails> {
        self.api
            .get_json(&format!("shows/{}", id), &[("extended", "full".to_string())])
            .await
    }

    pub async fn show_seasons(&self, id: &str) -> Result<Vec<ApiSeasonDetails>> {
        self.api
            .get_json(
                &format!("shows/{}/seasons", id),
                &[("extended", "full,episodes".to_string())],
            )
            .await
    }

    pub async fn episode_summary(&self, id: &str, season: i32, episode: i32) -> Result<ApiEpisode> {
        self.api
            .get_json(
                &format!("shows/{}/seasons/{}/episodes/{}", id, season, episode),
                &[("extended", "full".to_string())],
            )
            .await
    }

    pub async fn show_history(
        &self,
        id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiHistoryItem>> {
        let mut query = vec![("limit", "10000".to_string())];
        if let Some(since) = since {
            query.push(("start_at", since.to_rfc3339()));
        }
        self.api
            .get_json(&format!("sync/history/shows/{}", id), &query)
            .await
    }

    pub async fn add_history(&self, body: &ApiHistoryBody) -> Result<()> {
        self.api
            .post_json::<_, serde_json::Value>("sync/history", &[], body)
            .await
            .map(|_| ())
    }

    pub async fn remove_history(&self, body: &ApiHistoryRemoveBody) -> Result<()> {
        self.api
            .post_json::<_, serde_json::Value>("sync/history/remove", &[], body)
            .await
            .map(|_| ())
    }

    pub async fn lists(&self) -> Result<Vec<ApiList>> {
        self.api.get_json("users/me/lists", &[]).await
    }

    pub async fn create_list(&self, name: &str) -> Result<ApiList> {
        let body = ApiNewList {
            name,
            privacy: "private",
        };
        self.api.post_json("users/me/lists", &[], &body).await
    }

    pub async fn list_shows(&self, list_id: i64) -> Result<Vec<ApiListItem>> {
        self.api
            .get_json(
                &format!("users/me/lists/{}/items/shows", list_id),
                &[("extended", "full".to_string())],
            )
            .await
    }

    pub async fn add_list_items(&self, list_id: i64, body: &ApiListItemsBody) -> Result<()> {
        self.api
            .post_json::<_, serde_json::Value>(&format!("users/me/lists/{}/items", list_id), &[], body)
            .await
            .map(|_| ())
    }

    pub async fn remove_list_items(&self, list_id: i64, body: &ApiListItemsBody) -> Result<()> {
        self.api
            .post_json::<_, serde_json::Value>(
                &format!("users/me/lists/{}/items/remove", list_id),
                &[],
                body,
            )
            .await
            .map(|_| ())
    }
}
