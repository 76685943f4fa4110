use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::*;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SyncError};

pub const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// A reqwest client that waits its turn under a rate limit and retries transient failures
/// (timeouts, connection errors, 429 and 5xx) with exponential backoff.
pub struct ApiClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl ApiClient {
    pub fn new(client: Client, base_url: &str, quota: Quota) -> ApiClient {
        ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            self.limiter.until_ready().await;
            let outcome = build(&self.client).send().await;

            let retryable = match &outcome {
                Ok(response) => {
                    response.status().is_server_error()
                        || response.status() == StatusCode::TOO_MANY_REQUESTS
                }
                Err(err) => err.is_timeout() || err.is_connect(),
            };
            if !retryable || attempt >= MAX_ATTEMPTS {
                return check_status(outcome?);
            }

            let delay = backoff_delay(attempt);
            warn!(
                "Request failed (attempt {}/{}), retrying in {:?}",
                attempt, MAX_ATTEMPTS, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        trace!("GET {}", url);
        let response = self.send(|client| client.get(&url).query(query)).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, query: &[(&str, String)], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        trace!("POST {}", url);
        let response = self
            .send(|client| client.post(&url).query(query).json(body))
            .await?;
        decode(response).await
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.pow(attempt.saturating_sub(1))
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    debug!("{} returned {}", response.url(), status);
    match status {
        StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized),
        _ => Err(SyncError::Http {
            status,
            url: response.url().to_string(),
        }),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    match serde_json::from_str::<T>(&text) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            info!("Failed to parse: {}", err);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonzero_ext::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(2));
    }

    #[test]
    fn urls_are_joined_once() {
        let api = ApiClient::new(
            Client::new(),
            "https://api.trakt.tv/",
            Quota::per_second(nonzero!(1u32)),
        );
        assert_eq!(api.url("/shows/1"), "https://api.trakt.tv/shows/1");
        assert_eq!(api.url("shows/1"), "https://api.trakt.tv/shows/1");
    }
}
