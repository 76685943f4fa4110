//! trakt.tv as a data source: maps API shapes onto local models.
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use log::*;

use crate::error::{Result, SyncError};
use crate::models::{Episode, EpisodeWatchEntry, FollowedShowEntry, PendingAction, Season, Show};
use crate::sources::*;
use crate::trakt::t_api::*;

impl From<ApiShowDetails> for Show {
    fn from(api: ApiShowDetails) -> Show {
        let airs = api.airs.unwrap_or_default();
        Show {
            title: api.title,
            trakt_id: api.ids.trakt,
            tmdb_id: api.ids.tmdb,
            imdb_id: api.ids.imdb,
            summary: api.overview,
            homepage: api.homepage,
            trakt_rating: api.rating,
            trakt_votes: api.votes,
            certification: api.certification,
            first_aired: api.first_aired.map(|d| d.naive_utc()),
            country: api.country,
            network: api.network,
            runtime: api.runtime,
            genres: (!api.genres.is_empty()).then(|| api.genres.join(",")),
            status: api.status,
            airs_day: airs
                .day
                .as_deref()
                .and_then(|day| day.parse::<Weekday>().ok())
                .map(|day| day.number_from_monday() as i32),
            airs_time: airs
                .time
                .as_deref()
                .and_then(|time| NaiveTime::parse_from_str(time, "%H:%M").ok()),
            airs_tz: airs.timezone,
            ..Show::EMPTY
        }
    }
}

impl From<ApiEpisode> for Episode {
    fn from(api: ApiEpisode) -> Episode {
        Episode {
            trakt_id: api.ids.trakt,
            tmdb_id: api.ids.tmdb,
            title: api.title,
            summary: api.overview,
            number: api.number,
            first_aired: api.first_aired.map(|d| d.naive_utc()),
            trakt_rating: api.rating,
            trakt_votes: api.votes,
            ..Episode::EMPTY
        }
    }
}

fn season_from_api(api: ApiSeasonDetails) -> (Season, Vec<Episode>) {
    let season = Season {
        trakt_id: api.ids.trakt,
        tmdb_id: api.ids.tmdb,
        title: api.title,
        summary: api.overview,
        number: api.number,
        network: api.network,
        episode_count: api.episode_count,
        episodes_aired: api.aired_episodes,
        trakt_rating: api.rating,
        trakt_votes: api.votes,
        ..Season::EMPTY
    };
    let episodes = api.episodes.into_iter().map(Episode::from).collect();
    (season, episodes)
}

fn watch_from_history(item: ApiHistoryItem) -> Option<(Episode, EpisodeWatchEntry)> {
    let episode = item.episode?;
    Some((
        Episode {
            trakt_id: episode.ids.trakt,
            ..Episode::EMPTY
        },
        EpisodeWatchEntry {
            id: 0,
            episode_id: 0,
            trakt_id: Some(item.id),
            watched_at: item.watched_at.naive_utc(),
            pending_action: PendingAction::Nothing,
        },
    ))
}

fn followed_from_list_item(item: ApiListItem) -> Option<(FollowedShowEntry, Show)> {
    let show = item.show?;
    Some((
        FollowedShowEntry {
            trakt_id: Some(item.id),
            followed_at: item.listed_at.map(|d| d.naive_utc()),
            ..Default::default()
        },
        Show::from(show),
    ))
}

fn list_items_body(shows: &[Show]) -> ApiListItemsBody {
    ApiListItemsBody {
        shows: shows
            .iter()
            .map(|show| ApiShowIds {
                ids: ApiIDs {
                    trakt: show.trakt_id,
                    tmdb: show.tmdb_id,
                    imdb: show.imdb_id.clone(),
                    slug: None,
                },
            })
            .collect(),
    }
}

/// Trakt accepts its own id or an IMDb id in paths.
fn path_id(show: &Show) -> Result<String> {
    show.trakt_id
        .map(|id| id.to_string())
        .or_else(|| show.imdb_id.clone())
        .ok_or_else(|| SyncError::NoData(format!("Trakt id of show {}", show.id)))
}

#[async_trait]
impl ShowDataSource for TraktApi {
    async fn get_show(&self, show: &Show) -> Result<Show> {
        let id = path_id(show)?;
        Ok(Show::from(self.show_summary(&id).await?))
    }
}

#[async_trait]
impl SeasonsEpisodesDataSource for TraktApi {
    async fn get_seasons_episodes(&self, show: &Show) -> Result<Vec<(Season, Vec<Episode>)>> {
        let id = path_id(show)?;
        let seasons = self.show_seasons(&id).await?;
        debug!("Trakt lists {} seasons for show {}", seasons.len(), show.id);
        Ok(seasons.into_iter().map(season_from_api).collect())
    }

    async fn get_season(&self, show: &Show, season_number: i32) -> Result<Season> {
        let id = path_id(show)?;
        self.show_seasons(&id)
            .await?
            .into_iter()
            .find(|s| s.number == Some(season_number))
            .map(|s| season_from_api(s).0)
            .ok_or_else(|| SyncError::NoData(format!("season {} of show {}", season_number, show.id)))
    }
}

#[async_trait]
impl EpisodeDataSource for TraktApi {
    async fn get_episode(
        &self,
        show: &Show,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Episode> {
        let id = path_id(show)?;
        Ok(Episode::from(
            self.episode_summary(&id, season_number, episode_number)
                .await?,
        ))
    }
}

#[async_trait]
impl EpisodeWatchesDataSource for TraktApi {
    async fn get_show_episode_watches(
        &self,
        show: &Show,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Episode, EpisodeWatchEntry)>> {
        let id = path_id(show)?;
        let history = self.show_history(&id, since).await?;
        Ok(history.into_iter().filter_map(watch_from_history).collect())
    }

    async fn add_episode_watches(&self, watches: &[(Episode, EpisodeWatchEntry)]) -> Result<()> {
        let body = ApiHistoryBody {
            episodes: watches
                .iter()
                .filter_map(|(episode, entry)| {
                    Some(ApiWatchedEpisode {
                        ids: ApiIDs {
                            trakt: Some(episode.trakt_id?),
                            ..Default::default()
                        },
                        watched_at: Utc.from_utc_datetime(&entry.watched_at),
                    })
                })
                .collect(),
        };
        if body.episodes.len() < watches.len() {
            warn!(
                "{} watches have no Trakt episode id and can't be uploaded",
                watches.len() - body.episodes.len()
            );
        }
        if body.episodes.is_empty() {
            return Ok(());
        }
        self.add_history(&body).await
    }

    async fn remove_episode_watches(&self, watches: &[EpisodeWatchEntry]) -> Result<()> {
        let body = ApiHistoryRemoveBody {
            ids: watches.iter().filter_map(|w| w.trakt_id).collect(),
        };
        if body.ids.is_empty() {
            return Ok(());
        }
        self.remove_history(&body).await
    }
}

#[async_trait]
impl FollowedShowsDataSource for TraktApi {
    async fn get_followed_list_id(&self) -> Result<i64> {
        if let Some(list) = self
            .lists()
            .await?
            .into_iter()
            .find(|list| list.name == FOLLOWED_LIST_NAME)
        {
            return Ok(list.ids.trakt);
        }

        info!("Creating Trakt list '{}'", FOLLOWED_LIST_NAME);
        Ok(self.create_list(FOLLOWED_LIST_NAME).await?.ids.trakt)
    }

    async fn get_list_shows(&self, list_id: i64) -> Result<Vec<(FollowedShowEntry, Show)>> {
        let items = self.list_shows(list_id).await?;
        Ok(items.into_iter().filter_map(followed_from_list_item).collect())
    }

    async fn add_show_ids_to_list(&self, list_id: i64, shows: &[Show]) -> Result<()> {
        self.add_list_items(list_id, &list_items_body(shows)).await
    }

    async fn remove_show_ids_from_list(&self, list_id: i64, shows: &[Show]) -> Result<()> {
        self.remove_list_items(list_id, &list_items_body(shows)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn show_details_map_onto_show() {
        let api = ApiShowDetails {
            title: Some("Dark".to_string()),
            ids: ApiIDs {
                trakt: Some(123),
                tmdb: Some(70523),
                imdb: Some("tt5753856".to_string()),
                slug: None,
            },
            airs: Some(ApiAirs {
                day: Some("Friday".to_string()),
                time: Some("09:00".to_string()),
                timezone: Some("Europe/Berlin".to_string()),
            }),
            genres: vec!["drama".to_string(), "mystery".to_string()],
            rating: Some(8.6),
            ..Default::default()
        };

        let show = Show::from(api);

        assert_eq!(show.trakt_id, Some(123));
        assert_eq!(show.tmdb_id, Some(70523));
        assert_eq!(show.airs_day, Some(5));
        assert_eq!(show.airs_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(show.genres.as_deref(), Some("drama,mystery"));
        assert_eq!(show.trakt_rating, Some(8.6));
        assert_eq!(show.id, 0);
    }

    #[test]
    fn missing_genres_stay_unknown() {
        let show = Show::from(ApiShowDetails::default());
        assert!(show.genres.is_none());
        assert!(show.airs_day.is_none());
    }

    #[test]
    fn seasons_carry_their_episodes() {
        let api = ApiSeasonDetails {
            number: Some(2),
            ids: ApiIDs {
                trakt: Some(55),
                ..Default::default()
            },
            episodes: vec![ApiEpisode {
                number: Some(1),
                ids: ApiIDs {
                    trakt: Some(555),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };

        let (season, episodes) = season_from_api(api);

        assert_eq!(season.number, Some(2));
        assert_eq!(season.trakt_id, Some(55));
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].trakt_id, Some(555));
        assert_eq!(episodes[0].season_id, 0);
    }

    #[test]
    fn history_without_episode_is_dropped() {
        let watched_at = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2021, 3, 4)
                .and_then(|d| d.and_hms_opt(21, 0, 0))
                .unwrap(),
        );
        let with = ApiHistoryItem {
            id: 9,
            watched_at,
            episode: Some(ApiEpisode {
                ids: ApiIDs {
                    trakt: Some(77),
                    ..Default::default()
                },
                ..Default::default()
            }),
        };
        let without = ApiHistoryItem {
            id: 10,
            watched_at,
            episode: None,
        };

        let (episode, entry) = watch_from_history(with).unwrap();
        assert_eq!(episode.trakt_id, Some(77));
        assert_eq!(entry.trakt_id, Some(9));
        assert_eq!(entry.watched_at, watched_at.naive_utc());
        assert!(watch_from_history(without).is_none());
    }

    #[test]
    fn path_prefers_trakt_id_then_imdb() {
        let both = Show {
            trakt_id: Some(1),
            imdb_id: Some("tt1".to_string()),
            ..Show::EMPTY
        };
        let imdb_only = Show {
            imdb_id: Some("tt1".to_string()),
            ..Show::EMPTY
        };
        assert_eq!(path_id(&both).unwrap(), "1");
        assert_eq!(path_id(&imdb_only).unwrap(), "tt1");
        assert!(path_id(&Show::EMPTY).is_err());
    }
}
