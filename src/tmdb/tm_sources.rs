//! themoviedb.org as a data source. Shows are looked up by their TMDb id, which Trakt
//! usually supplies on the first details refresh.
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::future::try_join_all;

use crate::error::{Result, SyncError};
use crate::models::{Episode, Season, Show};
use crate::sources::*;
use crate::tmdb::tm_api::*;

fn air_date(date: Option<&str>) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(date?, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

impl From<TmdbTvShow> for Show {
    fn from(api: TmdbTvShow) -> Show {
        let network = api.networks.into_iter().next().unwrap_or_default();
        Show {
            tmdb_id: Some(api.id),
            title: api.name,
            summary: api.overview.filter(|o| !o.is_empty()),
            homepage: api.homepage.filter(|h| !h.is_empty()),
            network: network.name,
            network_logo_path: network.logo_path,
            tmdb_poster_path: api.poster_path,
            tmdb_backdrop_path: api.backdrop_path,
            ..Show::EMPTY
        }
    }
}

impl From<TmdbEpisode> for Episode {
    fn from(api: TmdbEpisode) -> Episode {
        Episode {
            tmdb_id: Some(api.id),
            number: api.episode_number,
            title: api.name,
            summary: api.overview.filter(|o| !o.is_empty()),
            first_aired: air_date(api.air_date.as_deref()),
            tmdb_backdrop_path: api.still_path,
            ..Episode::EMPTY
        }
    }
}

fn season_from_api(api: TmdbSeason) -> (Season, Vec<Episode>) {
    let season = Season {
        tmdb_id: Some(api.id),
        number: api.season_number,
        title: api.name,
        summary: api.overview.filter(|o| !o.is_empty()),
        episode_count: Some(api.episodes.len() as i32),
        tmdb_poster_path: api.poster_path,
        ..Season::EMPTY
    };
    let episodes = api.episodes.into_iter().map(Episode::from).collect();
    (season, episodes)
}

fn tmdb_id(show: &Show) -> Result<i32> {
    show.tmdb_id
        .ok_or_else(|| SyncError::NoData(format!("TMDb id of show {}", show.id)))
}

#[async_trait]
impl ShowDataSource for TmdbApi {
    async fn get_show(&self, show: &Show) -> Result<Show> {
        Ok(Show::from(self.tv_show(tmdb_id(show)?).await?))
    }
}

#[async_trait]
impl SeasonsEpisodesDataSource for TmdbApi {
    async fn get_seasons_episodes(&self, show: &Show) -> Result<Vec<(Season, Vec<Episode>)>> {
        let id = tmdb_id(show)?;
        let summary = self.tv_show(id).await?;
        let seasons = try_join_all(
            summary
                .seasons
                .iter()
                .map(|season| self.tv_season(id, season.season_number)),
        )
        .await?;
        Ok(seasons.into_iter().map(season_from_api).collect())
    }

    async fn get_season(&self, show: &Show, season_number: i32) -> Result<Season> {
        let season = self.tv_season(tmdb_id(show)?, season_number).await?;
        Ok(season_from_api(season).0)
    }
}

#[async_trait]
impl EpisodeDataSource for TmdbApi {
    async fn get_episode(
        &self,
        show: &Show,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Episode> {
        let episode = self
            .tv_episode(tmdb_id(show)?, season_number, episode_number)
            .await?;
        Ok(Episode::from(episode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_dates_parse_or_are_unknown() {
        assert_eq!(
            air_date(Some("2017-12-01")),
            NaiveDate::from_ymd_opt(2017, 12, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(air_date(Some("")), None);
        assert_eq!(air_date(None), None);
    }

    #[test]
    fn show_takes_first_network_logo() {
        let show = Show::from(TmdbTvShow {
            id: 70523,
            overview: Some(String::new()),
            networks: vec![
                TmdbNetwork {
                    name: Some("Netflix".to_string()),
                    logo_path: Some("/netflix.png".to_string()),
                },
                TmdbNetwork::default(),
            ],
            poster_path: Some("/poster.jpg".to_string()),
            ..Default::default()
        });

        assert_eq!(show.tmdb_id, Some(70523));
        assert_eq!(show.network_logo_path.as_deref(), Some("/netflix.png"));
        assert_eq!(show.tmdb_poster_path.as_deref(), Some("/poster.jpg"));
        assert!(show.summary.is_none());
        assert!(show.trakt_id.is_none());
    }

    #[test]
    fn season_counts_its_episodes() {
        let (season, episodes) = season_from_api(TmdbSeason {
            id: 94054,
            season_number: Some(1),
            episodes: vec![
                TmdbEpisode {
                    id: 1,
                    episode_number: Some(1),
                    still_path: Some("/s.jpg".to_string()),
                    ..Default::default()
                },
                TmdbEpisode {
                    id: 2,
                    episode_number: Some(2),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        assert_eq!(season.tmdb_id, Some(94054));
        assert_eq!(season.episode_count, Some(2));
        assert_eq!(episodes[0].tmdb_backdrop_path.as_deref(), Some("/s.jpg"));
        assert_eq!(episodes[1].tmdb_id, Some(2));
    }
}
