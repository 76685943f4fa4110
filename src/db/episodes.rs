use diesel::prelude::*;

use crate::db::entity::entity_dao;
use crate::models::Episode;
use crate::schema::{episodes, seasons};

pub struct EpisodesDao;

entity_dao!(EpisodesDao, Episode, episodes, "episode");

impl EpisodesDao {
    pub fn episode_with_id(conn: &mut SqliteConnection, id: i64) -> QueryResult<Option<Episode>> {
        episodes::table
            .find(id)
            .select(Episode::as_select())
            .first(conn)
            .optional()
    }

    pub fn episodes_with_season_id(
        conn: &mut SqliteConnection,
        season_id: i64,
    ) -> QueryResult<Vec<Episode>> {
        episodes::table
            .filter(episodes::season_id.eq(season_id))
            .order((episodes::number.asc(), episodes::id.asc()))
            .select(Episode::as_select())
            .load(conn)
    }

    pub fn episodes_for_show_id(
        conn: &mut SqliteConnection,
        show_id: i64,
    ) -> QueryResult<Vec<Episode>> {
        episodes::table
            .inner_join(seasons::table)
            .filter(seasons::show_id.eq(show_id))
            .order((seasons::number.asc(), episodes::number.asc()))
            .select(Episode::as_select())
            .load(conn)
    }

    pub fn episode_with_trakt_id(
        conn: &mut SqliteConnection,
        trakt_id: i32,
    ) -> QueryResult<Option<Episode>> {
        episodes::table
            .filter(episodes::trakt_id.eq(trakt_id))
            .select(Episode::as_select())
            .first(conn)
            .optional()
    }

    pub fn episode_id_with_trakt_id(
        conn: &mut SqliteConnection,
        trakt_id: i32,
    ) -> QueryResult<Option<i64>> {
        episodes::table
            .filter(episodes::trakt_id.eq(trakt_id))
            .select(episodes::id)
            .first(conn)
            .optional()
    }

    /// The owning show of an episode, through its season.
    pub fn show_id_for_episode_id(
        conn: &mut SqliteConnection,
        episode_id: i64,
    ) -> QueryResult<Option<i64>> {
        episodes::table
            .inner_join(seasons::table)
            .filter(episodes::id.eq(episode_id))
            .select(seasons::show_id)
            .first(conn)
            .optional()
    }
}
