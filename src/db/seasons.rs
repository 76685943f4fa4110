use diesel::prelude::*;

use crate::db::entity::entity_dao;
use crate::models::Season;
use crate::schema::seasons;

pub struct SeasonsDao;

entity_dao!(SeasonsDao, Season, seasons, "season");

impl SeasonsDao {
    pub fn season_with_id(conn: &mut SqliteConnection, id: i64) -> QueryResult<Option<Season>> {
        seasons::table
            .find(id)
            .select(Season::as_select())
            .first(conn)
            .optional()
    }

    /// Seasons of a show ordered by number, specials (number 0) last.
    pub fn seasons_for_show_id(
        conn: &mut SqliteConnection,
        show_id: i64,
    ) -> QueryResult<Vec<Season>> {
        let mut found: Vec<Season> = seasons::table
            .filter(seasons::show_id.eq(show_id))
            .order((seasons::number.asc(), seasons::id.asc()))
            .select(Season::as_select())
            .load(conn)?;

        found.sort_by_key(|s| match s.number {
            Some(0) | None => i32::MAX,
            Some(n) => n,
        });
        Ok(found)
    }

    pub fn season_with_trakt_id(
        conn: &mut SqliteConnection,
        trakt_id: i32,
    ) -> QueryResult<Option<Season>> {
        seasons::table
            .filter(seasons::trakt_id.eq(trakt_id))
            .select(Season::as_select())
            .first(conn)
            .optional()
    }

    pub fn season_with_show_id_and_number(
        conn: &mut SqliteConnection,
        show_id: i64,
        number: i32,
    ) -> QueryResult<Option<Season>> {
        seasons::table
            .filter(seasons::show_id.eq(show_id))
            .filter(seasons::number.eq(number))
            .select(Season::as_select())
            .first(conn)
            .optional()
    }

    pub fn delete_with_show_id(conn: &mut SqliteConnection, show_id: i64) -> QueryResult<usize> {
        diesel::delete(seasons::table.filter(seasons::show_id.eq(show_id))).execute(conn)
    }

    pub fn update_season_ignore_flag(
        conn: &mut SqliteConnection,
        season_id: i64,
        ignored: bool,
    ) -> QueryResult<usize> {
        diesel::update(seasons::table.find(season_id))
            .set(seasons::ignored.eq(ignored))
            .execute(conn)
    }

    /// Ids of the regular seasons of the same show that come before `season_id`.
    pub fn show_previous_season_ids(
        conn: &mut SqliteConnection,
        season_id: i64,
    ) -> QueryResult<Vec<i64>> {
        let Some(season) = Self::season_with_id(conn, season_id)? else {
            return Ok(vec![]);
        };
        let Some(number) = season.number else {
            return Ok(vec![]);
        };

        seasons::table
            .filter(seasons::show_id.eq(season.show_id))
            .filter(seasons::number.gt(0))
            .filter(seasons::number.lt(number))
            .select(seasons::id)
            .load(conn)
    }

    pub fn reassign_show(conn: &mut SqliteConnection, from: i64, to: i64) -> QueryResult<usize> {
        diesel::update(seasons::table.filter(seasons::show_id.eq(from)))
            .set(seasons::show_id.eq(to))
            .execute(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, EntityDao, EpisodesDao, ShowDao};
    use crate::models::{Episode, Show};

    #[tokio::test]
    async fn specials_sort_last() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let show_id = ShowDao::insert(conn, &Show::EMPTY)?;
            for number in [0, 2, 1] {
                SeasonsDao::insert(
                    conn,
                    &Season {
                        number: Some(number),
                        ..Season::for_show(show_id)
                    },
                )?;
            }

            let numbers: Vec<_> = SeasonsDao::seasons_for_show_id(conn, show_id)?
                .into_iter()
                .map(|s| s.number)
                .collect();
            assert_eq!(numbers, vec![Some(1), Some(2), Some(0)]);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn previous_seasons_skip_specials() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let show_id = ShowDao::insert(conn, &Show::EMPTY)?;
            let mut ids = vec![];
            for number in 0..4 {
                ids.push(SeasonsDao::insert(
                    conn,
                    &Season {
                        number: Some(number),
                        ..Season::for_show(show_id)
                    },
                )?);
            }

            let mut previous = SeasonsDao::show_previous_season_ids(conn, ids[3])?;
            previous.sort();
            assert_eq!(previous, vec![ids[1], ids[2]]);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn deleting_season_cascades_to_episodes() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let show_id = ShowDao::insert(conn, &Show::EMPTY)?;
            let season_id = SeasonsDao::insert(conn, &Season::for_show(show_id))?;
            EpisodesDao::insert(conn, &Episode::for_season(season_id))?;

            SeasonsDao::delete_with_show_id(conn, show_id)?;
            assert!(EpisodesDao::episodes_with_season_id(conn, season_id)?.is_empty());
            Ok(())
        })
        .await
        .unwrap();
    }
}
