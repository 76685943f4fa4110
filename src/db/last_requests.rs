use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::db::entity::entity_dao;
use crate::models::{LastRequest, Request};
use crate::schema::last_requests;

pub struct LastRequestDao;

entity_dao!(LastRequestDao, LastRequest, last_requests, "last request");

impl LastRequestDao {
    pub fn last_request(
        conn: &mut SqliteConnection,
        request: Request,
        entity_id: i64,
    ) -> QueryResult<Option<LastRequest>> {
        last_requests::table
            .filter(last_requests::request.eq(request))
            .filter(last_requests::entity_id.eq(entity_id))
            .select(LastRequest::as_select())
            .first(conn)
            .optional()
    }

    /// Record a successful fetch, overwriting any earlier timestamp for the same key.
    pub fn record(
        conn: &mut SqliteConnection,
        request: Request,
        entity_id: i64,
        timestamp: NaiveDateTime,
    ) -> QueryResult<usize> {
        diesel::insert_into(last_requests::table)
            .values((
                last_requests::request.eq(request),
                last_requests::entity_id.eq(entity_id),
                last_requests::timestamp.eq(timestamp),
            ))
            .on_conflict((last_requests::request, last_requests::entity_id))
            .do_update()
            .set(last_requests::timestamp.eq(timestamp))
            .execute(conn)
    }

    pub fn delete(
        conn: &mut SqliteConnection,
        request: Request,
        entity_id: i64,
    ) -> QueryResult<usize> {
        diesel::delete(
            last_requests::table
                .filter(last_requests::request.eq(request))
                .filter(last_requests::entity_id.eq(entity_id)),
        )
        .execute(conn)
    }
}
