/// Field-precedence merging of the same entity as seen by the local store, Trakt and TMDb.
///
/// `None` from a source means "no opinion". One table applies everywhere:
/// - descriptive fields and ratings: Trakt, else local
/// - TMDb artwork and logos: TMDb, else local
/// - TMDb id: TMDb, else Trakt's copy of it, else local
///
/// Seasons and episodes also take descriptive fields from TMDb when Trakt has none, since
/// either source can be the one listing them.
///
/// Local-only fields (ids, parent ids, flags) always come from `local`.
use crate::models::{Episode, Season, Show};

pub fn merge_show(local: &Show, trakt: &Show, tmdb: &Show) -> Show {
    Show {
        id: local.id,
        title: pick(&trakt.title, &local.title),
        original_title: pick(&trakt.original_title, &local.original_title),
        summary: pick(&trakt.summary, &local.summary),
        homepage: pick(&trakt.homepage, &local.homepage),
        certification: pick(&trakt.certification, &local.certification),
        runtime: trakt.runtime.or(local.runtime),
        country: pick(&trakt.country, &local.country),
        first_aired: trakt.first_aired.or(local.first_aired),
        genres: pick(&trakt.genres, &local.genres),
        status: pick(&trakt.status, &local.status),
        network: pick(&trakt.network, &local.network),
        airs_day: trakt.airs_day.or(local.airs_day),
        airs_time: trakt.airs_time.or(local.airs_time),
        airs_tz: pick(&trakt.airs_tz, &local.airs_tz),
        imdb_id: pick(&trakt.imdb_id, &local.imdb_id),

        trakt_id: trakt.trakt_id.or(local.trakt_id),
        trakt_rating: trakt.trakt_rating.or(local.trakt_rating),
        trakt_votes: trakt.trakt_votes.or(local.trakt_votes),

        tmdb_id: tmdb.tmdb_id.or(trakt.tmdb_id).or(local.tmdb_id),
        network_logo_path: pick(&tmdb.network_logo_path, &local.network_logo_path),
        tmdb_poster_path: pick(&tmdb.tmdb_poster_path, &local.tmdb_poster_path),
        tmdb_backdrop_path: pick(&tmdb.tmdb_backdrop_path, &local.tmdb_backdrop_path),
    }
}

pub fn merge_season(local: &Season, trakt: &Season, tmdb: &Season) -> Season {
    Season {
        id: local.id,
        show_id: local.show_id,
        ignored: local.ignored,

        title: pick3(&trakt.title, &tmdb.title, &local.title),
        summary: pick3(&trakt.summary, &tmdb.summary, &local.summary),
        number: trakt.number.or(tmdb.number).or(local.number),
        network: pick3(&trakt.network, &tmdb.network, &local.network),
        episode_count: trakt.episode_count.or(tmdb.episode_count).or(local.episode_count),
        episodes_aired: trakt
            .episodes_aired
            .or(tmdb.episodes_aired)
            .or(local.episodes_aired),

        trakt_id: trakt.trakt_id.or(local.trakt_id),
        trakt_rating: trakt.trakt_rating.or(local.trakt_rating),
        trakt_votes: trakt.trakt_votes.or(local.trakt_votes),

        tmdb_id: tmdb.tmdb_id.or(trakt.tmdb_id).or(local.tmdb_id),
        tmdb_poster_path: pick(&tmdb.tmdb_poster_path, &local.tmdb_poster_path),
        tmdb_backdrop_path: pick(&tmdb.tmdb_backdrop_path, &local.tmdb_backdrop_path),
    }
}

pub fn merge_episode(local: &Episode, trakt: &Episode, tmdb: &Episode) -> Episode {
    Episode {
        id: local.id,
        season_id: local.season_id,

        title: pick3(&trakt.title, &tmdb.title, &local.title),
        summary: pick3(&trakt.summary, &tmdb.summary, &local.summary),
        number: trakt.number.or(tmdb.number).or(local.number),
        first_aired: trakt.first_aired.or(tmdb.first_aired).or(local.first_aired),

        trakt_id: trakt.trakt_id.or(local.trakt_id),
        trakt_rating: trakt.trakt_rating.or(local.trakt_rating),
        trakt_votes: trakt.trakt_votes.or(local.trakt_votes),

        tmdb_id: tmdb.tmdb_id.or(trakt.tmdb_id).or(local.tmdb_id),
        tmdb_backdrop_path: pick(&tmdb.tmdb_backdrop_path, &local.tmdb_backdrop_path),
    }
}

fn pick<T: Clone>(preferred: &Option<T>, fallback: &Option<T>) -> Option<T> {
    preferred.as_ref().or(fallback.as_ref()).cloned()
}

fn pick3<T: Clone>(first: &Option<T>, second: &Option<T>, last: &Option<T>) -> Option<T> {
    first.as_ref().or(second.as_ref()).or(last.as_ref()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local() -> Show {
        Show {
            id: 7,
            title: Some("Local title".to_string()),
            summary: Some("Local summary".to_string()),
            trakt_id: Some(1),
            tmdb_id: Some(10),
            network: Some("Local network".to_string()),
            tmdb_poster_path: Some("/local.jpg".to_string()),
            runtime: Some(30),
            ..Show::EMPTY
        }
    }

    #[test]
    fn empty_sources_leave_local_untouched() {
        let local = local();
        assert_eq!(merge_show(&local, &Show::EMPTY, &Show::EMPTY), local);

        let season = Season {
            id: 3,
            show_id: 7,
            title: Some("S1".to_string()),
            ignored: true,
            ..Season::EMPTY
        };
        assert_eq!(merge_season(&season, &Season::EMPTY, &Season::EMPTY), season);

        let episode = Episode {
            id: 4,
            season_id: 3,
            number: Some(2),
            ..Episode::EMPTY
        };
        assert_eq!(
            merge_episode(&episode, &Episode::EMPTY, &Episode::EMPTY),
            episode
        );
    }

    #[test]
    fn trakt_overrides_descriptive_fields() {
        let trakt = Show {
            title: Some("Trakt title".to_string()),
            runtime: Some(55),
            first_aired: NaiveDate::from_ymd_opt(2019, 3, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            trakt_rating: Some(8.5),
            ..Show::EMPTY
        };
        let merged = merge_show(&local(), &trakt, &Show::EMPTY);

        assert_eq!(merged.id, 7);
        assert_eq!(merged.title.as_deref(), Some("Trakt title"));
        assert_eq!(merged.summary.as_deref(), Some("Local summary"));
        assert_eq!(merged.runtime, Some(55));
        assert_eq!(merged.trakt_rating, Some(8.5));
        assert!(merged.first_aired.is_some());
    }

    #[test]
    fn trakt_does_not_touch_tmdb_artwork() {
        let trakt = Show {
            tmdb_poster_path: Some("/trakt.jpg".to_string()),
            ..Show::EMPTY
        };
        let merged = merge_show(&local(), &trakt, &Show::EMPTY);
        assert_eq!(merged.tmdb_poster_path.as_deref(), Some("/local.jpg"));
    }

    #[test]
    fn tmdb_only_wins_tmdb_fields() {
        let tmdb = Show {
            title: Some("TMDb title".to_string()),
            network: Some("TMDb network".to_string()),
            tmdb_poster_path: Some("/tmdb.jpg".to_string()),
            network_logo_path: Some("/logo.png".to_string()),
            ..Show::EMPTY
        };
        let merged = merge_show(&local(), &Show::EMPTY, &tmdb);

        assert_eq!(merged.title.as_deref(), Some("Local title"));
        assert_eq!(merged.network.as_deref(), Some("Local network"));
        assert_eq!(merged.tmdb_poster_path.as_deref(), Some("/tmdb.jpg"));
        assert_eq!(merged.network_logo_path.as_deref(), Some("/logo.png"));
    }

    #[test]
    fn tmdb_id_falls_back_through_trakt() {
        let trakt = Show {
            tmdb_id: Some(20),
            ..Show::EMPTY
        };
        let tmdb = Show {
            tmdb_id: Some(30),
            ..Show::EMPTY
        };

        assert_eq!(merge_show(&local(), &trakt, &tmdb).tmdb_id, Some(30));
        assert_eq!(merge_show(&local(), &trakt, &Show::EMPTY).tmdb_id, Some(20));
        assert_eq!(
            merge_show(&local(), &Show::EMPTY, &Show::EMPTY).tmdb_id,
            Some(10)
        );
    }

    #[test]
    fn merge_is_stable_when_reapplied() {
        let trakt = Show {
            title: Some("Trakt title".to_string()),
            ..Show::EMPTY
        };
        let tmdb = Show {
            tmdb_backdrop_path: Some("/b.jpg".to_string()),
            ..Show::EMPTY
        };
        let once = merge_show(&local(), &trakt, &tmdb);
        let twice = merge_show(&once, &trakt, &tmdb);
        assert_eq!(once, twice);
    }

    #[test]
    fn season_keeps_local_flags() {
        let local = Season {
            id: 3,
            show_id: 7,
            ignored: true,
            ..Season::EMPTY
        };
        let trakt = Season {
            id: 99,
            show_id: 99,
            trakt_id: Some(5),
            number: Some(1),
            ..Season::EMPTY
        };
        let merged = merge_season(&local, &trakt, &Season::EMPTY);

        assert_eq!(merged.id, 3);
        assert_eq!(merged.show_id, 7);
        assert!(merged.ignored);
        assert_eq!(merged.trakt_id, Some(5));
        assert_eq!(merged.number, Some(1));
    }

    #[test]
    fn episode_falls_back_to_tmdb_description() {
        let tmdb = Episode {
            title: Some("Pilot".to_string()),
            number: Some(1),
            tmdb_id: Some(77),
            ..Episode::EMPTY
        };
        let trakt = Episode {
            title: Some("The Pilot".to_string()),
            ..Episode::EMPTY
        };

        let tmdb_only = merge_episode(&Episode::for_season(3), &Episode::EMPTY, &tmdb);
        assert_eq!(tmdb_only.title.as_deref(), Some("Pilot"));
        assert_eq!(tmdb_only.number, Some(1));
        assert_eq!(tmdb_only.season_id, 3);

        let both = merge_episode(&Episode::for_season(3), &trakt, &tmdb);
        assert_eq!(both.title.as_deref(), Some("The Pilot"));
        assert_eq!(both.tmdb_id, Some(77));
    }
}
