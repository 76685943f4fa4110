use std::{env, fs::File, sync::Arc};

use chrono::Utc;
use eyre::{bail, Result, WrapErr};
use log::*;
use simplelog::WriteLogger;

use tivi_sync::auth::{AuthState, SessionProvider};
use tivi_sync::config::Config;
use tivi_sync::db::Database;
use tivi_sync::manager::SyncManager;
use tivi_sync::models::Show;
use tivi_sync::sources::DataSources;
use tivi_sync::tmdb::TmdbApi;
use tivi_sync::trakt::TraktApi;

const USAGE: &str = "usage: tivi-sync [sync | show ID | follow ID | follow-trakt TRAKT_ID | unfollow ID | watched EPISODE_ID]";

fn parse_id(arg: Option<&String>) -> Result<i64> {
    let Some(arg) = arg else {
        bail!(USAGE);
    };
    arg.parse().wrap_err_with(|| format!("'{}' is not an id", arg))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Config::from_env()?;

    // init logging
    WriteLogger::init(
        config.log_level,
        simplelog::Config::default(),
        File::create(&config.log_file)
            .wrap_err_with(|| format!("could not create log file {}", config.log_file))?,
    )?;

    let db = Database::connect(&config.database_url)?;
    let trakt = Arc::new(TraktApi::new(&config.trakt)?);
    let tmdb = Arc::new(TmdbApi::new(&config.tmdb)?);

    let initial = match config.trakt.access_token {
        Some(_) => AuthState::LoggedIn,
        None => AuthState::LoggedOut,
    };
    let session = Arc::new(SessionProvider::new(initial));
    let manager = SyncManager::new(
        db,
        DataSources::remote(trakt, tmdb),
        session,
        config.sync_settings(),
    );

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("sync");

    match command {
        "sync" => {
            let summary = manager.refresh_all().await?;
            println!(
                "{} shows refreshed, {} failures",
                summary.shows_refreshed, summary.failures
            );
        }
        "show" => {
            let show_id = parse_id(args.get(1))?;
            manager.refresh_show(show_id).await?;
            let show = manager.shows.get_show(show_id).await?;
            println!("{}", show.title.as_deref().unwrap_or("(untitled)"));
            for (season, episodes) in manager.episodes.seasons_with_episodes(show_id).await? {
                println!(
                    "  season {}: {} episodes{}",
                    season.number.unwrap_or_default(),
                    episodes.len(),
                    if season.ignored { " (ignored)" } else { "" }
                );
            }
            if let Some(next) = manager.episodes.next_episode_to_watch(show_id).await? {
                println!(
                    "  next up: episode {} {}",
                    next.number.unwrap_or_default(),
                    next.title.as_deref().unwrap_or_default()
                );
            }
        }
        "follow" => {
            let show_id = parse_id(args.get(1))?;
            manager.followed.add_followed_show(show_id).await?;
        }
        "follow-trakt" => {
            let trakt_id = parse_id(args.get(1))?;
            let placeholder = Show {
                trakt_id: Some(i32::try_from(trakt_id).wrap_err("trakt id out of range")?),
                ..Show::EMPTY
            };
            let show_id = manager.shows.get_id_or_save_placeholder(&placeholder).await?;
            manager.followed.add_followed_show(show_id).await?;
            manager.refresh_show(show_id).await?;
            println!("following show {}", show_id);
        }
        "unfollow" => {
            let show_id = parse_id(args.get(1))?;
            manager.followed.remove_followed_show(show_id).await?;
        }
        "watched" => {
            let episode_id = parse_id(args.get(1))?;
            manager.episodes.add_episode_watch(episode_id, Utc::now()).await?;
        }
        _ => bail!(USAGE),
    }

    info!("'{}' finished", command);
    Ok(())
}
