pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod manager;
pub mod models;
pub mod repos;
pub mod schema;
pub mod sources;
pub mod sync;
pub mod tmdb;
pub mod trakt;

#[cfg(test)]
mod test_utils;
