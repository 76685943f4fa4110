/// TMDb client and its data-source implementations. Contributes artwork, logos and TMDb ids.
pub mod tm_api;
pub mod tm_sources;

pub use tm_api::TmdbApi;
