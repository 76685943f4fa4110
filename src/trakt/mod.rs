/// Encapsulate the different functionality we require for our app to interface with trakt:
/// - api mod for talking to the API
/// - sources mod for exposing it to the repositories
pub mod t_api;
pub mod t_sources;

pub use t_api::TraktApi;
