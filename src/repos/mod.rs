/// Repositories: the operations the rest of the app calls. Each one owns the push-then-reconcile
/// flow for its slice of the store and the throttles that decide when a refresh is due.
pub mod episodes;
pub mod followed;
pub mod last_request;
pub mod shows;

pub use episodes::{SeasonsEpisodesRepository, SeasonsSource};
pub use followed::FollowedShowsRepository;
pub use last_request::{should_refresh, LastRequestStore};
pub use shows::ShowRepository;
