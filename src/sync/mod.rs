/// Building blocks shared by every repository:
/// - merge: field precedence across local, Trakt and TMDb
/// - syncer: diff a local table against a remote listing
/// - locks: serialise passes that touch the same show
pub mod locks;
pub mod merge;
pub mod syncer;

pub use locks::{KeyedGuard, KeyedLocks};
pub use syncer::{syncer_for_entity, ItemSyncer, ItemSyncerResult};
