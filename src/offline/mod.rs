//! Offline support: recent-content cache, queued writes and connectivity.

mod connectivity;
mod store;
mod sync;
mod types;

pub use connectivity::{Connectivity, ConnectivityProbe};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{store_namespace, OfflineSettings, OfflineSync};
pub use types::{QueueOutcome, ReplayReport};
