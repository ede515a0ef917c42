pub mod channel;
pub mod observer;
pub mod snapshot;
pub mod state;
pub mod tracker;

pub use channel::{ChannelObserver, WatchObserver};
pub use observer::UpgradeObserver;
pub use snapshot::{SnapshotFormatError, UpgradeMetadata, UpgradeSnapshot};
pub use state::{UnknownStateError, UpgradeState};
pub use tracker::UpgradeDetails;
