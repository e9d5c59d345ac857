pub mod api;
pub mod catalog;
pub mod channel;
pub mod progress;

pub use api::*;
pub use catalog::{Catalog, CatalogStats};
pub use channel::{parse_timestamp, Channel, ChannelStatus, UNGROUPED};
pub use progress::{report, ProgressEvent, ProgressSender};
