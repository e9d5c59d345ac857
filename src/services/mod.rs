//! Catalog services
//!
//! - Parsing M3U playlists into a catalog
//! - Probing channel availability with bounded concurrency
//! - Unifying duplicate channels and near-identical names
//! - Snapshot persistence and playlist export
//! - Playlist download and background job tracking

pub mod downloader;
pub mod jobs;
pub mod m3u_parser;
pub mod m3u_writer;
pub mod prober;
pub mod snapshot;
pub mod unifier;

// Re-export commonly used items
pub use downloader::{DownloadOptions, DownloadResult, Downloader};
pub use jobs::{JobHandle, JobKind, JobOutcome, JobPhase, JobStatus, JobTracker};
pub use m3u_parser::M3UParser;
pub use prober::{ProbeOptions, ProbeSummary, Prober};
pub use snapshot::SnapshotStore;
pub use unifier::{unify, UnifyReport};
