//! Feed persistence: reading, merging and rewriting the podcast RSS file.
//!
//! - [`model`] - Channel, item and document types
//! - [`reader`] - Loads an existing feed; prior items are kept as opaque subtrees
//! - [`writer`] - Renders a document as indented RSS 2.0
//! - [`backup`] - Backup-then-replace with restore on failure
//! - [`engine`] - [`FeedEngine::add_episode`], the entry point tying them together
//!
//! # Example
//!
//! ```ignore
//! use castfeed::config::{ConfigStore, FeedSettings};
//! use castfeed::feed::{EpisodeInput, FeedEngine};
//!
//! let settings = FeedSettings::from_store(ConfigStore::load(path)?)?;
//! let engine = FeedEngine::new(settings, tracing::info_span!("publish"));
//! let publication = engine.add_episode(&input)?;
//! ```

pub mod backup;
pub mod engine;
pub mod error;
pub mod model;
pub mod reader;
pub mod writer;

pub use backup::BackupManager;
pub use engine::{FeedEngine, Publication};
pub use error::{FeedError, Recovery};
pub use model::{
    CopyrightYears, DurationParseError, EpisodeDuration, EpisodeInput, FeedChannel, FeedDocument,
    FeedItem, ItemNode,
};
pub use reader::FeedSnapshot;
