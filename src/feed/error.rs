use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::util::TextError;

/// What happened to the live feed after a failed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// The pre-write copy was put back in place.
    Restored { backup: PathBuf },
    /// There was no feed before this run, so nothing could be restored. The
    /// partially written file has been removed.
    NoBackup,
}

impl std::fmt::Display for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recovery::Restored { backup } => {
                write!(f, "restored from backup '{}'", backup.display())
            }
            Recovery::NoBackup => {
                write!(f, "no backup existed, the feed may be in its pre-episode state")
            }
        }
    }
}

/// Errors raised while publishing an episode into the feed.
///
/// Everything here is fatal for the run. Missing channel metadata is not an
/// error; it is logged and the element is left out.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Episode text rejected: {0}")]
    UnsafeText(#[from] TextError),

    #[error("Audio file '{path}' cannot be read: {source}")]
    AudioFileMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read feed '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The existing feed is not well-formed. Merging into it could silently
    /// drop episodes, so nothing is written.
    #[error("Unable to parse feed '{path}': {message}")]
    FeedParse { path: PathBuf, message: String },

    #[error("Failed to back up feed into '{dir}': {source}")]
    BackupCreate {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The serializer rejected the in-memory document. This is a bug, not an
    /// environmental failure.
    #[error("Failed to render feed: {0}")]
    Render(String),

    #[error("Failed to write feed '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The new feed could not be written; `source` is the original failure.
    #[error("Feed write to '{path}' failed ({recovery})")]
    WriteFailed {
        path: PathBuf,
        recovery: Recovery,
        #[source]
        source: Box<FeedError>,
    },

    /// The write failed and putting the backup back failed too. The live
    /// feed must be recovered by hand from `backup`.
    #[error(
        "Feed write to '{path}' failed ({cause}) and restoring backup '{backup}' also failed: {source}"
    )]
    RestoreFailed {
        path: PathBuf,
        backup: PathBuf,
        cause: Box<FeedError>,
        #[source]
        source: std::io::Error,
    },
}

impl FeedError {
    /// The failure that started it all, looking through the recovery wrappers.
    pub fn root_cause(&self) -> &FeedError {
        match self {
            FeedError::WriteFailed { source, .. } => source.root_cause(),
            FeedError::RestoreFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
