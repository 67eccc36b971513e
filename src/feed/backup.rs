use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::Span;

use super::error::{FeedError, Recovery};

/// Timestamp layout used in backup file names.
const BACKUP_STAMP: &str = "%Y%m%d-%H%M%S";

/// Snapshots the live feed before every overwrite and puts it back if the
/// overwrite fails.
///
/// Backups are plain copies named `<dir>/<stem>_<YYYYMMDD-HHMMSS>.xml` and
/// are never cleaned up; they double as an audit trail.
///
/// There is no locking here. Two runs against the same feed at once can
/// interleave snapshot and overwrite, so callers must ensure a single writer.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    span: Span,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            dir: dir.into(),
            span,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a backup of `feed` taken at `at` goes.
    pub fn backup_path(&self, feed: &Path, at: DateTime<Utc>) -> PathBuf {
        let stem = feed
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "feed".to_string());
        self.dir
            .join(format!("{}_{}.xml", stem, at.format(BACKUP_STAMP)))
    }

    /// Copies the current feed aside. Returns `None` when there is no feed
    /// yet, in which case there is nothing to protect.
    pub fn snapshot(&self, feed: &Path, at: DateTime<Utc>) -> Result<Option<PathBuf>, FeedError> {
        if !feed.is_file() {
            tracing::debug!(parent: &self.span, path = %feed.display(), "No existing feed, skipping backup");
            return Ok(None);
        }

        let backup_error = |source| FeedError::BackupCreate {
            dir: self.dir.clone(),
            source,
        };

        // create_dir_all succeeds if the directory already exists
        std::fs::create_dir_all(&self.dir).map_err(backup_error)?;

        let backup = self.copy_unique(feed, at).map_err(backup_error)?;

        tracing::info!(parent: &self.span, backup = %backup.display(), "Created feed backup");
        Ok(Some(backup))
    }

    /// Copies `feed` to the first free name for `at`. Runs within the same
    /// second get `-1`, `-2`, ... suffixes; an existing backup is never
    /// overwritten.
    fn copy_unique(&self, feed: &Path, at: DateTime<Utc>) -> std::io::Result<PathBuf> {
        let first = self.backup_path(feed, at);
        let mut target = first.clone();
        let mut attempt = 0u32;

        let mut file = loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
            {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    target = numbered(&first, attempt);
                }
                Err(e) => return Err(e),
            }
        };

        let copied = std::fs::File::open(feed).and_then(|mut source| {
            std::io::copy(&mut source, &mut file)?;
            file.sync_all()
        });
        if let Err(e) = copied {
            let _ = std::fs::remove_file(&target);
            return Err(e);
        }
        Ok(target)
    }

    /// Backs up `feed`, renders the new content and overwrites `feed` with it.
    ///
    /// If rendering or writing fails, the partial file is removed and the
    /// backup (if one was taken) is copied back. The original failure is
    /// always returned, wrapped in [`FeedError::WriteFailed`] with the
    /// recovery outcome, or in [`FeedError::RestoreFailed`] when the restore
    /// itself went wrong. A backup that cannot be created aborts before the
    /// feed is touched.
    pub fn protected_write<F>(
        &self,
        feed: &Path,
        at: DateTime<Utc>,
        render: F,
    ) -> Result<Option<PathBuf>, FeedError>
    where
        F: FnOnce() -> Result<String, FeedError>,
    {
        let backup = self.snapshot(feed, at)?;

        match render().and_then(|content| write_file(feed, &content)) {
            Ok(()) => {
                tracing::info!(parent: &self.span, path = %feed.display(), "Saved feed");
                Ok(backup)
            }
            Err(cause) => Err(self.recover(feed, backup, cause)),
        }
    }

    fn recover(&self, feed: &Path, backup: Option<PathBuf>, cause: FeedError) -> FeedError {
        if let Err(e) = std::fs::remove_file(feed) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(parent: &self.span, path = %feed.display(), error = %e, "Could not remove partially written feed");
            }
        }

        let Some(backup) = backup else {
            tracing::error!(parent: &self.span, path = %feed.display(), error = %cause, "Feed write failed, no backup to restore");
            return FeedError::WriteFailed {
                path: feed.to_path_buf(),
                recovery: Recovery::NoBackup,
                source: Box::new(cause),
            };
        };

        match std::fs::copy(&backup, feed) {
            Ok(_) => {
                tracing::error!(parent: &self.span, path = %feed.display(), backup = %backup.display(), error = %cause, "Feed write failed, backup restored");
                FeedError::WriteFailed {
                    path: feed.to_path_buf(),
                    recovery: Recovery::Restored { backup },
                    source: Box::new(cause),
                }
            }
            Err(source) => {
                tracing::error!(
                    parent: &self.span,
                    path = %feed.display(),
                    backup = %backup.display(),
                    error = %cause,
                    restore_error = %source,
                    "Feed write and backup restore both failed, recover the feed manually"
                );
                FeedError::RestoreFailed {
                    path: feed.to_path_buf(),
                    backup,
                    cause: Box::new(cause),
                    source,
                }
            }
        }
    }
}

/// `feed_20240101-000000.xml` with `n` becomes `feed_20240101-000000-n.xml`.
fn numbered(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}-{n}.xml"))
}

fn write_file(path: &Path, content: &str) -> Result<(), FeedError> {
    let write_error = |source| FeedError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = std::fs::File::create(path).map_err(write_error)?;
    file.write_all(content.as_bytes()).map_err(write_error)?;
    // Sync to disk so a reported success is durable
    file.sync_all().map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_backup_path_format() {
        let manager = BackupManager::new("/srv/backups", Span::none());
        assert_eq!(
            manager.backup_path(Path::new("/srv/rss/podcast.xml"), at()),
            PathBuf::from("/srv/backups/podcast_20240305-140709.xml")
        );
    }

    #[test]
    fn test_write_without_existing_feed_takes_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        let manager = BackupManager::new(&backups, Span::none());

        let taken = manager
            .protected_write(&feed, at(), || Ok("<rss/>".to_string()))
            .unwrap();

        assert_eq!(taken, None);
        assert_eq!(std::fs::read_to_string(&feed).unwrap(), "<rss/>");
        assert!(!backups.exists());
    }

    #[test]
    fn test_write_over_existing_feed_backs_up_first() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        std::fs::write(&feed, "old").unwrap();
        let manager = BackupManager::new(&backups, Span::none());

        let taken = manager
            .protected_write(&feed, at(), || Ok("new".to_string()))
            .unwrap()
            .expect("backup should be taken");

        assert_eq!(taken, backups.join("feed_20240305-140709.xml"));
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(&feed).unwrap(), "new");
    }

    #[test]
    fn test_same_second_backups_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        let manager = BackupManager::new(&backups, Span::none());

        let mut taken = Vec::new();
        for content in ["one", "two", "three"] {
            std::fs::write(&feed, content).unwrap();
            taken.push(manager.snapshot(&feed, at()).unwrap().unwrap());
        }

        assert_eq!(
            taken,
            vec![
                backups.join("feed_20240305-140709.xml"),
                backups.join("feed_20240305-140709-1.xml"),
                backups.join("feed_20240305-140709-2.xml"),
            ]
        );
        let contents: Vec<_> = taken
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_existing_backup_dir_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();
        std::fs::write(&feed, "old").unwrap();
        let manager = BackupManager::new(&backups, Span::none());

        assert!(manager.snapshot(&feed, at()).unwrap().is_some());
    }

    #[test]
    fn test_failed_render_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        std::fs::write(&feed, "original bytes").unwrap();
        let manager = BackupManager::new(&backups, Span::none());

        let err = manager
            .protected_write(&feed, at(), || Err(FeedError::Render("boom".into())))
            .unwrap_err();

        match &err {
            FeedError::WriteFailed {
                recovery: Recovery::Restored { backup },
                ..
            } => assert_eq!(backup, &backups.join("feed_20240305-140709.xml")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), FeedError::Render(m) if m == "boom"));
        assert_eq!(std::fs::read_to_string(&feed).unwrap(), "original bytes");
    }

    #[test]
    fn test_failed_write_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        std::fs::write(&feed, "original bytes").unwrap();
        let manager = BackupManager::new(&backups, Span::none());

        // Rendered content is written, then the "disk" fails afterwards.
        let err = manager
            .protected_write(&feed, at(), || {
                std::fs::write(&feed, "half a fe").unwrap();
                Err(FeedError::Write {
                    path: feed.clone(),
                    source: std::io::Error::other("no space left on device"),
                })
            })
            .unwrap_err();

        assert!(matches!(
            err,
            FeedError::WriteFailed {
                recovery: Recovery::Restored { .. },
                ..
            }
        ));
        assert!(err.to_string().contains("restored from backup"));
        assert_eq!(std::fs::read_to_string(&feed).unwrap(), "original bytes");
    }

    #[test]
    fn test_failed_write_without_backup_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        let manager = BackupManager::new(&backups, Span::none());

        let err = manager
            .protected_write(&feed, at(), || Err(FeedError::Render("boom".into())))
            .unwrap_err();

        assert!(matches!(
            err,
            FeedError::WriteFailed {
                recovery: Recovery::NoBackup,
                ..
            }
        ));
        assert!(err.to_string().contains("no backup existed"));
        assert!(!feed.exists());
        assert!(files_in(&backups).is_empty());
    }

    #[test]
    fn test_backup_dir_blocked_by_file_aborts_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        std::fs::write(&feed, "old").unwrap();
        std::fs::write(&backups, "not a directory").unwrap();
        let manager = BackupManager::new(&backups, Span::none());

        let mut rendered = false;
        let err = manager
            .protected_write(&feed, at(), || {
                rendered = true;
                Ok("new".to_string())
            })
            .unwrap_err();

        assert!(matches!(err, FeedError::BackupCreate { .. }));
        assert!(!rendered);
        assert_eq!(std::fs::read_to_string(&feed).unwrap(), "old");
    }

    #[test]
    fn test_restore_failure_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.xml");
        let backups = dir.path().join("backups");
        std::fs::write(&feed, "old").unwrap();
        let manager = BackupManager::new(&backups, Span::none());
        let expected_backup = manager.backup_path(&feed, at());

        // The backup vanishes between snapshot and restore.
        let err = manager
            .protected_write(&feed, at(), || {
                std::fs::remove_file(&expected_backup).unwrap();
                Err(FeedError::Render("boom".into()))
            })
            .unwrap_err();

        match &err {
            FeedError::RestoreFailed { backup, .. } => assert_eq!(backup, &expected_backup),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), FeedError::Render(_)));
    }
}
