use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};
use tracing::Span;

use super::backup::BackupManager;
use super::error::FeedError;
use super::model::{
    format_rfc822, CopyrightYears, Enclosure, EpisodeInput, FeedChannel, FeedDocument, FeedItem,
    ENCLOSURE_MIME,
};
use super::{reader, writer};
use crate::config::{keys, FeedSettings};
use crate::util::{check_episode_text, has_extension, public_link};

/// Image formats podcast directories accept for artwork.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Outcome of a successful [`FeedEngine::add_episode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub feed_path: PathBuf,
    /// Copy of the previous feed, if there was one.
    pub backup: Option<PathBuf>,
    pub guid: String,
    /// Items in the feed after publishing, including the new one.
    pub item_count: usize,
}

/// Adds episodes to the feed file named in the settings.
///
/// One call is one complete run: read the existing feed, put the new item in
/// front of the old ones, rebuild the channel from configuration and write
/// the result under a [`BackupManager`]. Only a single writer per feed file
/// is supported.
#[derive(Debug, Clone)]
pub struct FeedEngine {
    settings: FeedSettings,
    backups: BackupManager,
    span: Span,
}

impl FeedEngine {
    /// `span` is the caller's logging handle; all engine and backup events
    /// are recorded under it.
    pub fn new(settings: FeedSettings, span: Span) -> Self {
        let backups = BackupManager::new(settings.backup_dir.clone(), span.clone());
        Self {
            settings,
            backups,
            span,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn add_episode(&self, input: &EpisodeInput) -> Result<Publication, FeedError> {
        self.add_episode_at(input, Utc::now())
    }

    /// Same as [`add_episode`](Self::add_episode) with an explicit clock.
    /// `now` becomes the item's `pubDate`, the channel's `lastBuildDate`, the
    /// backup timestamp and the end of the copyright range.
    pub fn add_episode_at(
        &self,
        input: &EpisodeInput,
        now: DateTime<Utc>,
    ) -> Result<Publication, FeedError> {
        check_episode_text(&input.title, &input.description)?;

        let length = std::fs::metadata(&input.audio_path)
            .map_err(|source| FeedError::AudioFileMissing {
                path: input.audio_path.clone(),
                source,
            })?
            .len();

        tracing::info!(parent: &self.span, title = %input.title, "Adding episode to the feed");

        let feed_path = &self.settings.feed_path;
        let prior = reader::load(feed_path)?;

        let item = self.build_item(input, length, now);
        let guid = item.guid.clone();

        let years = CopyrightYears::derive(prior.earliest_year, now.year());
        let channel = self.build_channel(years, now);

        let mut items = Vec::with_capacity(prior.items.len() + 1);
        items.push(item.into_node());
        items.extend(prior.items);
        let document = FeedDocument {
            channel,
            items,
            namespaces: prior.namespaces,
        };
        let item_count = document.items.len();

        let backup = self
            .backups
            .protected_write(feed_path, now, || writer::render(&document))?;

        tracing::info!(
            parent: &self.span,
            path = %feed_path.display(),
            guid = %guid,
            items = item_count,
            "Episode published"
        );

        Ok(Publication {
            feed_path: feed_path.clone(),
            backup,
            guid,
            item_count,
        })
    }

    fn build_item(&self, input: &EpisodeInput, length: u64, now: DateTime<Utc>) -> FeedItem {
        let link = match self.optional(keys::EPISODE_DIR) {
            Some(dir) => public_link(dir, &input.audio_path),
            None => input
                .audio_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        FeedItem {
            author: self.optional(keys::EPISODE_AUTHOR).map(str::to_string),
            explicit: self.optional(keys::EPISODE_EXPLICIT).map(str::to_string),
            image: self.image(keys::EPISODE_IMAGE),
            title: input.title.clone(),
            description: input.description.clone(),
            pub_date: now,
            duration: input.duration,
            guid: link.clone(),
            enclosure: Enclosure {
                url: link,
                length,
                mime_type: ENCLOSURE_MIME.to_string(),
            },
        }
    }

    fn build_channel(&self, years: CopyrightYears, now: DateTime<Utc>) -> FeedChannel {
        let text = |key| self.optional(key).map(str::to_string);

        let author = text(keys::RSS_AUTHOR);
        let managing_editor = text(keys::MANAGING_EDITOR);
        let description = text(keys::RSS_DESCRIPTION);

        let self_link = self.optional(keys::RSS_DIR).map(|dir| {
            let name = self
                .settings
                .feed_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            public_link(dir, name)
        });

        FeedChannel {
            title: text(keys::RSS_TITLE),
            link: text(keys::WEBSITE_LINK),
            language: text(keys::LANGUAGE),
            subtitle: text(keys::RSS_SUBTITLE),
            copyright: Some(years.notice(author.as_deref())),
            owner_name: author.clone(),
            author,
            summary: description.clone(),
            description,
            explicit: text(keys::ITUNES_EXPLICIT),
            keywords: text(keys::ITUNES_KEYWORDS),
            owner_email: managing_editor.clone(),
            managing_editor,
            self_link,
            image: self.image(keys::RSS_IMAGE),
            generator: Some(concat!("castfeed ", env!("CARGO_PKG_VERSION")).to_string()),
            category: text(keys::ITUNES_CATEGORY),
            last_build_date: Some(format_rfc822(now)),
        }
    }

    /// Best-effort config lookup: a missing or blank key is logged and the
    /// element it feeds is left out.
    fn optional(&self, key: &str) -> Option<&str> {
        let value = self.settings.store().get(key);
        if value.is_none() {
            tracing::warn!(parent: &self.span, key = %key, "Config key missing or empty, omitting element");
        }
        value
    }

    fn image(&self, key: &str) -> Option<String> {
        let url = self.optional(key)?;
        if has_extension(url, &IMAGE_EXTENSIONS) {
            Some(url.to_string())
        } else {
            tracing::error!(parent: &self.span, key = %key, url = %url, "Image must be a PNG or JPG, omitting");
            None
        }
    }
}
