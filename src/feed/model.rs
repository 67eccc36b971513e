use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

/// RFC 822 date layout used for `pubDate` and `lastBuildDate`. UTC is written
/// with the RFC 822 abbreviation `UT`.
pub const RFC822_UT: &str = "%a, %d %b %Y %H:%M:%S UT";

/// MIME type advertised on every enclosure.
pub const ENCLOSURE_MIME: &str = "audio/mpeg3";

pub const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

pub fn format_rfc822(at: DateTime<Utc>) -> String {
    at.format(RFC822_UT).to_string()
}

// ============================================================================
// Episode input
// ============================================================================

/// What the audio pipeline hands over for one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeInput {
    pub audio_path: PathBuf,
    pub title: String,
    pub description: String,
    pub duration: EpisodeDuration,
}

// ============================================================================
// Duration
// ============================================================================

/// Episode running time, split the way `itunes:duration` wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpisodeDuration {
    pub hours: u64,
    pub minutes: u8,
    pub seconds: u8,
}

impl EpisodeDuration {
    /// Rounds to the nearest whole second before splitting, so 59.6s becomes
    /// `0:01:00` rather than `0:00:60`. Negative and NaN inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        let total = if secs.is_finite() && secs > 0.0 {
            secs.round() as u64
        } else {
            0
        };
        Self::from_secs(total)
    }

    pub fn from_secs(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: ((total % 3600) / 60) as u8,
            seconds: (total % 60) as u8,
        }
    }

    pub fn as_secs(&self) -> u64 {
        self.hours * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }
}

impl fmt::Display for EpisodeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration '{0}': expected H:MM:SS, M:SS or seconds")]
pub struct DurationParseError(String);

impl FromStr for EpisodeDuration {
    type Err = DurationParseError;

    /// Accepts `H:MM:SS`, `M:SS`, or a plain (possibly fractional) number of
    /// seconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DurationParseError(s.to_string());
        let trimmed = s.trim();

        if !trimmed.contains(':') {
            let secs: f64 = trimmed.parse().map_err(|_| invalid())?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(invalid());
            }
            return Ok(Self::from_secs_f64(secs));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m, s] => (*h, *m, *s),
            [m, s] => ("0", *m, *s),
            _ => return Err(invalid()),
        };

        let hours: u64 = hours.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
        if seconds >= 60 || (parts.len() == 3 && minutes >= 60) {
            return Err(invalid());
        }

        Ok(Self::from_secs(hours * 3600 + minutes * 60 + seconds))
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Channel-level metadata. Every field is optional: a value missing from
/// configuration simply leaves its element out of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedChannel {
    pub title: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub explicit: Option<String>,
    pub keywords: Option<String>,
    pub managing_editor: Option<String>,
    pub copyright: Option<String>,
    pub self_link: Option<String>,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub image: Option<String>,
    pub generator: Option<String>,
    pub category: Option<String>,
    pub last_build_date: Option<String>,
}

// ============================================================================
// Copyright
// ============================================================================

/// First and latest year covered by the copyright notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyrightYears {
    pub first: i32,
    pub current: i32,
}

impl CopyrightYears {
    /// A first year at or after the current year collapses to a single year.
    pub fn derive(earliest: Option<i32>, current: i32) -> Self {
        let first = earliest.filter(|&y| y < current).unwrap_or(current);
        Self { first, current }
    }

    pub fn notice(&self, author: Option<&str>) -> String {
        let years = if self.first == self.current {
            self.current.to_string()
        } else {
            format!("{}\u{2014}{}", self.first, self.current)
        };
        match author {
            Some(author) => format!("\u{a9} {years} {author}. All rights reserved."),
            None => format!("\u{a9} {years}. All rights reserved."),
        }
    }
}

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub length: u64,
    pub mime_type: String,
}

/// A freshly published episode.
///
/// A `FeedItem` is turned into an [`ItemNode`] exactly once, when it enters
/// a document. From then on it is historical text and is never rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub author: Option<String>,
    pub explicit: Option<String>,
    pub image: Option<String>,
    pub title: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub duration: EpisodeDuration,
    pub guid: String,
    pub enclosure: Enclosure,
}

impl FeedItem {
    pub fn into_node(self) -> ItemNode {
        let mut events = vec![Event::Start(BytesStart::new("item"))];

        push_optional(&mut events, "itunes:author", self.author.as_deref());
        push_optional(&mut events, "itunes:explicit", self.explicit.as_deref());
        if let Some(image) = self.image.as_deref() {
            let mut tag = BytesStart::new("itunes:image");
            tag.push_attribute(("href", image));
            events.push(Event::Empty(tag));
        }
        push_text(&mut events, "title", &self.title);
        push_text(&mut events, "description", &self.description);
        push_text(&mut events, "itunes:summary", &self.description);
        push_text(&mut events, "pubDate", &format_rfc822(self.pub_date));
        push_text(&mut events, "itunes:duration", &self.duration.to_string());
        push_text(&mut events, "guid", &self.guid);

        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("url", self.enclosure.url.as_str()));
        enclosure.push_attribute(("length", self.enclosure.length.to_string().as_str()));
        enclosure.push_attribute(("type", self.enclosure.mime_type.as_str()));
        events.push(Event::Empty(enclosure));

        events.push(Event::End(BytesEnd::new("item")));
        ItemNode { events }
    }
}

fn push_text(events: &mut Vec<Event<'static>>, name: &'static str, value: &str) {
    events.push(Event::Start(BytesStart::new(name)));
    events.push(Event::Text(BytesText::new(value).into_owned()));
    events.push(Event::End(BytesEnd::new(name)));
}

fn push_optional(events: &mut Vec<Event<'static>>, name: &'static str, value: Option<&str>) {
    if let Some(value) = value {
        push_text(events, name, value);
    }
}

/// One `<item>` subtree, kept as the exact event sequence it was read (or
/// first built) with. Text stays in its escaped on-disk form, so replaying
/// the events reproduces the item without re-validating it.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemNode {
    events: Vec<Event<'static>>,
}

impl ItemNode {
    pub(crate) fn from_events(events: Vec<Event<'static>>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[Event<'static>] {
        &self.events
    }

    /// Unescaped text of the first direct child element called `name`.
    pub fn child_text(&self, name: &str) -> Option<String> {
        let mut depth = 0usize;
        let mut inside = false;
        let mut text = String::new();

        for event in &self.events {
            match event {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 && e.name().as_ref() == name.as_bytes() {
                        inside = true;
                    }
                }
                Event::End(_) => {
                    if inside && depth == 2 {
                        return Some(text);
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Text(t) if inside => match t.unescape() {
                    Ok(s) => text.push_str(&s),
                    Err(_) => text.push_str(&String::from_utf8_lossy(t)),
                },
                Event::CData(c) if inside => text.push_str(&String::from_utf8_lossy(c)),
                _ => {}
            }
        }
        None
    }

    pub fn guid(&self) -> Option<String> {
        self.child_text("guid")
    }

    pub fn title(&self) -> Option<String> {
        self.child_text("title")
    }
}

// ============================================================================
// Document
// ============================================================================

/// Channel metadata plus items, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    pub channel: FeedChannel,
    pub items: Vec<ItemNode>,
    /// Extra `xmlns:*` declarations for the root, as (attribute, URI) pairs
    /// such as `("xmlns:content", "http://purl.org/rss/1.0/modules/content/")`.
    /// Carried-forward items may use these prefixes.
    pub namespaces: Vec<(String, String)>,
}
