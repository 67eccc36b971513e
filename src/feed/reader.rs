use std::path::Path;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use super::error::FeedError;
use super::model::{FeedChannel, ItemNode};

/// A standalone four-digit token, e.g. the year in `Tue, 05 Mar 2024 ...`.
static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d{4})(?:\s|$)").expect("valid year regex"));

/// State recovered from an existing feed file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub channel: FeedChannel,
    /// `channel/item` subtrees in document order.
    pub items: Vec<ItemNode>,
    /// Smallest year found in any `channel/item/pubDate`.
    pub earliest_year: Option<i32>,
    /// `xmlns:*` declarations found on the root and `channel`, first one
    /// per prefix wins.
    pub namespaces: Vec<(String, String)>,
}

/// Loads the feed at `path`.
///
/// A path that does not exist is the valid "first episode" state and yields
/// an empty snapshot. Anything that exists but does not parse is fatal.
pub fn load(path: &Path) -> Result<FeedSnapshot, FeedError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No existing feed, starting fresh");
            return Ok(FeedSnapshot::default());
        }
        Err(source) => {
            return Err(FeedError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let parse_error = |message| FeedError::FeedParse {
        path: path.to_path_buf(),
        message,
    };
    let raw = String::from_utf8(bytes)
        .map_err(|e| parse_error(format!("feed is not UTF-8: {e}")))?;
    let snapshot = parse_str(&raw).map_err(parse_error)?;

    tracing::debug!(
        path = %path.display(),
        items = snapshot.items.len(),
        earliest_year = ?snapshot.earliest_year,
        "Loaded existing feed"
    );
    Ok(snapshot)
}

/// Trims every line so re-indentation on write does not stack up. Lines are
/// re-joined with `\n` rather than glued together, which keeps words in
/// multi-line text apart.
fn strip_lines(raw: &str) -> String {
    raw.lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

/// Parses feed text into a snapshot. Errors are returned as a message; the
/// caller attaches the path.
pub fn parse_str(raw: &str) -> Result<FeedSnapshot, String> {
    let content = strip_lines(raw);

    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, so a
    // hostile DOCTYPE in an existing feed cannot pull in external content.
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    let mut snapshot = FeedSnapshot::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut capture: Option<Vec<Event<'static>>> = None;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{e} at byte {}", reader.buffer_position()))?;

        match event {
            Event::Start(e) => {
                if path.is_empty() {
                    if seen_root {
                        return Err("multiple root elements".to_string());
                    }
                    seen_root = true;
                    if e.name().as_ref() != b"rss" {
                        tracing::warn!(
                            root = %String::from_utf8_lossy(e.name().as_ref()),
                            "Feed root is not <rss>"
                        );
                    }
                }
                if path.is_empty() || (path.len() == 1 && e.name().as_ref() == b"channel") {
                    collect_namespaces(&mut snapshot.namespaces, &e)?;
                }

                let name = e.name().as_ref().to_vec();
                if let Some(events) = capture.as_mut() {
                    events.push(Event::Start(e.into_owned()));
                } else if in_channel(&path) && name == b"item" {
                    capture = Some(vec![Event::Start(e.into_owned())]);
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                if path.is_empty() {
                    if seen_root {
                        return Err("multiple root elements".to_string());
                    }
                    seen_root = true;
                }

                if let Some(events) = capture.as_mut() {
                    events.push(Event::Empty(e.into_owned()));
                } else if in_channel(&path) {
                    if e.name().as_ref() == b"item" {
                        snapshot
                            .items
                            .push(ItemNode::from_events(vec![Event::Empty(e.into_owned())]));
                    } else {
                        read_channel_attributes(&mut snapshot.channel, &e, &reader)?;
                    }
                }
            }
            Event::Text(e) => {
                // Undeclared entities (&nbsp; and friends) are kept literally
                match e.unescape() {
                    Ok(unescaped) => text.push_str(&unescaped),
                    Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
                }
                if let Some(events) = capture.as_mut() {
                    events.push(Event::Text(e.into_owned()));
                }
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e));
                if let Some(events) = capture.as_mut() {
                    events.push(Event::CData(e.into_owned()));
                }
            }
            Event::Comment(e) => {
                if let Some(events) = capture.as_mut() {
                    events.push(Event::Comment(e.into_owned()));
                }
            }
            Event::End(e) => {
                if let Some(events) = capture.as_mut() {
                    events.push(Event::End(e.into_owned()));
                }

                let depth = path.len();
                if depth == 3 && in_channel(&path[..2]) && path[2] == b"item" {
                    if let Some(events) = capture.take() {
                        snapshot.items.push(ItemNode::from_events(events));
                    }
                } else if depth == 4 && in_channel(&path[..2]) && path[2] == b"item" {
                    if path[3] == b"pubDate" {
                        note_pub_date(&mut snapshot.earliest_year, &text);
                    }
                } else if depth >= 3 && in_channel(&path[..2]) {
                    read_channel_text(&mut snapshot.channel, &path[2..], &text);
                }

                path.pop();
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err("document has no root element".to_string());
    }
    if !path.is_empty() {
        return Err(format!(
            "unexpected end of document inside <{}>",
            String::from_utf8_lossy(&path[path.len() - 1])
        ));
    }

    Ok(snapshot)
}

/// True when `path` is `<root>/channel`, the parent of channel fields and
/// items.
fn in_channel(path: &[Vec<u8>]) -> bool {
    path.len() == 2 && path[1] == b"channel"
}

fn note_pub_date(earliest: &mut Option<i32>, pub_date: &str) {
    let year = YEAR_TOKEN
        .captures(pub_date)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok());

    match year {
        Some(year) => {
            *earliest = Some(earliest.map_or(year, |current| current.min(year)));
        }
        None => {
            tracing::warn!(pub_date = %pub_date, "pubDate has no year, ignoring for copyright");
        }
    }
}

/// `rel` path is relative to `channel`, e.g. `[b"title"]` or
/// `[b"itunes:owner", b"itunes:name"]`.
fn read_channel_text(channel: &mut FeedChannel, rel: &[Vec<u8>], text: &str) {
    let slot = match rel {
        [name] => match name.as_slice() {
            b"title" => &mut channel.title,
            b"link" => &mut channel.link,
            b"language" => &mut channel.language,
            b"itunes:subtitle" => &mut channel.subtitle,
            b"itunes:author" => &mut channel.author,
            b"description" => &mut channel.description,
            b"itunes:summary" => &mut channel.summary,
            b"itunes:explicit" => &mut channel.explicit,
            b"itunes:keywords" => &mut channel.keywords,
            b"managingEditor" => &mut channel.managing_editor,
            b"copyright" => &mut channel.copyright,
            b"generator" => &mut channel.generator,
            b"lastBuildDate" => &mut channel.last_build_date,
            _ => return,
        },
        [parent, name] if parent.as_slice() == b"itunes:owner" => match name.as_slice() {
            b"itunes:name" => &mut channel.owner_name,
            b"itunes:email" => &mut channel.owner_email,
            _ => return,
        },
        _ => return,
    };

    if !text.is_empty() {
        *slot = Some(text.to_string());
    }
}

fn collect_namespaces(
    namespaces: &mut Vec<(String, String)>,
    e: &BytesStart<'_>,
) -> Result<(), String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        if !attr.key.as_ref().starts_with(b"xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if namespaces.iter().any(|(declared, _)| *declared == key) {
            continue;
        }
        let uri = attr.unescape_value().map_err(|err| err.to_string())?;
        namespaces.push((key, uri.into_owned()));
    }
    Ok(())
}

fn read_channel_attributes(
    channel: &mut FeedChannel,
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<(), String> {
    let attribute = |key: &str| -> Result<Option<String>, String> {
        match e.try_get_attribute(key).map_err(|err| err.to_string())? {
            Some(attr) => attr
                .decode_and_unescape_value(reader.decoder())
                .map(|v| Some(v.into_owned()))
                .map_err(|err| err.to_string()),
            None => Ok(None),
        }
    };

    match e.name().as_ref() {
        b"atom:link" => {
            if attribute("rel")?.as_deref() == Some("self") {
                channel.self_link = attribute("href")?;
            }
        }
        b"itunes:image" => channel.image = attribute("href")?,
        b"itunes:category" => channel.category = attribute("text")?,
        _ => {}
    }
    Ok(())
}
