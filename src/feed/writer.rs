use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::error::FeedError;
use super::model::{FeedChannel, FeedDocument, ATOM_NS, ITUNES_NS};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Renders a document as indented RSS 2.0.
///
/// Channel fields that are `None` produce no element at all. Items are
/// replayed from their stored events, so prior episodes come out exactly as
/// they went in. Both the `itunes` and `atom` namespaces are always declared
/// on the root, whether or not any item uses them, followed by any other
/// prefixes the document carries over from the previous feed.
///
/// The serializer is the only well-formedness check on the generated text;
/// a failure here means the in-memory document is wrong and is reported as
/// [`FeedError::Render`].
pub fn render(document: &FeedDocument) -> Result<String, FeedError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:itunes", ITUNES_NS));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    let mut declared = vec!["xmlns:itunes", "xmlns:atom"];
    for (attribute, uri) in &document.namespaces {
        if declared.contains(&attribute.as_str()) {
            continue;
        }
        declared.push(attribute.as_str());
        rss.push_attribute((attribute.as_str(), uri.as_str()));
    }
    emit(&mut writer, Event::Start(rss))?;
    emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

    write_channel(&mut writer, &document.channel)?;

    for item in &document.items {
        for event in item.events() {
            emit(&mut writer, event.clone())?;
        }
    }

    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    let mut bytes = writer.into_inner().into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| FeedError::Render(e.to_string()))
}

fn write_channel(writer: &mut XmlWriter, channel: &FeedChannel) -> Result<(), FeedError> {
    text_element(writer, "title", channel.title.as_deref())?;
    text_element(writer, "link", channel.link.as_deref())?;
    text_element(writer, "language", channel.language.as_deref())?;
    text_element(writer, "itunes:subtitle", channel.subtitle.as_deref())?;
    text_element(writer, "itunes:author", channel.author.as_deref())?;
    text_element(writer, "description", channel.description.as_deref())?;
    text_element(writer, "itunes:summary", channel.summary.as_deref())?;
    text_element(writer, "itunes:explicit", channel.explicit.as_deref())?;
    text_element(writer, "itunes:keywords", channel.keywords.as_deref())?;
    text_element(writer, "managingEditor", channel.managing_editor.as_deref())?;
    text_element(writer, "copyright", channel.copyright.as_deref())?;

    if let Some(href) = channel.self_link.as_deref() {
        let mut link = BytesStart::new("atom:link");
        link.push_attribute(("href", href));
        link.push_attribute(("rel", "self"));
        link.push_attribute(("type", "application/rss+xml"));
        emit(writer, Event::Empty(link))?;
    }

    if channel.owner_name.is_some() || channel.owner_email.is_some() {
        emit(writer, Event::Start(BytesStart::new("itunes:owner")))?;
        text_element(writer, "itunes:name", channel.owner_name.as_deref())?;
        text_element(writer, "itunes:email", channel.owner_email.as_deref())?;
        emit(writer, Event::End(BytesEnd::new("itunes:owner")))?;
    }

    attribute_element(writer, "itunes:image", "href", channel.image.as_deref())?;
    text_element(writer, "generator", channel.generator.as_deref())?;
    attribute_element(writer, "itunes:category", "text", channel.category.as_deref())?;
    text_element(writer, "lastBuildDate", channel.last_build_date.as_deref())?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, name: &str, value: Option<&str>) -> Result<(), FeedError> {
    let Some(value) = value else {
        return Ok(());
    };
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn attribute_element(
    writer: &mut XmlWriter,
    name: &str,
    attribute: &str,
    value: Option<&str>,
) -> Result<(), FeedError> {
    let Some(value) = value else {
        return Ok(());
    };
    let mut tag = BytesStart::new(name);
    tag.push_attribute((attribute, value));
    emit(writer, Event::Empty(tag))
}

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), FeedError> {
    writer
        .write_event(event)
        .map_err(|e| FeedError::Render(e.to_string()))
}
