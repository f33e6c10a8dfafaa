use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::extract::{collapse_whitespace, strip_html};
use super::raw::{
    AttrBag, AttrElement, DurationField, Enclosure, MediaGroup, MediaRef, RawFeedItem,
};

/// SEC-003: Maximum element nesting depth accepted in a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Errors produced while turning a feed document into raw items.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(String),
    /// Document ended with elements still open.
    #[error("Unexpected end of document")]
    Truncated,
    /// SEC-003: Nesting depth exceeds safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
    /// Well-formed XML whose root is not rss, rdf:RDF or feed.
    #[error("Not a feed document (root element: {0})")]
    NotAFeed(String),
}

/// Raw item slot that a custom element can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawField {
    Title,
    Link,
    Guid,
    PubDate,
    Summary,
    Content,
    ContentEncoded,
    ContentSnippet,
    MediaDescription,
    YtVideoId,
    YtChannelId,
    EnclosureUrl,
}

/// Element name (as written in the document, prefix included) → raw slot.
pub type FieldMappings = HashMap<String, RawField>;

// ============================================================================
// Minimal element tree
// ============================================================================

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: AttrBag,
    text: String,
    children: Vec<Element>,
    /// Inner markup of `type="xhtml"` elements, verbatim from the document.
    markup: Option<String>,
    xhtml_start: Option<usize>,
}

impl Element {
    fn new(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Self {
        let mut attrs = AttrBag::new();
        for attr_result in start.attributes() {
            let attr = match attr_result {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed feed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.insert(key, value);
        }
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attrs,
            ..Self::default()
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    /// Inline XHTML markup, else own text, else the joined text of descendants.
    fn text_content(&self) -> Option<String> {
        if let Some(markup) = &self.markup {
            return Some(markup.clone());
        }
        let own = self.text.trim();
        if !own.is_empty() {
            return Some(own.to_string());
        }
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        let joined = parts.join(" ");
        if joined.trim().is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        for child in &self.children {
            let text = child.text.trim();
            if !text.is_empty() {
                parts.push(text);
            }
            child.collect_text(parts);
        }
    }

    /// Like `text_content`, with inline XHTML reduced to its text.
    fn plain_text(&self) -> Option<String> {
        match &self.markup {
            Some(markup) => Some(collapse_whitespace(&strip_html(markup))).filter(|t| !t.is_empty()),
            None => self.text_content(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn read_tree(bytes: &[u8]) -> Result<Element, ParseError> {
    // SEC-002: quick-xml (0.37) never expands DTD entity declarations; unknown
    // entities fail to unescape and are kept verbatim below.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::default()];
    let mut buf = Vec::new();

    loop {
        let before = position(&reader);
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() > MAX_XML_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                let mut element = Element::new(&e, &reader);
                if element.attr("type") == Some("xhtml") {
                    element.xhtml_start = Some(position(&reader));
                }
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = Element::new(&e, &reader);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::End(_)) => {
                // check_end_names (on by default) guarantees a matching Start
                if stack.len() > 1 {
                    if let Some(mut done) = stack.pop() {
                        // `before` is where this end tag starts
                        if let Some(start) = done.xhtml_start {
                            done.markup = bytes
                                .get(start..before)
                                .map(|inner| String::from_utf8_lossy(inner).trim().to_string())
                                .filter(|markup| !markup.is_empty());
                        }
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(done);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                if let Some(current) = stack.last_mut() {
                    current.push_text(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                if let Some(current) = stack.last_mut() {
                    current.push_text(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(ParseError::Truncated);
    }
    stack.pop().ok_or(ParseError::Truncated)
}

fn is_feed_root(name: &str) -> bool {
    matches!(name, "rss" | "feed" | "rdf:RDF" | "RDF") || name.ends_with(":RDF")
}

fn collect_items<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in &element.children {
        if child.name == "item" || child.name == "entry" {
            out.push(child);
        } else {
            collect_items(child, out);
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parses an RSS 2.0, RSS 1.0, Atom or YouTube feed document into raw items,
/// in document order.
pub fn parse_feed(bytes: &[u8], mappings: &FieldMappings) -> Result<Vec<RawFeedItem>, ParseError> {
    let tree = read_tree(bytes)?;
    let root = tree
        .children
        .first()
        .ok_or_else(|| ParseError::NotAFeed("<none>".to_string()))?;
    if !is_feed_root(&root.name) {
        return Err(ParseError::NotAFeed(root.name.clone()));
    }

    let mut items = Vec::new();
    collect_items(root, &mut items);
    Ok(items
        .into_iter()
        .map(|element| raw_item(element, mappings))
        .collect())
}

/// Date-time layouts with an explicit offset (`+02:00`, `+0200`, `+02`).
const ZONED_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Date-time layouts without an offset; read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a feed date written as RFC 3339, RFC 2822 or an ISO-like date/time.
///
/// ISO-like values may use `T` or a space between date and time, may carry
/// fractional seconds, and may end in `Z`, a numeric offset or nothing (UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix('z'))
        .unwrap_or(value);
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
    {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Renders a timestamp the way the rest of the pipeline stores them.
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Item mapping
// ============================================================================

#[derive(Default)]
struct Dates {
    pub_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    dc_date: Option<String>,
}

fn set_once(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn apply_mapping(item: &mut RawFeedItem, field: RawField, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match field {
        RawField::Title => item.title = Some(value),
        RawField::Link => item.link = Some(value),
        RawField::Guid => item.guid = Some(value),
        RawField::PubDate => item.pub_date = Some(value),
        RawField::Summary => item.summary = Some(value),
        RawField::Content => item.content = Some(value),
        RawField::ContentEncoded => item.content_encoded = Some(value),
        RawField::ContentSnippet => item.content_snippet = Some(value),
        RawField::MediaDescription => item.media_description = Some(value),
        RawField::YtVideoId => item.yt_video_id = Some(value),
        RawField::YtChannelId => item.yt_channel_id = Some(value),
        RawField::EnclosureUrl => {
            item.enclosure = Some(Enclosure { url: Some(value) })
        }
    }
}

fn media_group(element: &Element) -> MediaGroup {
    let mut group = MediaGroup::default();
    for child in &element.children {
        match child.name.as_str() {
            "media:thumbnail" => group.thumbnails.push(MediaRef::from_attrs(child.attrs.clone())),
            "yt:videoId" => group.video_ids.extend(child.text_content()),
            "yt:channelId" => group.channel_ids.extend(child.text_content()),
            "yt:duration" => group.durations.push(AttrElement {
                attrs: Some(child.attrs.clone()),
            }),
            "media:description" => group.descriptions.extend(child.text_content()),
            _ => {}
        }
    }
    group
}

fn raw_item(element: &Element, mappings: &FieldMappings) -> RawFeedItem {
    let mut item = RawFeedItem::default();
    let mut dates = Dates::default();
    let mut alternate_link = None;
    let mut other_link = None;

    for child in &element.children {
        if let Some(field) = mappings.get(&child.name) {
            let value = match field {
                RawField::EnclosureUrl => child
                    .attr("url")
                    .or_else(|| child.attr("href"))
                    .map(str::to_string)
                    .or_else(|| child.text_content()),
                _ => child.text_content(),
            };
            apply_mapping(&mut item, *field, value);
            continue;
        }

        match child.name.as_str() {
            "title" => set_once(&mut item.title, child.plain_text()),
            "link" => {
                if let Some(text) = child.text_content() {
                    set_once(&mut alternate_link, Some(text));
                } else if let Some(href) = child.attr("href") {
                    match child.attr("rel") {
                        None | Some("alternate") => {
                            set_once(&mut alternate_link, Some(href.to_string()))
                        }
                        Some("enclosure") if item.enclosure.is_none() => {
                            item.enclosure = Some(Enclosure {
                                url: Some(href.to_string()),
                            })
                        }
                        Some(_) => set_once(&mut other_link, Some(href.to_string())),
                    }
                }
            }
            "guid" | "id" => set_once(&mut item.guid, child.text_content()),
            "pubDate" => set_once(&mut dates.pub_date, child.text_content()),
            "published" => set_once(&mut dates.published, child.text_content()),
            "updated" => set_once(&mut dates.updated, child.text_content()),
            "dc:date" => set_once(&mut dates.dc_date, child.text_content()),
            "description" | "content" => set_once(&mut item.content, child.text_content()),
            "content:encoded" => set_once(&mut item.content_encoded, child.text_content()),
            "summary" => set_once(&mut item.summary, child.plain_text()),
            "enclosure" => {
                if item.enclosure.is_none() {
                    item.enclosure = Some(Enclosure {
                        url: child.attr("url").map(str::to_string),
                    });
                }
            }
            "media:content" => item
                .media_content
                .push(MediaRef::from_attrs(child.attrs.clone())),
            "media:thumbnail" => item
                .media_thumbnails
                .push(MediaRef::from_attrs(child.attrs.clone())),
            "media:description" => set_once(&mut item.media_description, child.plain_text()),
            "media:group" => {
                let group = media_group(child);
                if !group.is_empty() {
                    item.media_group = Some(group);
                }
            }
            "yt:videoId" => set_once(&mut item.yt_video_id, child.text_content()),
            "yt:channelId" => set_once(&mut item.yt_channel_id, child.text_content()),
            "yt:duration" => {
                if item.yt_duration.is_none() {
                    item.yt_duration = if child.attrs.is_empty() {
                        child.text_content().map(DurationField::Text)
                    } else {
                        Some(DurationField::Element(AttrElement {
                            attrs: Some(child.attrs.clone()),
                        }))
                    };
                }
            }
            _ => {}
        }
    }

    set_once(&mut item.link, alternate_link.or(other_link));
    set_once(
        &mut item.pub_date,
        dates
            .pub_date
            .or(dates.published)
            .or(dates.updated)
            .or(dates.dc_date),
    );
    if item.iso_date.is_none() {
        item.iso_date = item
            .pub_date
            .as_deref()
            .and_then(parse_timestamp)
            .map(|dt| to_iso(&dt));
    }
    if item.content_snippet.is_none() {
        item.content_snippet = item
            .content
            .as_deref()
            .map(|c| collapse_whitespace(&strip_html(c)))
            .filter(|s| !s.is_empty());
    }
    item
}
