//! Raw feed items as produced by the document parser.
//!
//! The shape follows the common xml-to-object convention used by feed
//! parsers: element attributes live in a `$` bag, repeated extension elements
//! become lists. Media entries may carry their URL either directly or inside
//! the attribute bag, so both are modelled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// XML attributes of an extension element.
pub type AttrBag = BTreeMap<String, String>;

/// `<enclosure url="...">`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A `media:content` or `media:thumbnail` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "$", skip_serializing_if = "Option::is_none")]
    pub attrs: Option<AttrBag>,
}

impl MediaRef {
    pub fn from_attrs(attrs: AttrBag) -> Self {
        Self {
            url: None,
            attrs: Some(attrs),
        }
    }

    /// The entry's URL, read directly or from the attribute bag.
    pub fn url(&self) -> Option<&str> {
        non_empty(self.url.as_deref())
            .or_else(|| non_empty(self.attrs.as_ref()?.get("url").map(String::as_str)))
    }
}

/// An element whose only interesting content is its attribute bag
/// (`<yt:duration seconds="..."/>` inside a media group).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrElement {
    #[serde(default, rename = "$", skip_serializing_if = "Option::is_none")]
    pub attrs: Option<AttrBag>,
}

impl AttrElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.as_ref()?.get(name).map(String::as_str)
    }
}

/// `yt:duration` as it appears at item level: either bare text or an
/// element carrying a `seconds` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationField {
    Text(String),
    Element(AttrElement),
}

/// Children of a `media:group` element, keyed by their qualified XML names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaGroup {
    #[serde(default, rename = "media:thumbnail", skip_serializing_if = "Vec::is_empty")]
    pub thumbnails: Vec<MediaRef>,
    #[serde(default, rename = "yt:videoId", skip_serializing_if = "Vec::is_empty")]
    pub video_ids: Vec<String>,
    #[serde(default, rename = "yt:channelId", skip_serializing_if = "Vec::is_empty")]
    pub channel_ids: Vec<String>,
    #[serde(default, rename = "yt:duration", skip_serializing_if = "Vec::is_empty")]
    pub durations: Vec<AttrElement>,
    #[serde(default, rename = "media:description", skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<String>,
}

impl MediaGroup {
    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
            && self.video_ids.is_empty()
            && self.channel_ids.is_empty()
            && self.durations.is_empty()
            && self.descriptions.is_empty()
    }
}

/// One item of a fetched feed, before normalization.
///
/// Every field is optional; which ones are populated depends on the feed
/// dialect (RSS 2.0, RSS 1.0, Atom, YouTube).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFeedItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoded: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_content: Vec<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_thumbnails: Vec<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_group: Option<MediaGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yt_video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yt_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yt_duration: Option<DurationField>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
