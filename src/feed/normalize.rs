//! Raw item → [`NormalizedArticle`] mapping.
//!
//! Two variants share the extraction helpers: plain articles, and YouTube
//! videos which additionally resolve a video id, channel id and duration.
//! Items without a usable title or link are rejected with `None`.

use regex::Regex;
use std::sync::OnceLock;

use super::extract::{build_snippet, extract_image_url, first_of, Candidate};
use super::raw::{DurationField, RawFeedItem};
use super::types::{Media, NormalizedArticle, Source, SourceKind};

const YT_GUID_PREFIX: &str = "yt:video:";
const YT_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Selects how items of one source are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer<'a> {
    Article,
    Video {
        fallback_channel_id: Option<&'a str>,
    },
}

impl<'a> Normalizer<'a> {
    pub fn for_source(source: &'a Source) -> Self {
        match source.kind {
            SourceKind::Article => Normalizer::Article,
            SourceKind::Video => Normalizer::Video {
                fallback_channel_id: source.channel_id.as_deref(),
            },
        }
    }

    /// Maps one raw item; `index` is its position within the source's feed.
    pub fn normalize(
        &self,
        item: &RawFeedItem,
        source_id: &str,
        index: usize,
    ) -> Option<NormalizedArticle> {
        match self {
            Normalizer::Article => normalise_item(item, source_id, index),
            Normalizer::Video {
                fallback_channel_id,
            } => normalise_youtube_item(item, source_id, index, *fallback_channel_id),
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn published_at(item: &RawFeedItem) -> Option<String> {
    trimmed(item.iso_date.as_deref()).or_else(|| trimmed(item.pub_date.as_deref()))
}

/// Normalizes an item from a plain RSS/Atom source.
pub fn normalise_item(
    item: &RawFeedItem,
    source_id: &str,
    index: usize,
) -> Option<NormalizedArticle> {
    let title = trimmed(item.title.as_deref());
    let link = trimmed(item.link.as_deref());
    let (Some(title), Some(link)) = (title, link) else {
        tracing::debug!(source = %source_id, index, "Dropping item without title or link");
        return None;
    };

    Some(NormalizedArticle {
        id: trimmed(item.guid.as_deref()).unwrap_or_else(|| format!("{source_id}-{index}")),
        title,
        snippet: build_snippet(item),
        link,
        image_url: extract_image_url(item),
        published_at: published_at(item),
        source_id: source_id.to_string(),
        media: Media::Article,
    })
}

/// Normalizes an item from a YouTube channel feed.
pub fn normalise_youtube_item(
    item: &RawFeedItem,
    source_id: &str,
    index: usize,
    fallback_channel_id: Option<&str>,
) -> Option<NormalizedArticle> {
    let video_id = youtube_video_id(item);
    let link = trimmed(item.link.as_deref())
        .or_else(|| video_id.as_ref().map(|id| format!("{YT_WATCH_URL}{id}")));
    let title = trimmed(item.title.as_deref());
    let (Some(title), Some(link)) = (title, link) else {
        tracing::debug!(source = %source_id, index, "Dropping video without title or link");
        return None;
    };

    let channel_id = youtube_channel_id(item).or_else(|| trimmed(fallback_channel_id));
    let id = video_id
        .clone()
        .or_else(|| trimmed(item.guid.as_deref()))
        .unwrap_or_else(|| format!("{source_id}-{index}"));

    Some(NormalizedArticle {
        id,
        title,
        snippet: build_snippet(item),
        link,
        image_url: youtube_image_url(item).or_else(|| extract_image_url(item)),
        published_at: published_at(item),
        source_id: source_id.to_string(),
        media: Media::Video {
            video_id,
            channel_id,
            duration_seconds: youtube_duration(item),
        },
    })
}

// ============================================================================
// YouTube field resolution
// ============================================================================

fn video_param_regex() -> &'static Regex {
    static V_PARAM: OnceLock<Regex> = OnceLock::new();
    V_PARAM.get_or_init(|| Regex::new(r"v=([^&]+)").expect("static regex"))
}

const VIDEO_ID_CANDIDATES: &[Candidate<String>] = &[
    |item: &RawFeedItem| trimmed(item.yt_video_id.as_deref()),
    |item: &RawFeedItem| trimmed(item.media_group.as_ref()?.video_ids.first().map(String::as_str)),
    |item: &RawFeedItem| {
        item.guid
            .as_deref()?
            .strip_prefix(YT_GUID_PREFIX)
            .and_then(|id| trimmed(Some(id)))
    },
    |item: &RawFeedItem| {
        video_param_regex()
            .captures(item.link.as_deref()?)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    },
];

/// Resolves the video id from the item's extension fields, guid or link.
pub fn youtube_video_id(item: &RawFeedItem) -> Option<String> {
    first_of(item, VIDEO_ID_CANDIDATES)
}

const CHANNEL_ID_CANDIDATES: &[Candidate<String>] = &[
    |item: &RawFeedItem| trimmed(item.yt_channel_id.as_deref()),
    |item: &RawFeedItem| {
        trimmed(item.media_group.as_ref()?.channel_ids.first().map(String::as_str))
    },
];

fn youtube_channel_id(item: &RawFeedItem) -> Option<String> {
    first_of(item, CHANNEL_ID_CANDIDATES)
}

const THUMBNAIL_CANDIDATES: &[Candidate<String>] = &[
    |item: &RawFeedItem| {
        item.media_thumbnails
            .iter()
            .find_map(|m| m.url())
            .map(str::to_string)
    },
    |item: &RawFeedItem| {
        item.media_group
            .as_ref()?
            .thumbnails
            .iter()
            .find_map(|m| m.url())
            .map(str::to_string)
    },
];

fn youtube_image_url(item: &RawFeedItem) -> Option<String> {
    first_of(item, THUMBNAIL_CANDIDATES)
}

/// Parses the leading decimal digits of `value`, ignoring leading whitespace.
///
/// `"212"` and `"212s"` give 212; `"abc"` and `""` give `None`.
pub fn parse_leading_int(value: &str) -> Option<u32> {
    let value = value.trim_start();
    let end = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

const DURATION_CANDIDATES: &[Candidate<u32>] = &[
    |item: &RawFeedItem| match item.yt_duration.as_ref()? {
        DurationField::Text(text) => parse_leading_int(text),
        DurationField::Element(_) => None,
    },
    |item: &RawFeedItem| match item.yt_duration.as_ref()? {
        DurationField::Element(element) => parse_leading_int(element.attr("seconds")?),
        DurationField::Text(_) => None,
    },
    |item: &RawFeedItem| {
        parse_leading_int(item.media_group.as_ref()?.durations.first()?.attr("seconds")?)
    },
];

fn youtube_duration(item: &RawFeedItem) -> Option<u32> {
    first_of(item, DURATION_CANDIDATES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::raw::{AttrBag, AttrElement, MediaGroup, MediaRef};
    use pretty_assertions::assert_eq;

    fn valid() -> RawFeedItem {
        RawFeedItem {
            title: Some("  A title ".into()),
            link: Some(" https://example.com/a ".into()),
            ..RawFeedItem::default()
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttrBag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let item = RawFeedItem {
            title: Some("  ".into()),
            link: Some("http://x".into()),
            ..RawFeedItem::default()
        };
        assert!(normalise_item(&item, "src", 0).is_none());
        assert!(normalise_youtube_item(&item, "src", 0, None).is_none());
    }

    #[test]
    fn test_blank_link_is_rejected() {
        let item = RawFeedItem {
            title: Some("Title".into()),
            link: Some("\t".into()),
            ..RawFeedItem::default()
        };
        assert!(normalise_item(&item, "src", 0).is_none());
    }

    #[test]
    fn test_article_fields_are_trimmed() {
        let article = normalise_item(&valid(), "blog", 3).unwrap();
        assert_eq!(article.title, "A title");
        assert_eq!(article.link, "https://example.com/a");
        assert_eq!(article.id, "blog-3");
        assert_eq!(article.snippet, "No summary available.");
        assert_eq!(article.media, Media::Article);
        assert!(article.published_at.is_none());
    }

    #[test]
    fn test_article_prefers_guid_and_iso_date() {
        let item = RawFeedItem {
            guid: Some("guid-1".into()),
            iso_date: Some("2024-01-02T10:30:00.000Z".into()),
            pub_date: Some("Tue, 02 Jan 2024 10:30:00 GMT".into()),
            ..valid()
        };
        let article = normalise_item(&item, "blog", 0).unwrap();
        assert_eq!(article.id, "guid-1");
        assert_eq!(article.published_at.as_deref(), Some("2024-01-02T10:30:00.000Z"));

        let pub_only = RawFeedItem {
            pub_date: Some("Tue, 02 Jan 2024 10:30:00 GMT".into()),
            ..valid()
        };
        let article = normalise_item(&pub_only, "blog", 0).unwrap();
        assert_eq!(
            article.published_at.as_deref(),
            Some("Tue, 02 Jan 2024 10:30:00 GMT")
        );
    }

    #[test]
    fn test_direct_video_id_beats_link() {
        let item = RawFeedItem {
            yt_video_id: Some("DIRECT".into()),
            link: Some("https://www.youtube.com/watch?v=XYZ".into()),
            ..valid()
        };
        assert_eq!(youtube_video_id(&item).as_deref(), Some("DIRECT"));
    }

    #[test]
    fn test_video_id_fallbacks() {
        let grouped = RawFeedItem {
            media_group: Some(MediaGroup {
                video_ids: vec![" GROUP ".into()],
                ..MediaGroup::default()
            }),
            guid: Some("yt:video:GUID".into()),
            ..valid()
        };
        assert_eq!(youtube_video_id(&grouped).as_deref(), Some("GROUP"));

        let guid = RawFeedItem {
            guid: Some("yt:video:GUID".into()),
            ..valid()
        };
        assert_eq!(youtube_video_id(&guid).as_deref(), Some("GUID"));

        let link = RawFeedItem {
            link: Some("https://www.youtube.com/watch?v=LINK&t=10".into()),
            ..valid()
        };
        assert_eq!(youtube_video_id(&link).as_deref(), Some("LINK"));

        assert_eq!(youtube_video_id(&valid()), None);
    }

    #[test]
    fn test_video_link_is_synthesized() {
        let item = RawFeedItem {
            title: Some("Video".into()),
            yt_video_id: Some("abc123".into()),
            ..RawFeedItem::default()
        };
        let video = normalise_youtube_item(&item, "yt", 0, None).unwrap();
        assert_eq!(video.link, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(video.id, "abc123");
    }

    #[test]
    fn test_video_without_id_or_link_is_rejected() {
        let item = RawFeedItem {
            title: Some("Video".into()),
            ..RawFeedItem::default()
        };
        assert!(normalise_youtube_item(&item, "yt", 0, None).is_none());
    }

    #[test]
    fn test_video_thumbnail_and_channel_resolution() {
        let item = RawFeedItem {
            yt_video_id: Some("abc".into()),
            media_thumbnails: vec![MediaRef::default()],
            media_group: Some(MediaGroup {
                thumbnails: vec![MediaRef::from_attrs(attrs(&[("url", "https://i.ytimg.com/g.jpg")]))],
                channel_ids: vec!["UCgroup".into()],
                ..MediaGroup::default()
            }),
            enclosure: Some(crate::feed::raw::Enclosure {
                url: Some("https://cdn.example/enclosure.jpg".into()),
            }),
            ..valid()
        };
        let video = normalise_youtube_item(&item, "yt", 0, Some("UCfallback")).unwrap();
        assert_eq!(video.image_url.as_deref(), Some("https://i.ytimg.com/g.jpg"));
        match video.media {
            Media::Video { channel_id, .. } => assert_eq!(channel_id.as_deref(), Some("UCgroup")),
            other => panic!("Expected video media, got {:?}", other),
        }
    }

    #[test]
    fn test_video_falls_back_to_generic_image_and_source_channel() {
        let item = RawFeedItem {
            yt_video_id: Some("abc".into()),
            content: Some(r#"<img src="https://cdn.example/inline.png">"#.into()),
            ..valid()
        };
        let video = normalise_youtube_item(&item, "yt", 0, Some("UCfallback")).unwrap();
        assert_eq!(video.image_url.as_deref(), Some("https://cdn.example/inline.png"));
        match video.media {
            Media::Video { channel_id, .. } => {
                assert_eq!(channel_id.as_deref(), Some("UCfallback"))
            }
            other => panic!("Expected video media, got {:?}", other),
        }
    }

    #[test]
    fn test_duration_sources() {
        let text = RawFeedItem {
            yt_duration: Some(DurationField::Text("95".into())),
            ..valid()
        };
        assert_eq!(youtube_duration(&text), Some(95));

        let element = RawFeedItem {
            yt_duration: Some(DurationField::Element(AttrElement {
                attrs: Some(attrs(&[("seconds", "120")])),
            })),
            ..valid()
        };
        assert_eq!(youtube_duration(&element), Some(120));

        let grouped = RawFeedItem {
            media_group: Some(MediaGroup {
                durations: vec![AttrElement {
                    attrs: Some(attrs(&[("seconds", "212")])),
                }],
                ..MediaGroup::default()
            }),
            ..valid()
        };
        assert_eq!(youtube_duration(&grouped), Some(212));
    }

    #[test]
    fn test_non_numeric_duration_is_absent() {
        let item = RawFeedItem {
            yt_duration: Some(DurationField::Text("PT3M".into())),
            ..valid()
        };
        assert_eq!(youtube_duration(&item), None);

        let recovered = RawFeedItem {
            yt_duration: Some(DurationField::Text("n/a".into())),
            media_group: Some(MediaGroup {
                durations: vec![AttrElement {
                    attrs: Some(attrs(&[("seconds", "61")])),
                }],
                ..MediaGroup::default()
            }),
            ..valid()
        };
        assert_eq!(youtube_duration(&recovered), Some(61));
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("212"), Some(212));
        assert_eq!(parse_leading_int(" 212s"), Some(212));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("-5"), None);
    }

    #[test]
    fn test_normalizer_dispatches_on_source_kind() {
        let article_source = Source::article("blog", "Blog", "https://blog.example/rss");
        let video_source = Source::video("yt", "Channel", "https://yt.example/feed", Some("UC1"));
        let item = RawFeedItem {
            yt_video_id: Some("vid".into()),
            ..valid()
        };

        let article = Normalizer::for_source(&article_source)
            .normalize(&item, &article_source.id, 0)
            .unwrap();
        assert_eq!(article.media, Media::Article);

        let video = Normalizer::for_source(&video_source)
            .normalize(&item, &video_source.id, 0)
            .unwrap();
        assert_eq!(
            video.media,
            Media::Video {
                video_id: Some("vid".into()),
                channel_id: Some("UC1".into()),
                duration_seconds: None,
            }
        );
        assert_eq!(video.id, "vid");
    }
}
