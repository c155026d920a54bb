//! Video rewriting: embedded players and inline clips become archive videos.

use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::NodeId;
use scraper::Selector;
use tracing::debug;

use super::document::{selector, PageDocument};
use crate::media::{youtube_poster_url, Imager, VideoGrabber};
use crate::site;

static YOUTUBE_IFRAMES: LazyLock<Selector> = LazyLock::new(|| selector(site::YOUTUBE_IFRAMES));
static YOUTUBE_SECTIONS: LazyLock<Selector> = LazyLock::new(|| selector(site::YOUTUBE_SECTIONS));
static SUMMARY_VIDEOS: LazyLock<Selector> = LazyLock::new(|| selector(site::SUMMARY_VIDEOS));
static VIDEOS: LazyLock<Selector> = LazyLock::new(|| selector(site::VIDEOS));
static SOURCES: LazyLock<Selector> = LazyLock::new(|| selector("source"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoStyle {
    /// Former YouTube player.
    Embedded,
    /// Article summary clip, played on demand.
    Summary,
    /// Short clip illustrating a step, looping silently.
    Step,
}

fn video_markup(to_root: &str, path: &str, poster: Option<&str>, style: VideoStyle) -> String {
    let (class, attrs) = match style {
        VideoStyle::Embedded => ("video-js youtube", r#"controls preload="none""#),
        VideoStyle::Summary => ("video-js summary-video", r#"controls preload="metadata""#),
        VideoStyle::Step => (
            "video-js step-video",
            r#"autoplay muted loop playsinline preload="auto""#,
        ),
    };
    let poster = poster
        .map(|p| format!(r#" poster="{}{}""#, to_root, p))
        .unwrap_or_default();
    format!(
        r#"<video class="{}" {}{}><source src="{}{}" type="video/webm"></video>"#,
        class, attrs, poster, to_root, path
    )
}

fn absolute(src: &str) -> String {
    match src.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => src.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(super) fn handle_videos(
    doc: &mut PageDocument,
    to_root: &str,
    imager: &mut Imager,
    videos: &mut VideoGrabber,
    include_youtube: bool,
) {
    if include_youtube {
        replace_youtube(doc, to_root, imager, videos);
    } else {
        remove_youtube(doc);
    }
    replace_inline(doc, to_root, imager, videos);
}

fn remove_youtube(doc: &mut PageDocument) {
    for section in doc.select(&YOUTUBE_SECTIONS) {
        if !doc.select_within(section, &YOUTUBE_IFRAMES).is_empty() {
            doc.remove(section);
        }
    }
    for iframe in doc.select(&YOUTUBE_IFRAMES) {
        doc.remove(iframe);
    }
}

fn replace_youtube(
    doc: &mut PageDocument,
    to_root: &str,
    imager: &mut Imager,
    videos: &mut VideoGrabber,
) {
    for iframe in doc.select(&YOUTUBE_IFRAMES) {
        let src = non_empty(doc.attr(iframe, "src")).or_else(|| non_empty(doc.attr(iframe, "data-src")));
        let Some(src) = src.map(|s| absolute(s.trim())) else {
            doc.remove(iframe);
            continue;
        };
        let Some(path) = videos.defer(&src) else {
            doc.remove(iframe);
            continue;
        };
        let poster = youtube_poster_url(&src).and_then(|poster| imager.defer(&poster));
        debug!("Replacing YouTube player for {}", src);
        doc.replace_with_html(
            iframe,
            video_markup(to_root, &path, poster.as_deref(), VideoStyle::Embedded),
        );
    }
}

/// Source URL of an inline `<video>`, on the element or its first `<source>`.
fn inline_source(doc: &PageDocument, video: NodeId) -> Option<String> {
    non_empty(doc.attr(video, "src"))
        .or_else(|| non_empty(doc.attr(video, "data-src")))
        .or_else(|| {
            doc.select_within(video, &SOURCES).into_iter().find_map(|source| {
                non_empty(doc.attr(source, "src")).or_else(|| non_empty(doc.attr(source, "data-src")))
            })
        })
}

fn replace_inline(
    doc: &mut PageDocument,
    to_root: &str,
    imager: &mut Imager,
    videos: &mut VideoGrabber,
) {
    let summary: HashSet<NodeId> = doc.select(&SUMMARY_VIDEOS).into_iter().collect();
    for video in doc.select(&VIDEOS) {
        let Some(src) = inline_source(doc, video) else {
            continue;
        };
        let Some(path) = videos.defer(&absolute(src.trim())) else {
            doc.remove(video);
            continue;
        };
        let poster = non_empty(doc.attr(video, "data-poster"))
            .or_else(|| non_empty(doc.attr(video, "poster")))
            .and_then(|poster| imager.defer(&absolute(poster.trim())));
        let style = if summary.contains(&video) {
            VideoStyle::Summary
        } else {
            VideoStyle::Step
        };
        doc.replace_with_html(video, video_markup(to_root, &path, poster.as_deref(), style));
    }
}
