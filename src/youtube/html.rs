//! Static scraping of playlist pages.
//!
//! Two inputs share this module: pages saved from a browser ("Save page as")
//! and the DOM of a live playlist page after the browser rendered it. Both are
//! plain HTML by the time they get here.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::core::{Extraction, VideoReference};
use crate::youtube::utils::{playlist_id_from_href, video_id_from_href};

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e:?}"))
}

/// Mix/watch-page side panel first, then the playlist page list
static CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    vec![
        selector("div#items.playlist-items"),
        selector("ytd-playlist-video-list-renderer #contents"),
    ]
});
static ITEM: LazyLock<Selector> = LazyLock::new(|| {
    selector("ytd-playlist-panel-video-renderer, ytd-playlist-video-renderer")
});
static WATCH_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="watch?v="]"#));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("#video-title"));
static CHANNEL: LazyLock<Selector> =
    LazyLock::new(|| selector("#byline, ytd-channel-name #text, #channel-name"));
static ENDPOINT_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a.yt-simple-endpoint[href*="watch?v="]"#));

fn clean_text(el: ElementRef<'_>) -> Option<String> {
    let text = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Title attribute wins over text, it is never truncated with an ellipsis
fn title_of(el: ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| clean_text(el))
}

fn first_video_id(scope: ElementRef<'_>) -> Option<String> {
    scope
        .select(&WATCH_ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find_map(video_id_from_href)
}

/// `#video-title` element that is, or sits inside, the anchor
fn owned_title(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if anchor.value().id() == Some("video-title") {
        return Some(anchor);
    }
    anchor.select(&TITLE).next()
}

fn build_reference(id: String, title: Option<String>, channel: Option<String>) -> VideoReference {
    let mut reference = VideoReference::new(id);
    reference.title = title;
    reference.channel = channel;
    reference
}

/// Extract the playlist entries of a page saved from the browser.
///
/// Returns an empty extraction when the playlist container is missing; the
/// caller decides whether that is an error.
pub fn parse_saved_page(html: &str) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    let Some(container) = CONTAINERS
        .iter()
        .find_map(|sel| document.select(sel).next())
    else {
        debug!("no playlist container in saved page");
        return extraction;
    };

    let items: Vec<_> = container.select(&ITEM).collect();
    if !items.is_empty() {
        debug!(count = items.len(), "playlist item renderers found");
        for item in items {
            let Some(id) = first_video_id(item) else {
                continue;
            };
            let title = item.select(&TITLE).next().and_then(title_of);
            let channel = item.select(&CHANNEL).next().and_then(clean_text);
            extraction.push(build_reference(id, title, channel));
        }
        return extraction;
    }

    // No renderer elements: entries, titles and channels line up by position.
    let anchors: Vec<_> = container
        .select(&WATCH_ANCHOR)
        .filter_map(|a| {
            let id = a.value().attr("href").and_then(video_id_from_href)?;
            Some((a, id))
        })
        .collect();
    let channels: Vec<_> = container.select(&CHANNEL).map(clean_text).collect();

    // The anchor holding the title is the entry, its thumbnail anchor is not.
    let titled: Vec<_> = anchors
        .iter()
        .filter_map(|(a, id)| Some((id.clone(), owned_title(*a)?)))
        .collect();
    let entries: Vec<(String, Option<String>)> = if !titled.is_empty() {
        titled
            .into_iter()
            .map(|(id, title)| (id, title_of(title)))
            .collect()
    } else {
        // titles live outside the anchors, only thumbnail/text pairs can be told apart
        let titles: Vec<_> = container.select(&TITLE).map(title_of).collect();
        let mut ids: Vec<String> = Vec::new();
        for (_, id) in anchors {
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
        ids.into_iter()
            .enumerate()
            .map(|(i, id)| (id, titles.get(i).cloned().flatten()))
            .collect()
    };
    debug!(
        entries = entries.len(),
        channels = channels.len(),
        "zipping playlist sibling lists"
    );

    for (i, (id, title)) in entries.into_iter().enumerate() {
        let channel = channels.get(i).cloned().flatten();
        extraction.push(build_reference(id, title, channel));
    }
    extraction
}

/// Extract the entries of a rendered live playlist page.
///
/// When `playlist_id` is given, links that carry a different `list`
/// parameter (recommendations, other mixes) are skipped.
pub fn parse_rendered_playlist(html: &str, playlist_id: Option<&str>) -> Extraction {
    let document = Html::parse_document(html);

    let anchors: Vec<_> = document
        .select(&ENDPOINT_ANCHOR)
        .filter_map(|a| a.value().attr("href").map(|href| (a, href)))
        .collect();

    let same_list = |href: &str| match playlist_id {
        Some(list) => playlist_id_from_href(href).as_deref() == Some(list),
        None => true,
    };
    let filter_by_list = anchors.iter().any(|(_, href)| same_list(href)) && playlist_id.is_some();

    let mut ordered: Vec<VideoReference> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (anchor, href) in anchors {
        if filter_by_list && !same_list(href) {
            continue;
        }
        let Some(id) = video_id_from_href(href) else {
            continue;
        };
        let title = (anchor.value().id() == Some("video-title"))
            .then(|| title_of(anchor))
            .flatten();

        match positions.get(&id) {
            Some(&pos) => {
                if ordered[pos].title.is_none() {
                    ordered[pos].title = title;
                }
            }
            None => {
                positions.insert(id.clone(), ordered.len());
                ordered.push(build_reference(id, title, None));
            }
        }
    }

    let mut extraction = Extraction::default();
    for reference in ordered {
        extraction.push(reference);
    }
    extraction
}
