use url::Url;

use crate::error::{Result, TubemixError};

const YOUTUBE_ORIGIN: &str = "https://www.youtube.com";

/// Raw value of the query parameter `name`, up to the next `&` or `#`.
///
/// Only matches at the start of the query or right after a `&`, so `dev=`
/// never counts as `v=`.
fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let query_start = url.find('?')? + 1;
    let query = &url[query_start..];
    let query = &query[..query.find('#').unwrap_or(query.len())];
    query.split('&').find_map(|pair| {
        pair.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Parse video ID from a watch link: the value of its `v` parameter.
///
/// The token is returned as-is, length is checked separately so that
/// malformed ids can be reported instead of silently dropped.
pub fn parse_video_id(url: &str) -> Result<String> {
    query_param(url, "v")
        .map(str::to_string)
        .ok_or_else(|| TubemixError::InvalidReference(url.to_string()))
}

/// Whether the link carries a `name=` query parameter
pub fn has_query_param(url: &str, name: &str) -> bool {
    query_param(url, name).is_some()
}

/// A video ID is syntactically valid iff it has exactly 11 characters
pub fn is_valid_video_id(id: &str) -> bool {
    id.chars().count() == 11
}

/// Extract the `list` parameter from a playlist or watch URL
pub fn parse_playlist_id(url: &str) -> Option<String> {
    let id: String = query_param(url, "list")?
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Resolve an anchor href (absolute or site-relative) against youtube.com
pub fn resolve_href(href: &str) -> Option<Url> {
    let base = Url::parse(YOUTUBE_ORIGIN).ok()?;
    base.join(href.trim()).ok()
}

/// Video ID of a watch link, `None` for anything that isn't one
pub fn video_id_from_href(href: &str) -> Option<String> {
    if !href.contains("watch?v=") {
        return None;
    }
    let url = resolve_href(href)?;
    url.query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Playlist ID carried by an anchor href
pub fn playlist_id_from_href(href: &str) -> Option<String> {
    let url = resolve_href(href)?;
    url.query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned())
}

/// Construct YouTube watch URL from video ID
pub fn build_watch_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_id_strips_extra_params() {
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=tPEE9ZwTmy0&list=RDtPEE9ZwTmy0&index=2")
                .unwrap(),
            "tPEE9ZwTmy0"
        );
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=tPEE9ZwTmy0").unwrap(),
            "tPEE9ZwTmy0"
        );
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=tPEE9ZwTmy0#t=3").unwrap(),
            "tPEE9ZwTmy0"
        );
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?dev=1&v=tPEE9ZwTmy0").unwrap(),
            "tPEE9ZwTmy0"
        );
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?feature=share&v=OnoNITE-CLc&t=4").unwrap(),
            "OnoNITE-CLc"
        );
    }

    #[test]
    fn test_parse_video_id_without_marker() {
        assert!(matches!(
            parse_video_id("https://www.youtube.com/playlist?list=PL123"),
            Err(TubemixError::InvalidReference(_))
        ));
        assert!(matches!(
            parse_video_id("https://www.youtube.com/watch?dev=1"),
            Err(TubemixError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_parse_video_id_keeps_malformed_token() {
        let id = parse_video_id("https://www.youtube.com/watch?v=abc&t=1").unwrap();
        assert_eq!(id, "abc");
        assert!(!is_valid_video_id(&id));
    }

    #[test]
    fn test_is_valid_video_id() {
        assert!(is_valid_video_id("tPEE9ZwTmy0"));
        assert!(is_valid_video_id("OnoNITE-CLc"));
        assert!(!is_valid_video_id("tPEE9ZwTmy"));
        assert!(!is_valid_video_id("tPEE9ZwTmy00"));
        assert!(!is_valid_video_id(""));
    }

    #[test]
    fn test_parse_playlist_id() {
        assert_eq!(
            parse_playlist_id(
                "https://www.youtube.com/playlist?list=PLCcqYFX7d5HC_Gz5pQex5gj708kGgjiRs"
            )
            .as_deref(),
            Some("PLCcqYFX7d5HC_Gz5pQex5gj708kGgjiRs")
        );
        assert_eq!(parse_playlist_id("https://www.youtube.com/watch?v=x"), None);
        assert_eq!(parse_playlist_id("https://www.youtube.com/watch?v=x&playlist=PL1"), None);
    }

    #[test]
    fn test_video_id_from_href() {
        assert_eq!(
            video_id_from_href("/watch?v=tPEE9ZwTmy0&list=RD1&index=1").as_deref(),
            Some("tPEE9ZwTmy0")
        );
        assert_eq!(
            video_id_from_href("https://www.youtube.com/watch?v=OnoNITE-CLc&pp=x").as_deref(),
            Some("OnoNITE-CLc")
        );
        assert_eq!(video_id_from_href("/@channel"), None);
        assert_eq!(
            playlist_id_from_href("/watch?v=tPEE9ZwTmy0&list=RD1").as_deref(),
            Some("RD1")
        );
    }

    #[test]
    fn test_build_watch_url() {
        assert_eq!(
            build_watch_url("tPEE9ZwTmy0"),
            "https://youtube.com/watch?v=tPEE9ZwTmy0"
        );
    }
}
