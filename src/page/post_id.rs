//! Post identity from permalink anchors.

use lazy_static::lazy_static;
use regex::Regex;

use super::{Anchor, Page};
use crate::models::PostId;

lazy_static! {
    static ref STATUS_PATH: Regex = Regex::new(r"/status/(\d+)").unwrap();
    // "12m", "3h", "45s", "Mar 5", "Mar 5, 2024"
    static ref TIMESTAMP_TEXT: Regex =
        Regex::new(r"^\d+m$|^\d+h$|^\d+s$|^[A-Za-z]{3}\s\d+|^[A-Za-z]{3}\s\d+,\s\d{4}").unwrap();
}

/// The numeric status segment of an href, e.g. `/user/status/1001/photo/1` -> `1001`.
pub fn status_segment(href: &str) -> Option<&str> {
    STATUS_PATH
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn is_timestamp_link(anchor: &Anchor) -> bool {
    anchor.has_time || TIMESTAMP_TEXT.is_match(anchor.text.trim())
}

/// Picks the post's own permalink among its anchors.
///
/// Only anchors with a `/status/<digits>` path are candidates. A candidate is
/// accepted when it looks like the timestamp link, or when it is the only
/// status anchor in the post; quoted or replied-to posts contribute extra
/// status links that must not win.
pub fn extract_post_id(anchors: &[Anchor]) -> Option<PostId> {
    let candidates: Vec<&Anchor> = anchors
        .iter()
        .filter(|anchor| anchor.href.contains("/status/"))
        .collect();
    let only_one = candidates.len() == 1;

    candidates.into_iter().find_map(|anchor| {
        let id = status_segment(&anchor.href)?;
        (only_one || is_timestamp_link(anchor)).then(|| PostId::new(id))
    })
}

/// Searches every post on the page (visible or not) for the one whose own
/// permalink is `post_id`. Posts that merely quote it do not match.
pub fn find_post<P: Page>(page: &P, post_id: &PostId) -> Option<P::Element> {
    page.posts()
        .into_iter()
        .find(|element| extract_post_id(&page.anchors(element)).as_ref() == Some(post_id))
}
