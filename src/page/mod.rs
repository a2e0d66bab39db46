//! The slice of the host page the observer consumes: post containers, their
//! permalink anchors and text bodies, and inline styles for the marker.

pub mod document;
pub mod marker;
pub mod post_id;

pub use document::{Document, NodeId, PostNode, SharedDocument};
pub use post_id::{extract_post_id, find_post};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An anchor inside a post container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub href: String,
    #[serde(default)]
    pub text: String,
    /// Whether the anchor wraps a `<time>` element.
    #[serde(default)]
    pub has_time: bool,
}

impl Anchor {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
            has_time: false,
        }
    }

    /// The timestamp permalink a post renders next to its author.
    pub fn timestamp(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            has_time: true,
            ..Self::new(href, text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleValue {
    pub value: String,
    #[serde(default)]
    pub important: bool,
}

/// Inline `style` declarations of one element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InlineStyle(BTreeMap<String, StyleValue>);

impl InlineStyle {
    pub fn set(&mut self, property: &str, value: &str, important: bool) {
        self.0.insert(
            property.to_string(),
            StyleValue {
                value: value.to_string(),
                important,
            },
        );
    }

    pub fn remove(&mut self, property: &str) -> Option<StyleValue> {
        self.0.remove(property)
    }

    pub fn get(&self, property: &str) -> Option<&StyleValue> {
        self.0.get(property)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Read and style access to the post containers of a page.
///
/// Element handles must stay comparable after the page changes: a handle to
/// an element that has been detached or re-rendered is simply no longer
/// `contains`-ed.
pub trait Page {
    type Element: Clone + PartialEq + fmt::Debug;

    /// Every element matching the post container pattern, in document order.
    fn posts(&self) -> Vec<Self::Element>;

    /// True when the element's bounding box intersects the viewport vertically.
    fn is_vertically_visible(&self, element: &Self::Element) -> bool;

    fn anchors(&self, element: &Self::Element) -> Vec<Anchor>;

    /// Raw text of the post body, if the post has one rendered.
    fn text(&self, element: &Self::Element) -> Option<String>;

    /// Whether the element is still attached to the document.
    fn contains(&self, element: &Self::Element) -> bool;

    fn set_style(&mut self, element: &Self::Element, property: &str, value: &str, important: bool);

    fn remove_style(&mut self, element: &Self::Element, property: &str);

    fn visible_posts(&self) -> Vec<Self::Element> {
        self.posts()
            .into_iter()
            .filter(|element| self.is_vertically_visible(element))
            .collect()
    }

    /// Trimmed post text; `None` when missing or blank.
    fn post_text(&self, element: &Self::Element) -> Option<String> {
        self.text(element)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}
