use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Anchor, InlineStyle, Page};

/// Identity of one rendered element. Re-rendering a post yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// One post container with its bounding box in viewport coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostNode {
    #[serde(skip)]
    pub node: NodeId,
    pub top: f64,
    pub bottom: f64,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub style: InlineStyle,
}

impl PostNode {
    pub fn new(top: f64, bottom: f64) -> Self {
        Self {
            top,
            bottom,
            ..Self::default()
        }
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchors.push(anchor);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// In-memory page: a viewport and the post containers currently attached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub viewport_height: f64,
    #[serde(default)]
    posts: Vec<PostNode>,
    #[serde(skip)]
    next_node: u64,
}

impl Document {
    pub fn new(viewport_height: f64) -> Self {
        Self {
            viewport_height,
            ..Self::default()
        }
    }

    /// Loads a page snapshot and assigns fresh node ids to its posts.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut snapshot: Document =
            serde_json::from_str(raw).context("failed to parse page snapshot")?;
        let posts = std::mem::take(&mut snapshot.posts);
        for post in posts {
            snapshot.push(post);
        }
        Ok(snapshot)
    }

    /// Attaches a post at the end of the document.
    pub fn push(&mut self, mut post: PostNode) -> NodeId {
        self.next_node += 1;
        post.node = NodeId(self.next_node);
        let node = post.node;
        self.posts.push(post);
        node
    }

    /// Detaches a post. Its handle stops being `contains`-ed.
    pub fn remove(&mut self, node: NodeId) -> Option<PostNode> {
        let index = self.posts.iter().position(|post| post.node == node)?;
        Some(self.posts.remove(index))
    }

    /// Replaces a post with an equivalent freshly rendered element: same box,
    /// anchors and text, new identity, no inline styles.
    pub fn rerender(&mut self, node: NodeId) -> Option<NodeId> {
        let index = self.posts.iter().position(|post| post.node == node)?;
        self.next_node += 1;
        let post = &mut self.posts[index];
        post.node = NodeId(self.next_node);
        post.style = InlineStyle::default();
        Some(post.node)
    }

    /// Scrolls the viewport down by `dy` pixels.
    pub fn scroll_by(&mut self, dy: f64) {
        for post in &mut self.posts {
            post.top -= dy;
            post.bottom -= dy;
        }
    }

    pub fn get(&self, node: NodeId) -> Option<&PostNode> {
        self.posts.iter().find(|post| post.node == node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PostNode> {
        self.posts.iter()
    }

    fn get_mut(&mut self, node: NodeId) -> Option<&mut PostNode> {
        self.posts.iter_mut().find(|post| post.node == node)
    }
}

impl Page for Document {
    type Element = NodeId;

    fn posts(&self) -> Vec<NodeId> {
        self.posts.iter().map(|post| post.node).collect()
    }

    fn is_vertically_visible(&self, element: &NodeId) -> bool {
        self.get(*element)
            .map(|post| post.top < self.viewport_height && post.bottom > 0.0)
            .unwrap_or(false)
    }

    fn anchors(&self, element: &NodeId) -> Vec<Anchor> {
        self.get(*element)
            .map(|post| post.anchors.clone())
            .unwrap_or_default()
    }

    fn text(&self, element: &NodeId) -> Option<String> {
        self.get(*element).and_then(|post| post.text.clone())
    }

    fn contains(&self, element: &NodeId) -> bool {
        self.get(*element).is_some()
    }

    fn set_style(&mut self, element: &NodeId, property: &str, value: &str, important: bool) {
        if let Some(post) = self.get_mut(*element) {
            post.style.set(property, value, important);
        }
    }

    fn remove_style(&mut self, element: &NodeId, property: &str) {
        if let Some(post) = self.get_mut(*element) {
            post.style.remove(property);
        }
    }
}

/// A [`Document`] shared between the host (which mutates and scrolls it) and
/// the observer task (which scans and styles it).
#[derive(Debug, Clone, Default)]
pub struct SharedDocument {
    inner: Arc<Mutex<Document>>,
}

impl SharedDocument {
    pub fn new(document: Document) -> Self {
        Self {
            inner: Arc::new(Mutex::new(document)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Page for SharedDocument {
    type Element = NodeId;

    fn posts(&self) -> Vec<NodeId> {
        self.lock().posts()
    }

    fn is_vertically_visible(&self, element: &NodeId) -> bool {
        self.lock().is_vertically_visible(element)
    }

    fn anchors(&self, element: &NodeId) -> Vec<Anchor> {
        self.lock().anchors(element)
    }

    fn text(&self, element: &NodeId) -> Option<String> {
        self.lock().text(element)
    }

    fn contains(&self, element: &NodeId) -> bool {
        self.lock().contains(element)
    }

    fn set_style(&mut self, element: &NodeId, property: &str, value: &str, important: bool) {
        self.lock().set_style(element, property, value, important);
    }

    fn remove_style(&mut self, element: &NodeId, property: &str) {
        self.lock().remove_style(element, property);
    }

    fn visible_posts(&self) -> Vec<NodeId> {
        self.lock().visible_posts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new(800.0);
        doc.push(PostNode::new(0.0, 300.0).with_text("first"));
        doc.push(PostNode::new(300.0, 600.0).with_text("second"));
        doc.push(PostNode::new(900.0, 1200.0).with_text("below the fold"));
        doc
    }

    #[test]
    fn visibility_is_vertical_intersection_only() {
        let mut doc = sample();
        assert_eq!(doc.visible_posts().len(), 2);

        doc.scroll_by(500.0);
        let visible: Vec<_> = doc
            .visible_posts()
            .into_iter()
            .filter_map(|node| doc.text(&node))
            .collect();
        assert_eq!(visible, vec!["second".to_string(), "below the fold".to_string()]);
    }

    #[test]
    fn edge_touching_post_is_not_visible() {
        let mut doc = Document::new(800.0);
        let below = doc.push(PostNode::new(800.0, 900.0));
        let above = doc.push(PostNode::new(-100.0, 0.0));
        assert!(!doc.is_vertically_visible(&below));
        assert!(!doc.is_vertically_visible(&above));
    }

    #[test]
    fn rerender_changes_identity_and_drops_styles() {
        let mut doc = sample();
        let node = doc.posts()[0];
        doc.set_style(&node, "outline", "1px solid red", true);

        let fresh = doc.rerender(node).unwrap();
        assert_ne!(fresh, node);
        assert!(!doc.contains(&node));
        assert!(doc.get(fresh).unwrap().style.is_empty());
        assert_eq!(doc.text(&fresh).as_deref(), Some("first"));
    }

    #[test]
    fn snapshot_loads_and_numbers_posts() {
        let raw = r#"{
            "viewportHeight": 720,
            "posts": [
                { "top": 10, "bottom": 200, "text": "hello",
                  "anchors": [{ "href": "/a/status/42", "text": "3h", "hasTime": true }] },
                { "top": 200, "bottom": 400 }
            ]
        }"#;
        let doc = Document::from_json(raw).unwrap();
        let nodes = doc.posts();
        assert_eq!(nodes.len(), 2);
        assert_ne!(nodes[0], nodes[1]);
        assert_eq!(doc.anchors(&nodes[0])[0].href, "/a/status/42");
        assert!(doc.text(&nodes[1]).is_none());
    }

    #[test]
    fn blank_text_is_not_extractable() {
        let mut doc = Document::new(800.0);
        let node = doc.push(PostNode::new(0.0, 10.0).with_text("   \n "));
        assert!(doc.post_text(&node).is_none());
    }

    #[test]
    fn demo_timeline_has_two_visible_posts() {
        let doc = Document::from_json(include_str!("../../demos/timeline.json")).unwrap();
        let visible = doc.visible_posts();
        assert_eq!(visible.len(), 2);
        let ids: Vec<_> = visible
            .iter()
            .filter_map(|node| crate::page::extract_post_id(&doc.anchors(node)))
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["1790000000000000001", "1790000000000000002"]);
    }
}
