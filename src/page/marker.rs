//! The highlight marker: outline plus a background tint, applied as important
//! inline styles. Outlines do not take part in layout, so marking never
//! shifts content.

use super::{InlineStyle, Page};

pub const MARKER_STYLES: [(&str, &str); 3] = [
    ("outline", "3px solid rgba(255, 0, 0, 0.8)"),
    ("outline-offset", "1px"),
    ("background-color", "rgba(255, 0, 0, 0.07)"),
];

pub fn apply<P: Page>(page: &mut P, element: &P::Element) {
    for (property, value) in MARKER_STYLES {
        page.set_style(element, property, value, true);
    }
}

/// Removes exactly the marker properties; other inline styles are left alone.
pub fn clear<P: Page>(page: &mut P, element: &P::Element) {
    for (property, _) in MARKER_STYLES {
        page.remove_style(element, property);
    }
}

pub fn is_marked(style: &InlineStyle) -> bool {
    MARKER_STYLES.iter().all(|(property, value)| {
        style
            .get(property)
            .map(|current| current.value == *value && current.important)
            .unwrap_or(false)
    })
}
