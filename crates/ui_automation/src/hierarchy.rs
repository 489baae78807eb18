//! Hierarchy parser: raw snapshot markup to a flat, ordered node list
//!
//! The dump format is stringly-typed and positionally indexed; nodes carry
//! no identity that survives across snapshots. The parser is therefore
//! deliberately forgiving: a missing attribute becomes its type's default
//! and a malformed bounds string becomes `None`. It never fails on content.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref NODE_TAG_RE: Regex = Regex::new(r"<node\b([^>]*)>").expect("static regex");
    static ref ATTR_RE: Regex = Regex::new(r#"([\w-]+)="([^"]*)""#).expect("static regex");
    static ref BOUNDS_RE: Regex =
        Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").expect("static regex");
}

/// On-screen rectangle occupied by a node, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bounds {
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Center point, rounded to the nearest pixel
    pub fn center(&self) -> (i32, i32) {
        (
            ((self.x1 as f64 + self.x2 as f64) / 2.0).round() as i32,
            ((self.y1 as f64 + self.y2 as f64) / 2.0).round() as i32,
        )
    }

    /// Whether `other` lies entirely within this rectangle (edges inclusive)
    pub fn contains(&self, other: &Bounds) -> bool {
        self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
    }

    /// Euclidean distance between the centers of two rectangles
    pub fn center_distance(&self, other: &Bounds) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (((ax - bx) as f64).powi(2) + ((ay - by) as f64).powi(2)).sqrt()
    }
}

/// One element within a snapshot. Ephemeral and snapshot-scoped: equality
/// is by position within one snapshot's node list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiNode {
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub class_name: String,
    pub clickable: bool,
    pub password: bool,
    pub checked: Option<bool>,
    pub bounds: Option<Bounds>,
}

impl UiNode {
    /// Whether this node accepts typed text
    pub fn is_text_input(&self) -> bool {
        self.password
            || self.class_name.contains("EditText")
            || self.class_name.contains("AutoCompleteTextView")
            || self.class_name.contains("MultiAutoCompleteTextView")
            || self.class_name.contains("SearchView")
    }

    /// A compact label for log and failure messages
    pub fn describe(&self) -> String {
        if !self.text.is_empty() {
            format!("text={:?}", self.text)
        } else if !self.resource_id.is_empty() {
            format!("id={:?}", self.resource_id)
        } else if !self.content_desc.is_empty() {
            format!("desc={:?}", self.content_desc)
        } else {
            format!("class={:?}", self.class_name)
        }
    }
}

/// Parse raw hierarchy markup into nodes in document order.
///
/// Every `<node …>` tag yields exactly one entry; malformed bounds are
/// dropped to `None` rather than rejecting the node.
pub fn parse_hierarchy(raw: &str) -> Vec<UiNode> {
    NODE_TAG_RE
        .captures_iter(raw)
        .map(|tag| parse_node_tag(&tag[1]))
        .collect()
}

fn parse_node_tag(attrs: &str) -> UiNode {
    let mut node = UiNode::default();

    for caps in ATTR_RE.captures_iter(attrs) {
        let value = unescape(&caps[2]);
        match &caps[1] {
            "text" => node.text = value,
            "resource-id" => node.resource_id = value,
            "content-desc" => node.content_desc = value,
            "class" => node.class_name = value,
            "clickable" => node.clickable = value == "true",
            "password" => node.password = value == "true",
            "checked" => node.checked = Some(value == "true"),
            "bounds" => node.bounds = parse_bounds(&value),
            _ => {}
        }
    }

    node
}

/// Parse a `[x1,y1][x2,y2]` bounds attribute; anything else is `None`
pub fn parse_bounds(value: &str) -> Option<Bounds> {
    let caps = BOUNDS_RE.captures(value.trim())?;
    Some(Bounds {
        x1: caps[1].parse().ok()?,
        y1: caps[2].parse().ok()?,
        x2: caps[3].parse().ok()?,
        y2: caps[4].parse().ok()?,
    })
}

/// Minimal XML entity decoding for attribute values
fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}
