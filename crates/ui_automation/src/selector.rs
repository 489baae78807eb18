//! Selector and query engine: matching nodes by field and match mode

use crate::hierarchy::UiNode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which textual attribute a selector reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorField {
    Text,
    ResourceId,
    ContentDesc,
}

/// How a selector value is compared against the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    #[default]
    Contains,
    Regex,
}

/// Immutable (field, value, match-mode) tuple used to find nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub field: SelectorField,
    pub value: String,
    #[serde(default)]
    pub mode: MatchMode,
}

impl Selector {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            field: SelectorField::Text,
            value: value.into(),
            mode: MatchMode::Contains,
        }
    }

    pub fn resource_id(value: impl Into<String>) -> Self {
        Self {
            field: SelectorField::ResourceId,
            value: value.into(),
            mode: MatchMode::Contains,
        }
    }

    pub fn content_desc(value: impl Into<String>) -> Self {
        Self {
            field: SelectorField::ContentDesc,
            value: value.into(),
            mode: MatchMode::Contains,
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    fn field_of<'a>(&self, node: &'a UiNode) -> &'a str {
        match self.field {
            SelectorField::Text => &node.text,
            SelectorField::ResourceId => &node.resource_id,
            SelectorField::ContentDesc => &node.content_desc,
        }
    }

    /// Whether one node satisfies this selector. A regex that fails to
    /// compile matches nothing; it never raises.
    pub fn matches(&self, node: &UiNode) -> bool {
        let haystack = self.field_of(node);
        match self.mode {
            MatchMode::Exact => haystack == self.value,
            MatchMode::Contains => haystack.contains(&self.value),
            MatchMode::Regex => match Regex::new(&self.value) {
                Ok(re) => re.is_match(haystack),
                Err(_) => false,
            },
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = match self.field {
            SelectorField::Text => "text",
            SelectorField::ResourceId => "id",
            SelectorField::ContentDesc => "desc",
        };
        let mode = match self.mode {
            MatchMode::Exact => "=",
            MatchMode::Contains => "~",
            MatchMode::Regex => "/",
        };
        write!(f, "{}{}{:?}", field, mode, self.value)
    }
}

/// All nodes matching the selector, preserving document order
pub fn query<'a>(nodes: &'a [UiNode], selector: &Selector) -> Vec<&'a UiNode> {
    nodes.iter().filter(|n| selector.matches(n)).collect()
}

/// Index of the first matching node within the snapshot's node list
pub fn find_first(nodes: &[UiNode], selector: &Selector) -> Option<usize> {
    nodes.iter().position(|n| selector.matches(n))
}

/// Comparison applied by `wait_for_node_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Eq,
    Gte,
    Lte,
}

impl Comparator {
    pub fn holds(&self, observed: usize, target: usize) -> bool {
        match self {
            Comparator::Eq => observed == target,
            Comparator::Gte => observed >= target,
            Comparator::Lte => observed <= target,
        }
    }
}
