//! Tap target resolver
//!
//! A selector frequently matches a label or icon that is not itself
//! clickable; the tap has to land on whatever element actually consumes it.
//! Resolution runs an ordered list of rules and takes the first answer:
//!
//! 1. the node itself is clickable
//! 2. the smallest clickable node whose bounds enclose the target
//! 3. the target has no bounds at all (report, issue nothing)
//! 4. the clickable node whose center is nearest the target's center
//!
//! Each rule is a standalone function so it can be unit-tested without the
//! others.

use crate::error::{AutomationError, Result};
use crate::hierarchy::UiNode;
use serde::Serialize;
use tracing::debug;

/// Which rule produced the resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Direct,
    ClickableContainer,
    NearestClickable,
    /// The matched node has no bounds; no tap can be issued
    NoBounds,
}

/// Outcome of resolving one matched node to a tappable element.
/// `node_index` is positional within the snapshot's node list, the only
/// identity a node has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TapResolution {
    pub node_index: usize,
    pub used_fallback: bool,
    pub reason: FallbackReason,
}

impl TapResolution {
    /// Whether a tap may actually be issued for this resolution
    pub fn tappable(&self) -> bool {
        self.reason != FallbackReason::NoBounds
    }
}

type Rule = fn(usize, &[UiNode]) -> Option<TapResolution>;

/// Rules in priority order; resolution takes the first hit
const RULES: &[Rule] = &[direct, clickable_container, no_bounds, nearest_clickable];

/// Rule 1: a clickable node receives its own tap, regardless of what else
/// is on screen
fn direct(target: usize, nodes: &[UiNode]) -> Option<TapResolution> {
    if nodes[target].clickable {
        Some(TapResolution {
            node_index: target,
            used_fallback: false,
            reason: FallbackReason::Direct,
        })
    } else {
        None
    }
}

/// Smallest-area clickable node geometrically enclosing the target. Also
/// used by the login classifier to lift a matched label onto its button.
pub(crate) fn smallest_enclosing_clickable(target: usize, nodes: &[UiNode]) -> Option<usize> {
    let target_bounds = nodes[target].bounds?;

    nodes
        .iter()
        .enumerate()
        .filter(|(i, n)| {
            *i != target
                && n.clickable
                && n.bounds.map(|b| b.contains(&target_bounds)).unwrap_or(false)
        })
        .min_by_key(|(_, n)| n.bounds.map(|b| b.area()).unwrap_or(i64::MAX))
        .map(|(i, _)| i)
}

/// Rule 2: smallest-area clickable node geometrically enclosing the target
fn clickable_container(target: usize, nodes: &[UiNode]) -> Option<TapResolution> {
    smallest_enclosing_clickable(target, nodes).map(|i| TapResolution {
        node_index: i,
        used_fallback: true,
        reason: FallbackReason::ClickableContainer,
    })
}

/// Rule 3: without bounds there is nothing to measure against; report the
/// condition instead of guessing
fn no_bounds(target: usize, nodes: &[UiNode]) -> Option<TapResolution> {
    if nodes[target].bounds.is_none() {
        Some(TapResolution {
            node_index: target,
            used_fallback: true,
            reason: FallbackReason::NoBounds,
        })
    } else {
        None
    }
}

/// Rule 4: clickable node with minimal center-to-center distance. Ties
/// break by document order (min_by keeps the first of equal keys).
fn nearest_clickable(target: usize, nodes: &[UiNode]) -> Option<TapResolution> {
    let target_bounds = nodes[target].bounds?;

    nodes
        .iter()
        .enumerate()
        .filter(|(i, n)| *i != target && n.clickable && n.bounds.is_some())
        .min_by(|(_, a), (_, b)| {
            let da = a.bounds.map(|ab| ab.center_distance(&target_bounds)).unwrap_or(f64::MAX);
            let db = b.bounds.map(|bb| bb.center_distance(&target_bounds)).unwrap_or(f64::MAX);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| TapResolution {
            node_index: i,
            used_fallback: true,
            reason: FallbackReason::NearestClickable,
        })
}

/// Resolve a matched node to the element that should receive the tap.
///
/// `Err(NoTapTarget)` only occurs when the screen has zero clickable nodes
/// with bounds to fall back on.
pub fn resolve_tap_target(target: usize, nodes: &[UiNode]) -> Result<TapResolution> {
    for rule in RULES {
        if let Some(resolution) = rule(target, nodes) {
            if resolution.used_fallback {
                debug!(
                    target,
                    resolved = resolution.node_index,
                    reason = ?resolution.reason,
                    "tap target resolved via fallback"
                );
            }
            return Ok(resolution);
        }
    }

    Err(AutomationError::NoTapTarget(nodes[target].describe()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Bounds;

    fn node(clickable: bool, bounds: Option<(i32, i32, i32, i32)>) -> UiNode {
        UiNode {
            clickable,
            bounds: bounds.map(|(x1, y1, x2, y2)| Bounds { x1, y1, x2, y2 }),
            ..Default::default()
        }
    }

    #[test]
    fn test_clickable_node_is_direct() {
        // Other clickables present; direct still wins
        let nodes = vec![
            node(true, Some((0, 0, 1000, 2000))),
            node(true, Some((10, 10, 200, 100))),
        ];
        let res = resolve_tap_target(1, &nodes).unwrap();
        assert_eq!(res.node_index, 1);
        assert!(!res.used_fallback);
        assert_eq!(res.reason, FallbackReason::Direct);
    }

    #[test]
    fn test_enclosing_container() {
        let nodes = vec![
            node(true, Some((0, 0, 1000, 2000))),  // outer container
            node(true, Some((0, 0, 500, 300))),    // tight container
            node(false, Some((100, 100, 400, 200))), // label
        ];
        let res = resolve_tap_target(2, &nodes).unwrap();
        assert_eq!(res.node_index, 1, "smallest enclosing clickable wins");
        assert!(res.used_fallback);
        assert_eq!(res.reason, FallbackReason::ClickableContainer);
    }

    #[test]
    fn test_no_bounds_reported_without_tap() {
        let nodes = vec![node(true, Some((0, 0, 100, 100))), node(false, None)];
        let res = resolve_tap_target(1, &nodes).unwrap();
        assert_eq!(res.node_index, 1);
        assert_eq!(res.reason, FallbackReason::NoBounds);
        assert!(!res.tappable());
    }

    #[test]
    fn test_nearest_clickable() {
        let nodes = vec![
            node(false, Some((450, 450, 550, 550))), // target center (500,500)
            node(true, Some((0, 0, 100, 100))),      // center (50,50)
            node(true, Some((400, 400, 500, 500))),  // center (450,450)
        ];
        let res = resolve_tap_target(0, &nodes).unwrap();
        assert_eq!(res.node_index, 2);
        assert_eq!(res.reason, FallbackReason::NearestClickable);
    }

    #[test]
    fn test_equidistant_ties_break_by_document_order() {
        // Two clickables both 100px from the target center; the earlier
        // node in document order must win deterministically
        let nodes = vec![
            node(false, Some((490, 490, 510, 510))), // center (500,500)
            node(true, Some((390, 490, 410, 510))),  // center (400,500)
            node(true, Some((590, 490, 610, 510))),  // center (600,500)
        ];
        let res = resolve_tap_target(0, &nodes).unwrap();
        assert_eq!(res.node_index, 1);
    }

    #[test]
    fn test_no_candidates_is_error() {
        let nodes = vec![node(false, Some((0, 0, 10, 10))), node(false, Some((20, 20, 30, 30)))];
        let err = resolve_tap_target(0, &nodes).unwrap_err();
        assert!(matches!(err, AutomationError::NoTapTarget(_)));
    }

    #[test]
    fn test_container_beats_nearest() {
        let nodes = vec![
            node(false, Some((100, 100, 200, 150))),
            node(true, Some((90, 90, 210, 160))), // encloses target
            node(true, Some((100, 160, 200, 170))), // nearer center, no enclosure
        ];
        let res = resolve_tap_target(0, &nodes).unwrap();
        assert_eq!(res.reason, FallbackReason::ClickableContainer);
        assert_eq!(res.node_index, 1);
    }
}
