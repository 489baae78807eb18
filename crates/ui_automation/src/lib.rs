//! ui_automation: ADB-driven UI automation engine for Android devices
//!
//! This library drives real devices and emulators through the Android
//! Debug Bridge:
//! - Shell command transport with per-call timeouts
//! - Cached UI hierarchy snapshots with activity-change invalidation
//! - Selector queries over parsed hierarchy nodes
//! - Tap target resolution with clickable-ancestor fallbacks
//! - Login form detection across multilingual screens
//! - Wait, scroll and stability polling primitives
//! - A JSON flow plan executor with input batching and retries
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ui_automation::{AdbBridge, Selector, SnapshotOptions, UiAutomator};
//!
//! #[tokio::main]
//! async fn main() -> ui_automation::Result<()> {
//!     let bridge = Arc::new(AdbBridge::new());
//!     let engine = UiAutomator::new(bridge, "emulator-5554");
//!
//!     if let Some(report) = engine.tap_by_selector(&Selector::text("Sign in")).await? {
//!         println!("tapped at {:?}", report.point);
//!     }
//!
//!     let snapshot = engine.snapshot(&SnapshotOptions::default()).await?;
//!     println!("{} nodes on screen", snapshot.nodes.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;

// Configuration module
pub mod config;

// Device transport
pub mod bridge;

// Hierarchy model and queries
pub mod hierarchy;
pub mod selector;
pub mod snapshot;

// Engine functionality
pub mod engine;
pub mod flow;
pub mod login;
pub mod resolver;
pub mod wait;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types and functions
pub use error::{AutomationError, Result};

// Config re-exports
pub use config::{
    CommandTuning, EngineConfig, FlowTuning, LoginTuning, ScrollTuning, SnapshotTuning,
    ENGINE_DEFAULTS,
};

// Bridge re-exports
pub use bridge::input::resolve_keycode;
pub use bridge::{AdbBridge, DeviceBridge, DeviceInfo, ForegroundActivity};

// Hierarchy re-exports
pub use hierarchy::{parse_hierarchy, Bounds, UiNode};
pub use selector::{find_first, query, Comparator, MatchMode, Selector, SelectorField};
pub use snapshot::{content_hash, Snapshot, SnapshotCache, SnapshotOptions};

// Engine re-exports
pub use engine::{percent_to_px, px_to_percent, TapReport, UiAutomator};
pub use flow::{FlowOutcome, FlowPlan, FlowState, FlowStep, StepAction, StepResult};
pub use login::LoginFields;
pub use resolver::{resolve_tap_target, FallbackReason, TapResolution};
pub use wait::{
    ActivityWaitResult, CancelHandle, CountWaitResult, ScrollDirection, ScrollResult,
    StabilityResult, WaitOptions, WaitResult,
};
