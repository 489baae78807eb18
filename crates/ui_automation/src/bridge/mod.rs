//! Device bridge: the seam between the engine and the tool that actually
//! talks to a device
//!
//! This module provides:
//! - `DeviceBridge`: async trait covering the four collaborator contracts
//!   (shell execution, hierarchy dump, foreground activity, screen geometry)
//! - `adb`: the production implementation shelling out to the adb binary
//! - `input`: shell-fragment formatters for input primitives

mod adb;
pub mod input;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use adb::{AdbBridge, DeviceInfo};

/// The screen/module currently shown to the user, as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundActivity {
    pub package: String,
    /// Fully qualified `package/component` string when the device reports one
    pub component: Option<String>,
}

/// Abstraction over the command-line bridge to one device.
///
/// The engine formats commands and interprets output; implementations own
/// process spawning and timeouts. Every round-trip carries a timeout, and a
/// timeout is a hard failure at this layer. Retry policy lives in the flow
/// executor, never here.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Run a shell command on the device and return trimmed stdout.
    ///
    /// A missing bridge binary is `BridgeUnavailable`; a non-zero exit with
    /// error output is `CommandFailed`. The two are never conflated.
    async fn execute(&self, device_id: &str, command: &str, timeout: Duration) -> Result<String>;

    /// Dump the current view hierarchy as raw markup.
    ///
    /// Empty output is `EmptySnapshot`: every engine operation depends on a
    /// non-empty snapshot, so there is no graceful degradation here.
    async fn dump_hierarchy(&self, device_id: &str) -> Result<String>;

    /// Resolve the foreground activity. `Ok(None)` means the device output
    /// was unrecognizable; callers that use this for cache invalidation
    /// must fail open on `None`.
    async fn foreground_activity(&self, device_id: &str) -> Result<Option<ForegroundActivity>>;

    /// Device screen size in pixels as `(width, height)`.
    ///
    /// Unparsable output is an error, never a silent default: a wrong
    /// default would mis-place every percentage-based action.
    async fn screen_size(&self, device_id: &str) -> Result<(u32, u32)>;
}
