//! Engine facade: one `UiAutomator` per device session
//!
//! Owns the bridge handle, the snapshot cache and the tuning config, and
//! exposes the whole automation surface. The supported contract is
//! single-caller sequential use per device; nothing here locks the device
//! against a second caller.

use crate::bridge::{input, DeviceBridge};
use crate::config::EngineConfig;
use crate::error::{AutomationError, Result};
use crate::hierarchy::UiNode;
use crate::resolver::{resolve_tap_target, TapResolution};
use crate::selector::{find_first, query, Selector};
use crate::snapshot::{Snapshot, SnapshotCache, SnapshotOptions};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Convert a percentage of a screen dimension to pixels
pub fn percent_to_px(percent: f64, dimension: u32) -> i32 {
    (percent / 100.0 * dimension as f64).round() as i32
}

/// Inverse of `percent_to_px`, recovering the percentage within the
/// rounding error of one pixel
pub fn px_to_percent(px: i32, dimension: u32) -> f64 {
    px as f64 / dimension as f64 * 100.0
}

/// Result of tapping through a selector: the resolution metadata is always
/// present for observability, even when no tap was issued
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TapReport {
    pub resolution: TapResolution,
    /// Rounded bounds center the tap landed on, when one was issued
    pub point: Option<(i32, i32)>,
}

/// UI automation engine bound to one device
pub struct UiAutomator {
    bridge: Arc<dyn DeviceBridge>,
    cache: SnapshotCache,
    config: EngineConfig,
    device_id: String,
    screen: OnceCell<(u32, u32)>,
}

impl UiAutomator {
    pub fn new(bridge: Arc<dyn DeviceBridge>, device_id: impl Into<String>) -> Self {
        Self::with_config(bridge, device_id, crate::config::ENGINE_DEFAULTS.clone())
    }

    pub fn with_config(
        bridge: Arc<dyn DeviceBridge>,
        device_id: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache: SnapshotCache::new(Arc::clone(&bridge)),
            bridge,
            config,
            device_id: device_id.into(),
            screen: OnceCell::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub(crate) fn bridge(&self) -> &dyn DeviceBridge {
        self.bridge.as_ref()
    }

    /// Current snapshot per the given cache policy
    pub async fn snapshot(&self, options: &SnapshotOptions) -> Result<Arc<Snapshot>> {
        self.cache.get(&self.device_id, options).await
    }

    /// Always-refetched snapshot, for poll loops that must observe change
    pub async fn fresh_snapshot(&self) -> Result<Arc<Snapshot>> {
        self.cache.refresh(&self.device_id).await
    }

    /// Device screen size, fetched once per engine and reused for every
    /// percentage conversion
    pub async fn screen_size(&self) -> Result<(u32, u32)> {
        self.screen
            .get_or_try_init(|| self.bridge.screen_size(&self.device_id))
            .await
            .copied()
    }

    pub(crate) async fn shell(&self, command: &str) -> Result<String> {
        self.bridge
            .execute(
                &self.device_id,
                command,
                Duration::from_millis(self.config.command.command_timeout_ms),
            )
            .await
    }

    /// All nodes matching the selector in the current snapshot
    pub async fn query(&self, selector: &Selector, options: &SnapshotOptions) -> Result<Vec<UiNode>> {
        let snapshot = self.snapshot(options).await?;
        Ok(query(&snapshot.nodes, selector).into_iter().cloned().collect())
    }

    /// First matching node as `(snapshot, index)`; `None` when absent
    pub async fn find(
        &self,
        selector: &Selector,
        options: &SnapshotOptions,
    ) -> Result<Option<(Arc<Snapshot>, usize)>> {
        let snapshot = self.snapshot(options).await?;
        Ok(find_first(&snapshot.nodes, selector).map(|i| (snapshot, i)))
    }

    /// Tap a raw coordinate
    pub async fn tap_point(&self, x: i32, y: i32) -> Result<()> {
        self.shell(&input::tap(x, y)).await?;
        Ok(())
    }

    /// Resolve a matched node to its tap target and issue at most one tap.
    ///
    /// A `NoBounds` resolution is reported without a tap. A resolved target
    /// that itself lacks bounds is an invariant break and errors out.
    pub async fn tap_node(&self, nodes: &[UiNode], index: usize) -> Result<TapReport> {
        let resolution = resolve_tap_target(index, nodes)?;

        if !resolution.tappable() {
            return Ok(TapReport {
                resolution,
                point: None,
            });
        }

        let target = &nodes[resolution.node_index];
        let bounds = target
            .bounds
            .ok_or_else(|| AutomationError::MissingBounds(target.describe()))?;
        let (x, y) = bounds.center();

        debug!(index, resolved = resolution.node_index, x, y, "tap");
        self.tap_point(x, y).await?;

        Ok(TapReport {
            resolution,
            point: Some((x, y)),
        })
    }

    /// Find-and-tap through a selector. `Ok(None)` means nothing matched;
    /// that is an expected outcome, not an error.
    pub async fn tap_by_selector(&self, selector: &Selector) -> Result<Option<TapReport>> {
        let Some((snapshot, index)) = self.find(selector, &SnapshotOptions::fresh()).await? else {
            return Ok(None);
        };
        let report = self.tap_node(&snapshot.nodes, index).await?;
        // The tap changed the screen; whatever we cached is now suspect
        if report.point.is_some() {
            self.cache.invalidate(&self.device_id).await;
        }
        Ok(Some(report))
    }

    /// Tap a field found by resource id to focus it, then type into it.
    /// `Ok(false)` when no such field exists.
    pub async fn type_by_id(&self, resource_id: &str, text: &str) -> Result<bool> {
        let selector = Selector::resource_id(resource_id);
        let Some(report) = self.tap_by_selector(&selector).await? else {
            return Ok(false);
        };
        if report.point.is_none() {
            return Ok(false);
        }
        self.shell(&input::text(text)).await?;
        Ok(true)
    }

    /// Foreground activity as the device currently reports it
    pub async fn foreground_activity(&self) -> Result<Option<crate::bridge::ForegroundActivity>> {
        self.bridge.foreground_activity(&self.device_id).await
    }

    /// Classify login controls on the current screen
    pub async fn detect_login_fields(&self) -> Result<crate::login::LoginFields> {
        let snapshot = self.snapshot(&SnapshotOptions::fresh()).await?;
        Ok(crate::login::detect_login_fields(
            &snapshot.nodes,
            &self.config.login,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FallbackReason;
    use crate::test_support::FakeBridge;

    const LOGIN_DUMP: &str = r#"<hierarchy>
<node text="" resource-id="com.app:id/email" class="android.widget.EditText" clickable="true" bounds="[100,800][980,950]" />
<node text="" resource-id="com.app:id/password" class="android.widget.EditText" password="true" clickable="true" bounds="[100,1000][980,1150]" />
<node text="Login" resource-id="com.app:id/go" class="android.widget.Button" clickable="true" bounds="[100,1300][980,1450]" />
</hierarchy>"#;

    #[test]
    fn test_percent_px_round_trip() {
        for dimension in [480u32, 1080, 1440, 2400] {
            for percent in 0..=100 {
                let px = percent_to_px(percent as f64, dimension);
                let recovered = px_to_percent(px, dimension);
                assert!(
                    (recovered - percent as f64).abs() <= 1.0,
                    "{}% of {} -> {}px -> {}%",
                    percent,
                    dimension,
                    px,
                    recovered
                );
            }
        }
    }

    #[tokio::test]
    async fn test_tap_by_selector_issues_one_tap() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![LOGIN_DUMP]));
        let engine = UiAutomator::new(bridge.clone(), "dev");

        let report = engine
            .tap_by_selector(&Selector::text("Login"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.resolution.reason, FallbackReason::Direct);
        assert_eq!(report.point, Some((540, 1375)));
        assert_eq!(bridge.executed(), vec!["input tap 540 1375".to_string()]);
    }

    #[tokio::test]
    async fn test_tap_by_selector_not_found_is_none() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![LOGIN_DUMP]));
        let engine = UiAutomator::new(bridge.clone(), "dev");

        let report = engine
            .tap_by_selector(&Selector::text("No such label"))
            .await
            .unwrap();
        assert!(report.is_none());
        assert!(bridge.executed().is_empty());
    }

    #[tokio::test]
    async fn test_type_by_id_taps_then_types() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![LOGIN_DUMP]));
        let engine = UiAutomator::new(bridge.clone(), "dev");

        let typed = engine.type_by_id("email", "a@b.co").await.unwrap();
        assert!(typed);
        let commands = bridge.executed();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], "input tap 540 875");
        assert_eq!(commands[1], "input text 'a@b.co'");
    }

    #[tokio::test]
    async fn test_detect_login_fields_end_to_end() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![LOGIN_DUMP]));
        let engine = UiAutomator::new(bridge, "dev");

        let fields = engine.detect_login_fields().await.unwrap();
        assert_eq!(fields.email_field, Some(0));
        assert_eq!(fields.password_field, Some(1));
        assert_eq!(fields.submit_button, Some(2));
    }
}
