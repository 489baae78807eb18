//! Poll-until-condition and scroll-until-found primitives
//!
//! Polling is the only real way to observe device state, so every wait is a
//! capture/evaluate/sleep loop. Deadlines are explicit `Deadline` values
//! carrying a cooperative cancel flag, so a host can abort a long wait
//! without killing the process. Timing out is an expected outcome: these
//! functions report `found = false` with the last observed state rather
//! than erroring.

use crate::bridge::input;
use crate::engine::{percent_to_px, UiAutomator};
use crate::error::Result;
use crate::selector::{query, Comparator, Selector};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Shared cancel flag for one wait loop
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Explicit deadline threaded through every poll loop. A loop terminates on
/// condition-met, deadline, or cancellation; nothing else.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    expires_at: Instant,
    cancel: CancelHandle,
}

impl Deadline {
    pub fn after_ms(timeout_ms: u64) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires_at: started + Duration::from_millis(timeout_ms),
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn reached(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.expires_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Common knobs for one wait loop; defaults come from the engine config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitOptions {
    pub timeout_ms: Option<u64>,
    pub interval_ms: Option<u64>,
    #[serde(skip)]
    pub cancel: Option<CancelHandle>,
}

impl WaitOptions {
    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms: Some(timeout_ms),
            ..Default::default()
        }
    }
}

/// Outcome of a presence/absence wait
#[derive(Debug, Clone, Serialize)]
pub struct WaitResult {
    pub found: bool,
    /// Matches in the last observed snapshot
    pub matches: usize,
    pub elapsed_ms: u64,
}

/// Outcome of a node-count wait
#[derive(Debug, Clone, Serialize)]
pub struct CountWaitResult {
    pub satisfied: bool,
    pub last_count: usize,
    pub elapsed_ms: u64,
}

/// Outcome of an activity/package wait
#[derive(Debug, Clone, Serialize)]
pub struct ActivityWaitResult {
    pub found: bool,
    /// Last observed foreground activity, if any could be resolved
    pub activity: Option<String>,
    pub elapsed_ms: u64,
}

/// Outcome of a stability wait
#[derive(Debug, Clone, Serialize)]
pub struct StabilityResult {
    pub settled: bool,
    pub snapshots_taken: u32,
    pub elapsed_ms: u64,
}

/// Which way new content should scroll into view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Outcome of a scroll-until-found loop
#[derive(Debug, Clone, Serialize)]
pub struct ScrollResult {
    pub found: bool,
    pub scrolls_performed: u32,
    /// Two consecutive dumps were textually identical: the scrollable
    /// extent is used up
    pub exhausted: bool,
}

impl UiAutomator {
    fn wait_params(&self, options: &WaitOptions) -> (Deadline, Duration) {
        let timeout = options
            .timeout_ms
            .unwrap_or(self.config().snapshot.default_wait_timeout_ms);
        let interval = options
            .interval_ms
            .unwrap_or(self.config().snapshot.poll_interval_ms);
        let mut deadline = Deadline::after_ms(timeout);
        if let Some(cancel) = &options.cancel {
            deadline = deadline.with_cancel(cancel.clone());
        }
        (deadline, Duration::from_millis(interval))
    }

    /// Wait until at least one node matches the selector
    pub async fn wait_for(&self, selector: &Selector, options: &WaitOptions) -> Result<WaitResult> {
        self.wait_until(selector, options, |count| count > 0).await
    }

    /// Wait until no node matches the selector
    pub async fn wait_for_gone(
        &self,
        selector: &Selector,
        options: &WaitOptions,
    ) -> Result<WaitResult> {
        let result = self.wait_until(selector, options, |count| count == 0).await?;
        // For an absence wait, "found" means the condition held
        Ok(result)
    }

    async fn wait_until(
        &self,
        selector: &Selector,
        options: &WaitOptions,
        condition: impl Fn(usize) -> bool,
    ) -> Result<WaitResult> {
        let (deadline, interval) = self.wait_params(options);

        loop {
            let snapshot = self.fresh_snapshot().await?;
            let matches = query(&snapshot.nodes, selector).len();

            if condition(matches) {
                return Ok(WaitResult {
                    found: true,
                    matches,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            if deadline.reached() {
                debug!(%selector, matches, "wait timed out");
                return Ok(WaitResult {
                    found: false,
                    matches,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Poll until the match count satisfies the comparator. Always reports
    /// the last observed count.
    pub async fn wait_for_node_count(
        &self,
        selector: &Selector,
        target: usize,
        comparator: Comparator,
        options: &WaitOptions,
    ) -> Result<CountWaitResult> {
        let (deadline, interval) = self.wait_params(options);

        loop {
            let snapshot = self.fresh_snapshot().await?;
            let count = query(&snapshot.nodes, selector).len();

            if comparator.holds(count, target) {
                return Ok(CountWaitResult {
                    satisfied: true,
                    last_count: count,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            if deadline.reached() {
                return Ok(CountWaitResult {
                    satisfied: false,
                    last_count: count,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn observe_activity(&self) -> Result<Option<String>> {
        // Activity polling goes straight to the bridge; the snapshot cache
        // is irrelevant here
        let fg = self.bridge().foreground_activity(self.device_id()).await?;
        Ok(fg.map(|a| a.component.unwrap_or(a.package)))
    }

    /// Wait until the foreground activity name contains `expected`
    pub async fn wait_for_activity(
        &self,
        expected: &str,
        options: &WaitOptions,
    ) -> Result<ActivityWaitResult> {
        self.wait_activity_where(options, |activity| activity.contains(expected))
            .await
    }

    /// Wait until the foreground package matches `package` exactly
    pub async fn wait_for_package(
        &self,
        package: &str,
        options: &WaitOptions,
    ) -> Result<ActivityWaitResult> {
        self.wait_activity_where(options, |activity| {
            activity.split('/').next() == Some(package)
        })
        .await
    }

    /// Wait until the foreground activity differs from what it was when the
    /// wait began
    pub async fn wait_for_activity_change(
        &self,
        options: &WaitOptions,
    ) -> Result<ActivityWaitResult> {
        let initial = self.observe_activity().await?;
        self.wait_activity_where(options, move |activity| {
            initial.as_deref() != Some(activity)
        })
        .await
    }

    async fn wait_activity_where(
        &self,
        options: &WaitOptions,
        condition: impl Fn(&str) -> bool,
    ) -> Result<ActivityWaitResult> {
        let (deadline, interval) = self.wait_params(options);

        loop {
            let activity = self.observe_activity().await?;

            if let Some(name) = &activity {
                if condition(name) {
                    return Ok(ActivityWaitResult {
                        found: true,
                        activity,
                        elapsed_ms: deadline.elapsed_ms(),
                    });
                }
            }
            if deadline.reached() {
                return Ok(ActivityWaitResult {
                    found: false,
                    activity,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Wait until the UI stops changing: N consecutive dumps with the same
    /// content hash count as settled
    pub async fn wait_for_ui_stable(&self, options: &WaitOptions) -> Result<StabilityResult> {
        let (deadline, interval) = self.wait_params(options);
        let required = self.config().snapshot.stability_snapshots.max(1);

        let mut last_hash: Option<u64> = None;
        let mut consecutive = 0u32;
        let mut taken = 0u32;

        loop {
            let snapshot = self.fresh_snapshot().await?;
            taken += 1;

            if last_hash == Some(snapshot.content_hash) {
                consecutive += 1;
            } else {
                consecutive = 1;
                last_hash = Some(snapshot.content_hash);
            }

            if consecutive >= required {
                return Ok(StabilityResult {
                    settled: true,
                    snapshots_taken: taken,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            if deadline.reached() {
                return Ok(StabilityResult {
                    settled: false,
                    snapshots_taken: taken,
                    elapsed_ms: deadline.elapsed_ms(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One directional swipe sized as a percentage of the screen extent,
    /// centered on the screen
    pub async fn scroll(&self, direction: ScrollDirection, percent: u32) -> Result<()> {
        let (w, h) = self.screen_size().await?;
        let (x1, y1, x2, y2) = swipe_coords(direction, percent, w, h);
        self.shell(&input::swipe(x1, y1, x2, y2, Some(300))).await?;
        Ok(())
    }

    /// Scroll until the selector matches, bounded by `max_scrolls` and by
    /// scroll exhaustion (two consecutive identical dumps)
    pub async fn scroll_until(
        &self,
        selector: &Selector,
        direction: ScrollDirection,
    ) -> Result<ScrollResult> {
        let percent = self.config().scroll.scroll_percent;
        let max_scrolls = self.config().scroll.max_scrolls;
        let settle = Duration::from_millis(self.config().scroll.scroll_settle_ms);

        let mut previous_raw: Option<String> = None;
        let mut scrolls = 0u32;

        loop {
            let snapshot = self.fresh_snapshot().await?;

            if query(&snapshot.nodes, selector).first().is_some() {
                return Ok(ScrollResult {
                    found: true,
                    scrolls_performed: scrolls,
                    exhausted: false,
                });
            }

            if previous_raw.as_deref() == Some(snapshot.raw_text.as_str()) {
                debug!(%selector, scrolls, "scroll exhausted");
                return Ok(ScrollResult {
                    found: false,
                    scrolls_performed: scrolls,
                    exhausted: true,
                });
            }

            if scrolls >= max_scrolls {
                return Ok(ScrollResult {
                    found: false,
                    scrolls_performed: scrolls,
                    exhausted: false,
                });
            }

            previous_raw = Some(snapshot.raw_text.clone());
            self.scroll(direction, percent).await?;
            scrolls += 1;
            tokio::time::sleep(settle).await;
        }
    }
}

/// Swipe start/end for scrolling new content into view from `direction`.
/// Revealing lower content means the finger travels upward, and so on.
fn swipe_coords(direction: ScrollDirection, percent: u32, w: u32, h: u32) -> (i32, i32, i32, i32) {
    let cx = (w / 2) as i32;
    let cy = (h / 2) as i32;

    match direction {
        ScrollDirection::Down | ScrollDirection::Up => {
            let half = percent_to_px(percent as f64 / 2.0, h).min(cy - 1);
            match direction {
                ScrollDirection::Down => (cx, cy + half, cx, cy - half),
                _ => (cx, cy - half, cx, cy + half),
            }
        }
        ScrollDirection::Right | ScrollDirection::Left => {
            let half = percent_to_px(percent as f64 / 2.0, w).min(cx - 1);
            match direction {
                ScrollDirection::Right => (cx + half, cy, cx - half, cy),
                _ => (cx - half, cy, cx + half, cy),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::test_support::FakeBridge;

    const EMPTY: &str = r#"<hierarchy><node text="nothing here" bounds="[0,0][10,10]" /></hierarchy>"#;
    const TARGET: &str =
        r#"<hierarchy><node text="Loaded!" clickable="true" bounds="[0,0][10,10]" /></hierarchy>"#;

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.snapshot.poll_interval_ms = 20;
        config.snapshot.default_wait_timeout_ms = 400;
        config.scroll.scroll_settle_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_wait_for_matches_on_third_poll() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![EMPTY, EMPTY, TARGET]));
        let engine = UiAutomator::new(bridge, "dev");

        let options = WaitOptions {
            timeout_ms: Some(1000),
            interval_ms: Some(250),
            cancel: None,
        };
        let result = engine
            .wait_for(&Selector::text("Loaded!"), &options)
            .await
            .unwrap();
        assert!(result.found);
        assert_eq!(result.matches, 1);
        // Two sleeps of 250ms before the matching poll
        assert!(
            result.elapsed_ms >= 250 && result.elapsed_ms <= 750,
            "elapsed {}ms",
            result.elapsed_ms
        );
    }

    #[tokio::test]
    async fn test_wait_for_timeout_reports_last_state() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![EMPTY]));
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for(&Selector::text("Loaded!"), &WaitOptions::timeout(100))
            .await
            .unwrap();
        assert!(!result.found);
        assert_eq!(result.matches, 0);
        assert!(result.elapsed_ms >= 100);
    }

    #[tokio::test]
    async fn test_wait_for_gone() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![TARGET, TARGET, EMPTY]));
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for_gone(&Selector::text("Loaded!"), &WaitOptions::default())
            .await
            .unwrap();
        assert!(result.found);
        assert_eq!(result.matches, 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![EMPTY]));
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let cancel = CancelHandle::default();
        cancel.cancel();
        let options = WaitOptions {
            timeout_ms: Some(60_000),
            interval_ms: Some(10),
            cancel: Some(cancel),
        };
        let start = Instant::now();
        let result = engine.wait_for(&Selector::text("never"), &options).await.unwrap();
        assert!(!result.found);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_for_node_count_gte() {
        let two = r#"<hierarchy><node text="row" /><node text="row" /></hierarchy>"#;
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![EMPTY, two]));
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for_node_count(
                &Selector::text("row"),
                2,
                Comparator::Gte,
                &WaitOptions::default(),
            )
            .await
            .unwrap();
        assert!(result.satisfied);
        assert_eq!(result.last_count, 2);
    }

    #[tokio::test]
    async fn test_wait_for_activity() {
        let bridge = Arc::new(
            FakeBridge::new()
                .with_dumps(vec![EMPTY])
                .with_activities(vec![Some("com.app/.Splash"), Some("com.app/.Home")]),
        );
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for_activity(".Home", &WaitOptions::default())
            .await
            .unwrap();
        assert!(result.found);
        assert_eq!(result.activity.as_deref(), Some("com.app/.Home"));
    }

    #[tokio::test]
    async fn test_wait_for_activity_change() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![EMPTY]).with_activities(vec![
            Some("com.app/.Splash"), // initial observation
            Some("com.app/.Splash"),
            Some("com.app/.Main"),
        ]));
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for_activity_change(&WaitOptions::default())
            .await
            .unwrap();
        assert!(result.found);
        assert_eq!(result.activity.as_deref(), Some("com.app/.Main"));
    }

    #[tokio::test]
    async fn test_wait_for_package_timeout() {
        let bridge = Arc::new(
            FakeBridge::new()
                .with_dumps(vec![EMPTY])
                .with_activities(vec![Some("com.other/.Main")]),
        );
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for_package("com.app", &WaitOptions::timeout(80))
            .await
            .unwrap();
        assert!(!result.found);
        assert_eq!(result.activity.as_deref(), Some("com.other/.Main"));
    }

    #[tokio::test]
    async fn test_ui_stable_after_consecutive_identical_dumps() {
        let changing = r#"<hierarchy><node text="spinner frame 1" /></hierarchy>"#;
        let bridge = Arc::new(
            FakeBridge::new().with_dumps(vec![changing, EMPTY, EMPTY, EMPTY, EMPTY]),
        );
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .wait_for_ui_stable(&WaitOptions::timeout(2000))
            .await
            .unwrap();
        assert!(result.settled);
        // One changing dump, then three identical ones
        assert_eq!(result.snapshots_taken, 4);
    }

    #[tokio::test]
    async fn test_scroll_until_found() {
        let bridge = Arc::new(
            FakeBridge::new()
                .with_dumps(vec![EMPTY, r#"<hierarchy><node text="mid" /></hierarchy>"#, TARGET]),
        );
        let engine = UiAutomator::with_config(bridge.clone(), "dev", fast_config());

        let result = engine
            .scroll_until(&Selector::text("Loaded!"), ScrollDirection::Down)
            .await
            .unwrap();
        assert!(result.found);
        assert_eq!(result.scrolls_performed, 2);
        // Every scroll is one swipe command
        let swipes: Vec<_> = bridge
            .executed()
            .into_iter()
            .filter(|c| c.starts_with("input swipe"))
            .collect();
        assert_eq!(swipes.len(), 2);
    }

    #[tokio::test]
    async fn test_scroll_until_exhausted_on_identical_dumps() {
        let bridge = Arc::new(FakeBridge::new().with_dumps(vec![EMPTY, EMPTY]));
        let engine = UiAutomator::with_config(bridge, "dev", fast_config());

        let result = engine
            .scroll_until(&Selector::text("never"), ScrollDirection::Down)
            .await
            .unwrap();
        assert!(!result.found);
        assert!(result.exhausted);
        assert_eq!(result.scrolls_performed, 1);
    }

    #[test]
    fn test_swipe_coords_directions() {
        // 1080x2400, 60 percent: vertical half-span 720, horizontal 324
        let (x1, y1, x2, y2) = swipe_coords(ScrollDirection::Down, 60, 1080, 2400);
        assert_eq!((x1, x2), (540, 540));
        assert!(y1 > y2, "reveal-down swipes upward");
        assert_eq!(y1 - y2, 1440);

        let (x1, y1, x2, y2) = swipe_coords(ScrollDirection::Right, 60, 1080, 2400);
        assert_eq!((y1, y2), (1200, 1200));
        assert!(x1 > x2, "reveal-right swipes leftward");
    }
}
