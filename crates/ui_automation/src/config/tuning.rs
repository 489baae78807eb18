//! Tuning configuration for engine operations
//!
//! Every constant that shapes a heuristic or a poll loop lives here as a
//! named, env-overridable field rather than a hard invariant buried in code.

use lazy_static::lazy_static;
use std::env;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Snapshot caching and polling configuration
#[derive(Debug, Clone)]
pub struct SnapshotTuning {
    /// Cached snapshots older than this are refetched
    pub max_age_ms: u64,
    /// Sleep between poll iterations in wait loops
    pub poll_interval_ms: u64,
    /// Default deadline for wait operations
    pub default_wait_timeout_ms: u64,
    /// Consecutive identical dumps required before the UI counts as settled
    pub stability_snapshots: u32,
}

impl Default for SnapshotTuning {
    fn default() -> Self {
        Self {
            max_age_ms: env_u64("DROIDPILOT_SNAPSHOT_MAX_AGE_MS", 3000),
            poll_interval_ms: env_u64("DROIDPILOT_POLL_INTERVAL_MS", 250),
            default_wait_timeout_ms: env_u64("DROIDPILOT_WAIT_TIMEOUT_MS", 5000),
            stability_snapshots: env_u32("DROIDPILOT_STABILITY_SNAPSHOTS", 3),
        }
    }
}

/// Device round-trip configuration
#[derive(Debug, Clone)]
pub struct CommandTuning {
    /// Timeout for ordinary shell round-trips
    pub command_timeout_ms: u64,
    /// Timeout for hierarchy dumps, which are much slower than input events
    pub dump_timeout_ms: u64,
}

impl Default for CommandTuning {
    fn default() -> Self {
        Self {
            command_timeout_ms: env_u64("DROIDPILOT_COMMAND_TIMEOUT_MS", 10_000),
            dump_timeout_ms: env_u64("DROIDPILOT_DUMP_TIMEOUT_MS", 15_000),
        }
    }
}

/// Scroll loop configuration
#[derive(Debug, Clone)]
pub struct ScrollTuning {
    /// Swipe length as a percentage of the screen extent in the scroll axis
    pub scroll_percent: u32,
    /// Upper bound on swipes in a scroll-until-found loop
    pub max_scrolls: u32,
    /// Settle time after each swipe before re-dumping
    pub scroll_settle_ms: u64,
}

impl Default for ScrollTuning {
    fn default() -> Self {
        Self {
            scroll_percent: env_u32("DROIDPILOT_SCROLL_PERCENT", 60),
            max_scrolls: env_u32("DROIDPILOT_MAX_SCROLLS", 8),
            scroll_settle_ms: env_u64("DROIDPILOT_SCROLL_SETTLE_MS", 500),
        }
    }
}

/// Login field classifier configuration
#[derive(Debug, Clone)]
pub struct LoginTuning {
    /// How far a submit candidate's top may sit above the password field's
    /// bottom edge and still count as "below" it, in pixels
    pub submit_y_tolerance_px: i32,
    /// A size-based submit candidate must beat the runner-up's area by this
    /// factor to be accepted
    pub submit_area_margin: f64,
}

impl Default for LoginTuning {
    fn default() -> Self {
        Self {
            submit_y_tolerance_px: env_u32("DROIDPILOT_SUBMIT_Y_TOLERANCE_PX", 16) as i32,
            submit_area_margin: env_f64("DROIDPILOT_SUBMIT_AREA_MARGIN", 1.4),
        }
    }
}

/// Flow executor configuration
#[derive(Debug, Clone)]
pub struct FlowTuning {
    /// Retries applied to steps that do not carry their own count
    pub default_step_retries: u32,
    /// Fixed delay between retry attempts
    pub retry_delay_ms: u64,
}

impl Default for FlowTuning {
    fn default() -> Self {
        Self {
            default_step_retries: env_u32("DROIDPILOT_STEP_RETRIES", 0),
            retry_delay_ms: env_u64("DROIDPILOT_RETRY_DELAY_MS", 500),
        }
    }
}

/// Master engine configuration, owned by the engine and passed by reference
/// to every consumer
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub snapshot: SnapshotTuning,
    pub command: CommandTuning,
    pub scroll: ScrollTuning,
    pub login: LoginTuning,
    pub flow: FlowTuning,
}

lazy_static! {
    /// Process-wide defaults, seeded from the environment once
    pub static ref ENGINE_DEFAULTS: EngineConfig = EngineConfig::default();
}
