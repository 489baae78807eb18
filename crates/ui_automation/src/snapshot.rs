//! Snapshot capture and the per-device snapshot cache
//!
//! A snapshot is the engine's only view of the screen, and capturing one is
//! by far the most expensive round-trip, so the cache is consulted before
//! every selector operation. Entries are replaced wholesale on refresh and
//! never merged.

use crate::bridge::DeviceBridge;
use crate::error::{AutomationError, Result};
use crate::hierarchy::{parse_hierarchy, UiNode};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

/// FNV-1a 64-bit hash. Fast and non-cryptographic; used only to detect
/// content change between dumps, where collisions are acceptable.
pub fn content_hash(raw: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in raw.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Point-in-time capture of everything drawn on a device's screen
#[derive(Debug)]
pub struct Snapshot {
    pub raw_text: String,
    pub nodes: Vec<UiNode>,
    pub captured_at: DateTime<Utc>,
    pub device_id: String,
    pub activity_at_capture: Option<String>,
    pub content_hash: u64,
    /// Monotonic capture instant, used for age checks so wall-clock jumps
    /// cannot resurrect or expire entries
    taken: Instant,
}

impl Snapshot {
    pub fn age_ms(&self) -> u64 {
        self.taken.elapsed().as_millis() as u64
    }
}

/// Options controlling one cache lookup
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Entries older than this are refetched. Age equal to the limit still
    /// counts as fresh, so `max_age_ms = 0` can hit a just-stored entry.
    pub max_age_ms: u64,
    /// Refetch when the foreground activity no longer matches the one
    /// recorded at capture time
    pub invalidate_on_activity_change: bool,
    /// Bypass the cache entirely
    pub force_refresh: bool,
    /// Permit fetching on a miss; when false a miss is `SnapshotUnavailable`
    pub allow_fetch: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            max_age_ms: crate::config::ENGINE_DEFAULTS.snapshot.max_age_ms,
            invalidate_on_activity_change: true,
            force_refresh: false,
            allow_fetch: true,
        }
    }
}

impl SnapshotOptions {
    pub fn fresh() -> Self {
        Self {
            force_refresh: true,
            ..Default::default()
        }
    }
}

/// Explicit per-device snapshot cache, owned by the engine.
///
/// The supported contract is single-caller sequential use per device; the
/// internal mutex only guards the map itself for hosts that drive distinct
/// devices from separate tasks.
pub struct SnapshotCache {
    bridge: Arc<dyn DeviceBridge>,
    entries: Mutex<HashMap<String, Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new(bridge: Arc<dyn DeviceBridge>) -> Self {
        Self {
            bridge,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch-or-return the snapshot for one device.
    ///
    /// Check order: force refresh, then presence, then freshness, then
    /// activity. The activity check fails open: if the current foreground
    /// activity cannot be resolved the cached entry is treated as valid,
    /// which avoids refetch flapping on devices with unreadable dumpsys.
    pub async fn get(&self, device_id: &str, options: &SnapshotOptions) -> Result<Arc<Snapshot>> {
        if !options.force_refresh {
            if let Some(cached) = self.lookup_valid(device_id, options).await? {
                return Ok(cached);
            }
            if !options.allow_fetch {
                return Err(AutomationError::SnapshotUnavailable(device_id.to_string()));
            }
        }

        self.refresh(device_id).await
    }

    async fn lookup_valid(
        &self,
        device_id: &str,
        options: &SnapshotOptions,
    ) -> Result<Option<Arc<Snapshot>>> {
        let cached = {
            let entries = self.entries.lock().await;
            entries.get(device_id).cloned()
        };

        let Some(snapshot) = cached else {
            return Ok(None);
        };

        // Freshness precedes the activity check: an expired entry is stale
        // no matter what is in the foreground
        if snapshot.age_ms() > options.max_age_ms {
            debug!(device_id, age_ms = snapshot.age_ms(), "snapshot expired");
            return Ok(None);
        }

        if options.invalidate_on_activity_change {
            if let Some(recorded) = &snapshot.activity_at_capture {
                match self.bridge.foreground_activity(device_id).await {
                    Ok(Some(current)) => {
                        let current_name =
                            current.component.unwrap_or_else(|| current.package.clone());
                        if &current_name != recorded {
                            debug!(
                                device_id,
                                recorded, current_name, "activity changed, invalidating snapshot"
                            );
                            return Ok(None);
                        }
                    }
                    // Unresolvable activity: still valid (fail open)
                    Ok(None) => {}
                    Err(AutomationError::BridgeUnavailable(e)) => {
                        return Err(AutomationError::BridgeUnavailable(e))
                    }
                    Err(_) => {}
                }
            }
        }

        Ok(Some(snapshot))
    }

    /// Capture a new snapshot and replace the cache entry wholesale
    pub async fn refresh(&self, device_id: &str) -> Result<Arc<Snapshot>> {
        let raw = self.bridge.dump_hierarchy(device_id).await?;
        if raw.trim().is_empty() {
            return Err(AutomationError::EmptySnapshot);
        }

        let activity = match self.bridge.foreground_activity(device_id).await {
            Ok(Some(fg)) => Some(fg.component.unwrap_or(fg.package)),
            _ => None,
        };

        let nodes = parse_hierarchy(&raw);
        debug!(device_id, node_count = nodes.len(), "snapshot captured");

        let snapshot = Arc::new(Snapshot {
            content_hash: content_hash(&raw),
            raw_text: raw,
            nodes,
            captured_at: Utc::now(),
            device_id: device_id.to_string(),
            activity_at_capture: activity,
            taken: Instant::now(),
        });

        let mut entries = self.entries.lock().await;
        entries.insert(device_id.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the cached snapshot for one device
    pub async fn invalidate(&self, device_id: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(device_id);
    }

    /// Drop every cached snapshot
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
    }
}
