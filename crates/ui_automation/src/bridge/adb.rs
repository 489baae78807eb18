//! ADB implementation of the device bridge

use crate::bridge::{DeviceBridge, ForegroundActivity};
use crate::error::{AutomationError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

lazy_static! {
    static ref WM_SIZE_RE: Regex =
        Regex::new(r"(Override|Physical) size:\s*(\d+)x(\d+)").expect("static regex");
    static ref FOCUS_RE: Regex =
        Regex::new(r"(?:mCurrentFocus|mFocusedApp|mResumedActivity)[^\n]*?([A-Za-z][\w.]*)/([^\s}]+)")
            .expect("static regex");
}

/// Information about a connected device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: String,
    pub status: String,
    pub model: Option<String>,
}

/// Production bridge shelling out to the adb binary
pub struct AdbBridge {
    adb_path: String,
}

impl AdbBridge {
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
        }
    }

    /// Use a custom adb binary instead of whatever is on PATH
    pub fn with_path(adb_path: String) -> Self {
        Self { adb_path }
    }

    /// Run `adb [-s id] <args…>` with a timeout, returning raw stdout and
    /// stderr. ENOENT on spawn means the adb binary itself is missing.
    async fn run_adb(
        &self,
        device_id: Option<&str>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<(std::process::Output, String, String)> {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(id) = device_id {
            cmd.arg("-s").arg(id);
        }
        for arg in args {
            cmd.arg(arg);
        }

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                AutomationError::Timeout(format!(
                    "adb {} timed out after {}ms",
                    args.first().copied().unwrap_or(""),
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AutomationError::BridgeUnavailable(format!(
                        "{} is not installed or not in PATH",
                        self.adb_path
                    ))
                } else {
                    AutomationError::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Ok((output, stdout, stderr))
    }

    /// List all connected devices via `adb devices -l`
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let (_, stdout, _) = self
            .run_adb(None, &["devices", "-l"], Duration::from_secs(5))
            .await?;

        let mut devices = Vec::new();
        for line in stdout.lines().skip(1) {
            // Skip header line
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                let mut model = None;
                for part in &parts[2..] {
                    if let Some(rest) = part.strip_prefix("model:") {
                        model = Some(rest.to_string());
                        break;
                    }
                }

                devices.push(DeviceInfo {
                    device_id: parts[0].to_string(),
                    status: parts[1].to_string(),
                    model,
                });
            }
        }

        Ok(devices)
    }
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn execute(&self, device_id: &str, command: &str, timeout: Duration) -> Result<String> {
        debug!(device_id, command, "adb shell");
        let (output, stdout, stderr) = self
            .run_adb(Some(device_id), &["shell", command], timeout)
            .await?;

        if !output.status.success() {
            let combined = format!("{}{}", stdout, stderr);
            return Err(AutomationError::CommandFailed(combined.trim().to_string()));
        }

        Ok(stdout.trim().to_string())
    }

    async fn dump_hierarchy(&self, device_id: &str) -> Result<String> {
        let (output, stdout, stderr) = self
            .run_adb(
                Some(device_id),
                &["exec-out", "uiautomator", "dump", "/dev/tty"],
                Duration::from_millis(crate::config::ENGINE_DEFAULTS.command.dump_timeout_ms),
            )
            .await?;

        // uiautomator is known to exit non-zero while still writing a full
        // hierarchy to the tty. Honor captured-output-despite-exit-code for
        // this one command only, keyed on the markup actually being present.
        if !output.status.success() && !stdout.contains("<hierarchy") {
            let combined = format!("{}{}", stdout, stderr);
            warn!(device_id, "uiautomator dump failed: {}", combined.trim());
            return Err(AutomationError::CommandFailed(combined.trim().to_string()));
        }

        // Strip the trailing "UI hierchary dumped to: …" status line
        let markup = match stdout.find("</hierarchy>") {
            Some(end) => &stdout[..end + "</hierarchy>".len()],
            None => stdout.trim(),
        };

        if markup.trim().is_empty() {
            return Err(AutomationError::EmptySnapshot);
        }

        Ok(markup.to_string())
    }

    async fn foreground_activity(&self, device_id: &str) -> Result<Option<ForegroundActivity>> {
        let stdout = match self
            .execute(
                device_id,
                "dumpsys activity activities | grep -E 'mResumedActivity|mFocusedApp' || dumpsys window windows | grep mCurrentFocus",
                Duration::from_secs(5),
            )
            .await
        {
            Ok(out) => out,
            Err(AutomationError::BridgeUnavailable(e)) => {
                return Err(AutomationError::BridgeUnavailable(e))
            }
            // Fail open: an unreadable activity must not break consumers
            // that only use it for staleness checks
            Err(e) => {
                debug!(device_id, "foreground activity unresolvable: {}", e);
                return Ok(None);
            }
        };

        match FOCUS_RE.captures(&stdout) {
            Some(caps) => {
                let package = caps[1].to_string();
                let component = Some(format!("{}/{}", &caps[1], &caps[2]));
                Ok(Some(ForegroundActivity { package, component }))
            }
            None => Ok(None),
        }
    }

    async fn screen_size(&self, device_id: &str) -> Result<(u32, u32)> {
        let stdout = self
            .execute(device_id, "wm size", Duration::from_secs(5))
            .await?;

        // Prefer Override size: it reflects the active resolution when the
        // user has resized the display
        let mut physical = None;
        let mut override_size = None;
        for caps in WM_SIZE_RE.captures_iter(&stdout) {
            let w: u32 = caps[2].parse().map_err(|_| {
                AutomationError::ParseError(format!("bad wm size output: {}", stdout))
            })?;
            let h: u32 = caps[3].parse().map_err(|_| {
                AutomationError::ParseError(format!("bad wm size output: {}", stdout))
            })?;
            if &caps[1] == "Override" {
                override_size = Some((w, h));
            } else {
                physical = Some((w, h));
            }
        }

        override_size.or(physical).ok_or_else(|| {
            AutomationError::ParseError(format!("cannot parse screen size from: {}", stdout))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wm_size_regex() {
        let out = "Physical size: 1080x2400\nOverride size: 720x1600";
        let sizes: Vec<_> = WM_SIZE_RE
            .captures_iter(out)
            .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string()))
            .collect();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[1].0, "Override");
        assert_eq!(sizes[1].1, "720");
    }

    #[test]
    fn test_focus_regex() {
        let out = "  mResumedActivity: ActivityRecord{1234 u0 com.example.app/.MainActivity t42}";
        let caps = FOCUS_RE.captures(out).unwrap();
        assert_eq!(&caps[1], "com.example.app");
        assert_eq!(&caps[2], ".MainActivity");
    }

    #[test]
    fn test_focus_regex_window_line() {
        let out = "  mCurrentFocus=Window{ab12cd u0 com.example.app/com.example.app.Main}";
        let caps = FOCUS_RE.captures(out).unwrap();
        assert_eq!(&caps[1], "com.example.app");
        assert_eq!(&caps[2], "com.example.app.Main");
    }
}
