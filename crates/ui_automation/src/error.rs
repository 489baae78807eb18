/// Error types for device automation operations
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    /// The bridge tool (adb) is missing from the host entirely. Fatal,
    /// never retried.
    #[error("Bridge tool unavailable: {0}")]
    BridgeUnavailable(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Command timeout: {0}")]
    Timeout(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The hierarchy source produced no markup. Every engine operation
    /// depends on a non-empty snapshot, so this is a hard failure.
    #[error("Hierarchy dump returned no content")]
    EmptySnapshot,

    /// Cache miss without permission to refetch.
    #[error("No cached snapshot for device {0}")]
    SnapshotUnavailable(String),

    /// The resolver found zero clickable candidates for a tap.
    #[error("No tap target: {0}")]
    NoTapTarget(String),

    /// A resolved tap target has no bounds. This is an invariant break,
    /// not a "not yet present" condition.
    #[error("Resolved target has no bounds: {0}")]
    MissingBounds(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AutomationError>;
