//! Configuration module for the automation engine
//!
//! This module contains:
//! - `tuning`: env-overridable tuning knobs for snapshots, scrolling,
//!   the login classifier and the flow executor

mod tuning;

pub use tuning::{
    CommandTuning, EngineConfig, FlowTuning, LoginTuning, ScrollTuning, SnapshotTuning,
    ENGINE_DEFAULTS,
};
