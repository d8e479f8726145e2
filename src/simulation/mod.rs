//! Channel contention simulation core.
//!
//! This module provides the complete in-process model of the shared V2X
//! radio channel. It integrates:
//! - Device registration and position tracking
//! - Message fragmentation into channel-contending sub-packages
//! - The sub-stepped contention loop with binary exponential backoff
//! - Collision arbitration with a capture-effect approximation
//! - Distance-based reception attenuation
//! - Package assembly, delivery queues and outcome statistics
//!
//! ## Module Organization
//!
//! - `types`: Core data structures (payloads, sub-packages, outcomes)
//! - `attenuation`: Distance math and the selectable drop curves
//! - `device`: Per-device state and the registry
//! - `stats`: Outcome counters and delay accounting
//! - `scheduler`: The `ChannelSimulator` driving everything
//!
//! ## Public API
//!
//! The main entry point is [`ChannelSimulator`], constructed by the host and
//! driven with `push_messages` / `run` / `pop_deliveries` once per outer
//! simulation step.

pub mod attenuation;
pub mod device;
pub mod scheduler;
pub mod stats;
pub mod types;

// Re-export the simulator for convenience
pub use scheduler::ChannelSimulator;

// Re-export commonly used types
pub use attenuation::AttenuationModel;
pub use stats::{ChannelTotals, DeviceReport, DeviceStats};
pub use types::{DeviceId, MessageCategory, Position, RSU_ID_OFFSET, V2xPayload};
