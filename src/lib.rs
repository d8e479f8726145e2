//! v2x-channel-simulator - shared-channel contention and message delivery
//! model for V2X traffic simulation.
//!
//! This crate models what happens between "a device wants to broadcast" and
//! "the receiver's application sees the message": channel contention between
//! many transmitters, binary exponential backoff with a bounded retry budget,
//! collision arbitration with a capture-effect approximation, distance-based
//! reception attenuation, fragmentation and reassembly, and the end-to-end
//! delay a message accumulates along the way.
//!
//! The simulated channel has one logical receiver (the ego vehicle) and any
//! number of transmitters: vehicle units broadcasting status messages and
//! roadside units broadcasting sensor snapshots, incident lists, signal
//! phases and map updates. The host drives the simulator once per outer
//! simulation step: push the step's application messages, run the sub-stepped
//! contention loop, pop whatever was delivered.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use v2x_channel_simulator::{
//!     ChannelSimulator, MessageCategory, Position, SimulationConfig, StatusBroadcast, V2xPayload,
//! };
//!
//! let mut sim = ChannelSimulator::with_seed(SimulationConfig::default(), 42);
//! sim.update_receiver_position(Position { x: 0.0, y: 0.0 });
//!
//! let mut batch = BTreeMap::new();
//! batch.insert(
//!     7,
//!     V2xPayload::Bsm(StatusBroadcast {
//!         vehicle_id: 7,
//!         position: Position { x: 12.0, y: 0.0 },
//!         speed_mps: 13.9,
//!         heading_deg: 90.0,
//!         timestamp_ms: 0.0,
//!     }),
//! );
//! sim.push_messages(batch);
//! sim.run();
//!
//! for (device_id, payload) in sim.pop_deliveries(MessageCategory::Bsm) {
//!     println!("delivered from {device_id}: {payload:?}");
//! }
//! ```
//!
//! # Reproducibility
//!
//! All randomness (contention order shuffles, backoff jitter, attenuation
//! rolls, startup phases) comes from one generator owned by the simulator
//! instance. Construct it with [`ChannelSimulator::with_seed`] and an
//! identical call sequence produces bit-identical deliveries and counters;
//! [`ChannelSimulator::new`] seeds from system entropy instead.

pub mod config;
pub mod scene;
pub mod simulation;

pub use config::SimulationConfig;
pub use simulation::attenuation::AttenuationModel;
pub use simulation::scheduler::ChannelSimulator;
pub use simulation::stats::{ChannelTotals, DeviceReport, DeviceStats};
pub use simulation::types::{
    DeviceId, LocalMapUpdate, MapApproach, MessageCategory, PhaseColor, Position, RSU_ID_OFFSET,
    SensedObject, SensorSnapshot, SignalPhase, SignalPhaseState, StatusBroadcast, TrafficEvent,
    TrafficEventList, V2xPayload,
};
