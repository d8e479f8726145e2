//! Type definitions for the channel simulation.
//!
//! Contains the data structures shared across the simulation:
//! - Message categories and their application payloads
//! - Sub-packages (the unit that contends for the channel)
//! - Fragment outcomes and per-package resolution progress
//! - Positions and device identifiers

use serde::{Deserialize, Serialize};

/// Device identifier. Vehicle units use their upstream id as-is; roadside
/// units are shifted by [`RSU_ID_OFFSET`] into a distinct range of the same
/// id space.
pub type DeviceId = u32;

/// Sub-package identifier, `master_package_id * 10 + fragment_index`.
/// Valid because a package never holds more than [`MAX_FRAGMENTS`] fragments.
pub type SubPackageId = u32;

/// Offset added to roadside-unit ids so vehicles and roadside units share one
/// identifier space without clashing.
pub const RSU_ID_OFFSET: DeviceId = 10_000;

/// Nominal channel payload capacity of one sub-package in bytes. Application
/// messages larger than this are fragmented.
pub const FRAGMENT_CAPACITY_BYTES: usize = 150;

/// Upper bound on fragments per package. Also what keeps the
/// `master * 10 + index` sub-package id encoding collision-free.
pub const MAX_FRAGMENTS: u8 = 9;

/// Simple 2D position in planar world coordinates (distance units are
/// whatever the host feed uses, typically meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };
}

impl Default for Position {
    fn default() -> Self {
        Self::ORIGIN
    }
}

/// The five V2X message categories carried over the shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    /// Basic safety message: periodic vehicle status broadcast.
    Bsm,
    /// Roadside sensor snapshot: objects perceived by RSU sensors.
    Rsm,
    /// Roadside incident list: events on the covered road section.
    Rsi,
    /// Signal phase and timing for a controlled intersection.
    Spat,
    /// Local map update for an intersection's lane layout.
    Map,
}

impl MessageCategory {
    /// Whether this category originates from a roadside unit (and therefore
    /// uses the offset id range).
    pub fn is_roadside(self) -> bool {
        !matches!(self, MessageCategory::Bsm)
    }
}

/// Periodic vehicle status broadcast (BSM).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBroadcast {
    pub vehicle_id: u64,
    pub position: Position,
    pub speed_mps: f64,
    pub heading_deg: f64,
    /// Host-clock send time in milliseconds, stamped at delivery.
    pub timestamp_ms: f64,
}

/// One object perceived by a roadside sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensedObject {
    pub object_id: u64,
    pub position: Position,
    pub speed_mps: f64,
}

/// Roadside sensor snapshot (RSM).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Location of the emitting roadside unit.
    pub position: Position,
    pub objects: Vec<SensedObject>,
    pub timestamp_ms: f64,
}

/// One road event reported by a roadside unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEvent {
    pub event_id: u64,
    pub position: Position,
    pub description: String,
}

/// Roadside incident list (RSI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEventList {
    pub position: Position,
    pub events: Vec<TrafficEvent>,
    pub timestamp_ms: f64,
}

/// Signal head color for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseColor {
    Red,
    Yellow,
    Green,
}

/// State of one signal phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPhase {
    pub phase_id: u32,
    pub color: PhaseColor,
    pub remaining_ms: f64,
}

/// Signal phase and timing message (SPAT).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPhaseState {
    pub position: Position,
    pub intersection_id: u64,
    pub phases: Vec<SignalPhase>,
    pub timestamp_ms: f64,
}

/// One approach of an intersection in a local map update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapApproach {
    pub approach_id: u32,
    pub heading_deg: f64,
    pub lane_count: u32,
}

/// Local map update message (MAP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMapUpdate {
    pub position: Position,
    pub intersection_id: u64,
    pub approaches: Vec<MapApproach>,
    pub timestamp_ms: f64,
}

/// Application payload of one package, tagged by message category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum V2xPayload {
    Bsm(StatusBroadcast),
    Rsm(SensorSnapshot),
    Rsi(TrafficEventList),
    Spat(SignalPhaseState),
    Map(LocalMapUpdate),
}

impl V2xPayload {
    /// Category of this payload.
    pub fn category(&self) -> MessageCategory {
        match self {
            V2xPayload::Bsm(_) => MessageCategory::Bsm,
            V2xPayload::Rsm(_) => MessageCategory::Rsm,
            V2xPayload::Rsi(_) => MessageCategory::Rsi,
            V2xPayload::Spat(_) => MessageCategory::Spat,
            V2xPayload::Map(_) => MessageCategory::Map,
        }
    }

    /// Transmitter position at generation time, used to advance the device's
    /// position snapshot on push.
    pub fn position(&self) -> Position {
        match self {
            V2xPayload::Bsm(p) => p.position,
            V2xPayload::Rsm(p) => p.position,
            V2xPayload::Rsi(p) => p.position,
            V2xPayload::Spat(p) => p.position,
            V2xPayload::Map(p) => p.position,
        }
    }

    /// Stamp the host-clock send time reconstructed at delivery.
    pub fn set_timestamp_ms(&mut self, timestamp_ms: f64) {
        match self {
            V2xPayload::Bsm(p) => p.timestamp_ms = timestamp_ms,
            V2xPayload::Rsm(p) => p.timestamp_ms = timestamp_ms,
            V2xPayload::Rsi(p) => p.timestamp_ms = timestamp_ms,
            V2xPayload::Spat(p) => p.timestamp_ms = timestamp_ms,
            V2xPayload::Map(p) => p.timestamp_ms = timestamp_ms,
        }
    }

    /// Approximate encoded size in bytes, used only to derive the fragment
    /// count. Fixed header plus a per-element increment for list payloads.
    pub fn approximate_size(&self) -> usize {
        match self {
            V2xPayload::Bsm(_) => 56,
            V2xPayload::Rsm(p) => 24 + 24 * p.objects.len(),
            V2xPayload::Rsi(p) => 24 + 32 * p.events.len(),
            V2xPayload::Spat(p) => 24 + 16 * p.phases.len(),
            V2xPayload::Map(p) => 32 + 48 * p.approaches.len(),
        }
    }

    /// Number of sub-packages this payload fragments into, capped at
    /// [`MAX_FRAGMENTS`].
    pub fn fragment_count(&self) -> u8 {
        let fragments = self
            .approximate_size()
            .div_ceil(FRAGMENT_CAPACITY_BYTES)
            .max(1);
        fragments.min(MAX_FRAGMENTS as usize) as u8
    }
}

/// Final outcome of one fragment's trip over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Reached the receiver and survived the attenuation roll.
    Delivered,
    /// Lost to a simultaneous arrival from another device.
    Collided,
    /// Lost channel contention more times than the attempt budget allows.
    RetryExhausted,
    /// Evicted from an over-full send queue before transmission.
    QueueOverflow,
    /// Arrived alone but discarded by the distance attenuation model.
    DistanceDropped,
}

impl FragmentOutcome {
    pub fn is_failure(self) -> bool {
        self != FragmentOutcome::Delivered
    }
}

/// Resolution progress of one package, keyed by master package id per device.
/// Removed the instant every fragment has reported.
#[derive(Debug, Clone, Copy)]
pub struct PackageProgress {
    /// Fragments that have reported an outcome so far.
    pub reported: u8,
    /// Folded package status. `Delivered` only while no fragment has failed.
    pub status: FragmentOutcome,
}

impl PackageProgress {
    /// Start progress from the first fragment's outcome.
    pub fn first(outcome: FragmentOutcome) -> Self {
        PackageProgress {
            reported: 1,
            status: outcome,
        }
    }

    /// Fold a further fragment outcome into the package status. The first
    /// failure reason sticks; `Collided` takes precedence over everything
    /// and is never overwritten.
    pub fn record(&mut self, outcome: FragmentOutcome) {
        self.reported += 1;
        if outcome.is_failure()
            && (!self.status.is_failure() || outcome == FragmentOutcome::Collided)
        {
            self.status = outcome;
        }
    }
}

/// The unit that contends for the channel: one fragment of one application
/// message, owned by exactly one place at a time (send queue, the in-air
/// arrival list of a sub-step, or the delivery queue).
#[derive(Debug, Clone)]
pub struct SubPackage {
    pub device_id: DeviceId,
    pub category: MessageCategory,
    pub master_package_id: u32,
    pub fragment_index: u8,
    pub fragment_count: u8,
    /// Generation time in sub-step ticks (includes the device startup phase).
    pub generate_time: u64,
    /// Reception time in ticks; stamped when the owning package resolves.
    pub received_time: u64,
    /// Accumulated wait in ticks. The fragment is due for transmission at
    /// exactly `generate_time + delay`.
    pub delay: u64,
    /// Channel-access attempts so far.
    pub attempts: u8,
    /// Current backoff window upper bound in ticks; doubles per lost attempt.
    pub backoff_ceiling: u64,
    pub payload: V2xPayload,
}

impl SubPackage {
    /// Sub-package id within the owning device's id space.
    pub fn id(&self) -> SubPackageId {
        self.master_package_id * 10 + self.fragment_index as u32
    }

    /// Tick at which this fragment next contends for the channel.
    pub fn due_tick(&self) -> u64 {
        self.generate_time + self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bsm() -> V2xPayload {
        V2xPayload::Bsm(StatusBroadcast {
            vehicle_id: 1,
            position: Position { x: 1.0, y: 2.0 },
            speed_mps: 10.0,
            heading_deg: 0.0,
            timestamp_ms: 0.0,
        })
    }

    #[test]
    fn status_broadcast_is_a_single_fragment() {
        assert_eq!(bsm().fragment_count(), 1);
    }

    #[test]
    fn fragment_count_grows_with_payload_and_caps() {
        let snapshot = |n: usize| {
            V2xPayload::Rsm(SensorSnapshot {
                position: Position::ORIGIN,
                objects: (0..n as u64)
                    .map(|object_id| SensedObject {
                        object_id,
                        position: Position::ORIGIN,
                        speed_mps: 0.0,
                    })
                    .collect(),
                timestamp_ms: 0.0,
            })
        };
        assert_eq!(snapshot(0).fragment_count(), 1);
        assert!(snapshot(20).fragment_count() > 1);
        // 200 objects is far past the cap
        assert_eq!(snapshot(200).fragment_count(), MAX_FRAGMENTS);
    }

    #[test]
    fn sub_package_id_encodes_master_and_index() {
        let sub = SubPackage {
            device_id: 3,
            category: MessageCategory::Bsm,
            master_package_id: 12,
            fragment_index: 4,
            fragment_count: 5,
            generate_time: 0,
            received_time: 0,
            delay: 0,
            attempts: 0,
            backoff_ceiling: 50,
            payload: bsm(),
        };
        assert_eq!(sub.id(), 124);
        assert_eq!(sub.id() / 10, 12);
    }

    #[test]
    fn first_failure_reason_sticks() {
        let mut progress = PackageProgress::first(FragmentOutcome::RetryExhausted);
        progress.record(FragmentOutcome::DistanceDropped);
        assert_eq!(progress.status, FragmentOutcome::RetryExhausted);
        assert_eq!(progress.reported, 2);
    }

    #[test]
    fn collision_overrides_and_is_never_overwritten() {
        let mut progress = PackageProgress::first(FragmentOutcome::QueueOverflow);
        progress.record(FragmentOutcome::Collided);
        assert_eq!(progress.status, FragmentOutcome::Collided);
        progress.record(FragmentOutcome::RetryExhausted);
        assert_eq!(progress.status, FragmentOutcome::Collided);
        progress.record(FragmentOutcome::Delivered);
        assert_eq!(progress.status, FragmentOutcome::Collided);
    }

    #[test]
    fn success_never_overwrites_a_failure() {
        let mut progress = PackageProgress::first(FragmentOutcome::Delivered);
        progress.record(FragmentOutcome::Delivered);
        assert_eq!(progress.status, FragmentOutcome::Delivered);
        progress.record(FragmentOutcome::DistanceDropped);
        assert_eq!(progress.status, FragmentOutcome::DistanceDropped);
        progress.record(FragmentOutcome::Delivered);
        assert_eq!(progress.status, FragmentOutcome::DistanceDropped);
    }

    #[test]
    fn roadside_categories() {
        assert!(!MessageCategory::Bsm.is_roadside());
        for category in [
            MessageCategory::Rsm,
            MessageCategory::Rsi,
            MessageCategory::Spat,
            MessageCategory::Map,
        ] {
            assert!(category.is_roadside());
        }
    }
}
