//! Per-device state and the device registry.
//!
//! A device is one transmitting participant (vehicle unit or roadside unit).
//! Devices are created lazily the first time the upstream feed mentions them
//! and live until the registry is cleared at scenario reset.

use std::collections::{HashMap, VecDeque};

use rand::Rng;
use rand::seq::SliceRandom;

use super::stats::DeviceStats;
use super::types::{DeviceId, PackageProgress, Position, SubPackage};

/// Exclusive upper bound of the startup-phase jitter in ticks. A new device's
/// first transmission is shifted by 0..=4 ticks so the fleet does not start
/// contending in lock-step.
pub const STARTUP_PHASE_TICKS: u64 = 5;

/// Distance-to-receiver placeholder until a device is first considered.
const INITIAL_RECEIVER_DISTANCE: f64 = 5_000.0;

/// One transmitting participant and all its bookkeeping.
#[derive(Debug)]
pub struct Device {
    pub id: DeviceId,
    /// Position snapshot, advanced once per outer step from the feed.
    pub position: Position,
    /// Per-device startup jitter in ticks, drawn once at registration.
    pub startup_phase: u64,
    /// How far this device listens when competing for the channel.
    pub consider_range: f64,
    /// Monotonically increasing master package counter.
    pub master_package_id: u32,
    /// Sub-packages waiting for a channel slot, oldest first.
    pub send_queue: VecDeque<SubPackage>,
    /// Resolution progress of packages whose fragments have left the queue.
    pub packages: HashMap<u32, PackageProgress>,
    /// Fully assembled deliveries awaiting the host's pop call.
    pub delivery_queue: VecDeque<SubPackage>,
    /// Transient: whether this device already transmitted in the running
    /// sub-step. Cleared at every sub-step start.
    pub transmitted_this_sub_step: bool,
    /// Transient: sub-packages of this device that reached the receiver in
    /// the running sub-step. Cleared at every sub-step start.
    pub arrived_this_sub_step: Vec<SubPackage>,
    /// Last observed distance to the receiver.
    pub receiver_distance: f64,
    pub stats: DeviceStats,
}

impl Device {
    pub fn new(id: DeviceId, position: Position, consider_range: f64, startup_phase: u64) -> Self {
        Device {
            id,
            position,
            startup_phase,
            consider_range,
            master_package_id: 0,
            send_queue: VecDeque::new(),
            packages: HashMap::new(),
            delivery_queue: VecDeque::new(),
            transmitted_this_sub_step: false,
            arrived_this_sub_step: Vec::new(),
            receiver_distance: INITIAL_RECEIVER_DISTANCE,
            stats: DeviceStats::default(),
        }
    }

    /// Refresh the new head-of-queue's delay baseline after the previous head
    /// left the queue (sent, evicted, or retired). A freshly queued successor
    /// must not appear to have been ready instantaneously: its wait is at
    /// least one tick, plus however long it already sat behind the old head.
    pub fn ready_next_sub_package(&mut self, now_ticks: u64) {
        let Some(head) = self.send_queue.front_mut() else {
            return;
        };
        if head.delay == 0 {
            head.delay = 1;
        }
        if now_ticks <= head.generate_time {
            return;
        }
        head.delay += now_ticks - head.generate_time;
    }

    /// Clear the transient per-sub-step channel state.
    pub fn clear_sub_step_state(&mut self) {
        self.transmitted_this_sub_step = false;
        self.arrived_this_sub_step.clear();
    }
}

/// Registry of every device seen so far, plus the iteration order that gets
/// reshuffled for each sub-step's contention round.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Device>,
    order: Vec<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    /// Insert a device on first sight. Idempotent: an already registered id
    /// is left untouched.
    pub fn register(&mut self, device: Device) {
        if self.devices.contains_key(&device.id) {
            return;
        }
        self.order.push(device.id);
        self.devices.insert(device.id, device);
    }

    pub fn values(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    /// Device ids in a deterministic (registration) order, for read paths
    /// that must not depend on hash-map iteration.
    pub fn ids(&self) -> &[DeviceId] {
        &self.order
    }

    /// Reshuffle the contention order and return a copy for this sub-step's
    /// round.
    pub fn shuffled_ids<R: Rng>(&mut self, rng: &mut R) -> Vec<DeviceId> {
        self.order.shuffle(rng);
        self.order.clone()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::{MessageCategory, StatusBroadcast, V2xPayload};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sub(generate_time: u64, delay: u64) -> SubPackage {
        SubPackage {
            device_id: 1,
            category: MessageCategory::Bsm,
            master_package_id: 0,
            fragment_index: 0,
            fragment_count: 1,
            generate_time,
            received_time: 0,
            delay,
            attempts: 0,
            backoff_ceiling: 50,
            payload: V2xPayload::Bsm(StatusBroadcast {
                vehicle_id: 1,
                position: Position::ORIGIN,
                speed_mps: 0.0,
                heading_deg: 0.0,
                timestamp_ms: 0.0,
            }),
        }
    }

    #[test]
    fn ready_next_gives_a_fresh_head_at_least_one_tick() {
        let mut device = Device::new(1, Position::ORIGIN, 200.0, 0);
        device.send_queue.push_back(sub(10, 0));
        device.ready_next_sub_package(10);
        // Same tick as generation: only the one-tick floor applies.
        assert_eq!(device.send_queue.front().unwrap().due_tick(), 11);
    }

    #[test]
    fn ready_next_accounts_for_time_spent_behind_the_old_head() {
        let mut device = Device::new(1, Position::ORIGIN, 200.0, 0);
        device.send_queue.push_back(sub(10, 0));
        device.ready_next_sub_package(25);
        // Floor to 1, then catch up by the 15 ticks already waited.
        assert_eq!(device.send_queue.front().unwrap().delay, 16);
    }

    #[test]
    fn ready_next_adds_elapsed_time_to_existing_delay() {
        let mut device = Device::new(1, Position::ORIGIN, 200.0, 0);
        device.send_queue.push_back(sub(10, 7));
        device.ready_next_sub_package(12);
        assert_eq!(device.send_queue.front().unwrap().delay, 9);
    }

    #[test]
    fn ready_next_on_empty_queue_is_a_no_op() {
        let mut device = Device::new(1, Position::ORIGIN, 200.0, 0);
        device.ready_next_sub_package(100);
        assert!(device.send_queue.is_empty());
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = DeviceRegistry::new();
        registry.register(Device::new(7, Position { x: 1.0, y: 1.0 }, 200.0, 3));
        registry.register(Device::new(7, Position { x: 9.0, y: 9.0 }, 200.0, 0));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(7).unwrap().startup_phase, 3);
        assert_eq!(registry.ids(), &[7]);
    }

    #[test]
    fn shuffle_preserves_membership() {
        let mut registry = DeviceRegistry::new();
        for id in 0..16 {
            registry.register(Device::new(id, Position::ORIGIN, 200.0, 0));
        }
        let mut rng = StdRng::seed_from_u64(11);
        let mut shuffled = registry.shuffled_ids(&mut rng);
        shuffled.sort_unstable();
        assert_eq!(shuffled, (0..16).collect::<Vec<_>>());
    }
}
