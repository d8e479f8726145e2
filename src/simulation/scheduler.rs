//! The sub-stepped channel contention scheduler.
//!
//! One [`ChannelSimulator`] instance owns every piece of mutable simulation
//! state: the device registry, pending send queues, package resolution tables
//! and the random source. The host drives it with the same cadence the
//! surrounding platform uses:
//!
//! 1) `push_messages` once per outer step per message batch — fragments the
//!    application payloads and enqueues them,
//! 2) `run` — executes the sub-stepped contention loop for one outer step,
//! 3) `pop_deliveries` — drains what reached the receiver.
//!
//! Within each sub-step the registered devices contend in a freshly shuffled
//! order: a device whose head-of-queue fragment is due transmits unless some
//! other device within its listening range already transmitted earlier in the
//! same sub-step, in which case it backs off binary-exponentially. At the end
//! of the sub-step the receiver resolves simultaneous arrivals: the closest
//! transmitter wins (capture effect), everyone else collides, and even the
//! winner must survive a distance-based drop roll.

use std::collections::BTreeMap;
use std::collections::hash_map::Entry;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;

use super::attenuation::distance;
use super::device::{Device, DeviceRegistry, STARTUP_PHASE_TICKS};
use super::stats::{ChannelTotals, DeviceReport, DeviceStats};
use super::types::{
    DeviceId, FragmentOutcome, MessageCategory, PackageProgress, Position, RSU_ID_OFFSET,
    SubPackage, V2xPayload,
};

/// Tick length used when no outer-step interval has been configured.
const FALLBACK_TICK_MS: f64 = 2.0;

/// Outer steps between two diagnostic snapshots.
const DIAGNOSTIC_PERIOD_STEPS: u64 = 20;

/// Channel contention and message delivery simulator for one logical
/// receiver contending against many transmitters.
///
/// All state is owned exclusively by the instance; the host constructs it,
/// drives it single-threaded and resets it between scenarios. With
/// [`ChannelSimulator::with_seed`] two runs over the same call sequence
/// produce bit-identical results.
pub struct ChannelSimulator {
    config: SimulationConfig,
    rng: StdRng,
    registry: DeviceRegistry,
    receiver_position: Position,
    /// Completed outer steps.
    step: u64,
    /// Sub-step cursor within the running outer step.
    sub_step: u64,
    /// Outer-step duration in milliseconds as configured by the host.
    step_interval_ms: f64,
    /// Length of one sub-step tick in milliseconds.
    tick_ms: f64,
    totals: ChannelTotals,
}

impl ChannelSimulator {
    /// Create a simulator seeded from system entropy.
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a simulator with a fixed seed for reproducible runs.
    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulationConfig, rng: StdRng) -> Self {
        let mut simulator = ChannelSimulator {
            config,
            rng,
            registry: DeviceRegistry::new(),
            receiver_position: Position::ORIGIN,
            step: 0,
            sub_step: 0,
            step_interval_ms: 0.0,
            tick_ms: FALLBACK_TICK_MS,
            totals: ChannelTotals::default(),
        };
        let interval = simulator.config.step_interval_ms;
        simulator.set_tick_duration(interval);
        simulator
    }

    /// Set the outer-step duration; one tick is `interval / sub-step count`.
    /// A non-positive interval keeps the fallback 2 ms tick.
    pub fn set_tick_duration(&mut self, interval_ms: f64) {
        self.step_interval_ms = interval_ms;
        self.tick_ms = if interval_ms > 0.0 {
            interval_ms / self.config.sub_steps_per_step as f64
        } else {
            FALLBACK_TICK_MS
        };
    }

    /// Move the single logical receiver.
    pub fn update_receiver_position(&mut self, position: Position) {
        self.receiver_position = position;
    }

    /// Advance one device's position snapshot. Unknown ids are registered on
    /// the spot; the upstream feed is authoritative about which devices exist.
    pub fn update_device_position(&mut self, id: DeviceId, position: Position) {
        self.ensure_registered(id, position);
        if let Some(device) = self.registry.get_mut(id) {
            device.position = position;
        }
    }

    /// Fragment and enqueue one batch of application messages, one payload
    /// per transmitting device. Roadside categories are shifted into the
    /// roadside id range; previously unseen devices are registered with a
    /// fresh startup phase. Over-full send queues evict their oldest entry.
    pub fn push_messages(&mut self, messages: BTreeMap<DeviceId, V2xPayload>) {
        self.sub_step = 0;
        let now = self.now_ticks();
        for (upstream_id, payload) in messages {
            let category = payload.category();
            let id = if category.is_roadside() {
                upstream_id + RSU_ID_OFFSET
            } else {
                upstream_id
            };
            self.ensure_registered(id, payload.position());
            self.totals.generated_packages += 1;

            let fragment_count = payload.fragment_count();
            let backoff_ceiling = self.config.initial_backoff_ticks;
            let device = self.registry.get_mut(id).expect("registered above");
            device.position = payload.position();
            let master_package_id = device.master_package_id;
            let generate_time = now + device.startup_phase;
            for fragment_index in 0..fragment_count {
                device.send_queue.push_back(SubPackage {
                    device_id: id,
                    category,
                    master_package_id,
                    fragment_index,
                    fragment_count,
                    generate_time,
                    received_time: 0,
                    delay: 0,
                    attempts: 0,
                    backoff_ceiling,
                    payload: payload.clone(),
                });
            }
            device.master_package_id += 1;
            self.enforce_queue_limit(id);
        }
    }

    /// Execute the sub-stepped contention loop for one outer step.
    pub fn run(&mut self) {
        let sub_steps = self.config.sub_steps_per_step;
        for sub_step in 0..sub_steps {
            self.sub_step = sub_step;

            for device in self.registry.values_mut() {
                device.clear_sub_step_state();
            }

            // Fresh permutation per sub-step: no device gets a standing
            // head start in the contention round.
            let order = self.registry.shuffled_ids(&mut self.rng);
            let mut arrival_order: Vec<DeviceId> = Vec::new();
            for id in order {
                let Some(device) = self.registry.get(id) else {
                    continue;
                };
                let receiver_distance = distance(&device.position, &self.receiver_position);
                if let Some(device) = self.registry.get_mut(id) {
                    device.receiver_distance = receiver_distance;
                }
                if receiver_distance > self.config.consider_range {
                    continue;
                }
                self.attempt_send(id, &mut arrival_order);
            }

            self.resolve_reception(&arrival_order);
        }

        // Loop exit leaves the cursor at the step boundary, so reports taken
        // between run and the next push see the boundary tick.
        self.sub_step = sub_steps;
        if self.step % DIAGNOSTIC_PERIOD_STEPS == 0 {
            self.log_diagnostics();
        }
        self.step += 1;
        self.sub_step = 0;
    }

    /// Drain every device's delivered messages of one category. Timestamps
    /// are reconstructed onto the host clock; if one device delivered the
    /// same category more than once since the last pop, the latest wins.
    pub fn pop_deliveries(&mut self, category: MessageCategory) -> BTreeMap<DeviceId, V2xPayload> {
        let tick_ms = self.tick_ms;
        let step_interval_ms = self.step_interval_ms;
        let fixed_delay_ms = self.config.fixed_delay_ms;
        let mut delivered = BTreeMap::new();
        for device in self.registry.values_mut() {
            if device.delivery_queue.is_empty() {
                continue;
            }
            let queue = std::mem::take(&mut device.delivery_queue);
            for sub in queue {
                if sub.category == category {
                    let mut payload = sub.payload;
                    payload.set_timestamp_ms(
                        sub.generate_time as f64 * tick_ms - step_interval_ms - fixed_delay_ms,
                    );
                    delivered.insert(device.id, payload);
                } else {
                    device.delivery_queue.push_back(sub);
                }
            }
        }
        delivered
    }

    /// Raw per-device counters, or `None` for an unknown device.
    pub fn stats(&self, id: DeviceId) -> Option<&DeviceStats> {
        self.registry.get(id).map(|device| &device.stats)
    }

    /// Assembled per-device snapshot for diagnostics.
    pub fn device_report(&self, id: DeviceId) -> Option<DeviceReport> {
        let device = self.registry.get(id)?;
        let now = self.now_ticks();
        Some(DeviceReport {
            success_count: device.stats.success_count,
            collision_count: device.stats.collision_count,
            retry_exhausted_count: device.stats.retry_exhausted_count,
            queue_overflow_count: device.stats.queue_overflow_count,
            distance_dropped_count: device.stats.distance_dropped_count,
            queue_depth: device.send_queue.len(),
            ticks_since_last_success: device.stats.ticks_since_last_success(now),
            receiver_distance: device.receiver_distance,
            average_delay_ms: self.average_delay_ms(id),
        })
    }

    /// Rolling average delivery delay in milliseconds, including the fixed
    /// receive-chain latency. `None` before the device's first success.
    pub fn average_delay_ms(&self, id: DeviceId) -> Option<f64> {
        let device = self.registry.get(id)?;
        device
            .stats
            .rolling_average_delay_ticks()
            .map(|ticks| ticks * self.tick_ms + self.config.fixed_delay_ms)
    }

    /// Channel-wide tallies.
    pub fn totals(&self) -> &ChannelTotals {
        &self.totals
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Completed outer steps.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Clear every map, queue and counter for a fresh scenario. The random
    /// source and configuration survive the reset.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.receiver_position = Position::ORIGIN;
        self.step = 0;
        self.sub_step = 0;
        self.totals = ChannelTotals::default();
    }

    fn now_ticks(&self) -> u64 {
        self.step * self.config.sub_steps_per_step + self.sub_step
    }

    fn next_step_tick(&self) -> u64 {
        (self.step + 1) * self.config.sub_steps_per_step
    }

    fn ensure_registered(&mut self, id: DeviceId, position: Position) {
        if self.registry.contains(id) {
            return;
        }
        let startup_phase = self.rng.gen_range(0..STARTUP_PHASE_TICKS);
        self.registry.register(Device::new(
            id,
            position,
            self.config.consider_range,
            startup_phase,
        ));
    }

    /// Evict the oldest pending sub-packages of a device until its send queue
    /// is back within the limit. Each eviction counts against the package as
    /// a queue overflow, and the surviving head gets its wait refreshed.
    fn enforce_queue_limit(&mut self, id: DeviceId) {
        let limit = self.config.queue_length_limit;
        let now = self.now_ticks();
        loop {
            let evicted = {
                let Some(device) = self.registry.get_mut(id) else {
                    return;
                };
                if device.send_queue.len() <= limit {
                    return;
                }
                let sub = device.send_queue.pop_front().expect("length checked");
                device.ready_next_sub_package(now);
                sub
            };
            self.fold_fragment_outcome(id, evicted, FragmentOutcome::QueueOverflow);
        }
    }

    /// One device's turn in the current sub-step.
    ///
    /// If the head-of-queue fragment is due now, the device listens for other
    /// devices within its own range that already transmitted this sub-step.
    /// If nobody did, the fragment goes on the air; otherwise the device
    /// defers: the fragment burns one attempt and either retires (budget
    /// exhausted) or waits out a jittered, doubled backoff window.
    fn attempt_send(&mut self, id: DeviceId, arrival_order: &mut Vec<DeviceId>) {
        let now = self.now_ticks();

        let blocked = {
            let Some(device) = self.registry.get(id) else {
                return;
            };
            let Some(head) = device.send_queue.front() else {
                return;
            };
            if head.due_tick() != now {
                return;
            }
            let position = device.position;
            let listen_range = device.consider_range;
            self.registry.values().any(|other| {
                other.id != id
                    && other.transmitted_this_sub_step
                    && distance(&position, &other.position) <= listen_range
            })
        };

        if !blocked {
            let device = self.registry.get_mut(id).expect("checked above");
            device.transmitted_this_sub_step = true;
            let sub = device.send_queue.pop_front().expect("checked above");
            device.arrived_this_sub_step.push(sub);
            device.ready_next_sub_package(now);
            arrival_order.push(id);
            return;
        }

        let attempt_budget = self.config.attempt_budget;
        let exhausted = {
            let device = self.registry.get_mut(id).expect("checked above");
            let head = device.send_queue.front_mut().expect("checked above");
            head.attempts += 1;
            head.attempts >= attempt_budget
        };

        if exhausted {
            let sub = {
                let device = self.registry.get_mut(id).expect("checked above");
                let sub = device.send_queue.pop_front().expect("checked above");
                device.ready_next_sub_package(now);
                sub
            };
            self.totals.retry_exhausted_fragments += 1;
            self.fold_fragment_outcome(id, sub, FragmentOutcome::RetryExhausted);
        } else {
            let device = self.registry.get_mut(id).expect("checked above");
            let head = device.send_queue.front_mut().expect("checked above");
            head.backoff_ceiling *= 2;
            let ceiling = head.backoff_ceiling;
            // The current sub-step's send window has passed, so the wait
            // starts at the next tick.
            head.delay += 1 + self.rng.gen_range(0..ceiling);
        }
    }

    /// Resolve the sub-step's arrivals at the receiver.
    ///
    /// A lone arrival is tentatively successful. Among simultaneous arrivals
    /// the closest transmitter captures the channel and all others collide;
    /// a distance tie goes to the earlier transmitter of the sub-step. The
    /// tentative winner still has to survive the attenuation drop roll.
    fn resolve_reception(&mut self, arrival_order: &[DeviceId]) {
        if arrival_order.is_empty() {
            return;
        }

        let winner = if arrival_order.len() == 1 {
            arrival_order[0]
        } else {
            let mut winner = arrival_order[0];
            let mut best = f64::INFINITY;
            for &id in arrival_order {
                let receiver_distance = self
                    .registry
                    .get(id)
                    .map(|device| device.receiver_distance)
                    .unwrap_or(f64::INFINITY);
                if receiver_distance < best {
                    best = receiver_distance;
                    winner = id;
                }
            }
            winner
        };

        for &id in arrival_order {
            let (sub, receiver_distance) = {
                let Some(device) = self.registry.get_mut(id) else {
                    continue;
                };
                let Some(sub) = device.arrived_this_sub_step.pop() else {
                    continue;
                };
                (sub, device.receiver_distance)
            };
            let outcome = if id == winner {
                let drop_probability = self
                    .config
                    .attenuation
                    .drop_probability(receiver_distance, self.config.consider_range);
                if self.rng.gen_range(0.0..1.0) < drop_probability {
                    FragmentOutcome::DistanceDropped
                } else {
                    FragmentOutcome::Delivered
                }
            } else {
                FragmentOutcome::Collided
            };
            self.fold_fragment_outcome(id, sub, outcome);
        }
    }

    /// Fold one fragment's final outcome into its package and, once every
    /// fragment has reported, resolve the package: count the failure or
    /// stamp and deliver the assembled message.
    fn fold_fragment_outcome(&mut self, id: DeviceId, mut sub: SubPackage, outcome: FragmentOutcome) {
        let now = self.now_ticks();
        let next_step_tick = self.next_step_tick();
        let Some(device) = self.registry.get_mut(id) else {
            return;
        };

        let package_id = sub.master_package_id;
        let progress = match device.packages.entry(package_id) {
            Entry::Vacant(slot) => *slot.insert(PackageProgress::first(outcome)),
            Entry::Occupied(mut slot) => {
                slot.get_mut().record(outcome);
                *slot.get()
            }
        };
        if progress.reported < sub.fragment_count {
            return;
        }
        device.packages.remove(&package_id);

        if progress.status.is_failure() {
            device.stats.record_failure(progress.status);
            self.totals.failed_packages += 1;
            return;
        }

        // The receiver hands the assembled message to the host at the next
        // step boundary; the generation stamp is aligned so that
        // received - generated still equals the modeled delay.
        let delay = now.saturating_sub(sub.generate_time);
        sub.received_time = next_step_tick;
        sub.generate_time = next_step_tick - delay;
        sub.delay = delay;
        device.stats.record_success(delay, now);
        device.delivery_queue.push_back(sub);
        self.totals.delivered_packages += 1;
        self.totals.total_delay_ticks += delay;
    }

    /// Periodic per-device snapshot. Observability only; never feeds back
    /// into scheduling.
    fn log_diagnostics(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let now = self.now_ticks();
        let sub_steps = self.config.sub_steps_per_step;
        let mut ids: Vec<DeviceId> = self.registry.ids().to_vec();
        ids.sort_unstable();
        debug!(
            "step {:>5} | device  queued  head-wait  since-ok  ok  coll  retry  qdrop  ddrop  range",
            self.step
        );
        for id in ids {
            let Some(device) = self.registry.get(id) else {
                continue;
            };
            let head_wait = device
                .send_queue
                .front()
                .map(|sub| sub.delay.to_string())
                .unwrap_or_else(|| "--".to_string());
            debug!(
                "step {:>5} | {:>6}  {:>6}  {:>9}  {:>7}  {:>2}  {:>4}  {:>5}  {:>5}  {:>5}  {:>5.0}",
                self.step,
                device.id,
                device.send_queue.len(),
                head_wait,
                device.stats.ticks_since_last_success(now) / sub_steps,
                device.stats.success_count,
                device.stats.collision_count,
                device.stats.retry_exhausted_count,
                device.stats.queue_overflow_count,
                device.stats.distance_dropped_count,
                device.receiver_distance,
            );
        }
        debug!(
            "step {:>5} | generated {} delivered {} failed {} retry-exhausted-fragments {} avg-delay {:?} ticks",
            self.step,
            self.totals.generated_packages,
            self.totals.delivered_packages,
            self.totals.failed_packages,
            self.totals.retry_exhausted_fragments,
            self.totals.average_delay_ticks(),
        );
    }
}
