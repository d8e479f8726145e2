//! Demo harness: load a scene, synthesize per-step traffic and drive the
//! channel simulator, logging delivery statistics.

use anyhow::{Context, Result, bail};
use env_logger::Builder;
use log::{LevelFilter, info};
use std::collections::BTreeMap;
use std::path::Path;

use v2x_channel_simulator::scene::{RoadsideActor, load_scene};
use v2x_channel_simulator::{
    ChannelSimulator, LocalMapUpdate, MapApproach, MessageCategory, PhaseColor, Position,
    SensedObject, SensorSnapshot, SignalPhase, SignalPhaseState, SimulationConfig, StatusBroadcast,
    TrafficEvent, TrafficEventList, V2xPayload,
};

const ALL_CATEGORIES: [MessageCategory; 5] = [
    MessageCategory::Bsm,
    MessageCategory::Rsm,
    MessageCategory::Rsi,
    MessageCategory::Spat,
    MessageCategory::Map,
];

struct CliArgs {
    scene_path: String,
    config_path: Option<String>,
    seed: Option<u64>,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut scene_path = None;
    let mut config_path = None;
    let mut seed = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(args.next().context("--config requires a path")?);
            }
            "--seed" => {
                let value = args.next().context("--seed requires a number")?;
                seed = Some(value.parse::<u64>().context("invalid --seed value")?);
            }
            other if scene_path.is_none() => scene_path = Some(other.to_string()),
            other => bail!("unexpected argument: {}", other),
        }
    }
    let Some(scene_path) = scene_path else {
        bail!("usage: v2x-channel-simulator <scene.json> [--config <config.toml>] [--seed <n>]");
    };
    Ok(CliArgs {
        scene_path,
        config_path,
        seed,
    })
}

fn main() -> Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = parse_args()?;

    let config = match &args.config_path {
        Some(path) => SimulationConfig::load(Path::new(path))
            .map_err(|e| anyhow::anyhow!(e))
            .context("loading simulation config")?,
        None => SimulationConfig::default(),
    };

    let scene = load_scene(&args.scene_path).context("loading scene")?;
    info!(
        "Loaded scene: {} steps, {} vehicles, {} roadside units",
        scene.steps,
        scene.vehicles.len(),
        scene.roadside_units.len()
    );

    let mut sim = match args.seed.or(scene.seed) {
        Some(seed) => {
            info!("Running with fixed seed {}", seed);
            ChannelSimulator::with_seed(config, seed)
        }
        None => ChannelSimulator::new(config),
    };

    let mut delivered_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for step in 0..scene.steps {
        sim.update_receiver_position(scene.receiver_position(step));

        let mut vehicle_batch = BTreeMap::new();
        for vehicle in &scene.vehicles {
            let position = vehicle.position_at(step);
            sim.update_device_position(vehicle.vehicle_id, position);
            vehicle_batch.insert(
                vehicle.vehicle_id,
                V2xPayload::Bsm(StatusBroadcast {
                    vehicle_id: vehicle.vehicle_id as u64,
                    position,
                    speed_mps: vehicle.speed_mps,
                    heading_deg: heading_of(vehicle.velocity.x, vehicle.velocity.y),
                    timestamp_ms: 0.0,
                }),
            );
        }
        if !vehicle_batch.is_empty() {
            sim.push_messages(vehicle_batch);
        }

        for category in [
            MessageCategory::Rsm,
            MessageCategory::Rsi,
            MessageCategory::Spat,
            MessageCategory::Map,
        ] {
            let mut batch = BTreeMap::new();
            for rsu in &scene.roadside_units {
                if rsu.categories.contains(&category) {
                    batch.insert(rsu.rsu_id, roadside_payload(category, rsu, step));
                }
            }
            if !batch.is_empty() {
                sim.push_messages(batch);
            }
        }

        sim.run();

        for category in ALL_CATEGORIES {
            let delivered = sim.pop_deliveries(category);
            if !delivered.is_empty() {
                *delivered_counts.entry(category_name(category)).or_default() += delivered.len();
            }
        }
    }

    info!("Delivered messages per category: {:?}", delivered_counts);
    let totals = sim.totals();
    info!(
        "Totals: generated {} delivered {} failed {} (retry-exhausted fragments {})",
        totals.generated_packages,
        totals.delivered_packages,
        totals.failed_packages,
        totals.retry_exhausted_fragments
    );
    if let Some(average) = totals.average_delay_ticks() {
        info!("Average delivery delay: {:.1} ticks", average);
    }
    for vehicle in &scene.vehicles {
        if let Some(report) = sim.device_report(vehicle.vehicle_id) {
            info!(
                "vehicle {}: ok {} collided {} retry {} queue {} distance {} avg-delay {:?} ms",
                vehicle.vehicle_id,
                report.success_count,
                report.collision_count,
                report.retry_exhausted_count,
                report.queue_overflow_count,
                report.distance_dropped_count,
                report.average_delay_ms
            );
        }
    }

    Ok(())
}

fn heading_of(vx: f64, vy: f64) -> f64 {
    if vx == 0.0 && vy == 0.0 {
        return 0.0;
    }
    vy.atan2(vx).to_degrees()
}

fn category_name(category: MessageCategory) -> &'static str {
    match category {
        MessageCategory::Bsm => "bsm",
        MessageCategory::Rsm => "rsm",
        MessageCategory::Rsi => "rsi",
        MessageCategory::Spat => "spat",
        MessageCategory::Map => "map",
    }
}

/// Synthesize a plausible payload for one roadside unit and step.
fn roadside_payload(category: MessageCategory, rsu: &RoadsideActor, step: u64) -> V2xPayload {
    let position = rsu.position;
    match category {
        MessageCategory::Rsm => V2xPayload::Rsm(SensorSnapshot {
            position,
            objects: (0..3u64)
                .map(|object_id| SensedObject {
                    object_id: rsu.rsu_id as u64 * 100 + object_id,
                    position: Position {
                        x: position.x + 5.0 * object_id as f64,
                        y: position.y - 3.0,
                    },
                    speed_mps: 8.0,
                })
                .collect(),
            timestamp_ms: 0.0,
        }),
        MessageCategory::Rsi => V2xPayload::Rsi(TrafficEventList {
            position,
            events: vec![TrafficEvent {
                event_id: rsu.rsu_id as u64,
                position,
                description: "lane closure ahead".to_string(),
            }],
            timestamp_ms: 0.0,
        }),
        MessageCategory::Spat => V2xPayload::Spat(SignalPhaseState {
            position,
            intersection_id: rsu.rsu_id as u64,
            phases: vec![SignalPhase {
                phase_id: 1,
                color: match (step / 30) % 3 {
                    0 => PhaseColor::Green,
                    1 => PhaseColor::Yellow,
                    _ => PhaseColor::Red,
                },
                remaining_ms: 1_000.0 * (30 - step % 30) as f64,
            }],
            timestamp_ms: 0.0,
        }),
        MessageCategory::Map => V2xPayload::Map(LocalMapUpdate {
            position,
            intersection_id: rsu.rsu_id as u64,
            approaches: (1..=4u32)
                .map(|approach_id| MapApproach {
                    approach_id,
                    heading_deg: 90.0 * approach_id as f64,
                    lane_count: 2,
                })
                .collect(),
            timestamp_ms: 0.0,
        }),
        MessageCategory::Bsm => unreachable!("roadside units never emit vehicle status"),
    }
}
