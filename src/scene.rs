//! Scene loading, parsing, and validation for the demo harness.
//!
//! A scene file describes a small self-contained traffic situation: the
//! receiver's path, the vehicles broadcasting status messages, and the
//! roadside units with the categories each one emits. The harness binary
//! synthesizes per-step payloads from it and drives the simulator.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::simulation::types::{MessageCategory, Position};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// Receiver path: a start position plus a constant per-step displacement.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverPath {
    pub start: Position,
    #[serde(default)]
    pub velocity: Position,
}

/// One vehicle broadcasting a status message every step.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleActor {
    pub vehicle_id: u32,
    pub start: Position,
    #[serde(default)]
    pub velocity: Position,
    #[serde(default = "default_speed")]
    pub speed_mps: f64,
}

fn default_speed() -> f64 {
    10.0
}

/// One stationary roadside unit and the categories it emits every step.
#[derive(Debug, Clone, Deserialize)]
pub struct RoadsideActor {
    pub rsu_id: u32,
    pub position: Position,
    pub categories: Vec<MessageCategory>,
}

/// Root structure describing the demo scene.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    /// Outer steps to simulate.
    pub steps: u64,
    /// Fixed seed for the run; omit for an entropy-seeded run.
    #[serde(default)]
    pub seed: Option<u64>,
    pub receiver: ReceiverPath,
    #[serde(default)]
    pub vehicles: Vec<VehicleActor>,
    #[serde(default)]
    pub roadside_units: Vec<RoadsideActor>,
}

impl Scene {
    /// Receiver position at the given step.
    pub fn receiver_position(&self, step: u64) -> Position {
        advance(self.receiver.start, self.receiver.velocity, step)
    }
}

impl VehicleActor {
    /// Vehicle position at the given step.
    pub fn position_at(&self, step: u64) -> Position {
        advance(self.start, self.velocity, step)
    }
}

fn advance(start: Position, velocity: Position, step: u64) -> Position {
    Position {
        x: start.x + velocity.x * step as f64,
        y: start.y + velocity.y * step as f64,
    }
}

/// Load and parse a scene from a JSON file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    let scene: Scene = serde_json::from_str(&data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(e.to_string()))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate scene configuration.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description
/// otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    if scene.steps == 0 {
        return Err("Scene must run for at least one step".to_string());
    }
    if scene.vehicles.is_empty() && scene.roadside_units.is_empty() {
        return Err("Scene must contain at least one vehicle or roadside unit".to_string());
    }

    let mut vehicle_ids = HashSet::new();
    for vehicle in &scene.vehicles {
        if !vehicle_ids.insert(vehicle.vehicle_id) {
            return Err(format!("Duplicate vehicle_id found: {}", vehicle.vehicle_id));
        }
        check_finite("vehicle start", vehicle.start)?;
        check_finite("vehicle velocity", vehicle.velocity)?;
    }

    let mut rsu_ids = HashSet::new();
    for rsu in &scene.roadside_units {
        if !rsu_ids.insert(rsu.rsu_id) {
            return Err(format!("Duplicate rsu_id found: {}", rsu.rsu_id));
        }
        check_finite("roadside unit position", rsu.position)?;
        if rsu.categories.is_empty() {
            return Err(format!(
                "Roadside unit {} must emit at least one category",
                rsu.rsu_id
            ));
        }
        if rsu.categories.contains(&MessageCategory::Bsm) {
            return Err(format!(
                "Roadside unit {} cannot emit the vehicle status category",
                rsu.rsu_id
            ));
        }
    }

    check_finite("receiver start", scene.receiver.start)?;
    check_finite("receiver velocity", scene.receiver.velocity)?;

    Ok(())
}

fn check_finite(what: &str, position: Position) -> Result<(), String> {
    if !position.x.is_finite() || !position.y.is_finite() {
        return Err(format!(
            "{} ({}, {}) must be finite",
            what, position.x, position.y
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE_JSON: &str = r#"{
        "steps": 60,
        "seed": 42,
        "receiver": { "start": { "x": 0.0, "y": 0.0 }, "velocity": { "x": 1.5, "y": 0.0 } },
        "vehicles": [
            { "vehicle_id": 1, "start": { "x": 20.0, "y": 5.0 }, "velocity": { "x": 1.5, "y": 0.0 } },
            { "vehicle_id": 2, "start": { "x": -40.0, "y": -5.0 } }
        ],
        "roadside_units": [
            { "rsu_id": 1, "position": { "x": 60.0, "y": 10.0 }, "categories": ["rsm", "spat"] }
        ]
    }"#;

    #[test]
    fn parses_a_complete_scene() {
        let scene: Scene = serde_json::from_str(SCENE_JSON).expect("parse failed");
        assert!(validate_scene(&scene).is_ok());
        assert_eq!(scene.steps, 60);
        assert_eq!(scene.seed, Some(42));
        assert_eq!(scene.vehicles.len(), 2);
        assert_eq!(
            scene.roadside_units[0].categories,
            vec![MessageCategory::Rsm, MessageCategory::Spat]
        );
        // Velocity defaults to standstill when omitted.
        assert_eq!(scene.vehicles[1].velocity, Position::ORIGIN);
    }

    #[test]
    fn positions_advance_along_the_path() {
        let scene: Scene = serde_json::from_str(SCENE_JSON).expect("parse failed");
        let at_ten = scene.vehicles[0].position_at(10);
        assert_eq!(at_ten, Position { x: 35.0, y: 5.0 });
        assert_eq!(scene.receiver_position(10), Position { x: 15.0, y: 0.0 });
    }

    #[test]
    fn rejects_an_empty_scene() {
        let scene: Scene = serde_json::from_str(
            r#"{ "steps": 10, "receiver": { "start": { "x": 0.0, "y": 0.0 } } }"#,
        )
        .expect("parse failed");
        assert!(validate_scene(&scene).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut scene: Scene = serde_json::from_str(SCENE_JSON).expect("parse failed");
        scene.vehicles[1].vehicle_id = 1;
        assert!(validate_scene(&scene).unwrap_err().contains("Duplicate"));
    }

    #[test]
    fn rejects_a_roadside_unit_emitting_vehicle_status() {
        let mut scene: Scene = serde_json::from_str(SCENE_JSON).expect("parse failed");
        scene.roadside_units[0].categories = vec![MessageCategory::Bsm];
        assert!(validate_scene(&scene).is_err());
    }
}
