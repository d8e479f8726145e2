//! Distance and attenuation calculations.
//!
//! Contains helpers for:
//! - Euclidean distance between device positions (squared form for hot paths)
//! - The two selectable distance-drop curves applied to an otherwise
//!   successful reception
//!
//! Units:
//! - Distance: world units of the host feed (typically meters)
//! - Probability: plain fraction in `[0, 1]`, rolled against a uniform sample

use serde::{Deserialize, Serialize};

use super::types::Position;

/// Divisor flattening the linear curve so it tops out at 5% at the edge of
/// the consider range.
const LINEAR_CURVE_DIVISOR: f64 = 20.0;

/// Selectable attenuation curve for the distance-based drop applied to the
/// winning transmission of a sub-step.
///
/// Both curves map the transmitter's distance to the receiver onto a drop
/// probability that grows with distance and is normalized by the consider
/// range. Which curve matches a given deployment is an open modeling
/// question, so the choice is configuration, not code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum AttenuationModel {
    /// Drop probability grows linearly with distance:
    /// `(d / range) / 20`.
    Linear,
    /// Drop probability grows with the logarithm of distance:
    /// `log_base(d + 1) / range`.
    Logarithmic {
        /// Logarithm base; must be at least 2.
        base: u32,
    },
}

impl Default for AttenuationModel {
    fn default() -> Self {
        AttenuationModel::Linear
    }
}

impl AttenuationModel {
    /// Drop probability for a transmission received from `distance` away,
    /// normalized by the channel consider range.
    ///
    /// The caller rolls a uniform sample in `[0, 1)` against the returned
    /// value; a sample below it discards the reception.
    pub fn drop_probability(&self, distance: f64, consider_range: f64) -> f64 {
        match *self {
            AttenuationModel::Linear => (distance / consider_range) / LINEAR_CURVE_DIVISOR,
            AttenuationModel::Logarithmic { base } => {
                // Guard the base the same way the setter clamps it: log base
                // below 2 would blow the curve up (or invert it at base 1).
                let base = base.max(2) as f64;
                ((distance + 1.0).ln() / base.ln()) / consider_range
            }
        }
    }
}

/// Squared Euclidean distance in world units (avoids a sqrt when only
/// comparing against a range).
pub fn distance2(a: &Position, b: &Position) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Euclidean distance between two positions.
pub fn distance(a: &Position, b: &Position) -> f64 {
    distance2(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Position {
        Position { x, y }
    }

    #[test]
    fn distance_basics() {
        assert_eq!(distance(&p(0.0, 0.0), &p(3.0, 4.0)), 5.0);
        assert_eq!(distance2(&p(1.0, 1.0), &p(1.0, 1.0)), 0.0);
        assert_eq!(distance2(&p(0.0, 0.0), &p(2.0, 0.0)), 4.0);
    }

    #[test]
    fn linear_curve_values() {
        let model = AttenuationModel::Linear;
        assert_eq!(model.drop_probability(0.0, 200.0), 0.0);
        // At the edge of the consider range the linear curve tops out at 5%.
        assert!((model.drop_probability(200.0, 200.0) - 0.05).abs() < 1e-12);
        assert!((model.drop_probability(100.0, 200.0) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn curves_grow_with_distance() {
        for model in [
            AttenuationModel::Linear,
            AttenuationModel::Logarithmic { base: 2 },
        ] {
            let near = model.drop_probability(10.0, 200.0);
            let mid = model.drop_probability(100.0, 200.0);
            let far = model.drop_probability(199.0, 200.0);
            assert!(near < mid && mid < far, "{model:?} not monotone");
        }
    }

    #[test]
    fn logarithmic_base_dampens_the_curve() {
        let steep = AttenuationModel::Logarithmic { base: 2 };
        let flat = AttenuationModel::Logarithmic { base: 10 };
        assert!(steep.drop_probability(150.0, 200.0) > flat.drop_probability(150.0, 200.0));
    }

    #[test]
    fn logarithmic_base_below_two_is_clamped() {
        let degenerate = AttenuationModel::Logarithmic { base: 1 };
        let clamped = AttenuationModel::Logarithmic { base: 2 };
        assert_eq!(
            degenerate.drop_probability(50.0, 200.0),
            clamped.drop_probability(50.0, 200.0)
        );
    }

    #[test]
    fn probabilities_stay_small_within_range() {
        for model in [
            AttenuationModel::Linear,
            AttenuationModel::Logarithmic { base: 2 },
        ] {
            for d in [0.0, 50.0, 100.0, 150.0, 200.0] {
                let prob = model.drop_probability(d, 200.0);
                assert!((0.0..1.0).contains(&prob), "{model:?} at {d}: {prob}");
            }
        }
    }
}
