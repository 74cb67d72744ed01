use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Number of spatial dimensions the aggregate grows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimensions {
    Two,
    Three,
}

impl Dimensions {
    pub fn from_count(count: u8) -> Result<Self> {
        match count {
            2 => Ok(Dimensions::Two),
            3 => Ok(Dimensions::Three),
            other => anyhow::bail!("dimensions must be 2 or 3, got {}.", other),
        }
    }

    pub fn count(self) -> u8 {
        match self {
            Dimensions::Two => 2,
            Dimensions::Three => 3,
        }
    }
}

/// Simulation parameters derived from the configuration. Read-only once the
/// model is built, so search workers share them without synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Particle behavior
    pub particle_spacing: f64,     // Distance between a joined particle and its parent
    pub attraction_distance: f64,  // Walkers closer than this may join
    pub min_move_distance: f64,    // Lower bound on a single random-walk step
    pub stickiness: f64,           // Probability that a join attempt succeeds

    // Engine
    pub dimensions: Dimensions,
    pub num_threads: usize,
    pub batch_size: usize,
    pub conflict_distance: f64,    // Minimum spacing between particles accepted in one round
    pub conflict_distance_sq: f64,
    pub rng_seed: Option<u64>,
    pub max_walk_steps: Option<u64>,
    pub max_particles: Option<u64>,
}

impl Default for SimParams {
    fn default() -> Self {
        let attraction_distance = 3.0;
        let conflict_distance = 5.0 * attraction_distance;
        SimParams {
            particle_spacing: 1.0,
            attraction_distance,
            min_move_distance: 1.0,
            stickiness: 1.0,
            dimensions: Dimensions::Three,
            num_threads: 16,
            batch_size: 128,
            conflict_distance,
            conflict_distance_sq: conflict_distance * conflict_distance,
            rng_seed: None,
            max_walk_steps: None,
            max_particles: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_count_round_trips() {
        for count in [2, 3] {
            assert_eq!(Dimensions::from_count(count).unwrap().count(), count);
        }
        assert!(Dimensions::from_count(4).is_err());
    }

    #[test]
    fn test_default_conflict_distance() {
        let params = SimParams::default();
        assert_eq!(params.conflict_distance, 15.0);
        assert_eq!(params.conflict_distance_sq, params.conflict_distance * params.conflict_distance);
    }
}
