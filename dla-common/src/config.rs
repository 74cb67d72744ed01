use anyhow::Result;
use serde::{Deserialize, Serialize};
use crate::sim_params::{Dimensions, SimParams};
use std::path::Path;

// Particle behavior, loaded from the [particle] table
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ParticleConfig {
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default = "default_attraction_distance")]
    pub attraction_distance: f64,
    #[serde(default = "default_min_move_distance")]
    pub min_move_distance: f64,
    #[serde(default = "default_stickiness")]
    pub stickiness: f64,
}

// Worker pool and round settings, loaded from the [engine] table
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_dimensions")]
    pub dimensions: u8,
    /// Particles accepted in the same round must be at least
    /// `conflict_distance_factor * attraction_distance` apart.
    #[serde(default = "default_conflict_distance_factor")]
    pub conflict_distance_factor: f64,
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Abandon a walk after this many steps (unbounded if absent).
    #[serde(default)]
    pub max_walk_steps: Option<u64>,
    /// Stop after the aggregate reaches this many particles (runs forever if absent).
    #[serde(default)]
    pub max_particles: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatsFormat {
    Json,
    Bincode,
    Messagepack,
}

// Side outputs besides the particle stream, loaded from the [output] table
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    #[serde(default)]
    pub save_stats: bool,
    #[serde(default = "default_stats_interval_rounds")]
    pub stats_interval_rounds: u64,
    #[serde(default = "default_stats_format")]
    pub stats_format: StatsFormat,
    #[serde(default)]
    pub save_positions: bool,
}

/// Main simulation configuration structure, loaded from a TOML file.
/// Every table is optional; missing values fall back to the classic defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub particle: ParticleConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        ParticleConfig {
            spacing: default_spacing(),
            attraction_distance: default_attraction_distance(),
            min_move_distance: default_min_move_distance(),
            stickiness: default_stickiness(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_threads: default_num_threads(),
            batch_size: default_batch_size(),
            dimensions: default_dimensions(),
            conflict_distance_factor: default_conflict_distance_factor(),
            rng_seed: None,
            max_walk_steps: None,
            max_particles: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            save_stats: false,
            stats_interval_rounds: default_stats_interval_rounds(),
            stats_format: default_stats_format(),
            save_positions: false,
        }
    }
}

impl SimulationConfig {
    /// Loads and validates the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;

        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Fails fast on parameters the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.particle;
        if !(p.spacing > 0.0) {
            anyhow::bail!("particle.spacing must be positive.");
        }
        if !(p.attraction_distance > 0.0) {
            anyhow::bail!("particle.attraction_distance must be positive.");
        }
        if !(p.min_move_distance > 0.0) {
            anyhow::bail!("particle.min_move_distance must be positive.");
        }
        if !(0.0..=1.0).contains(&p.stickiness) {
            anyhow::bail!("particle.stickiness must be within [0, 1], got {}.", p.stickiness);
        }

        let e = &self.engine;
        if e.num_threads == 0 {
            anyhow::bail!("engine.num_threads must be greater than 0.");
        }
        if e.batch_size == 0 {
            anyhow::bail!("engine.batch_size must be greater than 0.");
        }
        Dimensions::from_count(e.dimensions)?;
        if !(e.conflict_distance_factor >= 0.0) {
            anyhow::bail!("engine.conflict_distance_factor must not be negative.");
        }
        if e.max_walk_steps == Some(0) {
            anyhow::bail!("engine.max_walk_steps must be greater than 0 when set.");
        }

        if self.output.stats_interval_rounds == 0 {
            anyhow::bail!("output.stats_interval_rounds must be greater than 0.");
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> Result<SimParams> {
        let conflict_distance = self.engine.conflict_distance_factor * self.particle.attraction_distance;

        Ok(SimParams {
            particle_spacing: self.particle.spacing,
            attraction_distance: self.particle.attraction_distance,
            min_move_distance: self.particle.min_move_distance,
            stickiness: self.particle.stickiness,
            dimensions: Dimensions::from_count(self.engine.dimensions)?,
            num_threads: self.engine.num_threads,
            batch_size: self.engine.batch_size,
            conflict_distance,
            conflict_distance_sq: conflict_distance * conflict_distance,
            rng_seed: self.engine.rng_seed,
            max_walk_steps: self.engine.max_walk_steps,
            max_particles: self.engine.max_particles,
        })
    }
}

fn default_spacing() -> f64 {
    1.0
}

fn default_attraction_distance() -> f64 {
    3.0
}

fn default_min_move_distance() -> f64 {
    1.0
}

fn default_stickiness() -> f64 {
    1.0
}

fn default_num_threads() -> usize {
    16
}

fn default_batch_size() -> usize {
    128
}

fn default_dimensions() -> u8 {
    3
}

fn default_conflict_distance_factor() -> f64 {
    5.0
}

fn default_base_filename() -> String {
    "dla".to_string()
}

fn default_stats_interval_rounds() -> u64 {
    100
}

fn default_stats_format() -> StatsFormat {
    StatsFormat::Json
}
