pub mod config;
pub mod record;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{EngineConfig, OutputConfig, ParticleConfig, SimulationConfig, StatsFormat};
pub use record::{ParticleRecord, RecordReader, RecordWriter, NO_PARENT, RECORD_SIZE};
pub use sim_params::{Dimensions, SimParams};
pub use snapshot::RoundSnapshot;
pub use vecmath::{lerp_distance, Vec3};
