//! Diffusion-limited aggregation engine.
//!
//! Particles are released one at a time on a sphere around the aggregate and
//! random-walk until they stick to it. Walks run in parallel against a frozen
//! copy of the aggregate; a single coordinator commits each round's results.

pub mod coordinator;
pub mod export;
pub mod model;
pub mod output;
pub mod spatial_index;
pub mod walk;

pub use coordinator::{RoundCoordinator, ShutdownSignal};
pub use model::{Model, Particle};
pub use output::ParticleSink;
pub use spatial_index::SpatialIndex;
pub use walk::{Candidate, WalkState, Walker};
