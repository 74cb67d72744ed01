use serde::{Serialize, Deserialize};

/// Statistics of one search/commit round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Zero-based round number.
    pub round: u64,
    /// Aggregate size after the commit phase.
    pub total_particles: u64,
    /// Bounding radius after the commit phase.
    pub bounding_radius: f64,
    /// Candidates produced by the search phase.
    pub candidates: u32,
    pub accepted: u32,
    /// Candidates dropped for landing too close to another one accepted this round.
    pub rejected_conflicts: u32,
    /// Candidates left uncommitted because the particle limit was reached.
    pub discarded_at_limit: u32,
    /// Walks given up at the step cap during this round.
    pub abandoned_walks: u64,
    /// Wall time of the whole round (search + commit) in milliseconds.
    pub round_time_ms: f64,
}
