//! Round-based parallel search with serial commit.
//!
//! Each round, every worker in a fixed rayon pool walks particles against the
//! same frozen [`Model`] and appends the results to a shared batch. Once the
//! batch is full and every worker has returned, the coordinating thread
//! filters the batch and commits the survivors. The search phase only holds
//! `&Model` and the commit phase needs `&mut Model`, so the spatial index is
//! never read and written at the same time.

use crate::model::Model;
use crate::output::ParticleSink;
use crate::walk::{Candidate, Walker};
use anyhow::{Context, Result};
use dla_common::{RecordReader, RoundSnapshot, SimParams, Vec3};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Cloneable stop flag, checked between walks and at every round boundary.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the candidates of one batch were disposed of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CommitOutcome {
    accepted: u32,
    rejected: u32,
    /// Left unexamined once the particle limit was reached.
    discarded: u32,
}

/// Drives the worker pool through search/commit rounds and owns the model.
pub struct RoundCoordinator {
    model: Model,
    pool: ThreadPool,
    rng_seed: u64,
    round: u64,
    shutdown: ShutdownSignal,
}

impl RoundCoordinator {
    pub fn new(params: SimParams) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(params.num_threads)
            .thread_name(|i| format!("dla-walker-{}", i))
            .build()
            .context("Failed to build the walker thread pool")?;
        let rng_seed = params.rng_seed.unwrap_or_else(|| rand::rng().random());
        info!(
            "Walker pool ready: {} threads, {}D, batch size {}, conflict distance {:.2}, RNG seed {}.",
            pool.current_num_threads(),
            params.dimensions.count(),
            params.batch_size,
            params.conflict_distance,
            rng_seed
        );

        Ok(Self {
            model: Model::new(params),
            pool,
            rng_seed,
            round: 0,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Adds seed particles through the normal accept path, echoing each to
    /// `sink`. With no seed records, a single particle at the origin is used.
    /// Returns the number of seed records read.
    pub fn seed<R: Read, S: ParticleSink>(&mut self, reader: RecordReader<R>, sink: &mut S) -> Result<usize> {
        let mut count = 0;
        for record in reader {
            let record = record.context("Failed to read seed records")?;
            self.accept(record.position(), record.parent(), sink)?;
            count += 1;
        }

        if count == 0 {
            self.accept(Vec3::zero(), None, sink)?;
            info!("No seed records; seeded a single particle at the origin.");
        } else {
            info!("Seeded {} particles (bounding radius {:.3}).", count, self.model.bounding_radius());
        }
        sink.flush()?;
        Ok(count)
    }

    /// Runs one search phase followed by one commit phase.
    pub fn run_round<S: ParticleSink>(&mut self, sink: &mut S) -> Result<RoundSnapshot> {
        let round_start = Instant::now();
        let abandoned = AtomicU64::new(0);

        let batch = self.search_phase(&abandoned)?;
        let candidates = batch.len() as u32;
        let outcome = self.commit_phase(batch, sink)?;

        let snapshot = RoundSnapshot {
            round: self.round,
            total_particles: self.model.len() as u64,
            bounding_radius: self.model.bounding_radius(),
            candidates,
            accepted: outcome.accepted,
            rejected_conflicts: outcome.rejected,
            discarded_at_limit: outcome.discarded,
            abandoned_walks: abandoned.into_inner(),
            round_time_ms: round_start.elapsed().as_secs_f64() * 1000.0,
        };
        debug!(
            "Round {}: {} candidates, {} accepted, {} rejected as conflicts, {} discarded at the limit, {} walks abandoned.",
            snapshot.round,
            candidates,
            outcome.accepted,
            outcome.rejected,
            outcome.discarded,
            snapshot.abandoned_walks
        );

        self.round += 1;
        Ok(snapshot)
    }

    /// Runs rounds until shutdown is requested or the particle limit is
    /// reached. Without either, it never returns normally.
    pub fn run<S, F>(&mut self, sink: &mut S, mut on_round: F) -> Result<()>
    where
        S: ParticleSink,
        F: FnMut(&RoundSnapshot),
    {
        while !self.is_finished() {
            let snapshot = self.run_round(sink)?;
            on_round(&snapshot);
        }
        info!(
            "Stopped after {} rounds with {} particles ({} index trees).",
            self.round,
            self.model.len(),
            self.model.index().tree_count()
        );
        Ok(())
    }

    /// Every worker walks against the frozen model until the batch holds
    /// `batch_size` candidates. Walks finishing after that are discarded.
    fn search_phase(&self, abandoned: &AtomicU64) -> Result<Vec<Candidate>> {
        let params = self.model.params();
        let batch_size = params.batch_size;
        let max_walk_steps = params.max_walk_steps;
        let walker = Walker::new(&self.model)?;
        let shutdown = &self.shutdown;
        let batch = Mutex::new(Vec::with_capacity(batch_size));

        // Distinct stream per (round, worker)
        let round_seed = self
            .rng_seed
            .wrapping_add(self.round.wrapping_mul(self.pool.current_num_threads() as u64));

        self.pool.broadcast(|ctx| {
            let mut rng = StdRng::seed_from_u64(round_seed.wrapping_add(ctx.index() as u64));
            while !shutdown.is_requested() {
                let Some(candidate) = walker.walk_bounded(&mut rng, max_walk_steps) else {
                    abandoned.fetch_add(1, Ordering::Relaxed);
                    trace!("Worker {} abandoned a walk at the step limit.", ctx.index());
                    continue;
                };

                let mut items = batch.lock().unwrap_or_else(PoisonError::into_inner);
                if items.len() >= batch_size {
                    break;
                }
                items.push(candidate);
                if items.len() >= batch_size {
                    break;
                }
            }
        });

        Ok(batch.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Accepts candidates in append order, rejecting any that lands within
    /// the conflict distance of one already accepted this round.
    fn commit_phase<S: ParticleSink>(&mut self, batch: Vec<Candidate>, sink: &mut S) -> Result<CommitOutcome> {
        let threshold = self.model.params().conflict_distance_sq;
        let mut accepted_positions: Vec<Vec3> = Vec::with_capacity(batch.len());
        let mut outcome = CommitOutcome::default();

        for candidate in batch {
            if self.limit_reached() {
                outcome.discarded += 1;
                continue;
            }
            if accepted_positions
                .iter()
                .any(|p| p.distance_squared(candidate.position) < threshold)
            {
                outcome.rejected += 1;
                continue;
            }

            self.accept(candidate.position, Some(candidate.parent), sink)?;
            accepted_positions.push(candidate.position);
            outcome.accepted += 1;
        }

        sink.flush()?;
        Ok(outcome)
    }

    /// Emits the particle first, so a failed write leaves the model unchanged.
    fn accept<S: ParticleSink>(&mut self, position: Vec3, parent: Option<u32>, sink: &mut S) -> Result<()> {
        let particle = self.model.next_particle(position, parent);
        sink.emit(&particle)?;
        self.model.add(position, parent);
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.model
            .params()
            .max_particles
            .is_some_and(|max| self.model.len() as u64 >= max)
    }

    pub fn is_finished(&self) -> bool {
        self.shutdown.is_requested() || self.limit_reached()
    }

    /// A handle that stops [`RoundCoordinator::run`] at the next round boundary.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Number of completed rounds.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn rng_seed(&self) -> u64 {
        self.rng_seed
    }
}
