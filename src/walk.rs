//! Random walk of a single particle against a frozen aggregate.

use crate::model::Model;
use anyhow::Result;
use dla_common::{lerp_distance, Vec3};
use rand::Rng;

/// Where a finished walk wants to attach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub position: Vec3,
    pub parent: u32,
}

/// States of one walk. `Joining` is terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkState {
    Searching(Vec3),
    /// Wandered past twice the bounding radius; restarts on the bounding sphere.
    Reset,
    Joining(Candidate),
}

/// Diffuses new particles against a read-only [`Model`].
#[derive(Debug, Clone, Copy)]
pub struct Walker<'a> {
    model: &'a Model,
}

impl<'a> Walker<'a> {
    /// Fails if the model holds no particles: there would be nothing to
    /// attach to.
    pub fn new(model: &'a Model) -> Result<Self> {
        anyhow::ensure!(!model.is_empty(), "Cannot start a walk on an empty aggregate; seed the model first.");
        Ok(Walker { model })
    }

    pub fn start<R: Rng + ?Sized>(&self, rng: &mut R) -> WalkState {
        WalkState::Searching(self.model.random_starting_position(rng))
    }

    /// Advances the walk by one transition.
    pub fn step<R: Rng + ?Sized>(&self, state: WalkState, rng: &mut R) -> WalkState {
        match state {
            WalkState::Searching(p) => self.search_step(p, rng),
            WalkState::Reset => self.start(rng),
            joining @ WalkState::Joining(_) => joining,
        }
    }

    fn search_step<R: Rng + ?Sized>(&self, p: Vec3, rng: &mut R) -> WalkState {
        let params = self.model.params();

        let Some((parent_pos, parent_id)) = self.model.nearest(p) else {
            // Walker::new rejects an empty model and the index never shrinks
            unreachable!("spatial index is empty during a walk");
        };
        let d = p.distance(parent_pos);

        if d < params.attraction_distance {
            let toward = self.off_parent(p, parent_pos, rng);
            if !self.model.should_join(rng) {
                // Push the particle away a bit
                let pushed = lerp_distance(parent_pos, toward, params.attraction_distance + params.min_move_distance);
                return WalkState::Searching(pushed);
            }
            return WalkState::Joining(Candidate {
                position: self.model.place_particle(toward, parent_pos),
                parent: parent_id,
            });
        }

        // Largest step that cannot skip past the nearest particle's attraction shell
        let m = params.min_move_distance.max(d - params.attraction_distance);
        let next = p + self.model.motion_vector(rng) * m;
        if self.model.should_reset(next) {
            WalkState::Reset
        } else {
            WalkState::Searching(next)
        }
    }

    /// `p`, unless it sits exactly on the parent, in which case a point in a
    /// random direction around the parent.
    fn off_parent<R: Rng + ?Sized>(&self, p: Vec3, parent: Vec3, rng: &mut R) -> Vec3 {
        if p.distance_squared(parent) > 0.0 {
            p
        } else {
            parent + self.model.random_direction(rng)
        }
    }

    /// Walks one particle until it joins the aggregate. Never gives up.
    pub fn walk<R: Rng + ?Sized>(&self, rng: &mut R) -> Candidate {
        let mut state = self.start(rng);
        loop {
            state = self.step(state, rng);
            if let WalkState::Joining(candidate) = state {
                return candidate;
            }
        }
    }

    /// Like [`Walker::walk`], but gives up after `max_steps` transitions.
    /// `None` as the limit means no limit.
    pub fn walk_bounded<R: Rng + ?Sized>(&self, rng: &mut R, max_steps: Option<u64>) -> Option<Candidate> {
        let Some(max_steps) = max_steps else {
            return Some(self.walk(rng));
        };

        let mut state = self.start(rng);
        for _ in 0..max_steps {
            state = self.step(state, rng);
            if let WalkState::Joining(candidate) = state {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dla_common::SimParams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_model(params: SimParams) -> Model {
        let mut model = Model::new(params);
        model.add(Vec3::zero(), None);
        model
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let model = Model::new(SimParams::default());
        assert!(Walker::new(&model).is_err());
    }

    #[test]
    fn test_join_lands_at_particle_spacing_from_parent() {
        let mut model = seeded_model(SimParams::default());
        model.add(Vec3::new(1.0, 0.0, 0.0), Some(0));
        model.add(Vec3::new(1.0, 1.0, 0.0), Some(1));
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..200 {
            let c = walker.walk(&mut rng);
            let parent = model.particles()[c.parent as usize].position;
            assert!((c.position.distance(parent) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_join_within_attraction_distance() {
        let model = seeded_model(SimParams::default());
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        let state = walker.step(WalkState::Searching(Vec3::new(0.0, 2.0, 0.0)), &mut rng);
        let WalkState::Joining(c) = state else {
            panic!("expected a join, got {:?}", state);
        };
        assert_eq!(c.parent, 0);
        assert!((c.position - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_rejected_join_pushes_particle_away() {
        let params = SimParams { stickiness: 0.0, ..SimParams::default() };
        let model = seeded_model(params);
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        let state = walker.step(WalkState::Searching(Vec3::new(0.0, 0.0, 2.0)), &mut rng);
        let WalkState::Searching(p) = state else {
            panic!("expected the walker to keep searching, got {:?}", state);
        };
        // attraction_distance + min_move_distance, along parent -> walker
        assert!((p - Vec3::new(0.0, 0.0, 4.0)).length() < 1e-12);
    }

    #[test]
    fn test_walker_on_top_of_parent_still_joins_at_spacing() {
        let model = seeded_model(SimParams::default());
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(8);

        let state = walker.step(WalkState::Searching(Vec3::zero()), &mut rng);
        let WalkState::Joining(c) = state else {
            panic!("expected a join, got {:?}", state);
        };
        assert!((c.position.length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_far_step_never_enters_attraction_shell_early() {
        // Seed far from the walker so the safe step is d - attraction_distance
        let model = seeded_model(SimParams::default());
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(13);

        let start = Vec3::new(5.0, 0.0, 0.0);
        for _ in 0..100 {
            match walker.step(WalkState::Searching(start), &mut rng) {
                WalkState::Searching(p) => {
                    assert!((p.distance(start) - 2.0).abs() < 1e-9);
                    assert!(p.length() >= 3.0 - 1e-9);
                }
                WalkState::Reset => {}
                other => panic!("unexpected transition {:?}", other),
            }
        }
    }

    #[test]
    fn test_reset_relocates_to_bounding_sphere() {
        let params = SimParams { stickiness: 0.0, ..SimParams::default() };
        let model = seeded_model(params);
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let radius = model.bounding_radius();

        let mut state = walker.start(&mut rng);
        let mut resets = 0;
        for _ in 0..100_000 {
            let next = walker.step(state, &mut rng);
            if state == WalkState::Reset {
                let WalkState::Searching(p) = next else {
                    panic!("reset must be followed by a new search, got {:?}", next);
                };
                assert!((p.length() - radius).abs() < 1e-9);
                resets += 1;
                if resets >= 10 {
                    break;
                }
            }
            state = next;
        }
        assert!(resets > 0, "walker never wandered off");
    }

    #[test]
    fn test_zero_stickiness_never_joins() {
        let params = SimParams { stickiness: 0.0, ..SimParams::default() };
        let model = seeded_model(params);
        let walker = Walker::new(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(77);

        for _ in 0..5 {
            assert!(walker.walk_bounded(&mut rng, Some(10_000)).is_none());
        }
    }
}
