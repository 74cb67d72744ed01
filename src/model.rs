use crate::spatial_index::SpatialIndex;
use dla_common::{lerp_distance, Dimensions, ParticleRecord, SimParams, Vec3};
use rand::Rng;
use rand_distr::{UnitBall, UnitDisc};

/// An accepted particle. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Insertion sequence number, starting at 0.
    pub id: u32,
    pub position: Vec3,
    /// The particle this one attached to; `None` for seeds.
    pub parent: Option<u32>,
}

impl Particle {
    pub fn to_record(&self) -> ParticleRecord {
        ParticleRecord::new(self.parent, self.position)
    }
}

/// Holds all of the particles and defines their behavior.
///
/// The spatial index and the bounding radius only change through [`Model::add`],
/// which needs `&mut self`; random walks only need `&Model`.
#[derive(Debug)]
pub struct Model {
    params: SimParams,
    index: SpatialIndex,
    particles: Vec<Particle>,
    /// Radius of a sphere around the origin that contains every particle
    /// plus one attraction distance of margin. Never shrinks.
    bounding_radius: f64,
}

impl Model {
    pub fn new(params: SimParams) -> Self {
        Model {
            params,
            index: SpatialIndex::new(),
            particles: Vec::new(),
            bounding_radius: 0.0,
        }
    }

    /// The particle [`Model::add`] would create next, without adding it.
    pub fn next_particle(&self, position: Vec3, parent: Option<u32>) -> Particle {
        Particle { id: self.particles.len() as u32, position, parent }
    }

    /// Adds a new particle with the specified parent particle.
    pub fn add(&mut self, position: Vec3, parent: Option<u32>) -> Particle {
        let particle = self.next_particle(position, parent);
        self.index.insert(position, particle.id);
        self.bounding_radius = self
            .bounding_radius
            .max(position.length() + self.params.attraction_distance);

        self.particles.push(particle);
        particle
    }

    /// Returns the particle nearest the specified point.
    pub fn nearest(&self, point: Vec3) -> Option<(Vec3, u32)> {
        self.index.nearest(point)
    }

    /// Random point on the bounding sphere where a new walker starts.
    pub fn random_starting_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        self.random_direction(rng) * self.bounding_radius
    }

    /// True if the walker has gone too far away and should start over.
    pub fn should_reset(&self, p: Vec3) -> bool {
        p.length() > self.bounding_radius * 2.0
    }

    /// Called only when the walker is already within attraction distance of
    /// a candidate parent.
    pub fn should_join<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random::<f64>() <= self.params.stickiness
    }

    /// Final placement of a joining particle: `particle_spacing` away from
    /// the parent, towards `p`.
    pub fn place_particle(&self, p: Vec3, parent: Vec3) -> Vec3 {
        lerp_distance(parent, p, self.params.particle_spacing)
    }

    /// Direction of one random-walk step. The step length is chosen by the walk.
    pub fn motion_vector<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        self.random_direction(rng)
    }

    /// Uniformly distributed unit vector, confined to the z = 0 plane in 2D.
    pub fn random_direction<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        loop {
            let v = match self.params.dimensions {
                Dimensions::Three => Vec3::from(rng.sample::<[f64; 3], _>(UnitBall)),
                Dimensions::Two => {
                    let [x, y]: [f64; 2] = rng.sample(UnitDisc);
                    Vec3::new(x, y, 0.0)
                }
            };
            let n = v.normalize_or_zero();
            if n != Vec3::zero() {
                return n;
            }
        }
    }

    pub fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut model = Model::new(SimParams::default());
        let a = model.add(Vec3::zero(), None);
        let b = model.add(Vec3::new(1.0, 0.0, 0.0), Some(0));
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(b.parent, Some(0));
        assert_eq!(model.len(), 2);
        assert_eq!(model.nearest(Vec3::new(0.9, 0.1, 0.0)), Some((b.position, 1)));
    }

    #[test]
    fn test_next_particle_matches_add() {
        let mut model = Model::new(SimParams::default());
        model.add(Vec3::zero(), None);
        let next = model.next_particle(Vec3::new(0.0, 1.0, 0.0), Some(0));
        assert_eq!(model.len(), 1);
        assert_eq!(model.add(next.position, next.parent), next);
    }

    #[test]
    fn test_bounding_radius_never_shrinks() {
        let mut model = Model::new(SimParams::default());
        let mut rng = StdRng::seed_from_u64(3);
        let mut previous = model.bounding_radius();
        for _ in 0..500 {
            let r = rng.random_range(0.0..50.0);
            let p = model.random_direction(&mut rng) * r;
            model.add(p, None);
            assert!(model.bounding_radius() >= previous);
            assert!(model.bounding_radius() >= p.length() + 3.0 - 1e-9);
            previous = model.bounding_radius();
        }
    }

    #[test]
    fn test_place_particle_at_spacing_on_parent_side() {
        let params = SimParams { particle_spacing: 1.5, ..SimParams::default() };
        let model = Model::new(params);
        let parent = Vec3::new(2.0, -1.0, 4.0);
        let q = Vec3::new(4.0, 1.0, 3.0);
        let placed = model.place_particle(q, parent);

        assert!((placed.distance(parent) - 1.5).abs() < 1e-12);
        // Colinear with P and Q, on the P->Q side
        let along = (placed - parent).dot((q - parent).normalize_or_zero());
        assert!((along - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_random_starting_position_on_bounding_sphere() {
        let mut model = Model::new(SimParams::default());
        model.add(Vec3::new(10.0, 0.0, 0.0), None);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let p = model.random_starting_position(&mut rng);
            assert!((p.length() - 13.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_two_dimensional_directions_stay_planar() {
        let params = SimParams { dimensions: Dimensions::Two, ..SimParams::default() };
        let model = Model::new(params);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let d = model.random_direction(&mut rng);
            assert_eq!(d.z, 0.0);
            assert!((d.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_should_join_respects_stickiness_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        let always = Model::new(SimParams { stickiness: 1.0, ..SimParams::default() });
        assert!((0..1000).all(|_| always.should_join(&mut rng)));
        let never = Model::new(SimParams { stickiness: 0.0, ..SimParams::default() });
        assert!((0..1000).all(|_| !never.should_join(&mut rng)));
    }

    #[test]
    fn test_should_reset_beyond_twice_the_radius() {
        let mut model = Model::new(SimParams::default());
        model.add(Vec3::zero(), None);
        assert_eq!(model.bounding_radius(), 3.0);
        assert!(!model.should_reset(Vec3::new(6.0, 0.0, 0.0)));
        assert!(model.should_reset(Vec3::new(6.01, 0.0, 0.0)));
    }
}
