//! Insert-only nearest-neighbor index over the growing aggregate.
//!
//! Points land in a small linear-scan buffer. When the buffer fills it is
//! merged into a forest of static bucket kd-trees, where level `i` holds
//! either nothing or exactly `BUFFER_CAPACITY << i` points, like the digits
//! of a binary counter. Queries visit the buffer and every tree, pruning
//! each tree by the best distance found so far.

use dla_common::Vec3;

/// Points scanned linearly before being folded into the tree levels.
const BUFFER_CAPACITY: usize = 32;
/// Maximum number of points in a kd-tree leaf.
const LEAF_SIZE: usize = 16;
/// Marks a leaf node.
const NO_CHILD: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct Entry {
    point: Vec3,
    id: u32,
}

#[derive(Clone, Copy, Debug)]
struct KdNode {
    min: [f64; 3],
    max: [f64; 3],
    left: u32, // NO_CHILD if leaf
    right: u32,
    // Leaf data: entries[start..end]
    start: u32,
    end: u32,
    // Internal node data
    split_val: f64,
    axis: u8,
}

impl KdNode {
    /// Squared distance from `point` to this node's bounding box (0 inside).
    #[inline(always)]
    fn box_distance_sq(&self, point: [f64; 3]) -> f64 {
        let mut d2 = 0.0;
        for i in 0..3 {
            let v = point[i];
            if v < self.min[i] {
                d2 += (self.min[i] - v).powi(2);
            } else if v > self.max[i] {
                d2 += (v - self.max[i]).powi(2);
            }
        }
        d2
    }
}

/// Best match found so far during a query: (squared distance, entry).
type Best = Option<(f64, Entry)>;

#[inline(always)]
fn consider(best: &mut Best, query: Vec3, entry: &Entry) {
    let d2 = query.distance_squared(entry.point);
    let closer = match *best {
        Some((best_d2, _)) => d2 < best_d2,
        None => true,
    };
    if closer {
        *best = Some((d2, *entry));
    }
}

/// A static kd-tree built once over a fixed set of entries.
#[derive(Debug)]
struct KdTree {
    nodes: Vec<KdNode>,
    entries: Vec<Entry>,
}

impl KdTree {
    fn build(entries: Vec<Entry>) -> Self {
        let count = entries.len();
        let mut tree = KdTree {
            // A balanced tree has roughly 2 * N / LEAF_SIZE nodes
            nodes: Vec::with_capacity(2 * count / LEAF_SIZE + 1),
            entries,
        };
        if count > 0 {
            tree.build_recursive(0, count);
        }
        tree
    }

    fn build_recursive(&mut self, start: usize, end: usize) -> u32 {
        let count = end - start;

        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for entry in &self.entries[start..end] {
            let p = entry.point.to_array();
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        if count <= LEAF_SIZE {
            let node_idx = self.nodes.len() as u32;
            self.nodes.push(KdNode {
                min,
                max,
                left: NO_CHILD,
                right: NO_CHILD,
                start: start as u32,
                end: end as u32,
                split_val: 0.0,
                axis: 0,
            });
            return node_idx;
        }

        // Split along the widest extent
        let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        let axis = if extent[0] >= extent[1] && extent[0] >= extent[2] {
            0
        } else if extent[1] >= extent[2] {
            1
        } else {
            2
        };

        let mid = start + count / 2;
        self.entries[start..end].select_nth_unstable_by(count / 2, |a, b| {
            a.point
                .axis(axis)
                .partial_cmp(&b.point.axis(axis))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let split_val = self.entries[mid].point.axis(axis);

        let left = self.build_recursive(start, mid);
        let right = self.build_recursive(mid, end);

        let node_idx = self.nodes.len() as u32;
        self.nodes.push(KdNode {
            min,
            max,
            left,
            right,
            start: 0,
            end: 0,
            split_val,
            axis: axis as u8,
        });
        node_idx
    }

    fn nearest(&self, query: Vec3, best: &mut Best) {
        if self.nodes.is_empty() {
            return;
        }
        // Root is the last node pushed by the recursive build
        let root_idx = (self.nodes.len() - 1) as u32;
        self.nearest_recursive(root_idx, query, query.to_array(), best);
    }

    fn nearest_recursive(&self, node_idx: u32, query: Vec3, q: [f64; 3], best: &mut Best) {
        let node = &self.nodes[node_idx as usize];

        if let Some((best_d2, _)) = *best {
            if node.box_distance_sq(q) >= best_d2 {
                return;
            }
        }

        if node.left == NO_CHILD {
            for entry in &self.entries[node.start as usize..node.end as usize] {
                consider(best, query, entry);
            }
            return;
        }

        // Visit the child on the query's side of the split first
        let diff = q[node.axis as usize] - node.split_val;
        let (first, second) = if diff <= 0.0 { (node.left, node.right) } else { (node.right, node.left) };
        self.nearest_recursive(first, query, q, best);
        self.nearest_recursive(second, query, q, best);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

/// Nearest-neighbor index supporting insertion only.
///
/// Any number of threads may query a shared `&SpatialIndex`; insertion takes
/// `&mut self`, so a writer can never overlap a reader.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    buffer: Vec<Entry>,
    levels: Vec<Option<KdTree>>,
    len: usize,
}

impl SpatialIndex {
    pub fn new() -> Self {
        SpatialIndex {
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
            levels: Vec::new(),
            len: 0,
        }
    }

    /// Adds a point. Existing entries are never moved out of the index.
    pub fn insert(&mut self, point: Vec3, id: u32) {
        self.buffer.push(Entry { point, id });
        self.len += 1;
        if self.buffer.len() < BUFFER_CAPACITY {
            return;
        }

        // Carry the full buffer up the levels until an empty slot is found
        let mut carry = std::mem::replace(&mut self.buffer, Vec::with_capacity(BUFFER_CAPACITY));
        for slot in self.levels.iter_mut() {
            match slot.take() {
                None => {
                    *slot = Some(KdTree::build(carry));
                    return;
                }
                Some(tree) => carry.extend(tree.into_entries()),
            }
        }
        self.levels.push(Some(KdTree::build(carry)));
    }

    /// Returns the closest inserted point and its id, or `None` if the index
    /// is empty.
    pub fn nearest(&self, point: Vec3) -> Option<(Vec3, u32)> {
        let mut best: Best = None;
        for entry in &self.buffer {
            consider(&mut best, point, entry);
        }
        // Largest trees first: they are the most likely to hold the answer
        for tree in self.levels.iter().rev().flatten() {
            tree.nearest(point, &mut best);
        }
        best.map(|(_, entry)| (entry.point, entry.id))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of kd-trees currently in the forest.
    pub fn tree_count(&self) -> usize {
        self.levels.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force_nearest(points: &[Vec3], query: Vec3) -> f64 {
        points
            .iter()
            .map(|p| p.distance_squared(query))
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::new();
        assert!(index.is_empty());
        assert!(index.nearest(Vec3::zero()).is_none());
    }

    #[test]
    fn test_single_point() {
        let mut index = SpatialIndex::new();
        index.insert(Vec3::new(1.0, 2.0, 3.0), 0);
        let (point, id) = index.nearest(Vec3::new(100.0, -50.0, 0.0)).unwrap();
        assert_eq!(point, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(id, 0);
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut index = SpatialIndex::new();
        let mut points = Vec::new();

        for id in 0..3000u32 {
            let p = Vec3::new(
                rng.random_range(-100.0..100.0),
                rng.random_range(-100.0..100.0),
                rng.random_range(-100.0..100.0),
            );
            index.insert(p, id);
            points.push(p);

            // Check queries at several index sizes, across level cascades
            if id % 97 == 0 {
                for _ in 0..20 {
                    let q = Vec3::new(
                        rng.random_range(-150.0..150.0),
                        rng.random_range(-150.0..150.0),
                        rng.random_range(-150.0..150.0),
                    );
                    let (found, found_id) = index.nearest(q).unwrap();
                    assert_eq!(points[found_id as usize], found);
                    assert!((found.distance_squared(q) - brute_force_nearest(&points, q)).abs() < 1e-9);
                }
            }
        }
        assert_eq!(index.len(), 3000);
    }

    #[test]
    fn test_levels_follow_binary_counter() {
        let mut index = SpatialIndex::new();
        // 3 full buffers -> levels of 32 and 64 points
        for id in 0..(3 * BUFFER_CAPACITY as u32) {
            index.insert(Vec3::new(id as f64, 0.0, 0.0), id);
        }
        let sizes: Vec<usize> = index.levels.iter().flatten().map(KdTree::len).collect();
        assert_eq!(sizes, vec![BUFFER_CAPACITY, 2 * BUFFER_CAPACITY]);
        assert!(index.buffer.is_empty());
        assert_eq!(index.tree_count(), 2);
    }

    #[test]
    fn test_coincident_and_planar_points() {
        // All points on the z = 0 plane, many duplicates, as in 2D runs
        let mut index = SpatialIndex::new();
        for id in 0..500u32 {
            let x = (id % 10) as f64;
            index.insert(Vec3::new(x, 0.0, 0.0), id);
        }
        let (point, id) = index.nearest(Vec3::new(7.2, 3.0, 0.0)).unwrap();
        assert_eq!(point, Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(id % 10, 7);
    }
}
