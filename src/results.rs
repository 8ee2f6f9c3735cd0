//! Query result sets.
//!
//! Two shapes share the [`ResultSet`] surface: a bounded k-NN
//! accumulator that keeps the k smallest distances seen, and an
//! unbounded accumulator that keeps everything within a radius. Tree
//! descents drive both through `add_point` / `worst_dist` and never care
//! which one they are filling.

/// A single neighbor: a row index into the dataset and its distance to
/// the query under the index's captured metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// Common surface of the k-NN and radius accumulators.
pub trait ResultSet {
    /// Offer a candidate point. The set decides whether to keep it.
    fn add_point(&mut self, dist: f32, index: usize);

    /// The pruning bound: candidates at or beyond this distance cannot
    /// improve the set.
    fn worst_dist(&self) -> f32;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool;
}

/// Bounded accumulator for the k nearest points.
///
/// Keeps an ordered buffer of at most `capacity` entries. Ties at equal
/// distance are broken in favor of the earlier-inserted point, and a
/// point index is never stored twice.
#[derive(Debug, Clone)]
pub struct KnnResultSet {
    capacity: usize,
    entries: Vec<(f32, usize)>,
}

impl KnnResultSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    /// Row indices in ascending distance order.
    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|&(_, i)| i).collect()
    }

    /// Distances in ascending order.
    pub fn distances(&self) -> Vec<f32> {
        self.entries.iter().map(|&(d, _)| d).collect()
    }

    pub fn into_neighbors(self) -> Vec<Neighbor> {
        self.entries
            .into_iter()
            .map(|(distance, index)| Neighbor { index, distance })
            .collect()
    }
}

impl ResultSet for KnnResultSet {
    fn add_point(&mut self, dist: f32, index: usize) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.iter().any(|&(_, i)| i == index) {
            return;
        }
        // Insert after any equal distances so earlier insertions win ties.
        let pos = self.entries.partition_point(|&(d, _)| d <= dist);
        if pos >= self.capacity {
            return;
        }
        self.entries.insert(pos, (dist, index));
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
    }

    fn worst_dist(&self) -> f32 {
        if self.entries.len() < self.capacity {
            f32::INFINITY
        } else {
            self.entries.last().map_or(0.0, |&(d, _)| d)
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}

/// Unbounded accumulator for every point within a fixed radius.
///
/// The radius is in the metric's accumulated space (squared for
/// Euclidean). Points are kept in insertion order; callers sort if they
/// need ranked output.
#[derive(Debug, Clone)]
pub struct RadiusResultSet {
    radius: f32,
    entries: Vec<(f32, usize)>,
}

impl RadiusResultSet {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            entries: Vec::new(),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|&(_, i)| i).collect()
    }

    pub fn distances(&self) -> Vec<f32> {
        self.entries.iter().map(|&(d, _)| d).collect()
    }

    pub fn into_neighbors(self) -> Vec<Neighbor> {
        self.entries
            .into_iter()
            .map(|(distance, index)| Neighbor { index, distance })
            .collect()
    }
}

impl ResultSet for RadiusResultSet {
    fn add_point(&mut self, dist: f32, index: usize) {
        if dist <= self.radius {
            self.entries.push((dist, index));
        }
    }

    fn worst_dist(&self) -> f32 {
        self.radius
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_full(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_keeps_k_smallest() {
        let mut rs = KnnResultSet::new(3);
        for (d, i) in [(5.0, 0), (1.0, 1), (4.0, 2), (2.0, 3), (3.0, 4)] {
            rs.add_point(d, i);
        }
        assert_eq!(rs.indices(), vec![1, 3, 4]);
        assert_eq!(rs.distances(), vec![1.0, 2.0, 3.0]);
        assert_eq!(rs.worst_dist(), 3.0);
    }

    #[test]
    fn test_knn_worst_dist_until_full() {
        let mut rs = KnnResultSet::new(2);
        assert_eq!(rs.worst_dist(), f32::INFINITY);
        rs.add_point(1.0, 0);
        assert_eq!(rs.worst_dist(), f32::INFINITY);
        rs.add_point(2.0, 1);
        assert_eq!(rs.worst_dist(), 2.0);
    }

    #[test]
    fn test_knn_tie_prefers_earlier_insertion() {
        let mut rs = KnnResultSet::new(1);
        rs.add_point(1.0, 7);
        rs.add_point(1.0, 3);
        assert_eq!(rs.indices(), vec![7]);
    }

    #[test]
    fn test_knn_ignores_duplicate_index() {
        let mut rs = KnnResultSet::new(4);
        rs.add_point(1.0, 5);
        rs.add_point(0.5, 5);
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.distances(), vec![1.0]);
    }

    #[test]
    fn test_knn_zero_capacity() {
        let mut rs = KnnResultSet::new(0);
        rs.add_point(1.0, 0);
        assert!(rs.is_empty());
        assert!(rs.is_full());
    }

    #[test]
    fn test_radius_filters_and_keeps_insertion_order() {
        let mut rs = RadiusResultSet::new(2.0);
        rs.add_point(1.5, 3);
        rs.add_point(2.5, 4);
        rs.add_point(2.0, 5);
        rs.add_point(0.0, 6);
        assert_eq!(rs.indices(), vec![3, 5, 6]);
        assert_eq!(rs.worst_dist(), 2.0);
        assert!(!rs.is_full());
    }
}
