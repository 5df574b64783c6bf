
use smallvec::SmallVec;

use crate::{
    mv::{MotionVector, clip_i16},
    reference::RefList,
};

/// Fixed-point shift of cluster centroids.
pub const CENTROID_SHIFT: u32 = 8;

/// Vectors towards one reference that lie close to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cluster {
    pub list: RefList,
    pub ref_idx: i8,
    sum_x: i32,
    sum_y: i32,
    /// Mean of the members in Q8 quarter pixels
    pub centroid: (i32, i32),
    pub bbox_min: MotionVector,
    pub bbox_max: MotionVector,
    pub members: u32,
    /// Largest sub-pel distortion improvement among the members
    pub best_sdi: u32,
}

impl Cluster {
    fn new(list: RefList, ref_idx: i8, mv: MotionVector, sdi: u32) -> Self {
        let (x, y) = (i32::from(mv.x), i32::from(mv.y));
        Self {
            list,
            ref_idx,
            sum_x: x,
            sum_y: y,
            centroid: (x << CENTROID_SHIFT, y << CENTROID_SHIFT),
            bbox_min: mv,
            bbox_max: mv,
            members: 1,
            best_sdi: sdi,
        }
    }

    fn add(&mut self, mv: MotionVector, sdi: u32) {
        self.sum_x += i32::from(mv.x);
        self.sum_y += i32::from(mv.y);
        self.members += 1;
        let n = self.members as i32;
        self.centroid = (
            (self.sum_x << CENTROID_SHIFT) / n,
            (self.sum_y << CENTROID_SHIFT) / n,
        );
        self.bbox_min = MotionVector::new(self.bbox_min.x.min(mv.x), self.bbox_min.y.min(mv.y));
        self.bbox_max = MotionVector::new(self.bbox_max.x.max(mv.x), self.bbox_max.y.max(mv.y));
        self.best_sdi = self.best_sdi.max(sdi);
    }

    /// The centroid rounded to quarter pixels.
    #[must_use]
    pub fn centroid_mv(&self) -> MotionVector {
        let round = |c: i32| clip_i16((c + (1 << (CENTROID_SHIFT - 1))) >> CENTROID_SHIFT);
        MotionVector::new(round(self.centroid.0), round(self.centroid.1))
    }

    const fn same_ref(&self, list: RefList, ref_idx: i8) -> bool {
        self.list as u8 == list as u8 && self.ref_idx == ref_idx
    }
}

/// Clusters of the leaf vectors below one merge parent.
#[derive(Debug, Clone, Default)]
pub struct ClusterData {
    clusters: SmallVec<[Cluster; 16]>,
}

impl ClusterData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.clusters.clear();
    }

    /// Adds `mv` to the first cluster of the same reference whose centroid
    /// lies within `area` quarter pixels, or opens a new cluster.
    pub fn add(&mut self, list: RefList, ref_idx: i8, mv: MotionVector, sdi: u32, area: i16) {
        let area = u32::from(area.unsigned_abs());
        let found = self.clusters.iter_mut().find(|c| {
            c.same_ref(list, ref_idx) && c.centroid_mv().chebyshev_distance(mv) <= area
        });
        match found {
            Some(cluster) => cluster.add(mv, sdi),
            None => self.clusters.push(Cluster::new(list, ref_idx, mv, sdi)),
        }
    }

    fn count(&self, list: RefList, ref_idx: i8) -> usize {
        self.clusters
            .iter()
            .filter(|c| c.same_ref(list, ref_idx))
            .count()
    }

    /// Removes clusters until no reference holds more than `max_per_ref`.
    ///
    /// Single-member clusters go first, weakest sub-pel improvement first.
    /// When an over-cap reference has none left its smallest cluster goes.
    pub fn prune(&mut self, max_per_ref: usize) {
        loop {
            let over_cap = |c: &Cluster| self.count(c.list, c.ref_idx) > max_per_ref;
            let outlier = self
                .clusters
                .iter()
                .enumerate()
                .filter(|(_, c)| c.members == 1 && over_cap(c))
                .min_by_key(|(i, c)| (c.best_sdi, std::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            let victim = outlier.or_else(|| {
                self.clusters
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| over_cap(c))
                    .min_by_key(|(i, c)| (c.members, c.best_sdi, std::cmp::Reverse(*i)))
                    .map(|(i, _)| i)
            });
            match victim {
                Some(i) => {
                    self.clusters.remove(i);
                }
                None => break,
            }
        }
    }

    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
