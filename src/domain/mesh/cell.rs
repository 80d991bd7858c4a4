use smallvec::SmallVec;

/// Relative tolerance used when comparing coordinates of nested cells
pub const GEOMETRIC_TOLERANCE: f64 = 1e-12;

/// An axis-aligned box in `D`-dimensional real space
///
/// Every `Elem` covers exactly one `Cell`. The parametric space of a `Cell` is `[-1, 1]^D`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell<const D: usize> {
    pub min: [f64; D],
    pub max: [f64; D],
}

impl<const D: usize> Cell<D> {
    pub fn new(min: [f64; D], max: [f64; D]) -> Self {
        Self { min, max }
    }

    /// The bounding box of a set of points
    pub fn bounding(points: &[[f64; D]]) -> Option<Self> {
        let first = points.first()?;
        let mut cell = Self::new(*first, *first);
        for p in points.iter().skip(1) {
            for k in 0..D {
                cell.min[k] = cell.min[k].min(p[k]);
                cell.max[k] = cell.max[k].max(p[k]);
            }
        }
        Some(cell)
    }

    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    pub fn min_extent(&self) -> f64 {
        (0..D).map(|k| self.extent(k)).fold(f64::INFINITY, f64::min)
    }

    pub fn volume(&self) -> f64 {
        (0..D).map(|k| self.extent(k)).product()
    }

    pub fn center(&self) -> [f64; D] {
        std::array::from_fn(|k| 0.5 * (self.min[k] + self.max[k]))
    }

    /// Map a point from parametric space (`[-1, 1]^D`) into real space
    pub fn to_real(&self, xi: [f64; D]) -> [f64; D] {
        std::array::from_fn(|k| self.min[k] + 0.5 * (xi[k] + 1.0) * self.extent(k))
    }

    /// Map a point from real space into this cell's parametric space
    pub fn to_parametric(&self, x: [f64; D]) -> [f64; D] {
        std::array::from_fn(|k| 2.0 * (x[k] - self.min[k]) / self.extent(k) - 1.0)
    }

    /// Derivative of the parametric coordinate with respect to the real coordinate along `axis`
    pub fn inv_jacobian(&self, axis: usize) -> f64 {
        2.0 / self.extent(axis)
    }

    fn tolerance(&self) -> f64 {
        GEOMETRIC_TOLERANCE * (1.0 + (0..D).map(|k| self.extent(k)).fold(0.0, f64::max))
    }

    pub fn contains_point(&self, x: [f64; D]) -> bool {
        let tol = self.tolerance();
        (0..D).all(|k| x[k] >= self.min[k] - tol && x[k] <= self.max[k] + tol)
    }

    /// Is `other` entirely inside this cell?
    pub fn contains_cell(&self, other: &Self) -> bool {
        let tol = self.tolerance();
        (0..D).all(|k| other.min[k] >= self.min[k] - tol && other.max[k] <= self.max[k] + tol)
    }

    /// The overlapping region of two cells if it has a positive volume
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let tol = self.tolerance();
        let mut overlap = *self;
        for k in 0..D {
            overlap.min[k] = self.min[k].max(other.min[k]);
            overlap.max[k] = self.max[k].min(other.max[k]);
            if overlap.max[k] - overlap.min[k] <= tol {
                return None;
            }
        }
        Some(overlap)
    }

    /// Split the cell in half along each of the flagged axes
    ///
    /// Children are ordered with the first split axis varying fastest
    /// (for a 2D isotropic split: SW, SE, NW, NE)
    pub fn split(&self, axes: [bool; D]) -> SmallVec<[Self; 4]> {
        let mut children: SmallVec<[Self; 4]> = SmallVec::new();
        children.push(*self);

        for k in (0..D).rev().filter(|k| axes[*k]) {
            let mid = 0.5 * (self.min[k] + self.max[k]);
            children = children
                .iter()
                .flat_map(|c| {
                    let mut low = *c;
                    let mut high = *c;
                    low.max[k] = mid;
                    high.min[k] = mid;
                    [low, high]
                })
                .collect();
        }

        children
    }

    /// Does a face of this cell lie on the hyperplane `x[axis] == coord`
    /// while overlapping `facet` with a positive measure?
    pub fn touches_facet(&self, axis: usize, coord: f64, facet: &Self) -> bool {
        let tol = self.tolerance();
        let on_plane =
            (self.min[axis] - coord).abs() <= tol || (self.max[axis] - coord).abs() <= tol;
        on_plane
            && (0..D).filter(|k| *k != axis).all(|k| {
                self.max[k].min(facet.max[k]) - self.min[k].max(facet.min[k]) > tol
            })
    }

    /// If the two cells share (part of) a face, the axis normal to that face
    pub fn shared_face_axis(&self, other: &Self) -> Option<usize> {
        let tol = self.tolerance();
        (0..D).find(|&a| {
            let touching = (self.max[a] - other.min[a]).abs() <= tol
                || (self.min[a] - other.max[a]).abs() <= tol;
            touching
                && (0..D).filter(|k| *k != a).all(|k| {
                    self.max[k].min(other.max[k]) - self.min[k].max(other.min[k]) > tol
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ordering() {
        let cell = Cell::new([0.0, 0.0], [2.0, 1.0]);
        let children = cell.split([true, true]);

        assert_eq!(children.len(), 4);
        assert_eq!(children[0], Cell::new([0.0, 0.0], [1.0, 0.5]));
        assert_eq!(children[1], Cell::new([1.0, 0.0], [2.0, 0.5]));
        assert_eq!(children[2], Cell::new([0.0, 0.5], [1.0, 1.0]));
        assert_eq!(children[3], Cell::new([1.0, 0.5], [2.0, 1.0]));

        let halves = cell.split([false, true]);
        assert_eq!(halves.len(), 2);
        assert_eq!(halves[1], Cell::new([0.0, 0.5], [2.0, 1.0]));

        let total: f64 = children.iter().map(|c| c.volume()).sum();
        assert!((total - cell.volume()).abs() < 1e-14);
    }

    #[test]
    fn parametric_maps() {
        let cell = Cell::new([-1.0], [3.0]);
        assert_eq!(cell.to_real([-1.0]), [-1.0]);
        assert_eq!(cell.to_real([0.0]), [1.0]);
        assert!((cell.to_parametric([2.0])[0] - 0.5).abs() < 1e-14);
        assert!((cell.inv_jacobian(0) - 0.5).abs() < 1e-14);
    }

    #[test]
    fn intersections_and_faces() {
        let a = Cell::new([0.0, 0.0], [1.0, 1.0]);
        let b = Cell::new([0.5, 0.5], [2.0, 2.0]);
        let c = Cell::new([1.0, 0.0], [2.0, 0.5]);

        assert_eq!(a.intersection(&b), Some(Cell::new([0.5, 0.5], [1.0, 1.0])));
        assert_eq!(a.intersection(&c), None);
        assert_eq!(a.shared_face_axis(&c), Some(0));
        assert_eq!(a.shared_face_axis(&b), None);
        assert!(a.contains_cell(&Cell::new([0.25, 0.0], [0.5, 1.0])));
        assert!(!a.contains_cell(&b));
    }
}
