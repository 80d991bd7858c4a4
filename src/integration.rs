/// Gauss-Legendre Quadrature rules
pub mod glq;

use crate::domain::mesh::cell::Cell;
use glq::{glq_rule, scale_gauss_quad_points};
use itertools::Itertools;

/// Iterate over every multi-index `[i_0, .., i_{D-1}]` with `i_k < lens[k]`, with the last axis varying fastest
pub fn multi_indices<const D: usize>(lens: [usize; D]) -> impl Iterator<Item = [usize; D]> {
    (0..D)
        .map(|k| 0..lens[k])
        .multi_cartesian_product()
        .map(|idx| std::array::from_fn(|k| idx[k]))
}

/// Number of Gauss points needed to integrate a polynomial of the given degree exactly
pub const fn points_for_degree(degree: usize) -> usize {
    degree / 2 + 1
}

/// A tensor-product Gauss-Legendre rule over a `Cell`
///
/// Points are stored in real space, one list per axis. Weights include the Jacobian of the map from `(-1, 1)`.
#[derive(Clone, Debug)]
pub struct TensorRule<const D: usize> {
    pub points: [Vec<f64>; D],
    pub weights: [Vec<f64>; D],
}

impl<const D: usize> TensorRule<D> {
    /// `n[k]` Gauss points along axis `k` of the cell
    pub fn gauss(cell: &Cell<D>, n: [usize; D]) -> Self {
        let mut points: [Vec<f64>; D] = std::array::from_fn(|_| Vec::new());
        let mut weights: [Vec<f64>; D] = std::array::from_fn(|_| Vec::new());

        for k in 0..D {
            let (ref_points, ref_weights) = glq_rule(n[k].max(1));
            let (scale, scaled_points) =
                scale_gauss_quad_points(ref_points, cell.min[k], cell.max[k]);
            points[k] = scaled_points;
            weights[k] = ref_weights.iter().map(|w| w * scale).collect();
        }

        Self { points, weights }
    }

    /// A Gauss rule with the same number of points along every axis
    pub fn uniform(cell: &Cell<D>, n: usize) -> Self {
        Self::gauss(cell, [n; D])
    }

    /// A single point with unit weight (used to sample fields at arbitrary locations)
    pub fn single(x: [f64; D]) -> Self {
        Self {
            points: std::array::from_fn(|k| vec![x[k]]),
            weights: std::array::from_fn(|_| vec![1.0]),
        }
    }

    pub fn lens(&self) -> [usize; D] {
        std::array::from_fn(|k| self.points[k].len())
    }

    pub fn len(&self) -> usize {
        self.lens().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn point(&self, q: [usize; D]) -> [f64; D] {
        std::array::from_fn(|k| self.points[k][q[k]])
    }

    pub fn weight(&self, q: [usize; D]) -> f64 {
        (0..D).map(|k| self.weights[k][q[k]]).product()
    }

    /// Iterate over `(multi-index, point, weight)` triples
    pub fn iter(&self) -> impl Iterator<Item = ([usize; D], [f64; D], f64)> + '_ {
        multi_indices(self.lens()).map(move |q| (q, self.point(q), self.weight(q)))
    }

    /// Integrate a function of the real-space point
    pub fn integrate<F>(&self, integrand: F) -> f64
    where
        F: Fn([f64; D]) -> f64,
    {
        self.iter().map(|(_, x, w)| integrand(x) * w).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_integration() {
        let cell = Cell::new([0.0, -1.0], [2.0, 1.0]);
        let rule = TensorRule::gauss(&cell, [3, 2]);
        assert_eq!(rule.len(), 6);

        // x^3 * y^2 over (0, 2) x (-1, 1) = 4 * 2/3
        let integral = rule.integrate(|[x, y]| x.powi(3) * y.powi(2));
        assert!((integral - 8.0 / 3.0).abs() < 1e-12);

        let area = rule.integrate(|_| 1.0);
        assert!((area - cell.volume()).abs() < 1e-12);
    }

    #[test]
    fn index_ordering() {
        let indices: Vec<[usize; 2]> = multi_indices([2, 3]).collect();
        assert_eq!(indices.len(), 6);
        assert_eq!(indices[0], [0, 0]);
        assert_eq!(indices[1], [0, 1]);
        assert_eq!(indices[3], [1, 0]);

        let line: Vec<[usize; 1]> = multi_indices([4]).collect();
        assert_eq!(line, vec![[0], [1], [2], [3]]);
    }

    #[test]
    fn exactness_bound() {
        for degree in 0..20 {
            let n = points_for_degree(degree);
            assert!(2 * n - 1 >= degree);
        }
    }
}
