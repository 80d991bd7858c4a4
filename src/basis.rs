/// Legendre polynomials
pub mod legendre;
/// Hierarchic Lobatto (integrated Legendre) shape functions
pub mod lobatto;

use crate::domain::mesh::cell::Cell;
use crate::integration::{multi_indices, TensorRule};
pub use legendre::LegendreShapeFn;
pub use lobatto::LobattoShapeFn;

/// Hierarchical Shape Function along a single direction (defined over (-1.0, +1.0)).
/// [LegendreShapeFn] and [LobattoShapeFn] implement this trait.
///
/// Values are precomputed at a fixed set of points; `poly(n, p)` is the `n`th function at the `p`th point.
pub trait ShapeFn {
    fn with(max_order: usize, points: &[f64]) -> Self;

    fn poly(&self, n: usize, p: usize) -> f64;
    fn poly_d1(&self, n: usize, p: usize) -> f64;
}

/// The family of 1D shape functions a tensor basis is built from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    /// Discontinuous, orthogonal
    Legendre,
    /// Continuous, with vertex functions in slots 0 and 1
    Lobatto,
}

enum AxisTable {
    Legendre(LegendreShapeFn),
    Lobatto(LobattoShapeFn),
}

impl AxisTable {
    fn poly(&self, n: usize, p: usize) -> f64 {
        match self {
            Self::Legendre(table) => table.poly(n, p),
            Self::Lobatto(table) => table.poly(n, p),
        }
    }

    fn poly_d1(&self, n: usize, p: usize) -> f64 {
        match self {
            Self::Legendre(table) => table.poly_d1(n, p),
            Self::Lobatto(table) => table.poly_d1(n, p),
        }
    }
}

impl ShapeKind {
    fn table(&self, max_order: usize, points: &[f64]) -> AxisTable {
        match self {
            Self::Legendre => AxisTable::Legendre(LegendreShapeFn::with(max_order, points)),
            Self::Lobatto => AxisTable::Lobatto(LobattoShapeFn::with(max_order, points)),
        }
    }
}

/// Local tensor-product basis indices for the given orders (last axis varying fastest)
pub fn tensor_indices<const D: usize>(orders: [u8; D]) -> Vec<[u8; D]> {
    multi_indices(std::array::from_fn(|k| orders[k] as usize + 1))
        .map(|idx: [usize; D]| std::array::from_fn(|k| idx[k] as u8))
        .collect()
}

/// The value and real-space gradient of one basis function at one point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BasisSample<const D: usize> {
    pub value: f64,
    pub grad: [f64; D],
}

/// Samples a tensor-product basis over a `Cell` at the points of a [TensorRule]
pub struct BasisSampler<const D: usize> {
    indices: Vec<[u8; D]>,
    tables: Vec<AxisTable>,
    inv_jacobian: [f64; D],
}

impl<const D: usize> BasisSampler<D> {
    pub fn new(kind: ShapeKind, orders: [u8; D], cell: &Cell<D>, rule: &TensorRule<D>) -> Self {
        let tables = (0..D)
            .map(|k| {
                let parametric: Vec<f64> = rule.points[k]
                    .iter()
                    .map(|x| 2.0 * (x - cell.min[k]) / cell.extent(k) - 1.0)
                    .collect();
                kind.table(orders[k] as usize, &parametric)
            })
            .collect();

        Self {
            indices: tensor_indices(orders),
            tables,
            inv_jacobian: std::array::from_fn(|k| cell.inv_jacobian(k)),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[[u8; D]] {
        &self.indices
    }

    /// Every basis function at the rule point `q`
    pub fn sample(&self, q: [usize; D]) -> Vec<BasisSample<D>> {
        self.indices
            .iter()
            .map(|idx| {
                let values: [f64; D] =
                    std::array::from_fn(|k| self.tables[k].poly(idx[k] as usize, q[k]));
                let derivs: [f64; D] = std::array::from_fn(|k| {
                    self.tables[k].poly_d1(idx[k] as usize, q[k]) * self.inv_jacobian[k]
                });

                BasisSample {
                    value: values.iter().product(),
                    grad: std::array::from_fn(|k| {
                        (0..D)
                            .map(|j| if j == k { derivs[j] } else { values[j] })
                            .product()
                    }),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_index_layout() {
        let indices = tensor_indices([1, 2]);
        assert_eq!(indices.len(), 6);
        assert_eq!(indices[0], [0, 0]);
        assert_eq!(indices[2], [0, 2]);
        assert_eq!(indices[5], [1, 2]);
        assert_eq!(tensor_indices([0u8]).len(), 1);
    }

    #[test]
    fn gradients_in_real_space() {
        // P_1(u) P_1(v) over (0, 2) x (0, 4) = (x - 1) (y - 2) / 2
        let cell = Cell::new([0.0, 0.0], [2.0, 4.0]);
        let x = [1.5, 3.0];
        let rule = TensorRule::single(x);
        let sampler = BasisSampler::new(ShapeKind::Legendre, [1, 1], &cell, &rule);
        let samples = sampler.sample([0, 0]);

        assert_eq!(samples.len(), 4);
        let bilinear = samples[3];
        assert!((bilinear.value - 0.25).abs() < 1e-14);
        assert!((bilinear.grad[0] - 0.5).abs() < 1e-14);
        assert!((bilinear.grad[1] - 0.25).abs() < 1e-14);
    }

    #[test]
    fn lobatto_vertex_partition_of_unity() {
        let cell = Cell::new([2.0], [3.0]);
        let rule = TensorRule::uniform(&cell, 4);
        let sampler = BasisSampler::new(ShapeKind::Lobatto, [3], &cell, &rule);

        for (q, _, _) in rule.iter() {
            let samples = sampler.sample(q);
            assert!((samples[0].value + samples[1].value - 1.0).abs() < 1e-14);
            assert!((samples[0].grad[0] + 1.0).abs() < 1e-14);
        }
    }
}
