use super::{legendre::LegendreShapeFn, ShapeFn};

/// Hierarchic Lobatto shape functions
///
/// * `n = 0`: `(1 - x) / 2` (left vertex)
/// * `n = 1`: `(1 + x) / 2` (right vertex)
/// * `n >= 2`: `(P_n - P_{n-2}) / sqrt(2 (2n - 1))` (bubbles vanishing at both ends)
pub struct LobattoShapeFn {
    polys: Vec<Vec<f64>>,
    polys_d1: Vec<Vec<f64>>,
}

impl ShapeFn for LobattoShapeFn {
    fn with(max_order: usize, points: &[f64]) -> Self {
        let legendre = LegendreShapeFn::with(max_order.max(1), points);

        let mut polys = Vec::with_capacity(max_order + 1);
        let mut polys_d1 = Vec::with_capacity(max_order + 1);

        for n in 0..=max_order {
            match n {
                0 => {
                    polys.push(points.iter().map(|x| 0.5 * (1.0 - x)).collect());
                    polys_d1.push(vec![-0.5; points.len()]);
                }
                1 => {
                    polys.push(points.iter().map(|x| 0.5 * (1.0 + x)).collect());
                    polys_d1.push(vec![0.5; points.len()]);
                }
                _ => {
                    let norm = (2.0 * (2 * n - 1) as f64).sqrt();
                    polys.push(
                        (0..points.len())
                            .map(|p| (legendre.poly(n, p) - legendre.poly(n - 2, p)) / norm)
                            .collect(),
                    );
                    // (P_n - P_{n-2})' = (2n - 1) P_{n-1}
                    polys_d1.push(
                        (0..points.len())
                            .map(|p| (2 * n - 1) as f64 * legendre.poly(n - 1, p) / norm)
                            .collect(),
                    );
                }
            }
        }

        Self { polys, polys_d1 }
    }

    fn poly(&self, n: usize, p: usize) -> f64 {
        self.polys[n][p]
    }

    fn poly_d1(&self, n: usize, p: usize) -> f64 {
        self.polys_d1[n][p]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_and_bubble_values() {
        let shapes = LobattoShapeFn::with(6, &[-1.0, 0.3, 1.0]);

        assert!((shapes.poly(0, 0) - 1.0).abs() < 1e-14);
        assert!(shapes.poly(0, 2).abs() < 1e-14);
        assert!(shapes.poly(1, 0).abs() < 1e-14);
        assert!((shapes.poly(1, 2) - 1.0).abs() < 1e-14);

        for n in 2..=6 {
            assert!(shapes.poly(n, 0).abs() < 1e-14);
            assert!(shapes.poly(n, 2).abs() < 1e-14);
            assert!(shapes.poly(n, 1).abs() > 1e-6);
        }

        // l_2 = (x^2 - 1) sqrt(3/8)
        let x: f64 = 0.3;
        assert!((shapes.poly(2, 1) - (x * x - 1.0) * (3.0f64 / 8.0).sqrt()).abs() < 1e-14);
        assert!((shapes.poly_d1(2, 1) - 2.0 * x * (3.0f64 / 8.0).sqrt()).abs() < 1e-14);
    }
}
