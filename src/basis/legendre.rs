use super::ShapeFn;

/// Legendre polynomials `P_n` and their first derivatives
///
/// Orthogonal over `(-1, 1)`; used for discontinuous spaces and local projections
pub struct LegendreShapeFn {
    polys: Vec<Vec<f64>>,
    polys_d1: Vec<Vec<f64>>,
}

impl ShapeFn for LegendreShapeFn {
    fn with(max_order: usize, points: &[f64]) -> Self {
        let mut polys: Vec<Vec<f64>> = Vec::with_capacity(max_order + 1);
        let mut polys_d1: Vec<Vec<f64>> = Vec::with_capacity(max_order + 1);

        for n in 0..=max_order {
            let (p, p_d1): (Vec<f64>, Vec<f64>) = match n {
                0 => (vec![1.0; points.len()], vec![0.0; points.len()]),
                1 => (points.to_vec(), vec![1.0; points.len()]),
                _ => {
                    let n_ = (n - 1) as f64;
                    points
                        .iter()
                        .enumerate()
                        .map(|(i, x)| {
                            // (n + 1) P_{n+1} = (2n + 1) x P_n - n P_{n-1}
                            let value = ((2.0 * n_ + 1.0) * x * polys[n - 1][i]
                                - n_ * polys[n - 2][i])
                                / (n_ + 1.0);
                            // P'_{n+1} = P'_{n-1} + (2n + 1) P_n
                            let deriv = polys_d1[n - 2][i] + (2.0 * n_ + 1.0) * polys[n - 1][i];
                            (value, deriv)
                        })
                        .unzip()
                }
            };
            polys.push(p);
            polys_d1.push(p_d1);
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
