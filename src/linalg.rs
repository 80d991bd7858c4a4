/// Sparsely Packed symmetric Matrix used for assembly
pub mod sparse_matrix;

use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use rayon::iter::{IntoParallelIterator, ParallelExtend, ParallelIterator};
use sparse_matrix::SparseMatrix;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not symmetric positive definite; Cholesky factorization failed!")]
    NotPositiveDefinite,
    #[error("Matrix is singular; the solution contains non-finite values!")]
    Singular,
    #[error("Right hand side has length {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// A linear system `A x = b` assembled from per-Elem contributions
///
/// `A` is the symmetric matrix `a` plus the entries of `a_general`, which are not mirrored.
#[derive(Clone, Debug)]
pub struct LinearSystem {
    pub a: SparseMatrix,
    pub a_general: BTreeMap<[usize; 2], f64>,
    pub b: Vec<f64>,
}

/// The contributions of a single Elem to a [LinearSystem]
///
/// `a_entries` are symmetric; each unordered pair of DoFs should appear once.
/// `general_entries` are added at `[row, col]` only.
#[derive(Clone, Debug, Default)]
pub struct LocalSystem {
    pub a_entries: Vec<([usize; 2], f64)>,
    pub general_entries: Vec<([usize; 2], f64)>,
    pub b_entries: Vec<(usize, f64)>,
}

impl LinearSystem {
    pub fn new(dimension: usize) -> Self {
        Self {
            a: SparseMatrix::new(dimension),
            a_general: BTreeMap::new(),
            b: vec![0.0; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.a.dimension
    }

    pub fn consume_local(&mut self, local: LocalSystem) {
        self.a.insert_group(local.a_entries);
        for (coordinates, value) in local.general_entries {
            *self.a_general.entry(coordinates).or_insert(0.0) += value;
        }
        for (row, value) in local.b_entries {
            self.b[row] += value;
        }
    }

    pub fn solve(&self) -> Result<Vec<f64>, LinalgError> {
        if self.a_general.is_empty() {
            solve_spd(&self.a, &self.b)
        } else {
            solve_general(&self.a, &self.a_general, &self.b)
        }
    }
}

impl ParallelExtend<LocalSystem> for LinearSystem {
    fn par_extend<I>(&mut self, elem_systems_iter: I)
    where
        I: IntoParallelIterator<Item = LocalSystem>,
    {
        // collected before insertion so the summation order doesn't depend on thread scheduling
        let elem_systems: Vec<LocalSystem> = elem_systems_iter.into_par_iter().collect();
        for local in elem_systems {
            self.consume_local(local);
        }
    }
}

/// Solve `A x = b` for a sparse symmetric positive definite `A` with a sparse Cholesky factorization
pub fn solve_spd(matrix: &SparseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
    if rhs.len() != matrix.dimension {
        return Err(LinalgError::DimensionMismatch {
            expected: matrix.dimension,
            found: rhs.len(),
        });
    }
    if rhs.is_empty() {
        return Ok(Vec::new());
    }

    let factorization =
        CscCholesky::factor(&matrix.to_csc()).map_err(|_| LinalgError::NotPositiveDefinite)?;
    let b = DMatrix::from_column_slice(rhs.len(), 1, rhs);
    let x = factorization.solve(&b);

    if x.iter().all(|v| v.is_finite()) {
        Ok(x.iter().copied().collect())
    } else {
        Err(LinalgError::Singular)
    }
}

/// Solve a small dense symmetric system; falls back to LU when the matrix is only semi-definite
pub fn solve_dense_spd(matrix: DMatrix<f64>, rhs: DVector<f64>) -> Result<DVector<f64>, LinalgError> {
    if rhs.len() != matrix.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected: matrix.nrows(),
            found: rhs.len(),
        });
    }

    let solution = match matrix.clone().cholesky() {
        Some(cholesky) => cholesky.solve(&rhs),
        None => matrix.lu().solve(&rhs).ok_or(LinalgError::Singular)?,
    };

    if solution.iter().all(|v| v.is_finite()) {
        Ok(solution)
    } else {
        Err(LinalgError::Singular)
    }
}

/// Solve `(S + G) x = b` where `S` is symmetric and `G` is stored entry by entry
///
/// The sum is factored densely: with Cholesky (falling back to LU) if it is still symmetric, with LU otherwise.
pub fn solve_general(
    symmetric: &SparseMatrix,
    general: &BTreeMap<[usize; 2], f64>,
    rhs: &[f64],
) -> Result<Vec<f64>, LinalgError> {
    let n = symmetric.dimension;
    if rhs.len() != n {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            found: rhs.len(),
        });
    }
    if let Some([r, c]) = general.keys().find(|[r, c]| *r >= n || *c >= n) {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            found: *r.max(c) + 1,
        });
    }
    if rhs.is_empty() {
        return Ok(Vec::new());
    }

    let mut dense: DMatrix<f64> = symmetric.clone().into();
    for ([r, c], value) in general.iter() {
        dense[(*r, *c)] += value;
    }
    let b = DVector::from_column_slice(rhs);

    let scale = dense.amax().max(f64::MIN_POSITIVE);
    let is_symmetric = (0..n).all(|r| (0..r).all(|c| (dense[(r, c)] - dense[(c, r)]).abs() <= 1e-12 * scale));

    let x = if is_symmetric {
        solve_dense_spd(dense, b)?
    } else {
        debug!("Unsymmetric system of dimension {}; solving with LU", n);
        let x = dense.lu().solve(&b).ok_or(LinalgError::Singular)?;
        if !x.iter().all(|v| v.is_finite()) {
            return Err(LinalgError::Singular);
        }
        x
    };

    Ok(x.iter().copied().collect())
}
