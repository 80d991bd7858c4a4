use super::{mesh::cell::Cell, Space, SpaceError};
use crate::basis::{BasisSample, BasisSampler, ShapeKind};
use crate::integration::{points_for_degree, TensorRule};
use std::f64::consts::PI;
use thiserror::Error;

/// Extra Gauss points (per axis) used when integrating against a non-polynomial field
pub const EXACT_EXTRA_POINTS: usize = 8;

/// Norm used to measure errors and to define projections
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorNorm {
    L2,
    /// L2 norm plus the gradient seminorm
    H1,
}

/// A field's value and real-space gradient at one point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample<const D: usize> {
    pub value: f64,
    pub grad: [f64; D],
}

impl<const D: usize> Sample<D> {
    pub fn zero() -> Self {
        Self {
            value: 0.0,
            grad: [0.0; D],
        }
    }

    pub fn diff(&self, other: &Self) -> Self {
        Self {
            value: self.value - other.value,
            grad: std::array::from_fn(|k| self.grad[k] - other.grad[k]),
        }
    }

    /// Inner product of two samples under the given norm
    pub fn dot(&self, other: &Self, norm: ErrorNorm) -> f64 {
        let value = self.value * other.value;
        match norm {
            ErrorNorm::L2 => value,
            ErrorNorm::H1 => value + (0..D).map(|k| self.grad[k] * other.grad[k]).sum::<f64>(),
        }
    }

    /// Squared norm density
    pub fn density(&self, norm: ErrorNorm) -> f64 {
        self.dot(self, norm)
    }
}

impl<const D: usize> From<BasisSample<D>> for Sample<D> {
    fn from(bs: BasisSample<D>) -> Self {
        Self {
            value: bs.value,
            grad: bs.grad,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldError {
    #[error("Field covers {covered:.6e} of a cell with volume {volume:.6e}; the meshes are not nested!")]
    Uncovered { volume: f64, covered: f64 },
    #[error("Field piece {piece:?} straddles the cell {cell:?}; the meshes are not nested!")]
    NotNested { cell: String, piece: String },
    #[error("Field is defined over a domain of volume {found:.6e}, expected {expected:.6e}!")]
    DomainMismatch { expected: f64, found: f64 },
}

/// A function with a known closed form
pub trait ExactSolution<const D: usize>: Send + Sync {
    fn value(&self, x: [f64; D]) -> f64;
    fn gradient(&self, x: [f64; D]) -> [f64; D];

    fn sample(&self, x: [f64; D]) -> Sample<D> {
        Sample {
            value: self.value(x),
            grad: self.gradient(x),
        }
    }
}

/// The restriction of a [Solution] to one active `Elem`
#[derive(Clone, Debug)]
pub struct Piece<const D: usize> {
    pub elem_id: usize,
    pub cell: Cell<D>,
    pub orders: [u8; D],
    pub shape: ShapeKind,
    /// Coefficients in tensor-index order (fixed DoFs already substituted)
    pub coeffs: Vec<f64>,
}

impl<const D: usize> Piece<D> {
    pub fn degree(&self) -> u8 {
        self.orders.iter().copied().max().unwrap_or(0)
    }

    pub fn sampler(&self, rule: &TensorRule<D>) -> PieceSampler<'_, D> {
        PieceSampler {
            piece: self,
            basis: BasisSampler::new(self.shape, self.orders, &self.cell, rule),
        }
    }

    pub fn sample_at(&self, x: [f64; D]) -> Sample<D> {
        self.sampler(&TensorRule::single(x)).sample([0; D])
    }
}

pub struct PieceSampler<'a, const D: usize> {
    piece: &'a Piece<D>,
    basis: BasisSampler<D>,
}

impl<'a, const D: usize> PieceSampler<'a, D> {
    pub fn sample(&self, q: [usize; D]) -> Sample<D> {
        self.basis
            .sample(q)
            .iter()
            .zip(self.piece.coeffs.iter())
            .fold(Sample::zero(), |mut acc, (bs, c)| {
                acc.value += c * bs.value;
                for k in 0..D {
                    acc.grad[k] += c * bs.grad[k];
                }
                acc
            })
    }
}

/// A coefficient vector frozen against the [Space] it was computed on
#[derive(Clone, Debug)]
pub struct Solution<const D: usize> {
    pieces: Vec<Piece<D>>,
    coefficients: Vec<f64>,
}

impl<const D: usize> Solution<D> {
    /// Bind a vector of unknowns to a Space
    pub fn from_vector(space: &Space<D>, coefficients: Vec<f64>) -> Result<Self, SpaceError> {
        if coefficients.len() != space.num_dofs() {
            return Err(SpaceError::CoefficientLength {
                expected: space.num_dofs(),
                found: coefficients.len(),
            });
        }
        Ok(Self::bind(space, coefficients))
    }

    /// The zero function (with essential boundary values) over a Space
    pub fn zero(space: &Space<D>) -> Self {
        Self::bind(space, vec![0.0; space.num_dofs()])
    }

    // `coefficients` must have one entry per DoF of `space`
    fn bind(space: &Space<D>, coefficients: Vec<f64>) -> Self {
        let pieces = space
            .active_elems()
            .filter_map(|elem| {
                space.elem_dofs(elem.id).map(|dofs| Piece {
                    elem_id: elem.id,
                    cell: elem.cell,
                    orders: elem.poly_orders.orders,
                    shape: space.shape_kind(),
                    coeffs: dofs.iter().map(|dof| dof.coefficient(&coefficients)).collect(),
                })
            })
            .collect();

        Self {
            pieces,
            coefficients,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn num_dofs(&self) -> usize {
        self.coefficients.len()
    }

    pub fn pieces(&self) -> &[Piece<D>] {
        &self.pieces
    }

    pub fn piece(&self, elem_id: usize) -> Option<&Piece<D>> {
        self.pieces.iter().find(|piece| piece.elem_id == elem_id)
    }

    /// Value and gradient at a point (taken from the first piece containing it)
    pub fn sample(&self, x: [f64; D]) -> Option<Sample<D>> {
        self.pieces
            .iter()
            .find(|piece| piece.cell.contains_point(x))
            .map(|piece| piece.sample_at(x))
    }

    pub fn value(&self, x: [f64; D]) -> Option<f64> {
        self.sample(x).map(|s| s.value)
    }

    pub fn domain_volume(&self) -> f64 {
        self.pieces.iter().map(|piece| piece.cell.volume()).sum()
    }

    /// Squared norm over the whole domain
    pub fn norm_squared(&self, norm: ErrorNorm) -> f64 {
        self.pieces
            .iter()
            .map(|piece| {
                let rule = TensorRule::uniform(&piece.cell, piece.degree() as usize + 1);
                let sampler = piece.sampler(&rule);
                rule.iter()
                    .map(|(q, _, w)| sampler.sample(q).density(norm) * w)
                    .sum::<f64>()
            })
            .sum()
    }
}

/// The function an error or projection is measured against
#[derive(Clone, Copy)]
pub enum FieldRef<'a, const D: usize> {
    Discrete(&'a Solution<D>),
    Exact(&'a dyn ExactSolution<D>),
}

impl<'a, const D: usize> FieldRef<'a, D> {
    /// The parts of `cell` over which the field is a single smooth function
    ///
    /// Fails if a discrete field does not cover the whole cell.
    pub fn regions(&self, cell: &Cell<D>) -> Result<Vec<Region<'a, D>>, FieldError> {
        match self {
            Self::Exact(exact) => Ok(vec![Region {
                cell: *cell,
                source: RegionSource::Exact(*exact),
            }]),
            Self::Discrete(solution) => {
                let regions: Vec<Region<'a, D>> = solution
                    .pieces
                    .iter()
                    .filter_map(|piece| {
                        piece.cell.intersection(cell).map(|overlap| Region {
                            cell: overlap,
                            source: RegionSource::Piece(piece),
                        })
                    })
                    .collect();

                let volume = cell.volume();
                let covered: f64 = regions.iter().map(|r| r.cell.volume()).sum();
                if (covered - volume).abs() > 1e-9 * volume {
                    return Err(FieldError::Uncovered { volume, covered });
                }

                // each piece must be a refinement of the cell, or the cell a refinement of it
                let straddling = solution.pieces.iter().find(|piece| {
                    piece.cell.intersection(cell).is_some()
                        && !cell.contains_cell(&piece.cell)
                        && !piece.cell.contains_cell(cell)
                });
                match straddling {
                    Some(piece) => Err(FieldError::NotNested {
                        cell: format!("{:?}", cell),
                        piece: format!("{:?}", piece.cell),
                    }),
                    None => Ok(regions),
                }
            }
        }
    }

    /// Volume of the domain a discrete field is defined over (`None` for exact fields)
    pub fn domain_volume(&self) -> Option<f64> {
        match self {
            Self::Exact(_) => None,
            Self::Discrete(solution) => Some(solution.domain_volume()),
        }
    }

    pub fn sample(&self, x: [f64; D]) -> Option<Sample<D>> {
        match self {
            Self::Exact(exact) => Some(exact.sample(x)),
            Self::Discrete(solution) => solution.sample(x),
        }
    }
}

#[derive(Clone, Copy)]
enum RegionSource<'a, const D: usize> {
    Piece(&'a Piece<D>),
    Exact(&'a dyn ExactSolution<D>),
}

/// A cell over which a [FieldRef] is smooth
#[derive(Clone, Copy)]
pub struct Region<'a, const D: usize> {
    pub cell: Cell<D>,
    source: RegionSource<'a, D>,
}

impl<'a, const D: usize> Region<'a, D> {
    /// Polynomial degree of the field over the region (`None` for exact fields)
    pub fn degree(&self) -> Option<u8> {
        match self.source {
            RegionSource::Piece(piece) => Some(piece.degree()),
            RegionSource::Exact(_) => None,
        }
    }

    /// Gauss points per axis for integrating the field against a polynomial of degree `other`
    pub fn quadrature_points(&self, other: u8) -> usize {
        match self.source {
            RegionSource::Piece(piece) => {
                points_for_degree(2 * piece.degree().max(other) as usize) + 1
            }
            RegionSource::Exact(_) => points_for_degree(2 * other as usize) + EXACT_EXTRA_POINTS,
        }
    }

    pub fn sampler(&self, rule: &TensorRule<D>) -> RegionSampler<'a, D> {
        match self.source {
            RegionSource::Piece(piece) => RegionSampler::Piece(piece.sampler(rule)),
            RegionSource::Exact(exact) => RegionSampler::Exact(exact),
        }
    }
}

pub enum RegionSampler<'a, const D: usize> {
    Piece(PieceSampler<'a, D>),
    Exact(&'a dyn ExactSolution<D>),
}

impl<'a, const D: usize> RegionSampler<'a, D> {
    /// Sample at rule point `q` (located at `x`)
    pub fn sample(&self, q: [usize; D], x: [f64; D]) -> Sample<D> {
        match self {
            Self::Piece(sampler) => sampler.sample(q),
            Self::Exact(exact) => exact.sample(x),
        }
    }
}

// ----------------------------------------------------------------------------------------------------
// closed form fields
// ----------------------------------------------------------------------------------------------------

/// `u(x) = 1 - (e^{kx} + e^{-kx}) / (e^k + e^{-k})` over `(-1, 1)`
///
/// Solves `-u'' + k^2 u = k^2` with homogeneous Dirichlet conditions; thin layers form at both ends for large `k`.
#[derive(Clone, Copy, Debug)]
pub struct BoundaryLayer {
    pub k: f64,
}

impl BoundaryLayer {
    pub fn new(k: f64) -> Self {
        Self { k }
    }
}

impl ExactSolution<1> for BoundaryLayer {
    // written with decaying exponentials only, so large k doesn't overflow
    fn value(&self, [x]: [f64; 1]) -> f64 {
        let k = self.k;
        1.0 - ((k * (x - 1.0)).exp() + (-k * (x + 1.0)).exp()) / (1.0 + (-2.0 * k).exp())
    }

    fn gradient(&self, [x]: [f64; 1]) -> [f64; 1] {
        let k = self.k;
        [-k * ((k * (x - 1.0)).exp() - (-k * (x + 1.0)).exp()) / (1.0 + (-2.0 * k).exp())]
    }
}

/// `u(x) = cos(ωx)`
#[derive(Clone, Copy, Debug)]
pub struct Cosine {
    pub omega: f64,
}

impl Cosine {
    pub fn new(omega: f64) -> Self {
        Self { omega }
    }
}

impl ExactSolution<1> for Cosine {
    fn value(&self, [x]: [f64; 1]) -> f64 {
        (self.omega * x).cos()
    }

    fn gradient(&self, [x]: [f64; 1]) -> [f64; 1] {
        [-self.omega * (self.omega * x).sin()]
    }
}

/// `u = r^{2/3} sin(2θ/3)`, the corner singularity of the L-shaped domain (θ in `[0, 2π)`)
#[derive(Clone, Copy, Debug, Default)]
pub struct LShapeCorner;

impl LShapeCorner {
    fn polar([x, y]: [f64; 2]) -> (f64, f64) {
        let mut theta = y.atan2(x);
        if theta < 0.0 {
            theta += 2.0 * PI;
        }
        (x.hypot(y), theta)
    }
}

impl ExactSolution<2> for LShapeCorner {
    fn value(&self, x: [f64; 2]) -> f64 {
        let (r, theta) = Self::polar(x);
        r.powf(2.0 / 3.0) * (2.0 * theta / 3.0).sin()
    }

    fn gradient(&self, x: [f64; 2]) -> [f64; 2] {
        let (r, theta) = Self::polar(x);
        if r == 0.0 {
            return [0.0; 2];
        }
        let scale = 2.0 / 3.0 * r.powf(-1.0 / 3.0);
        [-scale * (theta / 3.0).sin(), scale * (theta / 3.0).cos()]
    }
}

/// A tensor-product polynomial `Σ c_i x^{i_0} y^{i_1} ..` given as (coefficient, powers) terms
#[derive(Clone, Debug)]
pub struct Polynomial<const D: usize> {
    terms: Vec<(f64, [u8; D])>,
}

impl<const D: usize> Polynomial<D> {
    pub fn new(terms: Vec<(f64, [u8; D])>) -> Self {
        Self { terms }
    }

    pub fn constant(c: f64) -> Self {
        Self::new(vec![(c, [0; D])])
    }
}

impl Polynomial<2> {
    /// `a + b x + c y + d x y`
    pub fn bilinear([a, b, c, d]: [f64; 4]) -> Self {
        Self::new(vec![(a, [0, 0]), (b, [1, 0]), (c, [0, 1]), (d, [1, 1])])
    }
}

impl<const D: usize> ExactSolution<D> for Polynomial<D> {
    fn value(&self, x: [f64; D]) -> f64 {
        self.terms
            .iter()
            .map(|(c, powers)| c * (0..D).map(|k| x[k].powi(powers[k] as i32)).product::<f64>())
            .sum()
    }

    fn gradient(&self, x: [f64; D]) -> [f64; D] {
        std::array::from_fn(|j| {
            self.terms
                .iter()
                .filter(|(_, powers)| powers[j] > 0)
                .map(|(c, powers)| {
                    c * (0..D)
                        .map(|k| {
                            if k == j {
                                powers[k] as f64 * x[k].powi(powers[k] as i32 - 1)
                            } else {
                                x[k].powi(powers[k] as i32)
                            }
                        })
                        .product::<f64>()
                })
                .sum()
        })
    }
}
