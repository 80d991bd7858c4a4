/// Newton iteration for (systems of) 1D reaction-diffusion problems
pub mod galerkin;

/// Orthogonal projections onto a Space
pub mod projection;

use crate::domain::{fields::Solution, Space};
use crate::error::AdaptError;
use thiserror::Error;

pub use galerkin::{
    ConstantCoefficients, CubicReaction, FitzHughNagumo, LinearCoupling, LinearProblem, NewtonSolver,
    ReactionDiffusion,
};
pub use projection::{OrthogonalProjector, ProjectionProblem};

/// Outcome of a discrete solve over one or more component Spaces
///
/// On success, the coefficient vectors of the components are concatenated in Space order.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveResult {
    Success(Vec<f64>),
    Diverged { iterations: usize, residual_norm: f64 },
    MaxIterationsExceeded { iterations: usize, residual_norm: f64 },
    Singular,
    InvalidProblem(String),
}

/// The failure modes of [SolveResult]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SolveFailure {
    #[error("Iteration diverged after {iterations} steps (residual norm: {residual_norm:.3e})")]
    Diverged { iterations: usize, residual_norm: f64 },
    #[error("No convergence within {iterations} steps (residual norm: {residual_norm:.3e})")]
    MaxIterationsExceeded { iterations: usize, residual_norm: f64 },
    #[error("System matrix is singular")]
    Singular,
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),
}

impl SolveResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<Vec<f64>, SolveFailure> {
        match self {
            Self::Success(coefficients) => Ok(coefficients),
            Self::Diverged {
                iterations,
                residual_norm,
            } => Err(SolveFailure::Diverged {
                iterations,
                residual_norm,
            }),
            Self::MaxIterationsExceeded {
                iterations,
                residual_norm,
            } => Err(SolveFailure::MaxIterationsExceeded {
                iterations,
                residual_norm,
            }),
            Self::Singular => Err(SolveFailure::Singular),
            Self::InvalidProblem(reason) => Err(SolveFailure::InvalidProblem(reason)),
        }
    }
}

/// Produces the discrete solution of a problem over a set of component Spaces
pub trait Solver<const D: usize> {
    fn solve(&mut self, spaces: &[Space<D>]) -> SolveResult;
}

/// Maps a solution onto a (coarser) Space
pub trait Projector<const D: usize> {
    fn project_global(&self, space: &Space<D>, source: &Solution<D>) -> Result<Solution<D>, AdaptError>;
}

/// Split a concatenated coefficient vector into one Solution per Space
pub fn split_solution<const D: usize>(
    spaces: &[Space<D>],
    coefficients: Vec<f64>,
) -> Result<Vec<Solution<D>>, AdaptError> {
    let expected: usize = spaces.iter().map(|space| space.num_dofs()).sum();
    if coefficients.len() != expected {
        return Err(crate::domain::SpaceError::CoefficientLength {
            expected,
            found: coefficients.len(),
        }
        .into());
    }

    let mut offset = 0;
    spaces
        .iter()
        .map(|space| {
            let n = space.num_dofs();
            let component = coefficients[offset..offset + n].to_vec();
            offset += n;
            Ok(Solution::from_vector(space, component)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mesh::Mesh;

    #[test]
    fn solve_result_conversion() {
        assert_eq!(SolveResult::Success(vec![1.0]).into_result(), Ok(vec![1.0]));
        assert_eq!(
            SolveResult::Diverged {
                iterations: 3,
                residual_norm: 1e12
            }
            .into_result(),
            Err(SolveFailure::Diverged {
                iterations: 3,
                residual_norm: 1e12
            })
        );
        assert!(!SolveResult::Singular.is_success());
    }

    #[test]
    fn split_components() {
        let spaces = vec![
            Space::l2(Mesh::interval(0.0, 1.0, 2).unwrap(), 1).unwrap(),
            Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), 2).unwrap(),
        ];
        let solutions = split_solution(&spaces, (0..7).map(|i| i as f64).collect()).unwrap();
        assert_eq!(solutions[0].coefficients(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(solutions[1].coefficients(), &[4.0, 5.0, 6.0]);

        assert!(split_solution(&spaces, vec![0.0; 6]).is_err());
    }
}
