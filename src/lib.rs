//! hp-adaptive finite element refinement
//!
//! An [AdaptivityController](adapt::AdaptivityController) repeatedly solves a problem on a globally
//! refined reference [Space](domain::Space), compares the result with its projection onto the coarse
//! Space, and refines the coarse Space (by splitting `Elem`s, raising their expansion orders, or both)
//! where the error is largest, until the error or the DoF budget is exhausted.

/// The adaptivity loop and its components
pub mod adapt;
/// Structures and Traits for Basis Function Evaluation
pub mod basis;
/// Structures to define the geometric characteristics and refinement state of a discretization
pub mod domain;
/// Crate level error type
pub mod error;
/// Discrete problems and projections over a Space
pub mod fem_problem;
/// Gauss-Legendre quadrature over tensor product cells
pub mod integration;
/// Sparse and dense linear solves
pub mod linalg;

pub use adapt::{AdaptivityConfig, AdaptivityController, AdaptivityOutcome, Termination};
pub use domain::{
    dof::EssentialBc,
    fields::{ErrorNorm, ExactSolution, FieldRef, Solution},
    mesh::{h_refinement::HRef, Mesh},
    Space, SpaceKind,
};
pub use error::AdaptError;
pub use fem_problem::{Projector, SolveResult, Solver};
