use crate::adapt::config::ConfigError;
use crate::domain::{
    fields::FieldError,
    mesh::{h_refinement::HRefError, p_refinement::PRefError, MeshError},
    SpaceError,
};
use crate::fem_problem::SolveFailure;
use crate::linalg::LinalgError;
use thiserror::Error;

/// Fatal errors of the adaptivity loop and its collaborators
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("Invalid adaptivity configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error(transparent)]
    HRef(#[from] HRefError),
    #[error(transparent)]
    PRef(#[from] PRefError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error("Solver failed in adaptivity step {step}: {failure}")]
    Solve { step: usize, failure: SolveFailure },
    #[error("Incompatible meshes: {0}")]
    IncompatibleMeshes(String),
    #[error("Expected {expected} solution components, found {found}")]
    ComponentMismatch { expected: usize, found: usize },
}

impl From<FieldError> for AdaptError {
    fn from(err: FieldError) -> Self {
        Self::IncompatibleMeshes(err.to_string())
    }
}
