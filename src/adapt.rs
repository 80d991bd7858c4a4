/// Tunables of the adaptivity loop
pub mod config;
/// The state machine driving the loop
pub mod controller;
/// Per-element error computation
pub mod estimate;
/// Convergence history files
pub mod graph;
/// Globally refined reference Spaces
pub mod reference;
/// Element selection and refinement candidates
pub mod selector;
/// Termination criteria
pub mod stopping;

pub use crate::domain::fields::ErrorNorm;
pub use config::{AdaptivityConfig, ConfigError};
pub use controller::{
    AdaptivityController, AdaptivityObserver, AdaptivityOutcome, AdaptivityState, CancelToken,
    Phase, StepReport, Termination,
};
pub use estimate::{ElementError, ErrorCalculator, ErrorNormalization, ErrorTable};
pub use graph::{ConvergenceGraph, ConvergenceLogger};
pub use reference::{ReferenceBuilder, ReferenceRefinement};
pub use selector::{
    CandList, CandidateEvaluator, CandidateKind, RefinementCandidate, SelectionStrategy,
};
pub use stopping::{StopReason, StoppingPolicy};
