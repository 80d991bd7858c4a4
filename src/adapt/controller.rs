use super::config::AdaptivityConfig;
use super::estimate::{ErrorCalculator, ErrorTable};
use super::reference::ReferenceBuilder;
use super::selector::{CandidateEvaluator, RefinementCandidate};
use super::stopping::{StopReason, StoppingPolicy};
use crate::domain::{
    fields::{ExactSolution, FieldRef, Solution},
    Space,
};
use crate::error::AdaptError;
use crate::fem_problem::{split_solution, Projector, Solver};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// States of the adaptivity loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    BuildReference,
    SolveReference,
    EstimateError,
    CheckStop,
    SelectAndRefine,
    Done,
}

/// Shared flag used to stop a running loop from another thread
///
/// The loop checks the flag before every phase, so it stops within one phase of a call to [CancelToken::cancel].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why [AdaptivityController::run] returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Converged,
    DofLimit,
    StepLimit,
    /// No flagged `Elem` had a candidate that reduces the error
    NoRefinementPossible,
    Cancelled,
}

impl From<StopReason> for Termination {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Converged => Self::Converged,
            StopReason::DofLimit => Self::DofLimit,
            StopReason::StepLimit => Self::StepLimit,
        }
    }
}

/// Progress of the loop, kept between calls to [AdaptivityController::run]
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptivityState {
    /// Estimated relative error (percent) of the latest step
    pub error_estimate: f64,
    pub exact_error: Option<f64>,
    pub num_dofs: usize,
    /// Number of completed estimates
    pub step: usize,
    /// Phase the loop is in (or stopped in)
    pub phase: Phase,
    pub done: bool,
}

impl Default for AdaptivityState {
    fn default() -> Self {
        Self {
            error_estimate: f64::INFINITY,
            exact_error: None,
            num_dofs: 0,
            step: 0,
            phase: Phase::BuildReference,
            done: false,
        }
    }
}

/// A [Phase] together with the data carried into it from the previous one
enum Stage<const D: usize> {
    BuildReference,
    SolveReference {
        references: Vec<Space<D>>,
    },
    EstimateError {
        references: Vec<Space<D>>,
        reference_solutions: Vec<Solution<D>>,
    },
    CheckStop {
        errors: ErrorTable,
        reference_solutions: Vec<Solution<D>>,
    },
    SelectAndRefine {
        errors: ErrorTable,
        reference_solutions: Vec<Solution<D>>,
    },
    Done,
}

impl<const D: usize> Stage<D> {
    fn phase(&self) -> Phase {
        match self {
            Self::BuildReference => Phase::BuildReference,
            Self::SolveReference { .. } => Phase::SolveReference,
            Self::EstimateError { .. } => Phase::EstimateError,
            Self::CheckStop { .. } => Phase::CheckStop,
            Self::SelectAndRefine { .. } => Phase::SelectAndRefine,
            Self::Done => Phase::Done,
        }
    }
}

/// Summary of one estimate, handed to every [AdaptivityObserver]
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub ndof_coarse: usize,
    pub ndof_reference: usize,
    pub component_dofs: Vec<usize>,
    pub error_estimate_percent: f64,
    pub exact_error_percent: Option<f64>,
    /// Time since the start of [AdaptivityController::run]
    pub elapsed: Duration,
}

pub trait AdaptivityObserver {
    fn on_step(&mut self, report: &StepReport);
}

impl<F: FnMut(&StepReport)> AdaptivityObserver for F {
    fn on_step(&mut self, report: &StepReport) {
        self(report)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdaptivityOutcome {
    pub termination: Termination,
    pub steps: usize,
    pub num_dofs: usize,
    pub error_estimate: f64,
    pub exact_error: Option<f64>,
    pub history: Vec<StepReport>,
}

impl AdaptivityOutcome {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Drives the hp-adaptivity loop over one Space per solution component
///
/// Each step builds reference Spaces, solves on them, projects the reference solutions onto the
/// coarse Spaces, estimates the error, and (unless a stopping criterion is met) refines the coarse
/// Spaces where the error is largest.
pub struct AdaptivityController<const D: usize, S, P> {
    config: AdaptivityConfig,
    spaces: Vec<Space<D>>,
    solver: S,
    projector: P,
    exact_solutions: Vec<Box<dyn ExactSolution<D>>>,
    observers: Vec<Box<dyn AdaptivityObserver>>,
    cancel_token: CancelToken,
    state: AdaptivityState,
    history: Vec<StepReport>,
}

impl<const D: usize, S: Solver<D>, P: Projector<D>> AdaptivityController<D, S, P> {
    pub fn new(
        config: AdaptivityConfig,
        spaces: Vec<Space<D>>,
        solver: S,
        projector: P,
    ) -> Result<Self, AdaptError> {
        config.validate()?;
        let num_dofs = spaces.iter().map(|space| space.num_dofs()).sum();

        Ok(Self {
            config,
            spaces,
            solver,
            projector,
            exact_solutions: Vec::new(),
            observers: Vec::new(),
            cancel_token: CancelToken::new(),
            state: AdaptivityState {
                num_dofs,
                ..Default::default()
            },
            history: Vec::new(),
        })
    }

    /// Known solutions (one per component) used to report the true error alongside the estimate
    pub fn with_exact_solutions(
        mut self,
        exact_solutions: Vec<Box<dyn ExactSolution<D>>>,
    ) -> Result<Self, AdaptError> {
        if exact_solutions.len() != self.spaces.len() {
            return Err(AdaptError::ComponentMismatch {
                expected: self.spaces.len(),
                found: exact_solutions.len(),
            });
        }
        self.exact_solutions = exact_solutions;
        Ok(self)
    }

    pub fn with_observer(mut self, observer: impl AdaptivityObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_token.clone()
    }

    pub fn config(&self) -> &AdaptivityConfig {
        &self.config
    }

    pub fn spaces(&self) -> &[Space<D>] {
        &self.spaces
    }

    pub fn into_spaces(self) -> Vec<Space<D>> {
        self.spaces
    }

    pub fn state(&self) -> &AdaptivityState {
        &self.state
    }

    pub fn history(&self) -> &[StepReport] {
        &self.history
    }

    /// Relative error estimate (percent) of the latest step
    pub fn error_estimate(&self) -> f64 {
        self.state.error_estimate
    }

    /// Total DoFs over every coarse Space
    pub fn num_dofs(&self) -> usize {
        self.spaces.iter().map(|space| space.num_dofs()).sum()
    }

    pub fn component_dofs(&self) -> Vec<usize> {
        self.spaces.iter().map(|space| space.num_dofs()).collect()
    }

    /// Forget the step count and history; the refined Spaces are kept
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = AdaptivityState {
            num_dofs: self.num_dofs(),
            ..Default::default()
        };
    }

    /// Run the loop until a stopping criterion is met, no refinement is possible, or the loop is cancelled
    pub fn run(&mut self) -> Result<AdaptivityOutcome, AdaptError> {
        let start = Instant::now();
        let builder = ReferenceBuilder::new(self.config.reference);
        let calculator = ErrorCalculator::new(self.config.error_norm, self.config.normalization);
        let policy = StoppingPolicy::from(&self.config);

        let mut step = self.state.step + 1;
        let mut stage: Stage<D> = Stage::BuildReference;
        let mut termination = Termination::Cancelled;
        self.state.done = false;

        loop {
            self.state.phase = stage.phase();
            if let Stage::Done = stage {
                break;
            }
            if self.cancel_token.is_cancelled() {
                info!("Adaptivity cancelled in step {}", step);
                termination = Termination::Cancelled;
                break;
            }

            stage = match stage {
                Stage::BuildReference => {
                    info!("---- Adaptivity step {} ({} DOF)", step, self.num_dofs());
                    let references = self
                        .spaces
                        .iter()
                        .map(|space| builder.build(space))
                        .collect::<Result<Vec<_>, AdaptError>>()?;
                    Stage::SolveReference { references }
                }
                Stage::SolveReference { references } => {
                    let ndof_reference: usize = references.iter().map(|r| r.num_dofs()).sum();
                    info!("ndof_coarse: {}, ndof_fine: {}", self.num_dofs(), ndof_reference);

                    let coefficients = self
                        .solver
                        .solve(&references)
                        .into_result()
                        .map_err(|failure| AdaptError::Solve { step, failure })?;
                    let reference_solutions = split_solution(&references, coefficients)?;
                    Stage::EstimateError {
                        references,
                        reference_solutions,
                    }
                }
                Stage::EstimateError {
                    references,
                    reference_solutions,
                } => {
                    let coarse_solutions = self
                        .spaces
                        .iter()
                        .zip(reference_solutions.iter())
                        .map(|(space, reference)| self.projector.project_global(space, reference))
                        .collect::<Result<Vec<_>, AdaptError>>()?;

                    let fields: Vec<FieldRef<D>> =
                        reference_solutions.iter().map(FieldRef::Discrete).collect();
                    let errors = calculator.calculate_errors(&coarse_solutions, &fields)?;
                    let exact_error = self.exact_error(&calculator, &coarse_solutions);

                    let error_estimate = errors.total_error_percent();
                    match exact_error {
                        Some(exact) => info!(
                            "err_est_rel: {:.6}%, err_exact_rel: {:.6}%",
                            error_estimate, exact
                        ),
                        None => info!("err_est_rel: {:.6}%", error_estimate),
                    }

                    self.state = AdaptivityState {
                        error_estimate,
                        exact_error,
                        num_dofs: self.num_dofs(),
                        step,
                        phase: Phase::EstimateError,
                        done: false,
                    };

                    let report = StepReport {
                        step,
                        ndof_coarse: self.num_dofs(),
                        ndof_reference: references.iter().map(|r| r.num_dofs()).sum(),
                        component_dofs: self.component_dofs(),
                        error_estimate_percent: error_estimate,
                        exact_error_percent: exact_error,
                        elapsed: start.elapsed(),
                    };
                    for observer in self.observers.iter_mut() {
                        observer.on_step(&report);
                    }
                    self.history.push(report);

                    Stage::CheckStop {
                        errors,
                        reference_solutions,
                    }
                }
                Stage::CheckStop {
                    errors,
                    reference_solutions,
                } => {
                    let stop_error = match (self.config.stop_on_exact_error, self.state.exact_error) {
                        (true, Some(exact)) => exact,
                        _ => self.state.error_estimate,
                    };

                    match policy.check(stop_error, self.num_dofs(), step) {
                        Some(reason) => {
                            info!("Adaptivity stopped after step {}: {:?}", step, reason);
                            termination = reason.into();
                            Stage::Done
                        }
                        None => Stage::SelectAndRefine {
                            errors,
                            reference_solutions,
                        },
                    }
                }
                Stage::SelectAndRefine {
                    errors,
                    reference_solutions,
                } => {
                    if self.adapt(&errors, &reference_solutions)? {
                        info!("No refinement reduces the error; stopping after step {}", step);
                        termination = Termination::NoRefinementPossible;
                        Stage::Done
                    } else {
                        step += 1;
                        Stage::BuildReference
                    }
                }
                Stage::Done => Stage::Done,
            };
        }

        self.state.done = true;
        self.state.num_dofs = self.num_dofs();

        Ok(AdaptivityOutcome {
            termination,
            steps: self.state.step,
            num_dofs: self.num_dofs(),
            error_estimate: self.state.error_estimate,
            exact_error: self.state.exact_error,
            history: self.history.clone(),
        })
    }

    /// Refine the coarse Spaces where `errors` flags them, fitting candidates to `reference_solutions`
    ///
    /// Candidates are scored in parallel and committed afterwards. Returns `true` if nothing was
    /// refined (no flagged `Elem` has a candidate that reduces its error).
    pub fn adapt(
        &mut self,
        errors: &ErrorTable,
        reference_solutions: &[Solution<D>],
    ) -> Result<bool, AdaptError> {
        if reference_solutions.len() != self.spaces.len() {
            return Err(AdaptError::ComponentMismatch {
                expected: self.spaces.len(),
                found: reference_solutions.len(),
            });
        }
        if errors.num_components() != self.spaces.len() {
            return Err(AdaptError::ComponentMismatch {
                expected: self.spaces.len(),
                found: errors.num_components(),
            });
        }

        let flagged = self.config.strategy.select(self.config.threshold, errors);
        let evaluator = CandidateEvaluator::from_config(&self.config);
        let spaces = &self.spaces;

        let chosen: Vec<(usize, RefinementCandidate<D>)> = flagged
            .par_iter()
            .map(|flag| {
                evaluator
                    .best(
                        &spaces[flag.component],
                        flag.elem_id,
                        FieldRef::Discrete(&reference_solutions[flag.component]),
                    )
                    .map(|best| best.map(|candidate| (flag.component, candidate)))
            })
            .collect::<Result<Vec<_>, AdaptError>>()?
            .into_iter()
            .flatten()
            .collect();

        debug!(
            "{} elems flagged, {} refinements chosen",
            flagged.len(),
            chosen.len()
        );

        for (component, space) in self.spaces.iter_mut().enumerate() {
            let picks: Vec<&RefinementCandidate<D>> = chosen
                .iter()
                .filter(|(c, _)| *c == component)
                .map(|(_, candidate)| candidate)
                .collect();
            if picks.is_empty() {
                continue;
            }

            space.mesh.execute_h_refinements(
                picks
                    .iter()
                    .filter_map(|candidate| candidate.split.map(|split| (candidate.elem_id, split)))
                    .collect(),
            )?;

            let mut new_orders = Vec::new();
            for candidate in picks {
                debug!(
                    "component {}, elem {}: {:?} {:?} -> {:?} (+{} DOF, score {:.3e})",
                    component,
                    candidate.elem_id,
                    candidate.kind,
                    candidate.split,
                    candidate.child_orders,
                    candidate.dof_delta,
                    candidate.score
                );

                match candidate.split {
                    Some(_) => new_orders.extend(
                        space.mesh.elems[candidate.elem_id]
                            .child_ids()
                            .into_iter()
                            .flatten()
                            .map(|child_id| (child_id, candidate.child_orders)),
                    ),
                    None => new_orders.push((candidate.elem_id, candidate.child_orders)),
                }
            }
            space.set_element_orders(new_orders)?;
        }

        Ok(chosen.is_empty())
    }

    fn exact_error(&self, calculator: &ErrorCalculator, coarse: &[Solution<D>]) -> Option<f64> {
        if self.exact_solutions.is_empty() {
            return None;
        }

        let fields: Vec<FieldRef<D>> = self
            .exact_solutions
            .iter()
            .map(|exact| FieldRef::Exact(exact.as_ref()))
            .collect();

        match calculator.calculate_errors(coarse, &fields) {
            Ok(table) => Some(table.total_error_percent()),
            Err(err) => {
                warn!("Unable to compute the exact error: {}", err);
                None
            }
        }
    }
}
