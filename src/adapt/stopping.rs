use super::config::AdaptivityConfig;

/// Why a [StoppingPolicy] ended the loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The error fell below `err_stop`
    Converged,
    /// The DoF count reached `ndof_stop`
    DofLimit,
    /// The step count reached `max_steps`
    StepLimit,
}

/// Termination predicate of the adaptivity loop
///
/// The DoF and step ceilings are checked whether or not the error criterion is met, so the loop
/// ends in a bounded number of steps even when the error stalls (or is `NaN`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoppingPolicy {
    /// Target error (percent)
    pub err_stop: f64,
    pub ndof_stop: usize,
    pub max_steps: usize,
}

impl StoppingPolicy {
    pub fn new(err_stop: f64, ndof_stop: usize, max_steps: usize) -> Self {
        Self {
            err_stop,
            ndof_stop,
            max_steps,
        }
    }

    pub fn check(&self, error_percent: f64, total_dof: usize, step: usize) -> Option<StopReason> {
        if error_percent < self.err_stop {
            Some(StopReason::Converged)
        } else if total_dof >= self.ndof_stop {
            Some(StopReason::DofLimit)
        } else if step >= self.max_steps {
            Some(StopReason::StepLimit)
        } else {
            None
        }
    }

    pub fn should_stop(&self, error_percent: f64, total_dof: usize, step: usize) -> bool {
        self.check(error_percent, total_dof, step).is_some()
    }
}

impl From<&AdaptivityConfig> for StoppingPolicy {
    fn from(config: &AdaptivityConfig) -> Self {
        Self::new(config.err_stop, config.ndof_stop, config.max_steps)
    }
}
