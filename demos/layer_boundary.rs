//! `-u'' + K^2 u = K^2` over `(-1, 1)` with homogeneous Dirichlet conditions
//!
//! The solution is flat in the interior with thin layers at both ends. The initial mesh is graded
//! towards the boundary, and the loop stops once the exact error drops below the configured target.

use hp_adapt::adapt::{AdaptivityConfig, AdaptivityController, ConvergenceLogger};
use hp_adapt::domain::fields::BoundaryLayer;
use hp_adapt::fem_problem::{ConstantCoefficients, NewtonSolver, OrthogonalProjector};
use hp_adapt::{EssentialBc, ErrorNorm, Mesh, Space};

const K: f64 = 1e2;
const P_INIT: u8 = 1;
const INIT_REF_NUM_BDY: usize = 5;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = AdaptivityConfig::from_file("./test_input/layer_boundary_config.json")?;

    let mut mesh = Mesh::<1>::from_file("./test_input/interval.json")?;
    mesh.refine_towards_boundary("Left", INIT_REF_NUM_BDY)?;
    mesh.refine_towards_boundary("Right", INIT_REF_NUM_BDY)?;

    let space = Space::h1(
        mesh,
        P_INIT,
        vec![EssentialBc::new("Left", 0.0), EssentialBc::new("Right", 0.0)],
    )?;

    let mut controller = AdaptivityController::new(
        config,
        vec![space],
        NewtonSolver::single(ConstantCoefficients::boundary_layer(K)),
        OrthogonalProjector::new(ErrorNorm::H1),
    )?
    .with_exact_solutions(vec![Box::new(BoundaryLayer::new(K))])?
    .with_observer(ConvergenceLogger::new("./test_output/layer_boundary"));

    let outcome = controller.run()?;

    log::info!(
        "{:?} after {} steps: {} DOF, err_est_rel {:.4e}%, err_exact_rel {:.4e}%",
        outcome.termination,
        outcome.steps,
        outcome.num_dofs,
        outcome.error_estimate,
        outcome.exact_error.unwrap_or(f64::NAN),
    );

    Ok(())
}
