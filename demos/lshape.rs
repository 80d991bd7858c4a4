//! Best approximation of `r^{2/3} sin(2θ/3)` over the L-shaped domain
//!
//! The gradient of the target is singular at the re-entrant corner, so refinement concentrates there.

use hp_adapt::adapt::{AdaptivityConfig, AdaptivityController, CandList, ConvergenceLogger};
use hp_adapt::domain::fields::LShapeCorner;
use hp_adapt::fem_problem::{OrthogonalProjector, ProjectionProblem};
use hp_adapt::{ErrorNorm, Mesh, Space};

const P_INIT: u8 = 2;
const THRESHOLD: f64 = 0.3;
const ERR_STOP: f64 = 0.1;
const NDOF_STOP: usize = 4000;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut mesh = Mesh::<2>::from_file("./test_input/lshape.json")?;
    mesh.refine_all_elements()?;
    let space = Space::l2(mesh, P_INIT)?;

    let config = AdaptivityConfig {
        threshold: THRESHOLD,
        cand_list: CandList::HpAniso,
        err_stop: ERR_STOP,
        ndof_stop: NDOF_STOP,
        mesh_regularity: Some(1),
        ..Default::default()
    };

    let mut controller = AdaptivityController::new(
        config,
        vec![space],
        ProjectionProblem::single(LShapeCorner, ErrorNorm::H1),
        OrthogonalProjector::new(ErrorNorm::H1),
    )?
    .with_exact_solutions(vec![Box::new(LShapeCorner)])?
    .with_observer(ConvergenceLogger::new("./test_output/lshape"));

    let outcome = controller.run()?;

    let space = &controller.spaces()[0];
    let corner_elems = space
        .active_elems()
        .filter(|elem| elem.cell.contains_point([0.0, 0.0]))
        .count();
    log::info!(
        "{:?} after {} steps: {} DOF over {} elems ({} touching the corner), err_est_rel {:.4e}%",
        outcome.termination,
        outcome.steps,
        outcome.num_dofs,
        space.mesh.num_active_elems(),
        corner_elems,
        outcome.error_estimate,
    );

    #[cfg(feature = "json_export")]
    space.mesh.export_to_json("./test_output/lshape/mesh.json")?;

    Ok(())
}
