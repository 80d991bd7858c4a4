//! Linearized FitzHugh-Nagumo system on two independent meshes
//!
//! `u = cos(πx/2)` is smooth while `v = 1 - cosh(Kx) / cosh(K)` has thin boundary layers, so `v`
//! starts from a mesh refined towards both ends and each component is adapted on its own mesh.
//! The two equations are solved together (`σ v` enters the `u` equation and `-u` the `v` equation).

use hp_adapt::adapt::{AdaptivityConfig, AdaptivityController, CandList, ConvergenceLogger};
use hp_adapt::fem_problem::{FitzHughNagumo, OrthogonalProjector};
use hp_adapt::{EssentialBc, ErrorNorm, ExactSolution, Mesh, Space};

const K: f64 = 1e2;
const P_INIT_U: u8 = 1;
const P_INIT_V: u8 = 1;
const INIT_REF_BDY: usize = 5;
const THRESHOLD: f64 = 0.3;
const ERR_STOP: f64 = 1e-1;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let dirichlet = || vec![EssentialBc::new("Left", 0.0), EssentialBc::new("Right", 0.0)];

    let mut u_mesh = Mesh::interval(-1.0, 1.0, 1)?;
    u_mesh.refine_all_elements()?;
    let mut v_mesh = u_mesh.clone();
    v_mesh.refine_towards_boundary("Left", INIT_REF_BDY)?;
    v_mesh.refine_towards_boundary("Right", INIT_REF_BDY - 1)?;

    let u_space = Space::h1(u_mesh, P_INIT_U, dirichlet())?;
    let v_space = Space::h1(v_mesh, P_INIT_V, dirichlet())?;

    let system = FitzHughNagumo::new(K);
    let exact_solutions: Vec<Box<dyn ExactSolution<1>>> =
        vec![Box::new(system.exact_u()), Box::new(system.exact_v())];

    let config = AdaptivityConfig {
        threshold: THRESHOLD,
        cand_list: CandList::HpAniso,
        err_stop: ERR_STOP,
        ndof_stop: 1000,
        ..Default::default()
    };

    let mut controller = AdaptivityController::new(
        config,
        vec![u_space, v_space],
        system.solver(),
        OrthogonalProjector::new(ErrorNorm::H1),
    )?
    .with_exact_solutions(exact_solutions)?
    .with_observer(ConvergenceLogger::new("./test_output/system"));

    let outcome = controller.run()?;

    let dofs = controller.component_dofs();
    log::info!(
        "{:?} after {} steps: {} DOF (u: {}, v: {}), err_est_rel {:.4e}%",
        outcome.termination,
        outcome.steps,
        outcome.num_dofs,
        dofs[0],
        dofs[1],
        outcome.error_estimate,
    );

    Ok(())
}
