use super::{SolveResult, Solver};
use crate::basis::BasisSampler;
use crate::domain::fields::{BoundaryLayer, Cosine, ExactSolution};
use crate::domain::{dof::LocalDof, Space, SpaceKind};
use crate::integration::{points_for_degree, TensorRule};
use crate::linalg::{LinalgError, LinearSystem, LocalSystem};
use log::debug;
use rayon::prelude::*;
use std::f64::consts::FRAC_PI_2;

/// Default absolute tolerance on the residual norm
pub const NEWTON_ABS_TOL: f64 = 1e-12;
/// Default tolerance on the residual norm relative to the initial residual
pub const NEWTON_REL_TOL: f64 = 1e-9;
/// Default iteration cap
pub const NEWTON_MAX_ITER: usize = 100;
// iteration is abandoned once the residual grows by this factor
const DIVERGENCE_FACTOR: f64 = 1e10;

/// Coefficients of `-(a(x) u')' + r(x, u) = f(x)` over a line
pub trait ReactionDiffusion: Send + Sync {
    fn diffusion(&self, _x: f64) -> f64 {
        1.0
    }

    /// `r(x, u)`
    fn reaction(&self, x: f64, u: f64) -> f64;

    /// `∂r/∂u`
    fn reaction_du(&self, x: f64, u: f64) -> f64;

    fn source(&self, x: f64) -> f64;
}

/// `-a u'' + c u = f` with constant coefficients
#[derive(Clone, Copy, Debug)]
pub struct ConstantCoefficients {
    pub diffusion: f64,
    pub reaction: f64,
    pub source: f64,
}

impl ConstantCoefficients {
    /// `-u'' + k^2 u = k^2`, whose solution over `(-1, 1)` with zero Dirichlet values has boundary layers at both ends
    pub fn boundary_layer(k: f64) -> Self {
        Self {
            diffusion: 1.0,
            reaction: k * k,
            source: k * k,
        }
    }
}

impl ReactionDiffusion for ConstantCoefficients {
    fn diffusion(&self, _x: f64) -> f64 {
        self.diffusion
    }

    fn reaction(&self, _x: f64, u: f64) -> f64 {
        self.reaction * u
    }

    fn reaction_du(&self, _x: f64, _u: f64) -> f64 {
        self.reaction
    }

    fn source(&self, _x: f64) -> f64 {
        self.source
    }
}

/// `-a u'' + c u^3 = f`
#[derive(Clone, Copy, Debug)]
pub struct CubicReaction {
    pub diffusion: f64,
    pub coefficient: f64,
    pub source: f64,
}

impl ReactionDiffusion for CubicReaction {
    fn diffusion(&self, _x: f64) -> f64 {
        self.diffusion
    }

    fn reaction(&self, _x: f64, u: f64) -> f64 {
        self.coefficient * u.powi(3)
    }

    fn reaction_du(&self, _x: f64, u: f64) -> f64 {
        3.0 * self.coefficient * u * u
    }

    fn source(&self, _x: f64) -> f64 {
        self.source
    }
}

/// `-a u'' + c u = f(x)` with a variable source term
#[derive(Clone, Copy, Debug)]
pub struct LinearProblem {
    pub diffusion: f64,
    pub reaction: f64,
    pub source: fn(f64) -> f64,
}

impl ReactionDiffusion for LinearProblem {
    fn diffusion(&self, _x: f64) -> f64 {
        self.diffusion
    }

    fn reaction(&self, _x: f64, u: f64) -> f64 {
        self.reaction * u
    }

    fn reaction_du(&self, _x: f64, _u: f64) -> f64 {
        self.reaction
    }

    fn source(&self, x: f64) -> f64 {
        (self.source)(x)
    }
}

/// Linearized FitzHugh-Nagumo system over `(-1, 1)` with `f(u) = u`
///
/// ```text
/// -d_u^2 u'' - u + σ v = g1
/// -d_v^2 v'' - u + v   = g2
/// ```
///
/// `g1` and `g2` are chosen so that `u = cos(πx/2)` and `v = 1 - cosh(kx) / cosh(k)` (both zero at the ends).
#[derive(Clone, Copy, Debug)]
pub struct FitzHughNagumo {
    pub d_u: f64,
    pub d_v: f64,
    pub sigma: f64,
    pub k: f64,
}

impl FitzHughNagumo {
    pub fn new(k: f64) -> Self {
        Self {
            d_u: 1.0,
            d_v: 1.0,
            sigma: 1.0,
            k,
        }
    }

    pub fn exact_u(&self) -> Cosine {
        Cosine::new(FRAC_PI_2)
    }

    pub fn exact_v(&self) -> BoundaryLayer {
        BoundaryLayer::new(self.k)
    }

    /// Newton solver for `[u, v]`, with both cross terms
    pub fn solver(&self) -> NewtonSolver {
        NewtonSolver::new(vec![
            Box::new(FitzHughNagumoEquation {
                system: *self,
                component: 0,
            }),
            Box::new(FitzHughNagumoEquation {
                system: *self,
                component: 1,
            }),
        ])
        .with_coupling(LinearCoupling::new(0, 1, self.sigma))
        .with_coupling(LinearCoupling::new(1, 0, -1.0))
    }
}

/// The diagonal part of one equation of a [FitzHughNagumo] system
struct FitzHughNagumoEquation {
    system: FitzHughNagumo,
    component: usize,
}

impl ReactionDiffusion for FitzHughNagumoEquation {
    fn diffusion(&self, _x: f64) -> f64 {
        match self.component {
            0 => self.system.d_u * self.system.d_u,
            _ => self.system.d_v * self.system.d_v,
        }
    }

    fn reaction(&self, x: f64, u: f64) -> f64 {
        self.reaction_du(x, u) * u
    }

    fn reaction_du(&self, _x: f64, _u: f64) -> f64 {
        match self.component {
            0 => -1.0,
            _ => 1.0,
        }
    }

    fn source(&self, x: f64) -> f64 {
        let FitzHughNagumo { d_u, d_v, sigma, k } = self.system;
        let u = self.system.exact_u().value([x]);
        let v = self.system.exact_v().value([x]);
        match self.component {
            0 => (d_u * d_u * FRAC_PI_2 * FRAC_PI_2 - 1.0) * u + sigma * v,
            _ => d_v * d_v * k * k * (1.0 - v) + v - u,
        }
    }
}

/// A linear cross term: `coefficient * u_component` added to the left-hand side of equation `equation`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearCoupling {
    pub equation: usize,
    pub component: usize,
    pub coefficient: f64,
}

impl LinearCoupling {
    pub fn new(equation: usize, component: usize, coefficient: f64) -> Self {
        Self {
            equation,
            component,
            coefficient,
        }
    }
}

/// Newton's method for one [ReactionDiffusion] equation per component over continuous 1D Spaces
///
/// All components are solved together, starting from zero (plus the essential boundary values).
/// Unknowns are numbered block by block in Space order, which matches the layout expected by
/// [split_solution](super::split_solution). Each component may live on its own Mesh; [LinearCoupling]
/// terms are integrated over the overlaps of the two Meshes' active Elems.
pub struct NewtonSolver {
    problems: Vec<Box<dyn ReactionDiffusion>>,
    couplings: Vec<LinearCoupling>,
    abs_tol: f64,
    rel_tol: f64,
    max_iterations: usize,
}

impl NewtonSolver {
    pub fn new(problems: Vec<Box<dyn ReactionDiffusion>>) -> Self {
        Self {
            problems,
            couplings: Vec::new(),
            abs_tol: NEWTON_ABS_TOL,
            rel_tol: NEWTON_REL_TOL,
            max_iterations: NEWTON_MAX_ITER,
        }
    }

    pub fn single(problem: impl ReactionDiffusion + 'static) -> Self {
        Self::new(vec![Box::new(problem)])
    }

    pub fn with_coupling(mut self, coupling: LinearCoupling) -> Self {
        self.couplings.push(coupling);
        self
    }

    pub fn with_tolerances(mut self, abs_tol: f64, rel_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self.rel_tol = rel_tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Diagonal block of one equation: Jacobian and negative residual at `u` (the component's own unknowns)
    fn assemble_component(
        system: &mut LinearSystem,
        space: &Space<1>,
        problem: &dyn ReactionDiffusion,
        offset: usize,
        u: &[f64],
    ) {
        let elems: Vec<_> = space.active_elems().collect();

        system.par_extend(elems.par_iter().map(|elem| {
            let mut local = LocalSystem::default();
            let dofs = match space.elem_dofs(elem.id) {
                Some(dofs) => dofs,
                None => return local,
            };

            let order = elem.poly_orders.orders[0] as usize;
            let rule = TensorRule::uniform(&elem.cell, order + 3);
            let sampler = BasisSampler::new(space.shape_kind(), elem.poly_orders.orders, &elem.cell, &rule);
            let coeffs: Vec<f64> = dofs.iter().map(|dof| dof.coefficient(u)).collect();

            for (q, [x], w) in rule.iter() {
                let samples = sampler.sample(q);
                let (u_q, du_q) = samples
                    .iter()
                    .zip(coeffs.iter())
                    .fold((0.0, 0.0), |(v, d), (s, c)| (v + c * s.value, d + c * s.grad[0]));

                let a = problem.diffusion(x);
                let r = problem.reaction(x, u_q);
                let r_du = problem.reaction_du(x, u_q);
                let f = problem.source(x);

                for (i, (s_i, dof_i)) in samples.iter().zip(dofs.iter()).enumerate() {
                    let gi = match dof_i {
                        LocalDof::Free(gi) => offset + *gi,
                        LocalDof::Fixed(_) => continue,
                    };
                    let residual = a * du_q * s_i.grad[0] + (r - f) * s_i.value;
                    local.b_entries.push((gi, -residual * w));

                    for (s_j, dof_j) in samples.iter().zip(dofs.iter()).skip(i) {
                        if let LocalDof::Free(gj) = dof_j {
                            let jac = a * s_i.grad[0] * s_j.grad[0] + r_du * s_i.value * s_j.value;
                            local.a_entries.push(([gi, offset + *gj], jac * w));
                        }
                    }
                }
            }

            local
        }));
    }

    /// Off-diagonal block `c ∫ φ_j ψ_i` of a [LinearCoupling], plus its share of the residual
    fn assemble_coupling(
        system: &mut LinearSystem,
        coupling: &LinearCoupling,
        [test_space, trial_space]: [&Space<1>; 2],
        [test_offset, trial_offset]: [usize; 2],
        trial_u: &[f64],
    ) {
        let test_elems: Vec<_> = test_space.active_elems().collect();

        system.par_extend(test_elems.par_iter().map(|test_elem| {
            let mut local = LocalSystem::default();
            let test_dofs = match test_space.elem_dofs(test_elem.id) {
                Some(dofs) => dofs,
                None => return local,
            };

            for trial_elem in trial_space.active_elems() {
                let (overlap, trial_dofs) = match (
                    test_elem.cell.intersection(&trial_elem.cell),
                    trial_space.elem_dofs(trial_elem.id),
                ) {
                    (Some(overlap), Some(dofs)) => (overlap, dofs),
                    _ => continue,
                };

                let degree = (test_elem.poly_orders.orders[0] + trial_elem.poly_orders.orders[0]) as usize;
                let rule = TensorRule::uniform(&overlap, points_for_degree(degree));
                let test = BasisSampler::new(
                    test_space.shape_kind(),
                    test_elem.poly_orders.orders,
                    &test_elem.cell,
                    &rule,
                );
                let trial = BasisSampler::new(
                    trial_space.shape_kind(),
                    trial_elem.poly_orders.orders,
                    &trial_elem.cell,
                    &rule,
                );
                let coeffs: Vec<f64> = trial_dofs.iter().map(|dof| dof.coefficient(trial_u)).collect();

                for (q, _, w) in rule.iter() {
                    let test_samples = test.sample(q);
                    let trial_samples = trial.sample(q);
                    let u_q: f64 = trial_samples
                        .iter()
                        .zip(coeffs.iter())
                        .map(|(s, c)| c * s.value)
                        .sum();

                    for (s_i, dof_i) in test_samples.iter().zip(test_dofs.iter()) {
                        let gi = match dof_i {
                            LocalDof::Free(gi) => test_offset + *gi,
                            LocalDof::Fixed(_) => continue,
                        };
                        local
                            .b_entries
                            .push((gi, -coupling.coefficient * u_q * s_i.value * w));

                        for (s_j, dof_j) in trial_samples.iter().zip(trial_dofs.iter()) {
                            if let LocalDof::Free(gj) = dof_j {
                                local.general_entries.push((
                                    [gi, trial_offset + *gj],
                                    coupling.coefficient * s_i.value * s_j.value * w,
                                ));
                            }
                        }
                    }
                }
            }

            local
        }));
    }

    /// Jacobian and negative residual of the whole system at `u`
    fn assemble(&self, spaces: &[Space<1>], offsets: &[usize], u: &[f64]) -> LinearSystem {
        let block = |c: usize| &u[offsets[c]..offsets[c] + spaces[c].num_dofs()];
        let mut system = LinearSystem::new(u.len());

        for (c, (space, problem)) in spaces.iter().zip(self.problems.iter()).enumerate() {
            Self::assemble_component(&mut system, space, problem.as_ref(), offsets[c], block(c));
        }
        for coupling in self.couplings.iter() {
            let (e, c) = (coupling.equation, coupling.component);
            Self::assemble_coupling(
                &mut system,
                coupling,
                [&spaces[e], &spaces[c]],
                [offsets[e], offsets[c]],
                block(c),
            );
        }

        system
    }

    fn validate(&self, spaces: &[Space<1>]) -> Result<(), String> {
        if spaces.len() != self.problems.len() {
            return Err(format!(
                "{} spaces were provided for {} equations",
                spaces.len(),
                self.problems.len()
            ));
        }
        if let Some(space) = spaces.iter().find(|space| space.kind() != SpaceKind::H1) {
            return Err(format!(
                "Newton solver requires continuous spaces (found {:?})",
                space.kind()
            ));
        }
        if let Some(coupling) = self
            .couplings
            .iter()
            .find(|c| c.equation >= spaces.len() || c.component >= spaces.len())
        {
            return Err(format!(
                "coupling {:?} refers to a component outside of 0..{}",
                coupling,
                spaces.len()
            ));
        }
        Ok(())
    }
}

impl Solver<1> for NewtonSolver {
    fn solve(&mut self, spaces: &[Space<1>]) -> SolveResult {
        if let Err(reason) = self.validate(spaces) {
            return SolveResult::InvalidProblem(reason);
        }

        let offsets: Vec<usize> = spaces
            .iter()
            .scan(0, |next, space| {
                let offset = *next;
                *next += space.num_dofs();
                Some(offset)
            })
            .collect();
        let mut u = vec![0.0; spaces.iter().map(|space| space.num_dofs()).sum()];
        let mut initial_residual = None;

        for iteration in 0..=self.max_iterations {
            let system = self.assemble(spaces, &offsets, &u);
            let residual_norm = system.b.iter().map(|r| r * r).sum::<f64>().sqrt();
            let res0 = *initial_residual.get_or_insert(residual_norm);
            debug!(
                "Newton iteration {}: residual norm {:.3e}",
                iteration, residual_norm
            );

            if !residual_norm.is_finite() || residual_norm > DIVERGENCE_FACTOR * res0.max(1.0) {
                return SolveResult::Diverged {
                    iterations: iteration,
                    residual_norm,
                };
            }
            if residual_norm <= self.abs_tol || residual_norm <= self.rel_tol * res0 {
                return SolveResult::Success(u);
            }
            if iteration == self.max_iterations {
                return SolveResult::MaxIterationsExceeded {
                    iterations: iteration,
                    residual_norm,
                };
            }

            match system.solve() {
                Ok(delta) => {
                    for (ui, di) in u.iter_mut().zip(delta) {
                        *ui += di;
                    }
                }
                Err(LinalgError::DimensionMismatch { expected, found }) => {
                    return SolveResult::InvalidProblem(format!(
                        "assembled system has dimension {} but {} unknowns",
                        expected, found
                    ))
                }
                Err(_) => return SolveResult::Singular,
            }
        }

        SolveResult::MaxIterationsExceeded {
            iterations: self.max_iterations,
            residual_norm: f64::NAN,
        }
    }
}
