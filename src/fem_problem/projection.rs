use super::{Projector, SolveResult, Solver};
use crate::basis::BasisSampler;
use crate::domain::{
    dof::LocalDof,
    fields::{ErrorNorm, ExactSolution, FieldRef, Sample, Solution},
    Space,
};
use crate::error::AdaptError;
use crate::integration::TensorRule;
use crate::linalg::{LinalgError, LinearSystem, LocalSystem};
use rayon::prelude::*;

/// Global orthogonal projection in the L2 or H1 inner product
///
/// Essential boundary values are kept; only free DoFs are fitted.
#[derive(Clone, Copy, Debug)]
pub struct OrthogonalProjector {
    pub norm: ErrorNorm,
}

impl OrthogonalProjector {
    pub fn new(norm: ErrorNorm) -> Self {
        Self { norm }
    }

    /// Best approximation of `field` in `space`
    ///
    /// Discrete fields must cover every active `Elem` of the space.
    pub fn project_field<const D: usize>(
        &self,
        space: &Space<D>,
        field: FieldRef<'_, D>,
    ) -> Result<Solution<D>, AdaptError> {
        let elems: Vec<_> = space.active_elems().collect();

        let locals = elems
            .par_iter()
            .map(|elem| {
                let mut local = LocalSystem::default();
                let dofs = match space.elem_dofs(elem.id) {
                    Some(dofs) => dofs,
                    None => return Ok(local),
                };
                let orders = elem.poly_orders.orders;
                let degree = orders.iter().copied().max().unwrap_or(0);

                for region in field.regions(&elem.cell)? {
                    let rule = TensorRule::uniform(&region.cell, region.quadrature_points(degree));
                    let basis = BasisSampler::new(space.shape_kind(), orders, &elem.cell, &rule);
                    let target = region.sampler(&rule);

                    for (q, x, w) in rule.iter() {
                        let samples: Vec<Sample<D>> =
                            basis.sample(q).into_iter().map(Sample::from).collect();
                        let f = target.sample(q, x);

                        for (i, (s_i, dof_i)) in samples.iter().zip(dofs.iter()).enumerate() {
                            let gi = match dof_i {
                                LocalDof::Free(gi) => *gi,
                                LocalDof::Fixed(_) => continue,
                            };
                            let mut rhs = f.dot(s_i, self.norm);

                            for (j, (s_j, dof_j)) in samples.iter().zip(dofs.iter()).enumerate() {
                                let m = s_j.dot(s_i, self.norm);
                                match dof_j {
                                    LocalDof::Free(gj) if j >= i => {
                                        local.a_entries.push(([gi, *gj], m * w))
                                    }
                                    LocalDof::Free(_) => (),
                                    // lift the essential values to the right hand side
                                    LocalDof::Fixed(value) => rhs -= value * m,
                                }
                            }
                            local.b_entries.push((gi, rhs * w));
                        }
                    }
                }

                Ok(local)
            })
            .collect::<Result<Vec<LocalSystem>, AdaptError>>()?;

        let mut system = LinearSystem::new(space.num_dofs());
        for local in locals {
            system.consume_local(local);
        }

        let coefficients = system.solve()?;
        Ok(Solution::from_vector(space, coefficients)?)
    }
}

impl<const D: usize> Projector<D> for OrthogonalProjector {
    fn project_global(&self, space: &Space<D>, source: &Solution<D>) -> Result<Solution<D>, AdaptError> {
        self.project_field(space, FieldRef::Discrete(source))
    }
}

/// Best approximation of known functions, posed as a [Solver]
///
/// Each component Space is fitted to its own target in the given norm.
pub struct ProjectionProblem<const D: usize> {
    targets: Vec<Box<dyn ExactSolution<D>>>,
    projector: OrthogonalProjector,
}

impl<const D: usize> ProjectionProblem<D> {
    pub fn new(targets: Vec<Box<dyn ExactSolution<D>>>, norm: ErrorNorm) -> Self {
        Self {
            targets,
            projector: OrthogonalProjector::new(norm),
        }
    }

    pub fn single(target: impl ExactSolution<D> + 'static, norm: ErrorNorm) -> Self {
        Self::new(vec![Box::new(target)], norm)
    }
}

impl<const D: usize> Solver<D> for ProjectionProblem<D> {
    fn solve(&mut self, spaces: &[Space<D>]) -> SolveResult {
        if spaces.len() != self.targets.len() {
            return SolveResult::InvalidProblem(format!(
                "{} spaces were provided for {} targets",
                spaces.len(),
                self.targets.len()
            ));
        }

        let mut coefficients = Vec::new();
        for (space, target) in spaces.iter().zip(self.targets.iter()) {
            match self
                .projector
                .project_field(space, FieldRef::Exact(target.as_ref()))
            {
                Ok(solution) => coefficients.extend_from_slice(solution.coefficients()),
                Err(AdaptError::Linalg(LinalgError::NotPositiveDefinite))
                | Err(AdaptError::Linalg(LinalgError::Singular)) => return SolveResult::Singular,
                Err(err) => return SolveResult::InvalidProblem(err.to_string()),
            }
        }

        SolveResult::Success(coefficients)
    }
}
