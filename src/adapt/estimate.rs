use crate::domain::fields::{ErrorNorm, FieldError, FieldRef, Solution};
use crate::error::AdaptError;
use crate::integration::TensorRule;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

/// How raw squared errors are scaled before they are compared and reported
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorNormalization {
    /// No scaling
    Absolute,
    /// Divide by the reference norm summed over every component
    RelativeErrorToGlobalNorm,
    /// Divide each component's errors by that component's reference norm
    RelativeErrorToComponentNorm,
}

/// Squared (normalized) error on one active `Elem` of one component
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementError {
    pub component: usize,
    pub elem_id: usize,
    pub error_squared: f64,
}

/// Per-element and per-component errors of a coarse solution against a reference field
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorTable {
    elements: Vec<ElementError>,
    component_errors: Vec<f64>,
    component_norms: Vec<f64>,
    total_squared: f64,
}

impl ErrorTable {
    /// A table of precomputed element errors; reference norms are left at zero
    pub fn from_elements(num_components: usize, elements: Vec<ElementError>) -> Self {
        let mut component_errors = vec![0.0; num_components];
        for e in elements.iter() {
            if let Some(component_error) = component_errors.get_mut(e.component) {
                *component_error += e.error_squared;
            }
        }

        Self {
            total_squared: component_errors.iter().sum(),
            component_errors,
            component_norms: vec![0.0; num_components],
            elements,
        }
    }

    pub fn elements(&self) -> &[ElementError] {
        &self.elements
    }

    /// Element errors ordered from largest to smallest (ties keep component/elem order)
    pub fn sorted(&self) -> Vec<ElementError> {
        let mut sorted = self.elements.clone();
        sorted.sort_by_key(|e| std::cmp::Reverse(OrderedFloat(e.error_squared)));
        sorted
    }

    pub fn max(&self) -> Option<&ElementError> {
        self.elements
            .iter()
            .max_by_key(|e| OrderedFloat(e.error_squared))
    }

    pub fn num_components(&self) -> usize {
        self.component_errors.len()
    }

    pub fn total_error_squared(&self) -> f64 {
        self.total_squared
    }

    /// `100 * sqrt(total)`: the relative error in percent when the errors are normalized
    pub fn total_error_percent(&self) -> f64 {
        self.total_squared.sqrt() * 100.0
    }

    pub fn component_error_squared(&self, component: usize) -> Option<f64> {
        self.component_errors.get(component).copied()
    }

    pub fn component_error_percent(&self, component: usize) -> Option<f64> {
        self.component_error_squared(component)
            .map(|err| err.sqrt() * 100.0)
    }

    /// Squared norm of a component's reference field
    pub fn component_norm_squared(&self, component: usize) -> Option<f64> {
        self.component_norms.get(component).copied()
    }
}

/// Integrates the difference between coarse solutions and reference fields
#[derive(Clone, Copy, Debug)]
pub struct ErrorCalculator {
    pub norm: ErrorNorm,
    pub normalization: ErrorNormalization,
}

impl ErrorCalculator {
    pub fn new(norm: ErrorNorm, normalization: ErrorNormalization) -> Self {
        Self {
            norm,
            normalization,
        }
    }

    /// Error of each coarse `Elem` (of each component) against the matching reference field
    ///
    /// The reference fields must be defined over (refinements of) the coarse meshes.
    pub fn calculate_errors<const D: usize>(
        &self,
        coarse: &[Solution<D>],
        reference: &[FieldRef<'_, D>],
    ) -> Result<ErrorTable, AdaptError> {
        if coarse.len() != reference.len() {
            return Err(AdaptError::ComponentMismatch {
                expected: coarse.len(),
                found: reference.len(),
            });
        }

        let mut raw_elements = Vec::new();
        let mut component_norms = Vec::with_capacity(coarse.len());

        for (component, (solution, field)) in coarse.iter().zip(reference.iter()).enumerate() {
            if let Some(found) = field.domain_volume() {
                let expected = solution.domain_volume();
                if (found - expected).abs() > 1e-9 * expected {
                    return Err(FieldError::DomainMismatch { expected, found }.into());
                }
            }

            let per_piece = solution
                .pieces()
                .par_iter()
                .map(|piece| {
                    let mut error_squared = 0.0;
                    let mut norm_squared = 0.0;

                    for region in field.regions(&piece.cell)? {
                        let rule =
                            TensorRule::uniform(&region.cell, region.quadrature_points(piece.degree()));
                        let coarse_sampler = piece.sampler(&rule);
                        let reference_sampler = region.sampler(&rule);

                        for (q, x, w) in rule.iter() {
                            let u_ref = reference_sampler.sample(q, x);
                            let u = coarse_sampler.sample(q);
                            error_squared += u_ref.diff(&u).density(self.norm) * w;
                            norm_squared += u_ref.density(self.norm) * w;
                        }
                    }

                    Ok((piece.elem_id, error_squared, norm_squared))
                })
                .collect::<Result<Vec<_>, AdaptError>>()?;

            component_norms.push(per_piece.iter().map(|(_, _, norm)| norm).sum::<f64>());
            raw_elements.extend(per_piece.into_iter().map(|(elem_id, error_squared, _)| {
                ElementError {
                    component,
                    elem_id,
                    error_squared,
                }
            }));
        }

        let denominators = self.denominators(&component_norms);

        let elements: Vec<ElementError> = raw_elements
            .into_iter()
            .map(|e| ElementError {
                error_squared: e.error_squared / denominators[e.component],
                ..e
            })
            .collect();

        Ok(ErrorTable {
            component_norms,
            ..ErrorTable::from_elements(coarse.len(), elements)
        })
    }

    // a vanishing reference norm falls back to absolute errors
    fn denominators(&self, component_norms: &[f64]) -> Vec<f64> {
        let nonzero = |d: f64| if d > 0.0 && d.is_finite() { d } else { 1.0 };
        match self.normalization {
            ErrorNormalization::Absolute => vec![1.0; component_norms.len()],
            ErrorNormalization::RelativeErrorToGlobalNorm => {
                let global = nonzero(component_norms.iter().sum());
                vec![global; component_norms.len()]
            }
            ErrorNormalization::RelativeErrorToComponentNorm => {
                component_norms.iter().map(|norm| nonzero(*norm)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fields::Polynomial;
    use crate::domain::mesh::{h_refinement::HRef, Mesh};
    use crate::domain::Space;
    use crate::fem_problem::OrthogonalProjector;

    #[test]
    fn zero_error_for_matching_fields() {
        let target = Polynomial::new(vec![(1.0, [0]), (3.0, [2])]);
        let space = Space::l2(Mesh::interval(0.0, 1.0, 3).unwrap(), 2).unwrap();
        let solution = OrthogonalProjector::new(ErrorNorm::H1)
            .project_field(&space, FieldRef::Exact(&target))
            .unwrap();

        let table = ErrorCalculator::new(ErrorNorm::H1, ErrorNormalization::RelativeErrorToGlobalNorm)
            .calculate_errors(&[solution], &[FieldRef::Exact(&target)])
            .unwrap();

        assert_eq!(table.elements().len(), 3);
        assert!(table.total_error_percent() < 1e-6);
    }

    #[test]
    fn constant_against_linear() {
        // u = 0 against u_ref = x on (0, 1): |e|_L2^2 = 1/3, |e'|^2 = 1
        let target = Polynomial::new(vec![(1.0, [1])]);
        let space = Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), 0).unwrap();
        let zero = Solution::zero(&space);

        let l2 = ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::Absolute)
            .calculate_errors(&[zero.clone()], &[FieldRef::Exact(&target)])
            .unwrap();
        assert!((l2.total_error_squared() - 1.0 / 3.0).abs() < 1e-12);

        let h1 = ErrorCalculator::new(ErrorNorm::H1, ErrorNormalization::Absolute)
            .calculate_errors(&[zero.clone()], &[FieldRef::Exact(&target)])
            .unwrap();
        assert!((h1.total_error_squared() - 4.0 / 3.0).abs() < 1e-12);
        assert!((h1.component_norm_squared(0).unwrap() - 4.0 / 3.0).abs() < 1e-12);

        // the whole field is error, so the relative error is 100%
        let relative = ErrorCalculator::new(ErrorNorm::H1, ErrorNormalization::RelativeErrorToGlobalNorm)
            .calculate_errors(&[zero], &[FieldRef::Exact(&target)])
            .unwrap();
        assert!((relative.total_error_percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn discrete_reference() {
        let target = Polynomial::new(vec![(1.0, [3])]);
        let coarse_space = Space::l2(Mesh::interval(-1.0, 1.0, 2).unwrap(), 1).unwrap();
        let mut fine_space = coarse_space.clone();
        fine_space.mesh.global_h_refinement(HRef::T).unwrap();
        fine_space.set_uniform_order(3).unwrap();

        let projector = OrthogonalProjector::new(ErrorNorm::L2);
        let coarse = projector.project_field(&coarse_space, FieldRef::Exact(&target)).unwrap();
        let fine = projector.project_field(&fine_space, FieldRef::Exact(&target)).unwrap();

        let calculator = ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::Absolute);
        let against_fine = calculator
            .calculate_errors(&[coarse.clone()], &[FieldRef::Discrete(&fine)])
            .unwrap();
        let against_exact = calculator
            .calculate_errors(&[coarse], &[FieldRef::Exact(&target)])
            .unwrap();

        // the fine space reproduces x^3 exactly
        assert!((against_fine.total_error_squared() - against_exact.total_error_squared()).abs() < 1e-12);
        // symmetric field, symmetric errors
        let errs = against_fine.elements();
        assert!((errs[0].error_squared - errs[1].error_squared).abs() < 1e-12);
    }

    #[test]
    fn component_normalization() {
        let small = Polynomial::new(vec![(1.0, [1])]);
        let large = Polynomial::new(vec![(10.0, [1])]);
        let space = Space::l2(Mesh::interval(0.0, 1.0, 2).unwrap(), 0).unwrap();
        let zeros = [Solution::zero(&space), Solution::zero(&space)];
        let fields = [FieldRef::Exact(&small), FieldRef::Exact(&large)];

        let per_component =
            ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::RelativeErrorToComponentNorm)
                .calculate_errors(&zeros, &fields)
                .unwrap();
        assert!((per_component.component_error_percent(0).unwrap() - 100.0).abs() < 1e-9);
        assert!((per_component.component_error_percent(1).unwrap() - 100.0).abs() < 1e-9);

        let global = ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::RelativeErrorToGlobalNorm)
            .calculate_errors(&zeros, &fields)
            .unwrap();
        assert!((global.total_error_percent() - 100.0).abs() < 1e-9);
        assert!(global.component_error_squared(1).unwrap() > 99.0 * global.component_error_squared(0).unwrap());
        assert_eq!(global.max().unwrap().component, 1);
        assert_eq!(global.sorted()[0].component, 1);
    }

    #[test]
    fn zero_norm_falls_back_to_absolute() {
        let space = Space::l2(Mesh::interval(0.0, 1.0, 2).unwrap(), 1).unwrap();
        let zero = Solution::zero(&space);
        let table = ErrorCalculator::new(ErrorNorm::H1, ErrorNormalization::RelativeErrorToGlobalNorm)
            .calculate_errors(&[zero.clone()], &[FieldRef::Discrete(&zero)])
            .unwrap();
        assert_eq!(table.total_error_squared(), 0.0);
    }

    #[test]
    fn non_nested_references_are_rejected() {
        let coarse_space = Space::l2(Mesh::interval(0.0, 1.0, 2).unwrap(), 1).unwrap();
        let coarse = Solution::zero(&coarse_space);
        let calculator = ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::Absolute);

        // elem boundaries that don't line up with the coarse mesh
        let shifted = Space::l2(Mesh::interval(0.0, 1.0, 3).unwrap(), 1).unwrap();
        let shifted = Solution::zero(&shifted);
        assert!(matches!(
            calculator.calculate_errors(&[coarse.clone()], &[FieldRef::Discrete(&shifted)]),
            Err(AdaptError::IncompatibleMeshes(_))
        ));

        // a wider domain
        let wider = Space::l2(Mesh::interval(-3.0, 2.0, 7).unwrap(), 1).unwrap();
        let wider = Solution::zero(&wider);
        assert!(matches!(
            calculator.calculate_errors(&[coarse.clone()], &[FieldRef::Discrete(&wider)]),
            Err(AdaptError::IncompatibleMeshes(_))
        ));

        // a single coarse elem that contains the whole coarse domain, plus more
        let single = Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), 1).unwrap();
        let single = Solution::zero(&single);
        let enclosing = Space::l2(Mesh::interval(-1.0, 1.0, 1).unwrap(), 1).unwrap();
        let enclosing = Solution::zero(&enclosing);
        assert!(matches!(
            calculator.calculate_errors(&[single], &[FieldRef::Discrete(&enclosing)]),
            Err(AdaptError::IncompatibleMeshes(_))
        ));

        // a genuine refinement is accepted
        let mut fine_space = coarse_space.clone();
        fine_space.mesh.global_h_refinement(HRef::T).unwrap();
        fine_space.assign_dofs();
        let fine = Solution::zero(&fine_space);
        assert!(calculator
            .calculate_errors(&[coarse], &[FieldRef::Discrete(&fine)])
            .is_ok());
    }

    #[test]
    fn component_count_mismatch() {
        let space = Space::l2(Mesh::interval(0.0, 1.0, 2).unwrap(), 1).unwrap();
        let zero = Solution::zero(&space);
        assert!(matches!(
            ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::Absolute)
                .calculate_errors(&[zero.clone(), zero.clone()], &[FieldRef::Discrete(&zero)]),
            Err(AdaptError::ComponentMismatch { expected: 2, found: 1 })
        ));
    }
}
