use super::config::AdaptivityConfig;
use super::estimate::{ElementError, ErrorTable};
use crate::basis::{BasisSampler, ShapeKind};
use crate::domain::{
    fields::{ErrorNorm, FieldRef, Sample},
    mesh::{cell::Cell, h_refinement::HRef, h_refinement::HRefError, MAX_POLYNOMIAL_ORDER},
    Space,
};
use crate::error::AdaptError;
use crate::integration::TensorRule;
use crate::linalg::solve_dense_spd;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

// relative size (squared) below which a projection error counts as zero
const ROUNDOFF_FLOOR: f64 = 1e-20;

/// The family of refinements considered for each flagged `Elem`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandList {
    /// p-refinement, same order increase along every axis
    PIso,
    /// p-refinement, per-axis order increases
    PAniso,
    /// isotropic splits (orders are inherited)
    HIso,
    /// isotropic and anisotropic splits (orders are inherited)
    HAniso,
    /// p-refinement and isotropic splits with new child orders
    HpIso,
    /// as [CandList::HpIso] plus anisotropic splits
    HpAnisoH,
    /// as [CandList::HpIso] with per-axis orders
    HpAnisoP,
    /// every split with per-axis orders
    HpAniso,
}

impl CandList {
    pub fn allows_p(&self) -> bool {
        !matches!(self, Self::HIso | Self::HAniso)
    }

    pub fn allows_h(&self) -> bool {
        !matches!(self, Self::PIso | Self::PAniso)
    }

    pub fn aniso_h(&self) -> bool {
        matches!(self, Self::HAniso | Self::HpAnisoH | Self::HpAniso)
    }

    pub fn aniso_p(&self) -> bool {
        matches!(self, Self::PAniso | Self::HpAnisoP | Self::HpAniso)
    }
}

/// How flagged elements are chosen from an [ErrorTable]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Only the element with the largest error
    SingleElement,
    /// The largest errors, until their sum reaches `threshold` times the total
    Cumulative,
    /// Every element whose squared error is at least `threshold` times the largest
    RelativeToMax,
}

impl SelectionStrategy {
    /// Flagged elements, worst first. Elements without error are never flagged.
    pub fn select(&self, threshold: f64, errors: &ErrorTable) -> Vec<ElementError> {
        let sorted: Vec<ElementError> = errors
            .sorted()
            .into_iter()
            .filter(|e| e.error_squared > 0.0)
            .collect();

        match self {
            Self::SingleElement => sorted.into_iter().take(1).collect(),
            Self::Cumulative => {
                let target = threshold * errors.total_error_squared();
                let mut sum = 0.0;
                sorted
                    .into_iter()
                    .take_while(|e| {
                        let take = sum == 0.0 || sum < target;
                        sum += e.error_squared;
                        take
                    })
                    .collect()
            }
            Self::RelativeToMax => match sorted.first() {
                Some(worst) => {
                    let cutoff = threshold * worst.error_squared;
                    sorted
                        .iter()
                        .take_while(|e| e.error_squared >= cutoff)
                        .copied()
                        .collect()
                }
                None => Vec::new(),
            },
        }
    }
}

/// What a [RefinementCandidate] does to its `Elem`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateKind {
    /// Keep the current split and orders
    None,
    P,
    HIso,
    HAniso,
    HpIso,
    HpAniso,
}

impl CandidateKind {
    fn classify<const D: usize>(split: Option<HRef>, orders_changed: bool) -> Self {
        match (split, orders_changed) {
            (None, false) => Self::None,
            (None, true) => Self::P,
            (Some(split), false) if split.is_isotropic::<D>() => Self::HIso,
            (Some(_), false) => Self::HAniso,
            (Some(split), true) if split.is_isotropic::<D>() => Self::HpIso,
            (Some(_), true) => Self::HpAniso,
        }
    }
}

/// One possible local refinement of an `Elem`, scored for cost and benefit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefinementCandidate<const D: usize> {
    pub elem_id: usize,
    pub kind: CandidateKind,
    pub split: Option<HRef>,
    /// Orders of the `Elem` itself, or of each of its children when it is split
    pub child_orders: [u8; D],
    pub dof_delta: i64,
    /// Squared projection error of the reference field onto the candidate basis
    pub error: f64,
    pub score: f64,
}

/// Enumerates and scores the admissible refinements of an `Elem`
#[derive(Clone, Copy, Debug)]
pub struct CandidateEvaluator {
    pub cand_list: CandList,
    pub conv_exp: f64,
    pub norm: ErrorNorm,
    pub mesh_regularity: Option<u8>,
    pub order_floor: u8,
    pub order_ceiling: u8,
    pub score_tolerance: f64,
}

impl CandidateEvaluator {
    pub fn from_config(config: &AdaptivityConfig) -> Self {
        Self {
            cand_list: config.cand_list,
            conv_exp: config.conv_exp,
            norm: config.error_norm,
            mesh_regularity: config.mesh_regularity,
            order_floor: config.order_floor,
            order_ceiling: config.order_ceiling,
            score_tolerance: config.score_tolerance,
        }
    }

    /// Every admissible candidate for the `Elem`, best first
    ///
    /// `reference` is the field the candidates are fitted to; it must cover the `Elem`.
    pub fn evaluate<const D: usize>(
        &self,
        space: &Space<D>,
        elem_id: usize,
        reference: FieldRef<'_, D>,
    ) -> Result<Vec<RefinementCandidate<D>>, AdaptError> {
        let elem = space
            .mesh
            .elems
            .get(elem_id)
            .ok_or(HRefError::ElemDoesntExist(elem_id))?;
        if !elem.is_active() {
            return Err(HRefError::ElemHasChildren(elem_id).into());
        }

        let orders = elem.poly_orders.orders;
        let current_dofs = space.local_dof_count(orders) as i64;
        let current_error = projection_error(&elem.cell, orders, reference, self.norm)?;
        let floor = self.order_floor.max(space.min_order());
        let ceiling = self.order_ceiling.min(MAX_POLYNOMIAL_ORDER);

        let mut options: Vec<(Option<HRef>, [u8; D])> = Vec::new();

        if self.cand_list.allows_p() {
            for increase in 1..=2u8 {
                options.push((None, orders.map(|o| o.saturating_add(increase))));
                if self.cand_list.aniso_p() && D > 1 {
                    for axis in 0..D {
                        let mut raised = orders;
                        raised[axis] = raised[axis].saturating_add(increase);
                        options.push((None, raised));
                    }
                }
            }
        }

        if self.cand_list.allows_h() {
            for split in HRef::available::<D>() {
                if !split.is_isotropic::<D>() && !self.cand_list.aniso_h() {
                    continue;
                }
                let axes = match elem.check_h_refinement(*split) {
                    Ok(axes) => axes,
                    Err(_) => continue,
                };
                if let Some(regularity) = self.mesh_regularity {
                    if space.mesh.split_irregularity(elem_id, axes) > regularity {
                        continue;
                    }
                }

                if self.cand_list.allows_p() {
                    for child_orders in self.child_order_options(orders, floor, ceiling) {
                        options.push((Some(*split), child_orders));
                    }
                } else {
                    options.push((Some(*split), orders));
                }
            }
        }

        let mut candidates = Vec::with_capacity(options.len());
        for (split, child_orders) in options.into_iter().unique() {
            if child_orders.iter().any(|o| *o > ceiling || *o < floor) {
                continue;
            }

            let (cells, num_children) = match split {
                Some(split) => (elem.cell.split(split.axes::<D>()?).into_vec(), split.num_children::<D>()),
                None => (vec![elem.cell], 1),
            };
            let dof_delta = (num_children * space.local_dof_count(child_orders)) as i64 - current_dofs;
            if dof_delta <= 0 {
                continue;
            }

            let mut error = 0.0;
            for cell in cells.iter() {
                error += projection_error(cell, child_orders, reference, self.norm)?;
            }

            candidates.push(RefinementCandidate {
                elem_id,
                kind: CandidateKind::classify::<D>(split, child_orders != orders),
                split,
                child_orders,
                dof_delta,
                error,
                score: (current_error - error) / (dof_delta as f64).powf(self.conv_exp),
            });
        }

        Ok(self.rank(candidates))
    }

    /// The top candidate, if it reduces the error at all
    pub fn best<const D: usize>(
        &self,
        space: &Space<D>,
        elem_id: usize,
        reference: FieldRef<'_, D>,
    ) -> Result<Option<RefinementCandidate<D>>, AdaptError> {
        Ok(self
            .evaluate(space, elem_id, reference)?
            .into_iter()
            .next()
            .filter(|candidate| candidate.score > 0.0))
    }

    /// Per-axis child orders from `ceil(o/2)` to `o + 1`: a common shift unless anisotropic orders are allowed
    fn child_order_options<const D: usize>(&self, orders: [u8; D], floor: u8, ceiling: u8) -> Vec<[u8; D]> {
        let ranges: [(u8, u8); D] =
            orders.map(|o| (((o + 1) / 2).max(floor), o.saturating_add(1).min(ceiling)));

        if self.cand_list.aniso_p() {
            ranges
                .iter()
                .map(|(lo, hi)| *lo..=*hi)
                .multi_cartesian_product()
                .map(|combo| std::array::from_fn(|k| combo[k]))
                .collect()
        } else {
            let low = (0..D).map(|k| ranges[k].0 as i16 - orders[k] as i16).min().unwrap_or(0);
            let high = (0..D).map(|k| ranges[k].1 as i16 - orders[k] as i16).max().unwrap_or(0);
            (low..=high)
                .map(|shift| orders.map(|o| (o as i16 + shift).max(0) as u8))
                .filter(|shifted| (0..D).all(|k| shifted[k] >= ranges[k].0 && shifted[k] <= ranges[k].1))
                .collect()
        }
    }

    // score descending; near-ties favor the cheaper candidate
    fn rank<const D: usize>(&self, mut candidates: Vec<RefinementCandidate<D>>) -> Vec<RefinementCandidate<D>> {
        candidates.sort_by_key(|c| Reverse(OrderedFloat(c.score)));

        let mut ranked = Vec::with_capacity(candidates.len());
        let mut rest = candidates.as_slice();
        while let Some(leader) = rest.first() {
            let width = self.score_tolerance * leader.score.abs();
            let group_len = rest
                .iter()
                .take_while(|c| leader.score - c.score <= width)
                .count()
                .max(1);

            let mut group = rest[..group_len].to_vec();
            group.sort_by_key(|c| c.dof_delta);
            ranked.extend(group);
            rest = &rest[group_len..];
        }

        ranked
    }
}

/// Squared error of the best approximation of `field` over `cell` by a Legendre tensor basis
fn projection_error<const D: usize>(
    cell: &Cell<D>,
    orders: [u8; D],
    field: FieldRef<'_, D>,
    norm: ErrorNorm,
) -> Result<f64, AdaptError> {
    let degree = orders.iter().copied().max().unwrap_or(0);
    let regions = field.regions(cell)?;
    let rules: Vec<TensorRule<D>> = regions
        .iter()
        .map(|region| TensorRule::uniform(&region.cell, region.quadrature_points(degree)))
        .collect();

    let n: usize = orders.iter().map(|o| *o as usize + 1).product();
    let mut matrix = DMatrix::<f64>::zeros(n, n);
    let mut rhs = DVector::<f64>::zeros(n);

    for (region, rule) in regions.iter().zip(rules.iter()) {
        let basis = BasisSampler::new(ShapeKind::Legendre, orders, cell, rule);
        let target = region.sampler(rule);

        for (q, x, w) in rule.iter() {
            let samples: Vec<Sample<D>> = basis.sample(q).into_iter().map(Sample::from).collect();
            let f = target.sample(q, x);
            for (i, s_i) in samples.iter().enumerate() {
                rhs[i] += f.dot(s_i, norm) * w;
                for (j, s_j) in samples.iter().enumerate() {
                    matrix[(i, j)] += s_i.dot(s_j, norm) * w;
                }
            }
        }
    }

    let coeffs = solve_dense_spd(matrix, rhs)?;

    let mut error = 0.0;
    let mut norm_squared = 0.0;
    for (region, rule) in regions.iter().zip(rules.iter()) {
        let basis = BasisSampler::new(ShapeKind::Legendre, orders, cell, rule);
        let target = region.sampler(rule);

        for (q, x, w) in rule.iter() {
            let fit = basis
                .sample(q)
                .iter()
                .zip(coeffs.iter())
                .fold(Sample::zero(), |mut acc, (bs, c)| {
                    acc.value += c * bs.value;
                    for k in 0..D {
                        acc.grad[k] += c * bs.grad[k];
                    }
                    acc
                });
            let f = target.sample(q, x);
            error += f.diff(&fit).density(norm) * w;
            norm_squared += f.density(norm) * w;
        }
    }

    // exact fits only differ from zero by roundoff
    if error <= ROUNDOFF_FLOOR * norm_squared {
        Ok(0.0)
    } else {
        Ok(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapt::estimate::{ErrorCalculator, ErrorNormalization};
    use crate::domain::fields::{BoundaryLayer, ExactSolution, Polynomial, Solution};
    use crate::domain::mesh::Mesh;

    fn evaluator(cand_list: CandList) -> CandidateEvaluator {
        CandidateEvaluator::from_config(&AdaptivityConfig {
            cand_list,
            ..Default::default()
        })
    }

    #[test]
    fn candidate_families() {
        let space = Space::l2(Mesh::rectangle([0.0; 2], [1.0; 2], [1, 1]).unwrap(), 2).unwrap();
        let corner = |x: [f64; 2]| (x[0] + 0.1).ln() * (2.0 * x[1]).sin();
        struct Field<F>(F);
        impl<F: Fn([f64; 2]) -> f64 + Send + Sync> ExactSolution<2> for Field<F> {
            fn value(&self, x: [f64; 2]) -> f64 {
                (self.0)(x)
            }
            fn gradient(&self, x: [f64; 2]) -> [f64; 2] {
                let h = 1e-6;
                [
                    ((self.0)([x[0] + h, x[1]]) - (self.0)([x[0] - h, x[1]])) / (2.0 * h),
                    ((self.0)([x[0], x[1] + h]) - (self.0)([x[0], x[1] - h])) / (2.0 * h),
                ]
            }
        }
        let field = Field(corner);
        let reference = FieldRef::Exact(&field);

        let p_iso = evaluator(CandList::PIso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(p_iso.len(), 2);
        assert!(p_iso.iter().all(|c| c.kind == CandidateKind::P && c.split.is_none()));

        let p_aniso = evaluator(CandList::PAniso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(p_aniso.len(), 6);

        let h_iso = evaluator(CandList::HIso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(h_iso.len(), 1);
        assert_eq!(h_iso[0].kind, CandidateKind::HIso);
        assert_eq!(h_iso[0].child_orders, [2, 2]);
        assert_eq!(h_iso[0].dof_delta, 27);

        let h_aniso = evaluator(CandList::HAniso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(h_aniso.len(), 3);
        assert!(h_aniso
            .iter()
            .any(|c| c.kind == CandidateKind::HAniso && c.split == Some(HRef::V)));

        // children from (1, 1) to (3, 3) by a common shift
        let hp_iso = evaluator(CandList::HpIso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(hp_iso.len(), 2 + 3);
        assert!(hp_iso.iter().any(|c| c.kind == CandidateKind::HpIso && c.child_orders == [1, 1]));

        // anisotropic splits into two (1, 1) children would remove DoFs
        let hp_aniso = evaluator(CandList::HpAniso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(hp_aniso.len(), 6 + 9 + 8 + 8);
        assert!(hp_aniso
            .iter()
            .any(|c| c.kind == CandidateKind::HpAniso && c.child_orders == [1, 3]));

        // best first
        assert!(hp_aniso.windows(2).all(|w| w[0].score >= w[1].score - 1e-9 * w[0].score.abs()));
    }

    #[test]
    fn one_dimensional_lists_collapse() {
        let space = Space::l2(Mesh::interval(-1.0, 1.0, 2).unwrap(), 2).unwrap();
        let layer = BoundaryLayer::new(20.0);
        let reference = FieldRef::Exact(&layer);

        let iso = evaluator(CandList::HpIso).evaluate(&space, 0, reference).unwrap();
        let aniso = evaluator(CandList::HpAniso).evaluate(&space, 0, reference).unwrap();
        assert_eq!(iso.len(), aniso.len());
        assert!(aniso.iter().all(|c| c.kind != CandidateKind::HAniso && c.kind != CandidateKind::HpAniso));
    }

    #[test]
    fn order_ceiling_excludes_p_candidates() {
        let space = Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), 4).unwrap();
        let target = Polynomial::new(vec![(1.0, [6])]);
        let capped = CandidateEvaluator {
            order_ceiling: 4,
            ..evaluator(CandList::HpIso)
        };

        let candidates = capped.evaluate(&space, 0, FieldRef::Exact(&target)).unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.split.is_some() && c.child_orders[0] <= 4));
    }

    #[test]
    fn smooth_fields_prefer_p() {
        // a quartic is captured by raising the order of the elem by one
        let space = Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), 3).unwrap();
        let target = Polynomial::new(vec![(1.0, [4]), (0.5, [3])]);
        let best = evaluator(CandList::HpIso)
            .best(&space, 0, FieldRef::Exact(&target))
            .unwrap()
            .unwrap();

        assert_eq!(best.kind, CandidateKind::P);
        assert_eq!(best.child_orders, [4]);
        assert_eq!(best.dof_delta, 1);
        assert!(best.error < 1e-20);
    }

    #[test]
    fn jumps_prefer_h() {
        let coarse = Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), 1).unwrap();
        let mut fine = coarse.clone();
        fine.mesh.global_h_refinement(HRef::T).unwrap();
        fine.set_uniform_order(0).unwrap();
        let step = Solution::from_vector(&fine, vec![0.0, 1.0]).unwrap();

        let best = evaluator(CandList::HpIso)
            .best(&coarse, 0, FieldRef::Discrete(&step))
            .unwrap()
            .unwrap();
        assert_eq!(best.kind, CandidateKind::HIso);
        assert_eq!(best.split, Some(HRef::T));
        assert_eq!(best.child_orders, [1]);
        assert!(best.error < 1e-20);
    }

    #[test]
    fn no_candidate_beats_an_exact_fit() {
        let space = Space::l2(Mesh::rectangle([0.0; 2], [1.0; 2], [1, 1]).unwrap(), 1).unwrap();
        let target = Polynomial::bilinear([1.0, 2.0, 3.0, 4.0]);

        let ranked = evaluator(CandList::HpAniso)
            .evaluate(&space, 0, FieldRef::Exact(&target))
            .unwrap();
        assert!(ranked.iter().all(|c| c.score.abs() < 1e-12));
        assert!(evaluator(CandList::HpAniso)
            .best(&space, 0, FieldRef::Exact(&target))
            .unwrap()
            .is_none());
    }

    #[test]
    fn ties_prefer_fewer_dofs() {
        let evaluator = evaluator(CandList::HpIso);
        let candidate = |dof_delta, score| RefinementCandidate::<1> {
            elem_id: 0,
            kind: CandidateKind::P,
            split: None,
            child_orders: [1],
            dof_delta,
            error: 0.0,
            score,
        };

        let ranked = evaluator.rank(vec![
            candidate(5, 1.0),
            candidate(3, 1.0 - 1e-12),
            candidate(1, 0.5),
            candidate(9, 2.0),
        ]);
        let order: Vec<i64> = ranked.iter().map(|c| c.dof_delta).collect();
        assert_eq!(order, vec![9, 3, 5, 1]);
    }

    #[test]
    fn regularity_limits_splits() {
        let mut space = Space::l2(Mesh::rectangle([0.0; 2], [1.0; 2], [2, 1]).unwrap(), 1).unwrap();
        space.mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        space.assign_dofs();

        // a child of elem 0 that borders elem 1 (already one level finer along y)
        let child = space
            .active_elems()
            .find(|elem| elem.cell.min[0] == 0.25 && elem.cell.min[1] == 0.0)
            .unwrap()
            .id;
        let field = Polynomial::new(vec![(1.0, [3, 3])]);

        let regular = CandidateEvaluator {
            mesh_regularity: Some(1),
            ..evaluator(CandList::HIso)
        };
        assert!(regular
            .evaluate(&space, child, FieldRef::Exact(&field))
            .unwrap()
            .is_empty());
        assert_eq!(
            evaluator(CandList::HIso)
                .evaluate(&space, child, FieldRef::Exact(&field))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn invalid_elems() {
        let mut space = Space::l2(Mesh::interval(0.0, 1.0, 2).unwrap(), 1).unwrap();
        space.mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        space.assign_dofs();
        let target = Polynomial::constant(1.0);

        assert!(matches!(
            evaluator(CandList::HpIso).evaluate(&space, 0, FieldRef::Exact(&target)),
            Err(AdaptError::HRef(HRefError::ElemHasChildren(0)))
        ));
        assert!(matches!(
            evaluator(CandList::HpIso).evaluate(&space, 17, FieldRef::Exact(&target)),
            Err(AdaptError::HRef(HRefError::ElemDoesntExist(17)))
        ));
    }

    #[test]
    fn selection_strategies() {
        let space = Space::l2(Mesh::interval(0.0, 4.0, 4).unwrap(), 0).unwrap();
        // elem errors of a zero solution against x: ∫ x^2 over [i, i+1]
        let target = Polynomial::new(vec![(1.0, [1])]);
        let zero = Solution::zero(&space);
        let table = ErrorCalculator::new(ErrorNorm::L2, ErrorNormalization::Absolute)
            .calculate_errors(&[zero], &[FieldRef::Exact(&target)])
            .unwrap();

        let ids = |selected: Vec<ElementError>| selected.iter().map(|e| e.elem_id).collect::<Vec<_>>();

        assert_eq!(ids(SelectionStrategy::SingleElement.select(0.3, &table)), vec![3]);
        // errors are 1/3, 7/3, 19/3, 37/3 out of 64/3
        assert_eq!(ids(SelectionStrategy::RelativeToMax.select(0.5, &table)), vec![3, 2]);
        assert_eq!(ids(SelectionStrategy::Cumulative.select(0.5, &table)), vec![3]);
        assert_eq!(ids(SelectionStrategy::Cumulative.select(0.7, &table)), vec![3, 2]);
        assert_eq!(ids(SelectionStrategy::Cumulative.select(1.0, &table)).len(), 4);
    }
}
