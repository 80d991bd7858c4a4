use crate::domain::{
    mesh::{h_refinement::HRef, MAX_POLYNOMIAL_ORDER},
    Space,
};
use crate::error::AdaptError;

/// How the reference Space is derived from the coarse one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceRefinement {
    /// Split every active `Elem` once
    H,
    /// Raise every order by the given amount
    P(u8),
    /// Split every active `Elem` once, then raise the orders by the given amount
    Hp(u8),
}

impl Default for ReferenceRefinement {
    fn default() -> Self {
        Self::Hp(1)
    }
}

/// Builds the globally refined reference Space for one adaptivity step
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceBuilder {
    pub refinement: ReferenceRefinement,
}

impl ReferenceBuilder {
    pub fn new(refinement: ReferenceRefinement) -> Self {
        Self { refinement }
    }

    /// A refined copy of `coarse`; the coarse Space is not modified
    ///
    /// `Elem`s that are too small to split are kept whole.
    pub fn build<const D: usize>(&self, coarse: &Space<D>) -> Result<Space<D>, AdaptError> {
        let mut reference = coarse.clone();

        let (split, increase) = match self.refinement {
            ReferenceRefinement::H => (true, 0),
            ReferenceRefinement::P(k) => (false, k),
            ReferenceRefinement::Hp(k) => (true, k),
        };

        if split {
            reference.mesh.h_refine_with_filter(|elem| {
                elem.check_h_refinement(HRef::T)
                    .is_ok()
                    .then_some(HRef::T)
            })?;
        }

        if increase > 0 {
            let raised: Vec<(usize, [u8; D])> = reference
                .active_elems()
                .map(|elem| {
                    let orders = elem
                        .poly_orders
                        .orders
                        .map(|o| o.saturating_add(increase).min(MAX_POLYNOMIAL_ORDER));
                    (elem.id, orders)
                })
                .collect();
            reference.set_element_orders(raised)?;
        } else {
            reference.assign_dofs();
        }

        debug_assert!(reference.num_dofs() >= coarse.num_dofs());
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dof::EssentialBc;
    use crate::domain::mesh::Mesh;

    #[test]
    fn reference_kinds() {
        let coarse = Space::l2(Mesh::l_shape().unwrap(), 2).unwrap();

        let h = ReferenceBuilder::new(ReferenceRefinement::H).build(&coarse).unwrap();
        assert_eq!(h.mesh.num_active_elems(), 12);
        assert_eq!(h.num_dofs(), 12 * 9);

        let p = ReferenceBuilder::new(ReferenceRefinement::P(2)).build(&coarse).unwrap();
        assert_eq!(p.mesh.num_active_elems(), 3);
        assert_eq!(p.num_dofs(), 3 * 25);

        let hp = ReferenceBuilder::default().build(&coarse).unwrap();
        assert_eq!(hp.num_dofs(), 12 * 16);

        // the coarse space is left alone
        assert_eq!(coarse.num_dofs(), 27);
        assert!((hp.mesh.active_volume() - coarse.mesh.active_volume()).abs() < 1e-12);
    }

    #[test]
    fn reference_keeps_boundary_conditions() {
        let coarse = Space::h1(
            Mesh::interval(0.0, 1.0, 2).unwrap(),
            1,
            vec![EssentialBc::new("Left", 1.0), EssentialBc::new("Right", 0.0)],
        )
        .unwrap();
        let reference = ReferenceBuilder::default().build(&coarse).unwrap();

        assert_eq!(reference.essential_bcs().len(), 2);
        // 3 interior vertices + 4 bubbles
        assert_eq!(reference.num_dofs(), 7);
        assert!(reference.num_dofs() >= coarse.num_dofs());
    }

    #[test]
    fn orders_are_capped() {
        let coarse = Space::l2(Mesh::interval(0.0, 1.0, 1).unwrap(), MAX_POLYNOMIAL_ORDER).unwrap();
        let reference = ReferenceBuilder::new(ReferenceRefinement::P(1)).build(&coarse).unwrap();
        assert_eq!(reference.num_dofs(), coarse.num_dofs());
    }
}
