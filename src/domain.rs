/// Degrees of Freedom
pub mod dof;
/// Structures used to compute solution fields over a Space
pub mod fields;
/// The internal geometric structure of a Space
pub mod mesh;

use crate::basis::ShapeKind;
use dof::{DofMap, EssentialBc, LocalDof};
use mesh::{
    elem::Elem, h_refinement::HRefError, p_refinement::PRefError, Mesh, MAX_POLYNOMIAL_ORDER,
};
use thiserror::Error;

/// The function space a [Space] discretizes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceKind {
    /// Continuous, Lobatto basis (1D only)
    H1,
    /// Discontinuous, Legendre basis
    L2,
}

impl SpaceKind {
    pub fn shape_kind(&self) -> ShapeKind {
        match self {
            Self::H1 => ShapeKind::Lobatto,
            Self::L2 => ShapeKind::Legendre,
        }
    }

    /// Lowest expansion order the space admits
    pub fn min_order(&self) -> u8 {
        match self {
            Self::H1 => 1,
            Self::L2 => 0,
        }
    }

    /// Number of DoFs an `Elem` with the given orders contributes
    ///
    /// Continuous spaces share vertex functions, so each `Elem` is charged for one vertex plus its bubbles.
    pub fn local_dof_count<const D: usize>(&self, orders: [u8; D]) -> usize {
        match self {
            Self::H1 => orders.iter().map(|p| *p as usize).product(),
            Self::L2 => orders.iter().map(|p| *p as usize + 1).product(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("{kind:?} spaces are not supported over {dim}D meshes!")]
    UnsupportedKind { kind: SpaceKind, dim: usize },
    #[error("Expansion order {order} is outside the admissible range [{min}, {max}]!")]
    InvalidOrder { order: u8, min: u8, max: u8 },
    #[error("Coefficient vector has length {found}, expected {expected}!")]
    CoefficientLength { expected: usize, found: usize },
    #[error(transparent)]
    PRef(#[from] PRefError),
    #[error(transparent)]
    HRef(#[from] HRefError),
}

/// A discrete function space: a Mesh with expansion orders, a basis kind, and a DoF numbering
///
/// The DoF numbering must be regenerated with [Space::assign_dofs] whenever the Mesh or its
/// expansion orders are modified directly.
#[derive(Clone, Debug)]
pub struct Space<const D: usize> {
    pub mesh: Mesh<D>,
    kind: SpaceKind,
    essential_bcs: Vec<EssentialBc>,
    dofs: DofMap,
}

impl<const D: usize> Space<D> {
    /// Construct a space with a uniform expansion order over every `Elem`
    pub fn new(
        mesh: Mesh<D>,
        kind: SpaceKind,
        order: u8,
        essential_bcs: Vec<EssentialBc>,
    ) -> Result<Self, SpaceError> {
        if kind == SpaceKind::H1 && D != 1 {
            return Err(SpaceError::UnsupportedKind { kind, dim: D });
        }

        let mut space = Self {
            mesh,
            kind,
            essential_bcs,
            dofs: DofMap::default(),
        };
        space.set_uniform_order(order)?;

        Ok(space)
    }

    pub fn h1(mesh: Mesh<D>, order: u8, essential_bcs: Vec<EssentialBc>) -> Result<Self, SpaceError> {
        Self::new(mesh, SpaceKind::H1, order, essential_bcs)
    }

    pub fn l2(mesh: Mesh<D>, order: u8) -> Result<Self, SpaceError> {
        Self::new(mesh, SpaceKind::L2, order, Vec::new())
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn shape_kind(&self) -> ShapeKind {
        self.kind.shape_kind()
    }

    pub fn min_order(&self) -> u8 {
        self.kind.min_order()
    }

    pub fn essential_bcs(&self) -> &[EssentialBc] {
        &self.essential_bcs
    }

    pub fn local_dof_count(&self, orders: [u8; D]) -> usize {
        self.kind.local_dof_count(orders)
    }

    pub fn num_dofs(&self) -> usize {
        self.dofs.num_dofs()
    }

    pub fn active_elems(&self) -> impl Iterator<Item = &Elem<D>> + '_ {
        self.mesh.active_elems()
    }

    /// Global meaning of each local basis function on an active `Elem` (in tensor-index order)
    pub fn elem_dofs(&self, elem_id: usize) -> Option<&[LocalDof]> {
        self.dofs.elem_dofs(elem_id)
    }

    /// Regenerate the DoF numbering from the current Mesh
    pub fn assign_dofs(&mut self) {
        self.dofs = match self.kind {
            SpaceKind::H1 => DofMap::continuous_line(&self.mesh, &self.essential_bcs),
            SpaceKind::L2 => DofMap::discontinuous(&self.mesh),
        };
    }

    fn check_order(&self, order: u8) -> Result<(), SpaceError> {
        if order < self.min_order() || order > MAX_POLYNOMIAL_ORDER {
            Err(SpaceError::InvalidOrder {
                order,
                min: self.min_order(),
                max: MAX_POLYNOMIAL_ORDER,
            })
        } else {
            Ok(())
        }
    }

    /// Set the expansion order of every `Elem` (active or not) along every axis
    pub fn set_uniform_order(&mut self, order: u8) -> Result<(), SpaceError> {
        self.check_order(order)?;
        self.mesh.set_global_expansion_orders([order; D])?;
        self.assign_dofs();
        Ok(())
    }

    /// Set per-`Elem` expansion orders and renumber
    pub fn set_element_orders(&mut self, orders: Vec<(usize, [u8; D])>) -> Result<(), SpaceError> {
        for (_, elem_orders) in orders.iter() {
            for order in elem_orders {
                self.check_order(*order)?;
            }
        }
        self.mesh.set_expansion_orders(orders)?;
        self.assign_dofs();
        Ok(())
    }

    /// Shift the orders of every active `Elem` by `delta_u` (and `delta_v` along the second
    /// axis of 2D meshes), clamping the result to `[floor, ceiling]`
    pub fn adjust_element_order(
        &mut self,
        delta_u: i8,
        delta_v: i8,
        floor: u8,
        ceiling: u8,
    ) -> Result<(), SpaceError> {
        if floor > ceiling {
            return Err(PRefError::InvalidOrderBounds { floor, ceiling }.into());
        }
        let low = floor.max(self.min_order()) as i16;
        let high = ceiling.min(MAX_POLYNOMIAL_ORDER) as i16;
        let deltas = [delta_u as i16, delta_v as i16];

        let adjusted: Vec<(usize, [u8; D])> = self
            .active_elems()
            .map(|elem| {
                let orders = std::array::from_fn(|k| {
                    (elem.poly_orders.orders[k] as i16 + deltas[k.min(1)]).clamp(low, high.max(low))
                        as u8
                });
                (elem.id, orders)
            })
            .collect();

        self.mesh.set_expansion_orders(adjusted)?;
        self.assign_dofs();
        Ok(())
    }
}

pub(crate) struct IdTracker {
    next_id: usize,
}

impl IdTracker {
    pub fn new(start: usize) -> Self {
        Self { next_id: start }
    }

    pub fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id - 1
    }

    /// Number of ids handed out so far (when starting from zero)
    pub fn count(&self) -> usize {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh::h_refinement::HRef;

    #[test]
    fn create_spaces() {
        let h1 = Space::h1(
            Mesh::interval(-1.0, 1.0, 4).unwrap(),
            3,
            vec![EssentialBc::new("Left", 0.0), EssentialBc::new("Right", 0.0)],
        )
        .unwrap();
        // 3 interior vertices + 4 * 2 bubbles
        assert_eq!(h1.num_dofs(), 11);
        assert_eq!(h1.shape_kind(), ShapeKind::Lobatto);

        let mut l2 = Space::l2(Mesh::l_shape().unwrap(), 2).unwrap();
        assert_eq!(l2.num_dofs(), 27);
        l2.mesh.global_h_refinement(HRef::T).unwrap();
        l2.assign_dofs();
        assert_eq!(l2.num_dofs(), 108);
    }

    #[test]
    fn unsupported_configurations() {
        assert!(matches!(
            Space::h1(Mesh::l_shape().unwrap(), 2, Vec::new()),
            Err(SpaceError::UnsupportedKind { kind: SpaceKind::H1, dim: 2 })
        ));
        assert!(matches!(
            Space::h1(Mesh::interval(0.0, 1.0, 1).unwrap(), 0, Vec::new()),
            Err(SpaceError::InvalidOrder { order: 0, .. })
        ));
    }

    #[test]
    fn adjust_orders() {
        let mut space = Space::l2(Mesh::rectangle([0.0; 2], [1.0; 2], [2, 2]).unwrap(), 2).unwrap();

        space.adjust_element_order(3, -1, 0, 4).unwrap();
        assert!(space.active_elems().all(|elem| elem.poly_orders.orders == [4, 1]));
        assert_eq!(space.num_dofs(), 4 * 10);

        space.adjust_element_order(-9, -9, 0, 4).unwrap();
        assert_eq!(space.num_dofs(), 4);

        assert!(matches!(
            space.adjust_element_order(1, 1, 3, 2),
            Err(SpaceError::PRef(PRefError::InvalidOrderBounds { floor: 3, ceiling: 2 }))
        ));
    }

    #[test]
    fn element_order_updates() {
        let mut space = Space::l2(Mesh::interval(0.0, 1.0, 3).unwrap(), 1).unwrap();
        space.set_element_orders(vec![(1, [3])]).unwrap();
        assert_eq!(space.num_dofs(), 2 + 4 + 2);

        assert!(matches!(
            space.set_element_orders(vec![(7, [2])]),
            Err(SpaceError::PRef(PRefError::ElemDoesntExist(7)))
        ));
        assert!(matches!(
            space.set_element_orders(vec![(0, [2]), (0, [3])]),
            Err(SpaceError::PRef(PRefError::DoubleRefinement(0)))
        ));
        assert!(matches!(
            space.set_element_orders(vec![(2, [MAX_POLYNOMIAL_ORDER + 1])]),
            Err(SpaceError::InvalidOrder { .. })
        ));
        assert_eq!(space.num_dofs(), 8);
    }

    #[test]
    fn local_dof_counts() {
        assert_eq!(SpaceKind::H1.local_dof_count([4]), 4);
        assert_eq!(SpaceKind::L2.local_dof_count([1, 2]), 6);
        assert_eq!(SpaceKind::L2.local_dof_count([0, 0]), 1);
    }
}
