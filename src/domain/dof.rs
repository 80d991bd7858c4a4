//! Mapping between an Elem's local basis functions and global Degrees of Freedom

use super::mesh::{cell::GEOMETRIC_TOLERANCE, Mesh};
use super::IdTracker;
use crate::basis::tensor_indices;
use std::collections::BTreeMap;
use std::fmt;

/// The global meaning of one local basis function on an `Elem`
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalDof {
    /// An unknown with the given global index
    Free(usize),
    /// A coefficient fixed by an essential boundary condition
    Fixed(f64),
}

impl LocalDof {
    pub fn id(&self) -> Option<usize> {
        match self {
            Self::Free(id) => Some(*id),
            Self::Fixed(_) => None,
        }
    }

    /// The coefficient of this basis function given a vector of unknowns
    pub fn coefficient(&self, unknowns: &[f64]) -> f64 {
        match self {
            Self::Free(id) => unknowns[*id],
            Self::Fixed(value) => *value,
        }
    }
}

impl fmt::Display for LocalDof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Free(id) => write!(f, "DoF {}", id),
            Self::Fixed(value) => write!(f, "Fixed({})", value),
        }
    }
}

/// A constant Dirichlet condition on every boundary with the given marker
#[derive(Clone, Debug, PartialEq)]
pub struct EssentialBc {
    pub marker: String,
    pub value: f64,
}

impl EssentialBc {
    pub fn new(marker: impl Into<String>, value: f64) -> Self {
        Self {
            marker: marker.into(),
            value,
        }
    }
}

/// Local-to-global DoF mapping over the active `Elem`s of a Mesh
#[derive(Clone, Debug, Default)]
pub struct DofMap {
    elem_dofs: BTreeMap<usize, Vec<LocalDof>>,
    num_dofs: usize,
}

impl DofMap {
    /// Every tensor-product basis function on every active `Elem` is its own DoF
    pub fn discontinuous<const D: usize>(mesh: &Mesh<D>) -> Self {
        let mut id_tracker = IdTracker::new(0);

        let elem_dofs = mesh
            .active_elems()
            .map(|elem| {
                let dofs = tensor_indices(elem.poly_orders.orders)
                    .iter()
                    .map(|_| LocalDof::Free(id_tracker.next_id()))
                    .collect();
                (elem.id, dofs)
            })
            .collect();

        Self {
            elem_dofs,
            num_dofs: id_tracker.count(),
        }
    }

    /// Continuous numbering along a line of `Elem`s
    ///
    /// Local slots 0 and 1 are the left and right vertex functions and are shared with the
    /// neighboring `Elem`s. Global ids run from left to right (vertex, bubbles, vertex, ...) so
    /// assembled matrices are banded. Vertices on a boundary with an essential condition are fixed.
    pub fn continuous_line<const D: usize>(mesh: &Mesh<D>, essential_bcs: &[EssentialBc]) -> Self {
        let mut id_tracker = IdTracker::new(0);

        let mut elems: Vec<_> = mesh.active_elems().collect();
        elems.sort_by(|a, b| a.cell.min[0].total_cmp(&b.cell.min[0]));

        let mut vertex_dof = |x: f64, tracker: &mut IdTracker| -> LocalDof {
            let point: [f64; D] = [x; D];
            match essential_bcs
                .iter()
                .find(|bc| mesh.point_on_boundary(&bc.marker, point))
            {
                Some(bc) => LocalDof::Fixed(bc.value),
                None => LocalDof::Free(tracker.next_id()),
            }
        };

        let mut elem_dofs = BTreeMap::new();
        let mut previous_vertex: Option<(f64, LocalDof)> = None;

        for elem in elems {
            let [left_x, right_x] = [elem.cell.min[0], elem.cell.max[0]];
            let tol = GEOMETRIC_TOLERANCE * (1.0 + left_x.abs());

            let left = match previous_vertex {
                Some((x, dof)) if (x - left_x).abs() <= tol => dof,
                _ => vertex_dof(left_x, &mut id_tracker),
            };
            let bubbles: Vec<LocalDof> = (2..=elem.poly_orders.orders[0])
                .map(|_| LocalDof::Free(id_tracker.next_id()))
                .collect();
            let right = vertex_dof(right_x, &mut id_tracker);
            previous_vertex = Some((right_x, right));

            let mut dofs = vec![left, right];
            dofs.extend(bubbles);
            elem_dofs.insert(elem.id, dofs);
        }

        Self {
            elem_dofs,
            num_dofs: id_tracker.count(),
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn elem_dofs(&self, elem_id: usize) -> Option<&[LocalDof]> {
        self.elem_dofs.get(&elem_id).map(|dofs| dofs.as_slice())
    }

    /// Iterate over `(elem_id, local dofs)` in elem-id order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[LocalDof])> + '_ {
        self.elem_dofs
            .iter()
            .map(|(elem_id, dofs)| (*elem_id, dofs.as_slice()))
    }
}
