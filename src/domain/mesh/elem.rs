use super::{
    cell::Cell,
    h_refinement::{HLevels, HRef, HRefError},
    p_refinement::PolyOrders,
    EXPECTED_NUM_H_REFINEMENTS, MIN_EDGE_LENGTH,
};
use crate::domain::IdTracker;
use json::{object, JsonValue};
use smallvec::SmallVec;
use std::fmt;

/// `Elem`s are the basic geometric unit of a `Mesh`
///
/// `Elem`s are responsible for keeping track of:
/// * The axis-aligned `Cell` they cover in real space
/// * Connections to their parent `Elem` (and their own h-refinement state)
/// * Connections to their child `Elem`s (if h-refined)
/// * Polynomial expansion orders (p-refinement state)
///
/// Only `Elem`s without children ("active" `Elem`s) carry degrees of freedom.
///
/// ## h-Refinement
///
/// The children of an `Elem` are ordered with the first split axis varying fastest:
/// ```text
///      T-Type           U-Type           V-Type
///  +-----+-----+    +-----+-----+    +-----------+
///  |  2  |  3  |    |     |     |    |     1     |
///  +-----+-----+    |  0  |  1  |    +-----------+
///  |  0  |  1  |    |     |     |    |     0     |
///  +-----+-----+    +-----+-----+    +-----------+
/// ```
#[derive(Debug, Clone)]
pub struct Elem<const D: usize> {
    pub id: usize,
    pub cell: Cell<D>,
    /// Id of the base-layer `Elem` this `Elem` descends from
    pub base_id: usize,
    pub h_levels: HLevels<D>,
    pub poly_orders: PolyOrders<D>,
    refinement: Option<HRef>,
    children: Option<SmallVec<[usize; 4]>>,
    ancestors: SmallVec<[(usize, u8); EXPECTED_NUM_H_REFINEMENTS]>,
}

impl<const D: usize> Elem<D> {
    /// Construct a new base-layer Elem
    pub fn new(id: usize, cell: Cell<D>) -> Self {
        Self {
            id,
            cell,
            base_id: id,
            h_levels: HLevels::default(),
            poly_orders: PolyOrders::default(),
            refinement: None,
            children: None,
            ancestors: SmallVec::new(),
        }
    }

    /// Check that a refinement can be applied to this `Elem` without producing degenerate children
    pub fn check_h_refinement(&self, refinement: HRef) -> Result<[bool; D], HRefError> {
        if self.children.is_some() {
            return Err(HRefError::ElemHasChildren(self.id));
        }
        let axes = refinement.axes::<D>()?;
        if (0..D).any(|k| axes[k] && self.cell.extent(k) / 2.0 < MIN_EDGE_LENGTH) {
            return Err(HRefError::MinEdgeLength(self.id));
        }
        Ok(axes)
    }

    /// Construct the children produced by an [HRef] of this Elem
    ///
    /// Children inherit this Elem's expansion orders
    pub(crate) fn h_refine(
        &mut self,
        refinement: HRef,
        id_tracker: &mut IdTracker,
    ) -> Result<Vec<Elem<D>>, HRefError> {
        let axes = self.check_h_refinement(refinement)?;

        let children: Vec<Elem<D>> = self
            .cell
            .split(axes)
            .into_iter()
            .enumerate()
            .map(|(child_idx, child_cell)| {
                let mut ancestors = self.ancestors.clone();
                ancestors.push((self.id, child_idx as u8));

                Elem {
                    id: id_tracker.next_id(),
                    cell: child_cell,
                    base_id: self.base_id,
                    h_levels: self.h_levels.refined(axes),
                    poly_orders: self.poly_orders,
                    refinement: None,
                    children: None,
                    ancestors,
                }
            })
            .collect();

        self.refinement = Some(refinement);
        self.children = Some(children.iter().map(|child| child.id).collect());
        Ok(children)
    }

    /// Id of the Parent Elem if this Elem has a parent
    pub fn parent_id(&self) -> Option<usize> {
        self.ancestors.last().map(|(id, _)| *id)
    }

    /// Get the stack of child indices and Elem-IDs back to this `Elem`s ancestor on the base layer of the mesh
    pub fn loc_stack(&self) -> &[(usize, u8)] {
        &self.ancestors
    }

    /// Get the bounds of this `Elem` in the parametric space of one of its ancestors
    pub fn relative_parametric_range(&self, ancestor: &Elem<D>) -> Option<Cell<D>> {
        if !ancestor.cell.contains_cell(&self.cell) {
            return None;
        }
        Some(Cell::new(
            ancestor.cell.to_parametric(self.cell.min),
            ancestor.cell.to_parametric(self.cell.max),
        ))
    }

    /// The refinement that was applied to this `Elem` (if any)
    pub fn refinement(&self) -> Option<HRef> {
        self.refinement
    }

    pub fn child_ids(&self) -> Option<SmallVec<[usize; 4]>> {
        self.children.clone()
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.children.is_none()
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "base_id": self.base_id,
            "min": self.cell.min.to_vec(),
            "max": self.cell.max.to_vec(),
            "h_levels": self.h_levels.levels.to_vec(),
            "p_orders": self.poly_orders,
            "parent": match self.parent_id() {
                Some(parent_id) => JsonValue::from(parent_id),
                None => JsonValue::Null,
            },
            "children": match &self.children {
                Some(child_ids) => JsonValue::from(child_ids.to_vec()),
                None => JsonValue::Null,
            },
        }
    }
}

impl<const D: usize> fmt::Display for Elem<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Elem {}:", self.id)?;
        writeln!(f, "\tbounds: {:?} -> {:?}", self.cell.min, self.cell.max)?;
        writeln!(f, "\th-levels: {:?}", self.h_levels.levels)?;
        writeln!(f, "\tp-orders: {:?}", self.poly_orders.orders)?;
        match &self.children {
            Some(child_ids) => writeln!(f, "\tchildren: {:?}", child_ids),
            None => writeln!(f, "\tactive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_construction() {
        let mut tracker = IdTracker::new(1);
        let mut elem = Elem::new(0, Cell::new([0.0, 0.0], [1.0, 1.0]));
        elem.poly_orders = PolyOrders::from([3, 2]);

        let children = elem.h_refine(HRef::U, &mut tracker).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, 1);
        assert_eq!(children[1].id, 2);
        assert_eq!(children[1].cell, Cell::new([0.5, 0.0], [1.0, 1.0]));
        assert_eq!(children[1].h_levels.levels, [1, 0]);
        assert_eq!(children[1].poly_orders.orders, [3, 2]);
        assert_eq!(children[1].parent_id(), Some(0));
        assert_eq!(children[1].loc_stack(), &[(0, 1)]);

        let range = children[1].relative_parametric_range(&elem).unwrap();
        assert_eq!(range, Cell::new([0.0, -1.0], [1.0, 1.0]));

        assert!(elem.has_children());
        assert_eq!(elem.refinement(), Some(HRef::U));
        assert_eq!(
            elem.h_refine(HRef::T, &mut tracker).unwrap_err(),
            HRefError::ElemHasChildren(0)
        );
    }

    #[test]
    fn minimum_edge_length() {
        let mut tracker = IdTracker::new(1);
        let mut elem = Elem::new(0, Cell::new([0.0], [MIN_EDGE_LENGTH]));
        assert_eq!(
            elem.h_refine(HRef::T, &mut tracker).unwrap_err(),
            HRefError::MinEdgeLength(0)
        );
    }
}
