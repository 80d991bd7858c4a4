/// Axis-aligned boxes describing the real-space extent of an `Elem`
pub mod cell;
/// A Finite Element in the refinement tree
pub mod elem;
/// Structures and Functions to facilitate isotropic and anisotropic h-refinement
pub mod h_refinement;
/// Structures and Functions to facilitate anisotropic p-refinement
pub mod p_refinement;

use cell::Cell;
use elem::Elem;
use h_refinement::{HRef, HRefError};
use p_refinement::PRefError;

use super::IdTracker;

use json::{object, JsonValue};
use std::collections::BTreeMap;
use std::fs::{read_to_string, File};
use std::io::BufWriter;
use thiserror::Error;

/// Minimum Edge length in real space. h-Refinements will fail after edges are smaller than this value.
pub const MIN_EDGE_LENGTH: f64 = 3.0518e-5; // 15ish refinement layers with unit sized cells

/// The expected "h-Refinement" depth. This determines the stack allocation size of some `SmallVec`s related to h-Refinement
pub const EXPECTED_NUM_H_REFINEMENTS: usize = 8;

/// Maximum Polynomial expansion. p-Refinements will fail when Elem's expansion orders exceed this value.
pub const MAX_POLYNOMIAL_ORDER: u8 = 20;

/// A marked piece of the domain boundary
///
/// `facet` is degenerate along `axis` (its min and max coincide at `coord`)
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary<const D: usize> {
    pub marker: String,
    pub axis: usize,
    pub coord: f64,
    pub facet: Cell<D>,
}

impl<const D: usize> Boundary<D> {
    pub fn new(marker: impl Into<String>, axis: usize, facet: Cell<D>) -> Self {
        Self {
            marker: marker.into(),
            axis,
            coord: facet.min[axis],
            facet,
        }
    }

    /// Does the point lie on this piece of boundary?
    pub fn contains_point(&self, point: [f64; D]) -> bool {
        self.facet.contains_point(point)
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "marker": self.marker.clone(),
            "axis": self.axis,
            "min": self.facet.min.to_vec(),
            "max": self.facet.max.to_vec(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Unable to read Mesh File: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse Mesh File as JSON: {0}")]
    Json(#[from] json::Error),
    #[error("Invalid Mesh File: {0}")]
    Format(String),
    #[error("Elem {0} has a non-positive extent!")]
    Degenerate(usize),
    #[error("Elems {0} and {1} overlap!")]
    Overlap(usize, usize),
}

/// Information used to Define the geometric structure and refinement state of a Space.
///
/// The mesh is an arena of [Elem]s. h-Refinement never removes `Elem`s; refined `Elem`s keep
/// their id and gain children, so the arena records the full refinement tree.
#[derive(Debug, Clone)]
pub struct Mesh<const D: usize> {
    pub elems: Vec<Elem<D>>,
    pub boundaries: Vec<Boundary<D>>,
}

impl<const D: usize> Mesh<D> {
    /// Construct a Mesh of base-layer Elems covering the given cells
    pub fn from_cells(cells: Vec<Cell<D>>, boundaries: Vec<Boundary<D>>) -> Result<Self, MeshError> {
        for (id, cell) in cells.iter().enumerate() {
            if (0..D).any(|k| cell.extent(k) <= 0.0) {
                return Err(MeshError::Degenerate(id));
            }
            if let Some(other) = cells
                .iter()
                .enumerate()
                .skip(id + 1)
                .find(|(_, other)| cell.intersection(other).is_some())
            {
                return Err(MeshError::Overlap(id, other.0));
            }
        }

        Ok(Self {
            elems: cells
                .into_iter()
                .enumerate()
                .map(|(id, cell)| Elem::new(id, cell))
                .collect(),
            boundaries,
        })
    }

    /// Construct a Mesh from a JSON file with the following format
    ///
    /// Each "Element" lists the ids of its 2^D corner "Nodes". Each "Boundary" lists the
    /// corner "Nodes" of a marked piece of boundary (one node in 1D, two nodes in 2D).
    ///
    /// The following describes this three element L-shaped mesh:
    /// ```text
    ///  1.0  5---------6---------7
    ///       |         |         |
    ///       |    1    |    2    |
    ///       |         |         |
    ///  0.0  2---------3---------4
    ///       |         |
    ///       |    0    |
    ///       |         |
    /// -1.0  0---------1
    ///  y  -1.0       0.0       1.0
    /// ```
    ///
    /// mesh.json
    /// ```JSON
    /// {
    ///     "Nodes": [
    ///         [-1.0, -1.0], [0.0, -1.0],
    ///         [-1.0, 0.0], [0.0, 0.0], [1.0, 0.0],
    ///         [-1.0, 1.0], [0.0, 1.0], [1.0, 1.0]
    ///     ],
    ///     "Elements": [
    ///         { "node_ids": [0, 1, 2, 3] },
    ///         { "node_ids": [2, 3, 5, 6] },
    ///         { "node_ids": [3, 4, 6, 7] }
    ///     ],
    ///     "Boundaries": [
    ///         { "marker": "Bdy", "node_ids": [0, 1] },
    ///         { "marker": "Bdy", "node_ids": [1, 3] }
    ///     ]
    /// }
    /// ```
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, MeshError> {
        let mesh_file_contents = read_to_string(path.as_ref())?;
        let mesh_file_json = json::parse(&mesh_file_contents)?;

        let points = parse_node_information::<D>(&mesh_file_json)?;
        let cells = parse_element_information::<D>(&mesh_file_json, &points)?;
        let boundaries = parse_boundary_information::<D>(&mesh_file_json, &points)?;

        Self::from_cells(cells, boundaries)
    }

    #[cfg(feature = "json_export")]
    /// Write the full refinement tree to a JSON file
    pub fn export_to_json(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        let mesh_object = object! {
            "Dimension": D,
            "Elems": JsonValue::from(self.elems.iter().map(|elem| elem.to_json()).collect::<Vec<_>>()),
            "Boundaries": JsonValue::from(self.boundaries.iter().map(|bnd| bnd.to_json()).collect::<Vec<_>>()),
        };

        mesh_object.write_pretty(&mut w, 4)?;

        Ok(())
    }

    /// Overwrite this mesh with a copy of another
    pub fn copy_from(&mut self, other: &Self) {
        self.elems.clone_from(&other.elems);
        self.boundaries.clone_from(&other.boundaries);
    }

    /// Iterate over all `Elem`s without children
    pub fn active_elems(&self) -> impl Iterator<Item = &Elem<D>> + '_ {
        self.elems.iter().filter(|elem| elem.is_active())
    }

    pub fn num_active_elems(&self) -> usize {
        self.active_elems().count()
    }

    /// Total volume covered by the active `Elem`s
    pub fn active_volume(&self) -> f64 {
        self.active_elems().map(|elem| elem.cell.volume()).sum()
    }

    /// Get a list of an [`Elem`]s descendant's IDs
    pub fn descendant_elems(
        &self,
        elem_id: usize,
        include_starting_elem: bool,
    ) -> Result<Vec<usize>, HRefError> {
        if elem_id >= self.elems.len() {
            Err(HRefError::ElemDoesntExist(elem_id))
        } else {
            let mut descendants = Vec::new();
            self.rec_descendant_elems(elem_id, include_starting_elem, &mut descendants);
            Ok(descendants)
        }
    }

    fn rec_descendant_elems(&self, elem_id: usize, include: bool, desc: &mut Vec<usize>) {
        if include {
            desc.push(elem_id);
        }
        if let Some(child_elem_ids) = self.elems[elem_id].child_ids() {
            for cei in child_elem_ids {
                self.rec_descendant_elems(cei, true, desc);
            }
        }
    }

    /// Get a list of an [`Elem`]s ancestors's IDs
    pub fn ancestor_elems(
        &self,
        elem_id: usize,
        include_starting_elem: bool,
    ) -> Result<Vec<usize>, HRefError> {
        if elem_id >= self.elems.len() {
            Err(HRefError::ElemDoesntExist(elem_id))
        } else {
            let mut ancestors = Vec::new();
            if include_starting_elem {
                ancestors.push(elem_id);
            }
            ancestors.extend(
                self.elems[elem_id]
                    .loc_stack()
                    .iter()
                    .rev()
                    .map(|(ancestor_id, _)| *ancestor_id),
            );
            Ok(ancestors)
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // h-refinement
    // ----------------------------------------------------------------------------------------------------

    /// Apply the same h-refinement to every active Elem
    pub fn global_h_refinement(&mut self, refinement: HRef) -> Result<(), HRefError> {
        self.execute_h_refinements(
            self.active_elems()
                .map(|elem| (elem.id, refinement))
                .collect(),
        )
    }

    /// Split every active Elem once along every axis
    pub fn refine_all_elements(&mut self) -> Result<(), HRefError> {
        self.global_h_refinement(HRef::T)
    }

    pub fn h_refine_elems(&mut self, elems: Vec<usize>, refinement: HRef) -> Result<(), HRefError> {
        self.execute_h_refinements(elems.iter().map(|e_id| (*e_id, refinement)).collect())
    }

    /// Refine each active Elem according to the filter
    pub fn h_refine_with_filter<F>(&mut self, filt: F) -> Result<(), HRefError>
    where
        F: Fn(&Elem<D>) -> Option<HRef>,
    {
        self.execute_h_refinements(
            self.active_elems()
                .filter_map(|elem| filt(elem).map(|refinement| (elem.id, refinement)))
                .collect(),
        )
    }

    /// Apply a set of h-refinements. Each Elem may appear at most once.
    pub fn execute_h_refinements(
        &mut self,
        refinements: Vec<(usize, HRef)>,
    ) -> Result<(), HRefError> {
        let mut refinements_map: BTreeMap<usize, HRef> = BTreeMap::new();
        for (elem_id, h_ref) in refinements {
            if elem_id >= self.elems.len() {
                return Err(HRefError::ElemDoesntExist(elem_id));
            }
            if refinements_map.insert(elem_id, h_ref).is_some() {
                return Err(HRefError::DoubleRefinement(elem_id));
            }
        }

        // validate everything up front so a failure leaves the mesh untouched
        for (elem_id, refinement) in refinements_map.iter() {
            self.elems[*elem_id].check_h_refinement(*refinement)?;
        }

        let mut elem_id_tracker = IdTracker::new(self.elems.len());
        for (elem_id, refinement) in refinements_map {
            let new_elems = self.elems[elem_id].h_refine(refinement, &mut elem_id_tracker)?;
            self.elems.extend(new_elems);
        }

        Ok(())
    }

    /// Isotropically refine the Elems touching a marked boundary, `depth` times
    pub fn refine_towards_boundary(&mut self, marker: &str, depth: usize) -> Result<(), HRefError> {
        if !self.boundaries.iter().any(|bnd| bnd.marker == marker) {
            return Err(HRefError::UnknownBoundary(marker.to_string()));
        }

        for _ in 0..depth {
            let touching: Vec<usize> = self
                .active_elems()
                .filter(|elem| self.elem_touches_boundary(elem.id, marker))
                .map(|elem| elem.id)
                .collect();
            self.h_refine_elems(touching, HRef::T)?;
        }

        Ok(())
    }

    /// Isotropically refine the Elems containing a point, `depth` times
    pub fn refine_towards_vertex(&mut self, point: [f64; D], depth: usize) -> Result<(), HRefError> {
        for _ in 0..depth {
            let touching: Vec<usize> = self
                .active_elems()
                .filter(|elem| elem.cell.contains_point(point))
                .map(|elem| elem.id)
                .collect();
            self.h_refine_elems(touching, HRef::T)?;
        }

        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // boundaries and adjacency
    // ----------------------------------------------------------------------------------------------------

    /// Does one of the Elem's faces lie on a boundary with the given marker?
    pub fn elem_touches_boundary(&self, elem_id: usize, marker: &str) -> bool {
        let cell = &self.elems[elem_id].cell;
        self.boundaries
            .iter()
            .filter(|bnd| bnd.marker == marker)
            .any(|bnd| cell.touches_facet(bnd.axis, bnd.coord, &bnd.facet))
    }

    /// Does the point lie on a boundary with the given marker?
    pub fn point_on_boundary(&self, marker: &str, point: [f64; D]) -> bool {
        self.boundaries
            .iter()
            .filter(|bnd| bnd.marker == marker)
            .any(|bnd| bnd.contains_point(point))
    }

    /// Active Elems sharing a face with the given Elem, along with the axis normal to that face
    pub fn active_neighbors(&self, elem_id: usize) -> Vec<(usize, usize)> {
        let cell = &self.elems[elem_id].cell;
        self.active_elems()
            .filter(|other| other.id != elem_id)
            .filter_map(|other| cell.shared_face_axis(&other.cell).map(|axis| (other.id, axis)))
            .collect()
    }

    /// Hanging node level that the Elem would have with respect to its neighbors
    /// after being split along the given axes
    pub fn split_irregularity(&self, elem_id: usize, axes: [bool; D]) -> u8 {
        let cell = &self.elems[elem_id].cell;
        let extents: [f64; D] =
            std::array::from_fn(|k| cell.extent(k) / if axes[k] { 2.0 } else { 1.0 });

        self.active_neighbors(elem_id)
            .into_iter()
            .map(|(neighbor_id, axis)| {
                let other = &self.elems[neighbor_id].cell;
                face_level(&extents, other, axis)
            })
            .max()
            .unwrap_or(0)
    }

    /// Largest hanging node level between any two neighboring active Elems
    pub fn max_irregularity(&self) -> u8 {
        self.active_elems()
            .map(|elem| self.split_irregularity(elem.id, [false; D]))
            .max()
            .unwrap_or(0)
    }

    // ----------------------------------------------------------------------------------------------------
    // expansion orders
    // ----------------------------------------------------------------------------------------------------

    /// Set the expansion orders of every Elem (active or not)
    ///
    /// The owning Space must renumber its DoFs afterwards.
    pub(crate) fn set_global_expansion_orders(&mut self, orders: [u8; D]) -> Result<(), PRefError> {
        self.set_expansion_orders(self.elems.iter().map(|elem| (elem.id, orders)).collect())
    }

    pub(crate) fn set_expansion_orders(
        &mut self,
        poly_orders: Vec<(usize, [u8; D])>,
    ) -> Result<(), PRefError> {
        let mut poly_orders_map: BTreeMap<usize, [u8; D]> = BTreeMap::new();
        for (elem_id, orders) in poly_orders {
            if elem_id >= self.elems.len() {
                return Err(PRefError::ElemDoesntExist(elem_id));
            }
            if poly_orders_map.insert(elem_id, orders).is_some() {
                return Err(PRefError::DoubleRefinement(elem_id));
            }
        }

        for (elem_id, orders) in poly_orders_map {
            self.elems[elem_id].poly_orders.set(orders)?;
        }

        Ok(())
    }
}

impl Mesh<1> {
    /// A uniform partition of `[a, b]` into `n` Elems, with boundary markers "Left" and "Right"
    pub fn interval(a: f64, b: f64, n: usize) -> Result<Self, MeshError> {
        if n == 0 || b <= a {
            return Err(MeshError::Format(format!(
                "cannot partition [{}, {}] into {} elems",
                a, b, n
            )));
        }
        let h = (b - a) / n as f64;
        let cells = (0..n)
            .map(|i| Cell::new([a + i as f64 * h], [a + (i + 1) as f64 * h]))
            .collect();

        Self::from_cells(
            cells,
            vec![
                Boundary::new("Left", 0, Cell::new([a], [a])),
                Boundary::new("Right", 0, Cell::new([b], [b])),
            ],
        )
    }
}

impl Mesh<2> {
    /// A uniform `nx` by `ny` grid over a rectangle, with boundary markers "Bottom", "Right", "Top" and "Left"
    pub fn rectangle(min: [f64; 2], max: [f64; 2], [nx, ny]: [usize; 2]) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 || max[0] <= min[0] || max[1] <= min[1] {
            return Err(MeshError::Format(format!(
                "cannot partition {:?} -> {:?} into {}x{} elems",
                min, max, nx, ny
            )));
        }
        let hx = (max[0] - min[0]) / nx as f64;
        let hy = (max[1] - min[1]) / ny as f64;
        let cells = (0..ny)
            .flat_map(|j| {
                (0..nx).map(move |i| {
                    Cell::new(
                        [min[0] + i as f64 * hx, min[1] + j as f64 * hy],
                        [min[0] + (i + 1) as f64 * hx, min[1] + (j + 1) as f64 * hy],
                    )
                })
            })
            .collect();

        Self::from_cells(
            cells,
            vec![
                Boundary::new("Bottom", 1, Cell::new(min, [max[0], min[1]])),
                Boundary::new("Right", 0, Cell::new([max[0], min[1]], max)),
                Boundary::new("Top", 1, Cell::new([min[0], max[1]], max)),
                Boundary::new("Left", 0, Cell::new(min, [min[0], max[1]])),
            ],
        )
    }

    /// The L-shaped domain `(-1, 1)^2 \ [0, 1) x (-1, 0]` as three unit squares, with the
    /// whole boundary marked "Bdy". The re-entrant corner sits at the origin.
    pub fn l_shape() -> Result<Self, MeshError> {
        let facets = [
            (1, [-1.0, -1.0], [0.0, -1.0]),
            (0, [0.0, -1.0], [0.0, 0.0]),
            (1, [0.0, 0.0], [1.0, 0.0]),
            (0, [1.0, 0.0], [1.0, 1.0]),
            (1, [-1.0, 1.0], [1.0, 1.0]),
            (0, [-1.0, -1.0], [-1.0, 1.0]),
        ];

        Self::from_cells(
            vec![
                Cell::new([-1.0, -1.0], [0.0, 0.0]),
                Cell::new([-1.0, 0.0], [0.0, 1.0]),
                Cell::new([0.0, 0.0], [1.0, 1.0]),
            ],
            facets
                .iter()
                .map(|(axis, min, max)| Boundary::new("Bdy", *axis, Cell::new(*min, *max)))
                .collect(),
        )
    }
}

fn face_level<const D: usize>(extents: &[f64; D], other: &Cell<D>, face_axis: usize) -> u8 {
    (0..D)
        .filter(|k| *k != face_axis)
        .map(|k| (extents[k] / other.extent(k)).log2().abs().round() as u8)
        .max()
        .unwrap_or(0)
}

fn parse_node_information<const D: usize>(mesh_file_json: &JsonValue) -> Result<Vec<[f64; D]>, MeshError> {
    if !mesh_file_json["Nodes"].is_array() {
        return Err(MeshError::Format("Nodes must be an Array!".to_string()));
    }

    mesh_file_json["Nodes"]
        .members()
        .map(|json_node_point| {
            if !json_node_point.is_array() || json_node_point.members().count() != D {
                return Err(MeshError::Format(format!(
                    "nodes must be arrays of length {}!",
                    D
                )));
            }

            let mut point = [0.0; D];
            for (coord, json_coord) in point.iter_mut().zip(json_node_point.members()) {
                *coord = json_coord.as_f64().ok_or_else(|| {
                    MeshError::Format("nodes must be composed of numerical values!".to_string())
                })?;
            }
            Ok(point)
        })
        .collect()
}

fn parse_node_ids<const D: usize>(
    json_ids: &JsonValue,
    points: &[[f64; D]],
    expected: usize,
) -> Result<Vec<[f64; D]>, MeshError> {
    if !json_ids.is_array() || json_ids.members().count() != expected {
        return Err(MeshError::Format(format!(
            "node_ids must be an Array of length {}!",
            expected
        )));
    }

    json_ids
        .members()
        .map(|node_id_json| {
            node_id_json
                .as_usize()
                .and_then(|node_id| points.get(node_id).copied())
                .ok_or_else(|| {
                    MeshError::Format(
                        "node_ids must be integers smaller than the total number of nodes!"
                            .to_string(),
                    )
                })
        })
        .collect()
}

fn parse_element_information<const D: usize>(
    mesh_file_json: &JsonValue,
    points: &[[f64; D]],
) -> Result<Vec<Cell<D>>, MeshError> {
    if !mesh_file_json["Elements"].is_array() {
        return Err(MeshError::Format("Elements must be an Array!".to_string()));
    }

    mesh_file_json["Elements"]
        .members()
        .map(|json_element| {
            let corners = parse_node_ids(&json_element["node_ids"], points, 1 << D)?;
            let cell = Cell::bounding(&corners)
                .ok_or_else(|| MeshError::Format("Elements must have nodes!".to_string()))?;

            // every node must sit on a corner of the axis-aligned box
            let on_corner = corners.iter().all(|p| {
                (0..D).all(|k| p[k] == cell.min[k] || p[k] == cell.max[k])
            });
            if !on_corner {
                return Err(MeshError::Format(
                    "Elements must be axis-aligned boxes!".to_string(),
                ));
            }

            Ok(cell)
        })
        .collect()
}

fn parse_boundary_information<const D: usize>(
    mesh_file_json: &JsonValue,
    points: &[[f64; D]],
) -> Result<Vec<Boundary<D>>, MeshError> {
    if mesh_file_json["Boundaries"].is_null() {
        return Ok(Vec::new());
    }
    if !mesh_file_json["Boundaries"].is_array() {
        return Err(MeshError::Format("Boundaries must be an Array!".to_string()));
    }

    mesh_file_json["Boundaries"]
        .members()
        .map(|json_boundary| {
            let marker = json_boundary["marker"]
                .as_str()
                .ok_or_else(|| MeshError::Format("Boundaries must have a marker!".to_string()))?;
            let corners = parse_node_ids(&json_boundary["node_ids"], points, 1 << (D - 1))?;
            let facet = Cell::bounding(&corners)
                .ok_or_else(|| MeshError::Format("Boundaries must have nodes!".to_string()))?;
            let axis = (0..D).find(|k| facet.extent(*k) == 0.0).ok_or_else(|| {
                MeshError::Format(format!("Boundary '{}' is not axis-aligned!", marker))
            })?;

            Ok(Boundary::new(marker, axis, facet))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_from_file() {
        let mesh = Mesh::<2>::from_file("./test_input/lshape.json").unwrap();
        assert_eq!(mesh.elems.len(), 3);
        assert_eq!(mesh.boundaries.len(), 6);
        assert!((mesh.active_volume() - 3.0).abs() < 1e-14);
        assert_eq!(mesh.elems[2].cell, Cell::new([0.0, 0.0], [1.0, 1.0]));

        let interval = Mesh::<1>::from_file("./test_input/interval.json").unwrap();
        assert_eq!(interval.elems.len(), 1);
        assert!(interval.point_on_boundary("Left", [-1.0]));
        assert!(interval.point_on_boundary("Right", [1.0]));
        assert!(!interval.point_on_boundary("Right", [-1.0]));
    }

    #[test]
    fn bad_mesh_files() {
        assert!(matches!(
            Mesh::<2>::from_file("./test_input/interval.json"),
            Err(MeshError::Format(_))
        ));
        assert!(matches!(
            Mesh::<1>::from_file("./test_input/does_not_exist.json"),
            Err(MeshError::Io(_))
        ));
        assert!(matches!(
            Mesh::from_cells(
                vec![Cell::new([0.0], [1.0]), Cell::new([0.5], [2.0])],
                Vec::new()
            ),
            Err(MeshError::Overlap(0, 1))
        ));
    }

    #[test]
    fn basic_h_refinements() {
        let mut mesh = Mesh::rectangle([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
        mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        mesh.h_refine_elems(vec![1, 2], HRef::U).unwrap();
        mesh.h_refine_elems(vec![3, 4], HRef::V).unwrap();

        assert_eq!(mesh.elems.len(), 14);
        assert_eq!(mesh.num_active_elems(), 9);
        assert!((mesh.active_volume() - 2.0).abs() < 1e-14);
        assert_eq!(mesh.ancestor_elems(12, false).unwrap(), vec![4, 0]);
        assert_eq!(
            mesh.descendant_elems(0, false).unwrap(),
            vec![2, 8, 9, 3, 10, 11, 4, 12, 13, 5]
        );
    }

    #[test]
    fn refined_mesh_to_file() {
        let mut mesh = Mesh::l_shape().unwrap();
        mesh.refine_all_elements().unwrap();
        mesh.set_global_expansion_orders([2, 3]).unwrap();
        mesh.export_to_json("./test_output/lshape_refined.json").unwrap();
    }

    #[test]
    fn refinement_towards_boundary() {
        let mut mesh = Mesh::interval(-1.0, 1.0, 1).unwrap();
        mesh.refine_towards_boundary("Left", 5).unwrap();
        mesh.refine_towards_boundary("Right", 5).unwrap();

        // five splits from each end
        assert_eq!(mesh.num_active_elems(), 11);
        let smallest = mesh
            .active_elems()
            .map(|elem| elem.cell.extent(0))
            .fold(f64::INFINITY, f64::min);
        assert!((smallest - 1.0 / 32.0).abs() < 1e-14);
        assert!((mesh.active_volume() - 2.0).abs() < 1e-14);

        assert_eq!(
            mesh.refine_towards_boundary("Top", 1),
            Err(HRefError::UnknownBoundary("Top".to_string()))
        );
    }

    #[test]
    fn refinement_towards_vertex() {
        let mut mesh = Mesh::l_shape().unwrap();
        mesh.refine_towards_vertex([0.0, 0.0], 2).unwrap();

        // every elem touches the origin at first, then three children per elem do
        assert_eq!(mesh.num_active_elems(), 3 * 3 + 3 * 4);
        assert!(mesh
            .active_elems()
            .filter(|elem| elem.cell.contains_point([0.0, 0.0]))
            .all(|elem| (elem.cell.extent(0) - 0.25).abs() < 1e-14));
    }

    #[test]
    fn hanging_node_levels() {
        let mut mesh = Mesh::rectangle([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
        assert_eq!(mesh.max_irregularity(), 0);
        assert_eq!(mesh.split_irregularity(0, [true, true]), 1);
        assert_eq!(mesh.split_irregularity(0, [true, false]), 0);

        mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        assert_eq!(mesh.max_irregularity(), 1);

        // the child of elem 0 that touches elem 1
        assert_eq!(mesh.split_irregularity(3, [true, true]), 2);
        assert_eq!(mesh.split_irregularity(3, [false, true]), 2);
        assert_eq!(mesh.split_irregularity(3, [true, false]), 1);

        let mut line = Mesh::interval(0.0, 1.0, 2).unwrap();
        line.h_refine_elems(vec![0], HRef::T).unwrap();
        line.h_refine_elems(vec![2], HRef::T).unwrap();
        assert_eq!(line.max_irregularity(), 0);
    }

    #[test]
    fn copy_mesh() {
        let mut coarse = Mesh::interval(0.0, 1.0, 2).unwrap();
        let mut fine = coarse.clone();
        fine.refine_all_elements().unwrap();
        assert_eq!(coarse.num_active_elems(), 2);

        coarse.copy_from(&fine);
        assert_eq!(coarse.num_active_elems(), 4);
    }

    #[test]
    fn h_refine_non_existent() {
        let mut mesh = Mesh::interval(0.0, 1.0, 2).unwrap();
        assert_eq!(
            mesh.h_refine_elems(vec![2], HRef::T),
            Err(HRefError::ElemDoesntExist(2))
        );
    }

    #[test]
    fn h_refine_elem_with_children() {
        let mut mesh = Mesh::interval(0.0, 1.0, 2).unwrap();
        mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        assert_eq!(
            mesh.h_refine_elems(vec![1, 0], HRef::T),
            Err(HRefError::ElemHasChildren(0))
        );
        // nothing was applied to elem 1
        assert!(mesh.elems[1].is_active());
    }

    #[test]
    fn double_h_refinement() {
        let mut mesh = Mesh::interval(0.0, 1.0, 2).unwrap();
        assert_eq!(
            mesh.execute_h_refinements(vec![(0, HRef::T), (0, HRef::T)]),
            Err(HRefError::DoubleRefinement(0))
        );
    }

    #[test]
    fn anisotropic_h_refinement_in_1d() {
        let mut mesh = Mesh::interval(0.0, 1.0, 1).unwrap();
        assert_eq!(
            mesh.h_refine_elems(vec![0], HRef::V),
            Err(HRefError::UnsupportedRefinement(HRef::V, 1))
        );
    }

    #[test]
    fn minimum_edge_length_exceeded() {
        let mut mesh = Mesh::interval(0.0, 1.0, 1).unwrap();
        let result = (0..20).try_for_each(|_| mesh.refine_towards_boundary("Left", 1));
        assert!(matches!(result, Err(HRefError::MinEdgeLength(_))));
    }

    #[test]
    fn expansion_order_updates() {
        let mut mesh = Mesh::rectangle([0.0, 0.0], [3.0, 1.0], [3, 1]).unwrap();
        mesh.set_expansion_orders(vec![(0, [3, 3]), (2, [2, 3])]).unwrap();
        assert_eq!(mesh.elems[0].poly_orders.orders, [3, 3]);
        assert_eq!(mesh.elems[1].poly_orders.orders, [1, 1]);
        assert_eq!(mesh.elems[2].poly_orders.orders, [2, 3]);

        assert_eq!(
            mesh.set_expansion_orders(vec![(5, [1, 1])]),
            Err(PRefError::ElemDoesntExist(5))
        );
        assert_eq!(
            mesh.set_expansion_orders(vec![(1, [2, 2]), (1, [3, 3])]),
            Err(PRefError::DoubleRefinement(1))
        );
        assert_eq!(
            mesh.set_expansion_orders(vec![(0, [0, MAX_POLYNOMIAL_ORDER + 1])]),
            Err(PRefError::ExceededMaxExpansion)
        );
        assert_eq!(mesh.elems[1].poly_orders.orders, [1, 1]);
    }
}
