use thiserror::Error;

/// Description of an h-Refinement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HRef {
    /// isotropic (split along every axis)
    T,
    /// anisotropic about the u-direction (split along the first axis only)
    U,
    /// anisotropic about the v-direction (split along the second axis only)
    V,
}

impl HRef {
    /// The axes that are bisected by this refinement in a `D`-dimensional mesh
    pub fn axes<const D: usize>(&self) -> Result<[bool; D], HRefError> {
        match (self, D) {
            (Self::T, _) => Ok([true; D]),
            (Self::U, 2) => Ok(std::array::from_fn(|k| k == 0)),
            (Self::V, 2) => Ok(std::array::from_fn(|k| k == 1)),
            _ => Err(HRefError::UnsupportedRefinement(*self, D)),
        }
    }

    /// The refinements that are meaningful in a `D`-dimensional mesh
    pub fn available<const D: usize>() -> &'static [HRef] {
        match D {
            2 => &[HRef::T, HRef::U, HRef::V],
            _ => &[HRef::T],
        }
    }

    pub fn num_children<const D: usize>(&self) -> usize {
        match self {
            Self::T => 1 << D,
            Self::U | Self::V => 2,
        }
    }

    pub fn is_isotropic<const D: usize>(&self) -> bool {
        matches!(self, Self::T) || D == 1
    }
}

/// Description of an `Elem`'s h-refinement levels along each axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HLevels<const D: usize> {
    pub levels: [u8; D],
}

impl<const D: usize> HLevels<D> {
    pub fn refined(&self, axes: [bool; D]) -> Self {
        Self {
            levels: std::array::from_fn(|k| self.levels[k] + axes[k] as u8),
        }
    }
}

impl<const D: usize> Default for HLevels<D> {
    fn default() -> Self {
        Self { levels: [0; D] }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HRefError {
    #[error("Elem {0} does not exist; Cannot apply h-Refinement!")]
    ElemDoesntExist(usize),
    #[error("Elem {0} already has children; Cannot apply h-Refinement!")]
    ElemHasChildren(usize),
    #[error("Multiple h-refinements were specified for Elem {0}; Cannot apply h-Refinements!")]
    DoubleRefinement(usize),
    #[error("h-Refinement of Elem {0} would produce edges shorter than the minimum edge length!")]
    MinEdgeLength(usize),
    #[error("h-Refinement {0:?} is not defined for a {1}D mesh!")]
    UnsupportedRefinement(HRef, usize),
    #[error("No boundary with marker '{0}' exists in the mesh!")]
    UnknownBoundary(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refinement_axes() {
        assert_eq!(HRef::T.axes::<1>().unwrap(), [true]);
        assert_eq!(HRef::T.axes::<2>().unwrap(), [true, true]);
        assert_eq!(HRef::U.axes::<2>().unwrap(), [true, false]);
        assert_eq!(HRef::V.axes::<2>().unwrap(), [false, true]);
        assert_eq!(
            HRef::U.axes::<1>(),
            Err(HRefError::UnsupportedRefinement(HRef::U, 1))
        );

        assert_eq!(HRef::T.num_children::<2>(), 4);
        assert_eq!(HRef::V.num_children::<2>(), 2);
        assert_eq!(HRef::available::<1>(), &[HRef::T]);
    }

    #[test]
    fn levels() {
        let levels = HLevels::<2>::default().refined([true, false]).refined([true, true]);
        assert_eq!(levels.levels, [2, 1]);
    }
}
