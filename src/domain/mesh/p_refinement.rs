use super::MAX_POLYNOMIAL_ORDER;
#[cfg(feature = "json_export")]
use json::JsonValue;
use thiserror::Error;

/// An `Elem`'s polynomial expansion order along each axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PolyOrders<const D: usize> {
    pub orders: [u8; D],
}

impl<const D: usize> PolyOrders<D> {
    pub const fn from(orders: [u8; D]) -> Self {
        Self { orders }
    }

    pub const fn uniform(order: u8) -> Self {
        Self { orders: [order; D] }
    }

    pub fn set(&mut self, orders: [u8; D]) -> Result<(), PRefError> {
        if orders.iter().any(|n| *n > MAX_POLYNOMIAL_ORDER) {
            return Err(PRefError::ExceededMaxExpansion);
        }
        self.orders = orders;

        Ok(())
    }
}

impl<const D: usize> Default for PolyOrders<D> {
    fn default() -> Self {
        Self::uniform(1)
    }
}

#[cfg(feature = "json_export")]
impl<const D: usize> From<PolyOrders<D>> for JsonValue {
    fn from(orders: PolyOrders<D>) -> Self {
        JsonValue::from(orders.orders.to_vec())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PRefError {
    #[error("Positive p-Refinement will result in expansion order over maximum; Cannot p-Refine!")]
    ExceededMaxExpansion,
    #[error("Elem {0} does not exist; Cannot apply p-Refinement!")]
    ElemDoesntExist(usize),
    #[error("Multiple p-refinements were specified for Elem {0}; Cannot apply p-Refinements")]
    DoubleRefinement(usize),
    #[error("Expansion order floor {floor} exceeds ceiling {ceiling}")]
    InvalidOrderBounds { floor: u8, ceiling: u8 },
}
