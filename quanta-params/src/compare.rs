//! Ordering between parameter values
//!
//! Values of one dimension compare by SI magnitude. Across dimensions a zero
//! value is the weaker one; otherwise energy outranks mass, which outranks
//! volume, which outranks anything else.

use crate::parameter::Parameter;
use quanta_core::Result;
use quanta_units::{DimensionVector, QuantityValue};
use std::cmp::Ordering;

fn rank(dimension: DimensionVector) -> u8 {
    if dimension == DimensionVector::ENERGY {
        3
    } else if dimension == DimensionVector::MASS {
        2
    } else if dimension == DimensionVector::VOLUME {
        1
    } else {
        0
    }
}

/// Total order used to pick the dominant of two values
pub fn compare_values(a: &QuantityValue, b: &QuantityValue) -> Ordering {
    if a.dimension == b.dimension {
        return a.magnitude.partial_cmp(&b.magnitude).unwrap_or(Ordering::Equal);
    }
    match (a.is_zero(), b.is_zero()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => rank(a.dimension).cmp(&rank(b.dimension)),
    }
}

impl Parameter {
    /// Compare the buffered values of two parameters
    pub fn compare(&self, other: &Parameter) -> Result<Ordering> {
        Ok(compare_values(&self.to_quantity_value()?, &other.to_quantity_value()?))
    }
}
