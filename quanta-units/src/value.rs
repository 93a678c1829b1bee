//! Dimensioned values
//!
//! A [`QuantityValue`] is an SI magnitude tagged with its dimension. Addition
//! and subtraction demand equal dimensions; multiplication and division
//! combine them.

use crate::parse::filter_expression;
use crate::{DimensionVector, QuantityRegistry};
use quanta_core::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul, Neg};
use std::sync::atomic::{AtomicBool, Ordering};

static DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

/// Turn NaN/Infinity reporting on or off for the whole process
pub fn set_diagnostics(enabled: bool) {
    DIAGNOSTICS.store(enabled, Ordering::Relaxed);
}

pub fn diagnostics_enabled() -> bool {
    DIAGNOSTICS.load(Ordering::Relaxed)
}

/// SI magnitude with its dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantityValue {
    pub magnitude: f64,
    pub dimension: DimensionVector,
}

impl QuantityValue {
    pub fn new(magnitude: f64, dimension: DimensionVector) -> Self {
        QuantityValue { magnitude, dimension }.observed("new")
    }

    /// Dimensionless value
    pub fn ratio(magnitude: f64) -> Self {
        Self::new(magnitude, DimensionVector::RATIO)
    }

    /// Value given in a unit expression, converted to SI
    pub fn from_unit(value: f64, expression: &str, registry: &QuantityRegistry) -> Result<Self> {
        let filtered = filter_expression(registry, expression)?;
        Ok(Self::new(filtered.to_si(value), filtered.dimension))
    }

    /// Magnitude expressed in `expression`; the dimensions must agree
    pub fn in_unit(&self, expression: &str, registry: &QuantityRegistry) -> Result<f64> {
        let filtered = filter_expression(registry, expression)?;
        if filtered.dimension != self.dimension {
            return Err(QuantaError::incompatible(
                self.dimension,
                format!("{} [{}]", expression, filtered.dimension),
            ));
        }
        Ok(filtered.from_si(self.magnitude))
    }

    pub fn is_ratio(&self) -> bool {
        self.dimension.is_ratio()
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude == 0.0
    }

    fn same_dimension(&self, other: &Self) -> Result<()> {
        if self.dimension != other.dimension {
            return Err(QuantaError::incompatible(self.dimension, other.dimension));
        }
        Ok(())
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.same_dimension(&other)?;
        Ok(Self::with(self.magnitude + other.magnitude, self.dimension, "add"))
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.same_dimension(&other)?;
        Ok(Self::with(self.magnitude - other.magnitude, self.dimension, "sub"))
    }

    pub fn checked_mul(self, other: Self) -> Result<Self> {
        let dimension = self.dimension.plus(other.dimension)?;
        Ok(Self::with(self.magnitude * other.magnitude, dimension, "mul"))
    }

    /// Division by zero follows f64 semantics
    pub fn checked_div(self, other: Self) -> Result<Self> {
        let dimension = self.dimension.minus(other.dimension)?;
        Ok(Self::with(self.magnitude / other.magnitude, dimension, "div"))
    }

    pub fn checked_powi(self, exp: i32) -> Result<Self> {
        let dimension = self.dimension.times(exp)?;
        Ok(Self::with(self.magnitude.powi(exp), dimension, "powi"))
    }

    /// Compare SI magnitudes of equal dimensions
    pub fn checked_cmp(&self, other: &Self) -> Result<Option<std::cmp::Ordering>> {
        self.same_dimension(other)?;
        Ok(self.magnitude.partial_cmp(&other.magnitude))
    }

    /// Equal dimension and magnitudes within a relative tolerance
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        let scale = self.magnitude.abs().max(other.magnitude.abs()).max(1.0);
        self.dimension == other.dimension
            && (self.magnitude - other.magnitude).abs() <= tolerance * scale
    }

    fn with(magnitude: f64, dimension: DimensionVector, op: &str) -> Self {
        QuantityValue { magnitude, dimension }.observed(op)
    }

    fn observed(self, op: &str) -> Self {
        if !self.magnitude.is_finite() && diagnostics_enabled() {
            tracing::warn!(
                op,
                magnitude = self.magnitude,
                dimension = %self.dimension,
                "non-finite quantity value"
            );
        }
        self
    }
}

impl Default for QuantityValue {
    fn default() -> Self {
        QuantityValue::ratio(0.0)
    }
}

impl Neg for QuantityValue {
    type Output = QuantityValue;

    fn neg(self) -> Self::Output {
        QuantityValue::with(-self.magnitude, self.dimension, "neg")
    }
}

impl Mul<f64> for QuantityValue {
    type Output = QuantityValue;

    fn mul(self, rhs: f64) -> Self::Output {
        QuantityValue::with(self.magnitude * rhs, self.dimension, "scale")
    }
}

impl Div<f64> for QuantityValue {
    type Output = QuantityValue;

    fn div(self, rhs: f64) -> Self::Output {
        QuantityValue::with(self.magnitude / rhs, self.dimension, "scale")
    }
}

impl fmt::Display for QuantityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dimension.is_ratio() {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} [{}]", self.magnitude, self.dimension)
        }
    }
}
