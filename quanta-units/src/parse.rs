//! Unit expression parsing
//!
//! Supports:
//! - Simple units: "m", "kg", "kWh"
//! - Products: "kg*m"
//! - Quotients: "m/s", "1/hr" (a single '/' only)
//! - Powers: "m^2", "s^-1"
//! - Combinations: "kg*m^2/s^2"
//!
//! Tokens resolve through [`QuantityRegistry::find_unit`], so display names,
//! legacy names, case variants and plurals are accepted. [`filter_expression`]
//! is the normalization point every other component goes through.

use crate::convert::ConversionPlan;
use crate::registry::UnitRef;
use crate::unit::{combine_expressions, split_expression};
use crate::{DimensionVector, Quantity, QuantityRegistry};
use quanta_core::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A resolved unit raised to a non-zero exponent
#[derive(Debug, Clone)]
pub struct ParsedFactor {
    pub unit: UnitRef,
    pub exponent: i32,
}

/// Canonical forms of a unit expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredExpression {
    /// SI unit of the expression's quantity (e.g. "kg*m/s")
    pub si_expression: String,
    /// The expression as written, with canonical unit spellings and repeated
    /// units combined (e.g. "kg^2*mi/hr")
    pub user_expression: String,
    pub dimension: DimensionVector,
    /// Name of the quantity owning the dimension
    pub quantity: String,
    /// `si = value * slope + intercept`
    pub slope: f64,
    pub intercept: f64,
}

impl FilteredExpression {
    pub fn to_si(&self, value: f64) -> f64 {
        value * self.slope + self.intercept
    }

    pub fn from_si(&self, value: f64) -> f64 {
        (value - self.intercept) / self.slope
    }
}

/// Resolve a unit expression into factors without touching the registry's
/// contents.
///
/// A whole expression that is itself registered (e.g. "kg/m^3") resolves to
/// that single unit. Repeated units are combined and cancelled exponents are
/// dropped.
pub fn parse_expression(registry: &QuantityRegistry, expr: &str) -> Result<Vec<ParsedFactor>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(unit) = registry.find_expression(expr) {
        return Ok(vec![ParsedFactor { unit, exponent: 1 }]);
    }

    let mut factors: Vec<ParsedFactor> = Vec::new();
    for (token, exponent) in split_expression(expr)? {
        let unit = registry.find_unit(&token)?;
        match factors.iter_mut().find(|f| f.unit == unit) {
            Some(factor) => factor.exponent += exponent,
            None => factors.push(ParsedFactor { unit, exponent }),
        }
    }
    factors.retain(|f| f.exponent != 0);
    Ok(factors)
}

/// Combined dimension of parsed factors
pub fn factors_dimension(factors: &[ParsedFactor]) -> Result<DimensionVector> {
    factors.iter().try_fold(DimensionVector::RATIO, |acc, f| {
        acc.plus(f.unit.dimension().times(f.exponent)?)
    })
}

/// Normalize a unit expression.
///
/// When the dimension has no quantity yet, a derived quantity is synthesized
/// from the factors' quantities and registered (unless registration is
/// disabled, which makes the expression an `UnknownUnit`).
pub fn filter_expression(registry: &QuantityRegistry, expr: &str) -> Result<FilteredExpression> {
    let factors = parse_expression(registry, expr)?;
    let dimension = factors_dimension(&factors)?;
    let plan = ConversionPlan::from_factors(&factors, registry.max_conversion_steps())?;
    let (slope, intercept) = plan.affine();

    let quantity = match registry.find_by_dimension(dimension) {
        Some(quantity) => quantity,
        None => synthesize(registry, &factors, dimension, expr)?,
    };
    let si_expression = quantity
        .si_unit()
        .map(|u| u.expression.clone())
        .ok_or_else(|| {
            QuantaError::InternalConsistency(format!("quantity '{}' has no SI unit", quantity.name))
        })?;

    let parts: Vec<(&str, i32)> = factors
        .iter()
        .map(|f| (f.unit.expression(), f.exponent))
        .collect();

    Ok(FilteredExpression {
        si_expression,
        user_expression: combine_expressions(&parts),
        dimension,
        quantity: quantity.name.clone(),
        slope,
        intercept,
    })
}

fn synthesize(
    registry: &QuantityRegistry,
    factors: &[ParsedFactor],
    dimension: DimensionVector,
    expr: &str,
) -> Result<Arc<Quantity>> {
    if !registry.jit_registration() {
        return Err(QuantaError::UnknownUnit(format!(
            "{} (no quantity for dimension {})",
            expr.trim(),
            dimension
        )));
    }

    let numerator = product_of(factors.iter().filter(|f| f.exponent > 0).map(|f| (f, f.exponent)))?;
    let denominator =
        product_of(factors.iter().filter(|f| f.exponent < 0).map(|f| (f, -f.exponent)))?;

    let numerator = match numerator {
        Some(q) => q,
        None => registry
            .find_by_dimension(DimensionVector::RATIO)
            .map(|q| (*q).clone())
            .ok_or_else(|| {
                QuantaError::InternalConsistency("no ratio quantity registered".to_string())
            })?,
    };

    let derived = Quantity::derive(&numerator, denominator.as_ref())?;
    if derived.dimension != dimension {
        return Err(QuantaError::InternalConsistency(format!(
            "derived quantity '{}' has dimension {} instead of {}",
            derived.name, derived.dimension, dimension
        )));
    }
    registry.register_derived(derived)
}

/// Product of factor quantities raised to their powers; `None` when empty
fn product_of<'a>(
    factors: impl Iterator<Item = (&'a ParsedFactor, i32)>,
) -> Result<Option<Quantity>> {
    let mut acc: Option<Quantity> = None;
    for (factor, exponent) in factors {
        let powered = factor.unit.quantity.power(exponent)?;
        acc = Some(match acc {
            Some(q) => q.product(&powered)?,
            None => powered,
        });
    }
    Ok(acc)
}
