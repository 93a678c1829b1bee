//! Conversions between unit expressions and SI
//!
//! A unit expression is decomposed into factors; each numerator factor
//! contributes its forward transform and each denominator factor its inverse,
//! once per power. Converting back to the specific unit applies the opposite
//! transforms in reverse order.

use crate::parse::{filter_expression, parse_expression, ParsedFactor};
use crate::QuantityRegistry;
use quanta_core::{QuantaError, Result};

/// One affine transform applied while converting to SI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionStep {
    pub slope: f64,
    pub intercept: f64,
    /// Denominator factors are applied inverted
    pub inverse: bool,
}

impl ConversionStep {
    fn apply(&self, value: f64) -> f64 {
        if self.inverse {
            (value - self.intercept) / self.slope
        } else {
            value * self.slope + self.intercept
        }
    }

    fn undo(&self, value: f64) -> f64 {
        if self.inverse {
            value * self.slope + self.intercept
        } else {
            (value - self.intercept) / self.slope
        }
    }

    /// Compose onto an accumulated `si = value * slope + intercept`
    fn compose(&self, (slope, intercept): (f64, f64)) -> (f64, f64) {
        if self.inverse {
            (slope / self.slope, (intercept - self.intercept) / self.slope)
        } else {
            (slope * self.slope, intercept * self.slope + self.intercept)
        }
    }
}

/// Ordered steps that take a value in a unit expression to SI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionPlan {
    pub steps: Vec<ConversionStep>,
}

impl ConversionPlan {
    /// Build the plan for parsed factors, numerator factors first.
    ///
    /// Fails with `InternalConsistency` once more than `max_steps` steps
    /// would be needed, or if a factor's quantity has no SI unit.
    pub fn from_factors(factors: &[ParsedFactor], max_steps: usize) -> Result<Self> {
        let numerators = factors.iter().filter(|f| f.exponent > 0);
        let denominators = factors.iter().filter(|f| f.exponent < 0);

        let mut steps = Vec::new();
        for factor in numerators.chain(denominators) {
            // every factor is checked against its quantity's SI unit
            factor.unit.si_unit()?;
            let unit = factor.unit.unit();
            for _ in 0..factor.exponent.unsigned_abs() {
                if steps.len() >= max_steps {
                    return Err(QuantaError::InternalConsistency(format!(
                        "conversion needs more than {} steps",
                        max_steps
                    )));
                }
                steps.push(ConversionStep {
                    slope: unit.slope,
                    intercept: unit.intercept,
                    inverse: factor.exponent < 0,
                });
            }
        }
        Ok(ConversionPlan { steps })
    }

    pub fn to_si(&self, value: f64) -> f64 {
        self.steps.iter().fold(value, |v, step| step.apply(v))
    }

    pub fn from_si(&self, value: f64) -> f64 {
        self.steps.iter().rev().fold(value, |v, step| step.undo(v))
    }

    /// Collapse the plan into a single `(slope, intercept)`
    pub fn affine(&self) -> (f64, f64) {
        self.steps.iter().fold((1.0, 0.0), |acc, step| step.compose(acc))
    }
}

fn plan_for(registry: &QuantityRegistry, expression: &str) -> Result<ConversionPlan> {
    let factors = parse_expression(registry, expression)?;
    ConversionPlan::from_factors(&factors, registry.max_conversion_steps())
}

/// Convert a value given in `expression` to its SI magnitude
pub fn convert_from_specific_to_si(
    registry: &QuantityRegistry,
    value: f64,
    expression: &str,
) -> Result<f64> {
    Ok(plan_for(registry, expression)?.to_si(value))
}

/// Convert an SI magnitude to a value in `expression`
pub fn convert_from_si_to_specific(
    registry: &QuantityRegistry,
    value: f64,
    expression: &str,
) -> Result<f64> {
    Ok(plan_for(registry, expression)?.from_si(value))
}

/// Convert between two unit expressions of the same dimension
pub fn convert(registry: &QuantityRegistry, value: f64, from: &str, to: &str) -> Result<f64> {
    let source = filter_expression(registry, from)?;
    let target = filter_expression(registry, to)?;
    if source.dimension != target.dimension {
        return Err(QuantaError::incompatible(
            format!("{} [{}]", from, source.dimension),
            format!("{} [{}]", to, target.dimension),
        ));
    }
    let si = convert_from_specific_to_si(registry, value, from)?;
    convert_from_si_to_specific(registry, si, to)
}
