//! Formula functions
//!
//! Functions are registered by name in a [`FunctionTable`]. The standard
//! table holds the transcendental functions (dimensionless arguments only)
//! and the `noop` placeholder. `if` is not a table entry: the evaluator
//! handles it so only the chosen branch runs.

use crate::FormulaValue;
use quanta_core::{QuantaError, Result};
use quanta_units::{DimensionVector, QuantityValue};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata for a formula function
#[derive(Debug, Clone, Serialize)]
pub struct FunctionMeta {
    pub name: &'static str,
    pub description: &'static str,
    pub usage: &'static str,
    pub arity: usize,
    pub category: &'static str,
}

/// A function callable from formulas
pub trait FormulaFunction: Send + Sync {
    fn meta(&self) -> FunctionMeta;
    fn call(&self, args: &[FormulaValue]) -> Result<FormulaValue>;
}

/// Check the argument count against the function's arity
pub fn check_arity(meta: &FunctionMeta, args: &[FormulaValue]) -> Result<()> {
    if args.len() != meta.arity {
        return Err(QuantaError::evaluation(format!(
            "{} expects {} argument(s), got {}",
            meta.usage,
            meta.arity,
            args.len()
        )));
    }
    Ok(())
}

/// Single-argument math on a dimensionless value
pub struct MathFunction {
    name: &'static str,
    description: &'static str,
    usage: &'static str,
    apply: fn(f64) -> f64,
}

impl MathFunction {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        usage: &'static str,
        apply: fn(f64) -> f64,
    ) -> Self {
        Self { name, description, usage, apply }
    }
}

impl FormulaFunction for MathFunction {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: self.name,
            description: self.description,
            usage: self.usage,
            arity: 1,
            category: "math",
        }
    }

    fn call(&self, args: &[FormulaValue]) -> Result<FormulaValue> {
        check_arity(&self.meta(), args)?;
        let arg = &args[0].quantity;
        if !arg.is_ratio() {
            return Err(QuantaError::incompatible(
                format!("{}({})", self.name, arg.dimension),
                DimensionVector::RATIO,
            ));
        }
        Ok(FormulaValue::untagged(QuantityValue::ratio((self.apply)(arg.magnitude))))
    }
}

/// Identity placeholder; keeps dimension and tag
pub struct Noop;

impl FormulaFunction for Noop {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "noop",
            description: "Returns its argument unchanged",
            usage: "noop(x)",
            arity: 1,
            category: "utility",
        }
    }

    fn call(&self, args: &[FormulaValue]) -> Result<FormulaValue> {
        check_arity(&self.meta(), args)?;
        Ok(args[0].clone())
    }
}

/// Function lookup by (case-insensitive) name
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Arc<dyn FormulaFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ln, exp, sin, cos, tan, asin, acos, atan, log10 and noop
    pub fn standard() -> Self {
        Self::new()
            // Logarithms and exponentials
            .with_function(MathFunction::new("ln", "Natural logarithm", "ln(x)", f64::ln))
            .with_function(MathFunction::new("exp", "e raised to x", "exp(x)", f64::exp))
            .with_function(MathFunction::new("log10", "Base-10 logarithm", "log10(x)", f64::log10))
            // Trigonometry (radians)
            .with_function(MathFunction::new("sin", "Sine", "sin(x)", f64::sin))
            .with_function(MathFunction::new("cos", "Cosine", "cos(x)", f64::cos))
            .with_function(MathFunction::new("tan", "Tangent", "tan(x)", f64::tan))
            .with_function(MathFunction::new("asin", "Arcsine", "asin(x)", f64::asin))
            .with_function(MathFunction::new("acos", "Arccosine", "acos(x)", f64::acos))
            .with_function(MathFunction::new("atan", "Arctangent", "atan(x)", f64::atan))
            .with_function(Noop)
    }

    pub fn with_function<F: FormulaFunction + 'static>(mut self, f: F) -> Self {
        let name = f.meta().name.to_lowercase();
        self.functions.insert(name, Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn FormulaFunction> {
        self.functions.get(&name.to_lowercase()).map(|f| f.as_ref())
    }

    /// Metadata of every function, sorted by name
    pub fn list(&self) -> Vec<FunctionMeta> {
        let mut metas: Vec<FunctionMeta> = self.functions.values().map(|f| f.meta()).collect();
        metas.sort_by_key(|m| m.name);
        metas
    }

    pub fn call(&self, name: &str, args: &[FormulaValue]) -> Result<FormulaValue> {
        match self.get(name) {
            Some(f) => f.call(args),
            None => Err(QuantaError::evaluation(format!("unknown function '{}'", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(v: f64) -> FormulaValue {
        FormulaValue::untagged(QuantityValue::ratio(v))
    }

    #[test]
    fn test_standard_functions() {
        let table = FunctionTable::standard();
        assert_eq!(table.call("ln", &[ratio(1.0)]).unwrap().quantity.magnitude, 0.0);
        assert_eq!(table.call("exp", &[ratio(0.0)]).unwrap().quantity.magnitude, 1.0);
        let log = table.call("LOG10", &[ratio(1000.0)]).unwrap().quantity.magnitude;
        assert!((log - 3.0).abs() < 1e-12);
        assert_eq!(table.call("cos", &[ratio(0.0)]).unwrap().quantity.magnitude, 1.0);
        assert_eq!(table.list().len(), 10);
    }

    #[test]
    fn test_dimensioned_argument_rejected() {
        let table = FunctionTable::standard();
        let mass = FormulaValue::untagged(QuantityValue::new(1.0, DimensionVector::MASS));
        let err = table.call("sin", &[mass.clone()]).unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::INCOMPATIBLE_DIMENSION);
        // noop accepts anything
        assert_eq!(table.call("noop", &[mass.clone()]).unwrap(), mass);
    }

    #[test]
    fn test_arity_and_unknown() {
        let table = FunctionTable::standard();
        let err = table.call("ln", &[ratio(1.0), ratio(2.0)]).unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::EVALUATION_FAILED);
        let err = table.call("sqrtx", &[ratio(1.0)]).unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::EVALUATION_FAILED);
    }
}
