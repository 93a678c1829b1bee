//! Reference resolution
//!
//! A formula names other values as `[identifier]`. The evaluator hands each
//! identifier, together with the current pass token, to a [`Resolver`].

use quanta_core::{PassToken, QuantaError, Result};
use quanta_units::QuantityValue;
use std::collections::HashMap;

/// Supplies the value behind a `[identifier]` reference
pub trait Resolver {
    fn resolve(&mut self, identifier: &str, pass: PassToken) -> Result<QuantityValue>;
}

/// Resolver for formulas that must not reference anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl Resolver for NoReferences {
    fn resolve(&mut self, identifier: &str, _pass: PassToken) -> Result<QuantityValue> {
        Err(QuantaError::UnknownParameter(identifier.to_string()))
    }
}

/// Fixed identifier -> value table
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    values: HashMap<String, QuantityValue>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identifier: impl Into<String>, value: QuantityValue) -> Self {
        self.insert(identifier, value);
        self
    }

    pub fn insert(&mut self, identifier: impl Into<String>, value: QuantityValue) {
        self.values.insert(identifier.into(), value);
    }
}

impl Resolver for MapResolver {
    fn resolve(&mut self, identifier: &str, _pass: PassToken) -> Result<QuantityValue> {
        self.values
            .get(identifier)
            .copied()
            .ok_or_else(|| QuantaError::UnknownParameter(identifier.to_string()))
    }
}
