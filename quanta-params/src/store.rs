//! Parameter store
//!
//! Owns parameters keyed by unique id and resolves `[id]` references between
//! them. A parameter whose formula is running is taken out of the store and
//! put on the evaluation stack, so reaching it again is a cycle.

use crate::parameter::Parameter;
use quanta_core::{PassToken, QuantaError, Result};
use quanta_formula::{FormulaEvaluator, Resolver};
use quanta_units::{QuantityRegistry, QuantityValue};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ParameterStore {
    evaluator: Arc<FormulaEvaluator>,
    parameters: HashMap<String, Parameter>,
    /// Registration order
    order: Vec<String>,
    evaluating: Vec<String>,
}

impl ParameterStore {
    pub fn new(evaluator: FormulaEvaluator) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            parameters: HashMap::new(),
            order: Vec::new(),
            evaluating: Vec::new(),
        }
    }

    /// Store evaluating with the standard function table
    pub fn with_registry(registry: Arc<QuantityRegistry>) -> Self {
        Self::new(FormulaEvaluator::new(registry))
    }

    pub fn evaluator(&self) -> &FormulaEvaluator {
        &self.evaluator
    }

    pub fn registry(&self) -> &QuantityRegistry {
        self.evaluator.registry()
    }

    /// Add a parameter; its id must not be in use
    pub fn register(&mut self, parameter: Parameter) -> Result<()> {
        let id = parameter.id().to_string();
        if self.parameters.contains_key(&id) || self.evaluating.contains(&id) {
            return Err(QuantaError::DuplicateParameter(id));
        }
        tracing::debug!(id = %id, "registered parameter");
        self.order.push(id.clone());
        self.parameters.insert(id, parameter);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Parameter> {
        self.parameters.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Parameter> {
        let removed = self.parameters.remove(id);
        if removed.is_some() {
            self.order.retain(|o| o != id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Bring one parameter up to date for `pass` and return its value
    pub fn evaluate(&mut self, id: &str, pass: PassToken) -> Result<QuantityValue> {
        self.resolve(id, pass)
    }

    /// Refresh every parameter for one calculation pass.
    ///
    /// A failing parameter does not stop the pass; the failures are returned
    /// with the id they belong to.
    pub fn update_all(&mut self, pass: PassToken) -> Vec<(String, QuantaError)> {
        tracing::debug!(%pass, parameters = self.order.len(), "update pass");
        let mut failures = Vec::new();
        for id in self.order.clone() {
            if let Err(e) = self.resolve(&id, pass) {
                tracing::debug!(id = %id, error = %e, "parameter failed");
                failures.push((id, e));
            }
        }
        failures
    }

    /// Mint a pass token and run [`update_all`](Self::update_all) with it
    pub fn run_pass(&mut self) -> (PassToken, Vec<(String, QuantaError)>) {
        let pass = PassToken::mint();
        let failures = self.update_all(pass);
        (pass, failures)
    }
}

impl Resolver for ParameterStore {
    fn resolve(&mut self, identifier: &str, pass: PassToken) -> Result<QuantityValue> {
        if let Some(start) = self.evaluating.iter().position(|id| id == identifier) {
            let mut cycle = self.evaluating[start..].to_vec();
            cycle.push(identifier.to_string());
            return Err(QuantaError::CircularReference(cycle));
        }

        let mut parameter = self
            .parameters
            .remove(identifier)
            .ok_or_else(|| QuantaError::UnknownParameter(identifier.to_string()))?;

        self.evaluating.push(identifier.to_string());
        let evaluator = Arc::clone(&self.evaluator);
        let outcome = parameter
            .update_buffers(pass, &evaluator, self)
            .and_then(|_| parameter.to_quantity_value());
        self.evaluating.pop();

        self.parameters.insert(identifier.to_string(), parameter);
        outcome
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("parameters", &self.order)
            .finish()
    }
}
