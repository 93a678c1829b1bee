//! Quantity registry
//!
//! Holds every known [`Quantity`] and resolves unit tokens. The registry is
//! built once from a definition source and then only grows: when a parsed
//! expression has a dimension nothing covers yet, a derived quantity is
//! synthesized and appended. Growth happens behind a write lock and is
//! idempotent, so a registry shared as `Arc<QuantityRegistry>` stays
//! consistent.

use crate::definitions::DefinitionDocument;
use crate::{DimensionVector, Quantity, Unit};
use quanta_core::{EngineConfig, QuantaError, Result, DEFAULT_MAX_CONVERSION_STEPS};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A unit inside its owning quantity
#[derive(Debug, Clone)]
pub struct UnitRef {
    pub quantity: Arc<Quantity>,
    pub index: usize,
}

impl UnitRef {
    pub fn unit(&self) -> &Unit {
        &self.quantity.units[self.index]
    }

    pub fn dimension(&self) -> DimensionVector {
        self.quantity.dimension
    }

    pub fn expression(&self) -> &str {
        &self.unit().expression
    }

    /// The SI unit of the owning quantity
    pub fn si_unit(&self) -> Result<&Unit> {
        self.quantity.si_unit().ok_or_else(|| {
            QuantaError::InternalConsistency(format!(
                "quantity '{}' lost its SI unit",
                self.quantity.name
            ))
        })
    }
}

impl PartialEq for UnitRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.quantity, &other.quantity) && self.index == other.index
    }
}

#[derive(Default)]
struct Inner {
    quantities: Vec<Arc<Quantity>>,
    /// Unit expression -> (quantity index, unit index); first entry wins
    by_expression: HashMap<String, (usize, usize)>,
    legacy: HashMap<String, String>,
}

impl Inner {
    fn push(&mut self, quantity: Quantity) -> Arc<Quantity> {
        let q_index = self.quantities.len();
        for (u_index, unit) in quantity.units.iter().enumerate() {
            self.by_expression
                .entry(unit.expression.clone())
                .or_insert((q_index, u_index));
        }
        let quantity = Arc::new(quantity);
        self.quantities.push(Arc::clone(&quantity));
        quantity
    }

    fn by_dimension(&self, dimension: DimensionVector) -> Option<&Arc<Quantity>> {
        self.quantities.iter().find(|q| q.dimension == dimension)
    }

    fn unit_ref(&self, (q_index, u_index): (usize, usize)) -> UnitRef {
        UnitRef {
            quantity: Arc::clone(&self.quantities[q_index]),
            index: u_index,
        }
    }

    fn exact(&self, token: &str) -> Option<UnitRef> {
        self.by_expression.get(token).map(|&at| self.unit_ref(at))
    }

    fn by_unit_name(&self, name: &str) -> Option<UnitRef> {
        for (q_index, quantity) in self.quantities.iter().enumerate() {
            if let Some(u_index) = quantity.units.iter().position(|u| u.name == name) {
                return Some(self.unit_ref((q_index, u_index)));
            }
        }
        None
    }

    /// Units whose expression or name equals `token` ignoring case, or
    /// equals it with a trailing plural "s" removed
    fn loose_candidates(&self, token: &str) -> Vec<UnitRef> {
        let lower = token.to_lowercase();
        let singular = lower
            .strip_suffix('s')
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let matches = |text: &str| {
            let text = text.to_lowercase();
            text == lower || singular.as_deref() == Some(text.as_str())
        };

        let mut found = Vec::new();
        for (q_index, quantity) in self.quantities.iter().enumerate() {
            for (u_index, unit) in quantity.units.iter().enumerate() {
                if unit.expression.is_empty() {
                    continue;
                }
                if matches(&unit.expression) || matches(&unit.name) {
                    found.push(self.unit_ref((q_index, u_index)));
                }
            }
        }
        found
    }
}

/// Registry of quantities and their units
pub struct QuantityRegistry {
    inner: RwLock<Inner>,
    jit_registration: bool,
    max_conversion_steps: usize,
}

impl QuantityRegistry {
    /// Registry over the built-in definitions
    pub fn builtin() -> Result<Self> {
        Self::from_definitions(&DefinitionDocument::builtin())
    }

    /// Build a registry from a definition document.
    ///
    /// Every quantity must carry an SI unit (slope 1, intercept 0) and a
    /// dimension not already taken by an earlier quantity.
    pub fn from_definitions(doc: &DefinitionDocument) -> Result<Self> {
        let mut inner = Inner::default();
        for def in &doc.quantities {
            if let Some(existing) = inner.by_dimension(def.dimension) {
                return Err(QuantaError::Definition(format!(
                    "quantities '{}' and '{}' share dimension {}",
                    existing.name, def.name, def.dimension
                )));
            }
            let quantity = Quantity::base(
                &def.name,
                &def.symbol,
                def.dimension,
                def.units.clone(),
                def.preferred,
            )?;
            for unit in &quantity.units {
                crate::unit::split_expression(&unit.expression).map_err(|e| {
                    QuantaError::Definition(format!("unit of '{}': {}", def.name, e))
                })?;
            }
            inner.push(quantity);
        }
        inner.legacy = doc
            .legacy
            .iter()
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect();

        tracing::debug!(
            quantities = inner.quantities.len(),
            units = inner.by_expression.len(),
            "quantity registry loaded"
        );

        Ok(QuantityRegistry {
            inner: RwLock::new(inner),
            jit_registration: true,
            max_conversion_steps: DEFAULT_MAX_CONVERSION_STEPS,
        })
    }

    /// Build a registry the way the configuration asks for
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let doc = match &config.definitions_path {
            Some(path) => DefinitionDocument::from_file(path)?,
            None => DefinitionDocument::builtin(),
        };
        Ok(Self::from_definitions(&doc)?
            .with_jit_registration(config.jit_registration)
            .with_max_conversion_steps(config.max_conversion_steps))
    }

    pub fn with_jit_registration(mut self, enabled: bool) -> Self {
        self.jit_registration = enabled;
        self
    }

    pub fn with_max_conversion_steps(mut self, steps: usize) -> Self {
        self.max_conversion_steps = steps.max(1);
        self
    }

    pub fn jit_registration(&self) -> bool {
        self.jit_registration
    }

    pub fn max_conversion_steps(&self) -> usize {
        self.max_conversion_steps
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all quantities in registration order
    pub fn quantities(&self) -> Vec<Arc<Quantity>> {
        self.read().quantities.clone()
    }

    /// First quantity with the given dimension
    pub fn find_by_dimension(&self, dimension: DimensionVector) -> Option<Arc<Quantity>> {
        self.read().by_dimension(dimension).cloned()
    }

    /// Quantity by name, following the legacy map for renamed quantities
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Quantity>> {
        let inner = self.read();
        let name = inner.legacy.get(name).map(String::as_str).unwrap_or(name);
        inner.quantities.iter().find(|q| q.name == name).cloned()
    }

    /// Current name for a legacy quantity or unit name
    pub fn legacy_name(&self, old: &str) -> Option<String> {
        self.read().legacy.get(old).cloned()
    }

    /// Exact unit expression lookup, no fallbacks
    pub fn find_expression(&self, expression: &str) -> Option<UnitRef> {
        self.read().exact(expression)
    }

    /// Resolve a single unit token.
    ///
    /// Tried in order: exact expression, exact display name, legacy unit
    /// name, then a case-insensitive / plural-stripped match that must be
    /// unique.
    pub fn find_unit(&self, token: &str) -> Result<UnitRef> {
        let token = token.trim();
        let inner = self.read();

        if let Some(found) = inner.exact(token) {
            return Ok(found);
        }
        if let Some(found) = inner.by_unit_name(token) {
            return Ok(found);
        }
        if let Some(found) = inner.legacy.get(token).and_then(|new| inner.exact(new)) {
            return Ok(found);
        }

        let mut candidates = inner.loose_candidates(token);
        candidates.dedup_by(|a, b| a == b);
        match candidates.len() {
            0 => Err(QuantaError::UnknownUnit(token.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => Err(QuantaError::AmbiguousUnitMatch {
                token: token.to_string(),
                candidates: candidates.iter().map(|c| c.expression().to_string()).collect(),
            }),
        }
    }

    /// Register a synthesized quantity unless its dimension is already
    /// covered, returning whichever quantity owns the dimension afterwards
    pub fn register_derived(&self, quantity: Quantity) -> Result<Arc<Quantity>> {
        let mut inner = self.write();
        if let Some(existing) = inner.by_dimension(quantity.dimension) {
            return Ok(Arc::clone(existing));
        }
        if !self.jit_registration {
            return Err(QuantaError::UnknownUnit(format!(
                "no quantity for dimension {}",
                quantity.dimension
            )));
        }
        if quantity.si_unit().is_none() {
            return Err(QuantaError::InternalConsistency(format!(
                "derived quantity '{}' has no SI unit",
                quantity.name
            )));
        }

        tracing::debug!(
            name = %quantity.name,
            dimension = %quantity.dimension,
            units = quantity.units.len(),
            "registering derived quantity"
        );
        Ok(inner.push(quantity))
    }

    /// Visible units of a quantity, by quantity name
    pub fn visible_units(&self, quantity: &str) -> Result<Vec<Unit>> {
        let quantity = self
            .find_by_name(quantity)
            .ok_or_else(|| QuantaError::UnknownUnit(format!("no quantity named '{}'", quantity)))?;
        Ok(quantity.visible_units().cloned().collect())
    }

    /// Rescale a value expressed in `expression` along the unit's
    /// larger/smaller neighbors so its magnitude lands at or above 1 without
    /// overshooting into the next larger unit.
    ///
    /// Units without neighbors are returned unchanged.
    pub fn auto_scale(&self, value: f64, expression: &str) -> Result<(f64, String)> {
        let mut current = self.find_unit(expression)?;
        let mut value = value;
        if value == 0.0 || !value.is_finite() {
            return Ok((value, current.expression().to_string()));
        }

        for _ in 0..self.max_conversion_steps {
            let unit = current.unit();
            if let Some(larger) = unit.larger.as_deref().and_then(|l| self.neighbor(&current, l)) {
                let scaled = larger.unit().from_si(unit.to_si(value));
                if scaled.abs() >= 1.0 {
                    value = scaled;
                    current = larger;
                    continue;
                }
            }
            if value.abs() < 1.0 {
                if let Some(smaller) =
                    unit.smaller.as_deref().and_then(|s| self.neighbor(&current, s))
                {
                    value = smaller.unit().from_si(unit.to_si(value));
                    current = smaller;
                    continue;
                }
            }
            return Ok((value, current.expression().to_string()));
        }
        Err(QuantaError::InternalConsistency(format!(
            "auto-scaling '{}' did not settle",
            expression
        )))
    }

    /// A neighbor unit must live in the same quantity
    fn neighbor(&self, from: &UnitRef, expression: &str) -> Option<UnitRef> {
        from.quantity.unit_index(expression).map(|index| UnitRef {
            quantity: Arc::clone(&from.quantity),
            index,
        })
    }
}

impl fmt::Debug for QuantityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantityRegistry")
            .field("quantities", &self.len())
            .field("jit_registration", &self.jit_registration)
            .field("max_conversion_steps", &self.max_conversion_steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> QuantityRegistry {
        QuantityRegistry::builtin().unwrap()
    }

    #[test]
    fn test_find_by_dimension() {
        let reg = registry();
        assert_eq!(reg.find_by_dimension(DimensionVector::ENERGY).unwrap().name, "energy");
        assert!(reg
            .find_by_dimension(DimensionVector::from_exponents(5, 5, 5, 5).unwrap())
            .is_none());
    }

    #[test]
    fn test_find_by_name_follows_legacy() {
        let reg = registry();
        assert_eq!(reg.find_by_name("heat").unwrap().name, "energy");
        assert_eq!(reg.find_by_name("weight").unwrap().name, "mass");
        assert!(reg.find_by_name("mood").is_none());
    }

    #[test]
    fn test_find_unit_exact_and_name() {
        let reg = registry();
        assert_eq!(reg.find_unit("kg").unwrap().expression(), "kg");
        assert_eq!(reg.find_unit("kilogram").unwrap().expression(), "kg");
        assert_eq!(reg.find_unit("MMBtu").unwrap().expression(), "mmBtu");
        assert_eq!(reg.find_unit("bbl_oil").unwrap().expression(), "bbl");
    }

    #[test]
    fn test_find_unit_plural_and_case() {
        let reg = registry();
        assert_eq!(reg.find_unit("grams").unwrap().expression(), "g");
        assert_eq!(reg.find_unit("hrs").unwrap().expression(), "hr");
        assert_eq!(reg.find_unit("KWH").unwrap().expression(), "kWh");
        assert_eq!(reg.find_unit("Pounds").unwrap().expression(), "lb");
    }

    #[test]
    fn test_find_unit_ambiguous() {
        let err = registry().find_unit("ml").unwrap_err();
        match err {
            QuantaError::AmbiguousUnitMatch { token, candidates } => {
                assert_eq!(token, "ml");
                assert!(candidates.contains(&"mL".to_string()));
                assert!(candidates.contains(&"ML".to_string()));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_find_unit_unknown() {
        let err = registry().find_unit("furlong").unwrap_err();
        assert_eq!(err, QuantaError::UnknownUnit("furlong".to_string()));
        // a lone "s" is seconds, never the empty ratio unit
        assert_eq!(registry().find_unit("S").unwrap().expression(), "s");
    }

    #[test]
    fn test_register_derived_is_idempotent() {
        let reg = registry();
        let mass = reg.find_by_name("mass").unwrap();
        let time = reg.find_by_name("time").unwrap();
        let before = reg.len();

        let first = reg.register_derived(Quantity::derive(&mass, Some(&time)).unwrap()).unwrap();
        let second = reg.register_derived(Quantity::derive(&mass, Some(&time)).unwrap()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reg.len(), before + 1);
        assert_eq!(reg.find_unit("lb/hr").unwrap().quantity.name, "mass per time");
    }

    #[test]
    fn test_register_derived_respects_config() {
        let reg = registry().with_jit_registration(false);
        let mass = reg.find_by_name("mass").unwrap();
        let time = reg.find_by_name("time").unwrap();
        let err = reg.register_derived(Quantity::derive(&mass, Some(&time)).unwrap()).unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::UNKNOWN_UNIT);
    }

    #[test]
    fn test_rejects_shared_dimension() {
        let mut doc = DefinitionDocument::builtin();
        let mut copy = doc.quantities[1].clone();
        copy.name = "heft".to_string();
        doc.quantities.push(copy);
        let err = QuantityRegistry::from_definitions(&doc).unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::DEFINITION);
    }

    #[test]
    fn test_rejects_quantity_without_si_unit() {
        let mut doc = DefinitionDocument::builtin();
        doc.quantities[1].units.remove(0);
        assert!(QuantityRegistry::from_definitions(&doc).is_err());
    }

    #[test]
    fn test_auto_scale() {
        let reg = registry();
        let (value, unit) = reg.auto_scale(2500.0, "g").unwrap();
        assert!((value - 2.5).abs() < 1e-12);
        assert_eq!(unit, "kg");

        let (value, unit) = reg.auto_scale(0.002, "kg").unwrap();
        assert!((value - 2.0).abs() < 1e-9);
        assert_eq!(unit, "g");

        let (value, unit) = reg.auto_scale(90.0, "min").unwrap();
        assert!((value - 1.5).abs() < 1e-12);
        assert_eq!(unit, "hr");

        // no neighbors: unchanged
        assert_eq!(reg.auto_scale(12.0, "lb").unwrap(), (12.0, "lb".to_string()));
    }

    #[test]
    fn test_visible_units() {
        let reg = registry();
        let units = reg.visible_units("energy").unwrap();
        assert!(units.iter().any(|u| u.expression == "kWh"));
        assert!(!units.iter().any(|u| u.expression == "cal"));
        assert!(reg.visible_units("nothing").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig::default()
            .with_jit_registration(false)
            .with_max_conversion_steps(7);
        let reg = QuantityRegistry::from_config(&config).unwrap();
        assert!(!reg.jit_registration());
        assert_eq!(reg.max_conversion_steps(), 7);

        let missing = EngineConfig::default().with_definitions("/nonexistent/units.json");
        assert!(QuantityRegistry::from_config(&missing).is_err());
    }
}
