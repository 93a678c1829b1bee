//! Quantity type - a named physical type with its interchangeable units

use crate::unit::combine_expressions;
use crate::{DimensionVector, Unit};
use quanta_core::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a quantity came to exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QuantityKind {
    /// Loaded from a definition source
    Base,
    /// Synthesized from a numerator and an optional denominator quantity
    Derived {
        numerator: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        denominator: Option<String>,
    },
}

/// A named physical quantity (e.g. "energy") with an ordered set of units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub name: String,
    pub symbol: String,
    pub dimension: DimensionVector,
    pub units: Vec<Unit>,
    /// Index into `units` of the preferred display unit
    pub preferred: usize,
    pub kind: QuantityKind,
}

impl Quantity {
    /// Create a base quantity, validating its unit list
    pub fn base(
        name: &str,
        symbol: &str,
        dimension: DimensionVector,
        units: Vec<Unit>,
        preferred: usize,
    ) -> Result<Self> {
        let quantity = Quantity {
            name: name.to_string(),
            symbol: symbol.to_string(),
            dimension,
            units,
            preferred,
            kind: QuantityKind::Base,
        };
        quantity.validate()?;
        Ok(quantity)
    }

    fn validate(&self) -> Result<()> {
        if self.units.is_empty() {
            return Err(QuantaError::Definition(format!("quantity '{}' has no units", self.name)));
        }
        if self.preferred >= self.units.len() {
            return Err(QuantaError::Definition(format!(
                "quantity '{}' prefers unit #{} but has {} units",
                self.name,
                self.preferred,
                self.units.len()
            )));
        }
        if self.si_index().is_none() {
            return Err(QuantaError::Definition(format!(
                "quantity '{}' has no SI unit (slope 1, intercept 0)",
                self.name
            )));
        }
        for (i, unit) in self.units.iter().enumerate() {
            if unit.slope == 0.0 || !unit.slope.is_finite() || !unit.intercept.is_finite() {
                return Err(QuantaError::Definition(format!(
                    "unit '{}' of '{}' has an unusable conversion",
                    unit.expression, self.name
                )));
            }
            if self.units[..i].iter().any(|u| u.expression == unit.expression) {
                return Err(QuantaError::Definition(format!(
                    "unit expression '{}' listed twice in '{}'",
                    unit.expression, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, QuantityKind::Derived { .. })
    }

    /// Index of the first SI unit
    pub fn si_index(&self) -> Option<usize> {
        self.units.iter().position(Unit::is_si)
    }

    /// The SI unit. Every registered quantity has one.
    pub fn si_unit(&self) -> Option<&Unit> {
        self.si_index().map(|i| &self.units[i])
    }

    pub fn preferred_unit(&self) -> &Unit {
        &self.units[self.preferred]
    }

    pub fn unit_index(&self, expression: &str) -> Option<usize> {
        self.units.iter().position(|u| u.expression == expression)
    }

    /// Units offered in pickers
    pub fn visible_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| u.visible)
    }

    /// Raise a quantity to an integer power; every unit is raised with it.
    ///
    /// The result is not registered; it only serves as a parent while
    /// synthesizing a derived quantity.
    pub fn power(&self, exp: i32) -> Result<Quantity> {
        if exp == 1 {
            return Ok(self.clone());
        }
        Ok(Quantity {
            name: format!("{}^{}", self.name, exp),
            symbol: combine_expressions(&[(&self.symbol, exp)]),
            dimension: self.dimension.times(exp)?,
            units: self.units.iter().map(|u| u.power(exp)).collect(),
            preferred: self.preferred,
            kind: QuantityKind::Derived {
                numerator: self.name.clone(),
                denominator: None,
            },
        })
    }

    /// Cross product of two quantities (e.g. mass and length)
    pub fn product(&self, other: &Quantity) -> Result<Quantity> {
        let mut units = Vec::with_capacity(self.units.len() * other.units.len());
        for a in &self.units {
            for b in &other.units {
                units.push(a.multiply(b));
            }
        }
        let mut quantity = Quantity {
            name: format!("{}-{}", self.name, other.name),
            symbol: format!("{}*{}", self.symbol, other.symbol),
            dimension: self.dimension.plus(other.dimension)?,
            units,
            preferred: self.preferred * other.units.len() + other.preferred,
            kind: QuantityKind::Derived {
                numerator: self.name.clone(),
                denominator: None,
            },
        };
        dedup_units(&mut quantity);
        Ok(quantity)
    }

    /// Build a derived quantity `numerator / denominator`.
    ///
    /// The unit list is the full cross product of the parents' units, each
    /// with the combined conversion factor. Without a denominator the
    /// numerator's units are taken as they are.
    pub fn derive(numerator: &Quantity, denominator: Option<&Quantity>) -> Result<Quantity> {
        let Some(denominator) = denominator else {
            return Ok(Quantity {
                kind: QuantityKind::Derived {
                    numerator: numerator.name.clone(),
                    denominator: None,
                },
                ..numerator.clone()
            });
        };

        let mut units = Vec::with_capacity(numerator.units.len() * denominator.units.len());
        for a in &numerator.units {
            for b in &denominator.units {
                units.push(a.divide(b));
            }
        }

        let mut quantity = Quantity {
            name: format!("{} per {}", numerator.name, denominator.name),
            symbol: format!("{}/{}", numerator.symbol, denominator.symbol),
            dimension: numerator.dimension.minus(denominator.dimension)?,
            units,
            preferred: numerator.preferred * denominator.units.len() + denominator.preferred,
            kind: QuantityKind::Derived {
                numerator: numerator.name.clone(),
                denominator: Some(denominator.name.clone()),
            },
        };
        dedup_units(&mut quantity);
        Ok(quantity)
    }
}

/// Crossing "ratio" units can produce the same expression twice (`1/s`).
/// Keep the first occurrence and move the preferred index along with it.
fn dedup_units(quantity: &mut Quantity) {
    let preferred = quantity.units[quantity.preferred].expression.clone();
    let mut seen: Vec<String> = Vec::with_capacity(quantity.units.len());
    quantity.units.retain(|u| {
        if seen.contains(&u.expression) {
            false
        } else {
            seen.push(u.expression.clone());
            true
        }
    });
    quantity.preferred = quantity.unit_index(&preferred).unwrap_or(0);
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.dimension)
    }
}
