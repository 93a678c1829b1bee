//! Unit representation with affine SI conversion

use quanta_core::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete scale for a quantity (e.g. joule, Btu)
///
/// `si = value * slope + intercept`. A unit belongs to exactly one
/// [`Quantity`](crate::Quantity), which owns its dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// The unit expression (e.g. "kg", "mi", "J/kg")
    pub expression: String,
    /// The display name (e.g. "kilogram")
    pub name: String,
    /// Factor applied before the intercept when converting to SI
    pub slope: f64,
    /// Offset for non-proportional units
    #[serde(default)]
    pub intercept: f64,
    /// Expression of the next larger unit, for auto-scaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub larger: Option<String>,
    /// Expression of the next smaller unit, for auto-scaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smaller: Option<String>,
    /// Whether the unit is offered in unit pickers
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

impl Unit {
    /// Create a unit with proportional conversion (no offset)
    pub fn new(expression: &str, name: &str, slope: f64) -> Self {
        Unit {
            expression: expression.to_string(),
            name: name.to_string(),
            slope,
            intercept: 0.0,
            larger: None,
            smaller: None,
            visible: true,
        }
    }

    /// Create a unit with an offset
    pub fn with_offset(expression: &str, name: &str, slope: f64, intercept: f64) -> Self {
        Unit {
            intercept,
            ..Unit::new(expression, name, slope)
        }
    }

    /// Builder: set auto-scaling neighbors
    pub fn with_neighbors(mut self, smaller: Option<&str>, larger: Option<&str>) -> Self {
        self.smaller = smaller.map(str::to_string);
        self.larger = larger.map(str::to_string);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Check if this is the SI unit of its quantity
    pub fn is_si(&self) -> bool {
        self.slope == 1.0 && self.intercept == 0.0
    }

    /// Check if this unit has an offset (non-proportional conversion)
    pub fn has_offset(&self) -> bool {
        self.intercept != 0.0
    }

    /// Convert a value from this unit to SI
    pub fn to_si(&self, value: f64) -> f64 {
        value * self.slope + self.intercept
    }

    /// Convert a value from SI to this unit
    pub fn from_si(&self, value_si: f64) -> f64 {
        (value_si - self.intercept) / self.slope
    }

    /// Raise unit to a power (e.g. m^2). Offsets do not survive powers.
    pub fn power(&self, exp: i32) -> Unit {
        if exp == 1 {
            return self.clone();
        }
        let expression = combine_expressions(&[(&self.expression, exp)]);
        Unit {
            name: format!("{}^{}", self.name, exp),
            slope: self.slope.powi(exp),
            intercept: 0.0,
            larger: None,
            smaller: None,
            visible: self.visible,
            expression,
        }
    }

    /// Multiply two units (e.g. kg * mi)
    pub fn multiply(&self, other: &Unit) -> Unit {
        Unit {
            expression: combine_expressions(&[(&self.expression, 1), (&other.expression, 1)]),
            name: format!("{} {}", self.name, other.name),
            slope: self.slope * other.slope,
            intercept: 0.0,
            larger: self
                .larger
                .as_ref()
                .map(|l| combine_expressions(&[(l, 1), (&other.expression, 1)])),
            smaller: self
                .smaller
                .as_ref()
                .map(|s| combine_expressions(&[(s, 1), (&other.expression, 1)])),
            visible: self.visible && other.visible,
        }
    }

    /// Divide two units (e.g. J / kg)
    pub fn divide(&self, other: &Unit) -> Unit {
        Unit {
            expression: combine_expressions(&[(&self.expression, 1), (&other.expression, -1)]),
            name: format!("{} per {}", self.name, other.name),
            slope: self.slope / other.slope,
            intercept: 0.0,
            larger: self
                .larger
                .as_ref()
                .map(|l| combine_expressions(&[(l, 1), (&other.expression, -1)])),
            smaller: self
                .smaller
                .as_ref()
                .map(|s| combine_expressions(&[(s, 1), (&other.expression, -1)])),
            visible: self.visible && other.visible,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Split a unit expression textually into `(token, exponent)` pairs.
///
/// `kg*m^2/s^2` becomes `[("kg", 1), ("m", 2), ("s", -2)]`. The token `1`
/// and empty sides are neutral. No registry lookup happens here.
pub fn split_expression(expr: &str) -> Result<Vec<(String, i32)>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(Vec::new());
    }

    let mut sides = expr.split('/');
    let numerator = sides.next().unwrap_or_default();
    let denominator = sides.next();
    if sides.next().is_some() {
        return Err(QuantaError::parse(format!("more than one '/' in unit expression: {}", expr)));
    }

    let mut tokens = Vec::new();
    split_side(expr, numerator, 1, denominator.is_some(), &mut tokens)?;
    if let Some(denominator) = denominator {
        if denominator.trim().is_empty() {
            return Err(QuantaError::parse(format!("empty denominator in unit expression: {}", expr)));
        }
        split_side(expr, denominator, -1, false, &mut tokens)?;
    }
    Ok(tokens)
}

fn split_side(
    expr: &str,
    side: &str,
    sign: i32,
    allow_empty: bool,
    tokens: &mut Vec<(String, i32)>,
) -> Result<()> {
    if side.trim().is_empty() && allow_empty {
        return Ok(());
    }

    for token in side.split('*') {
        let token = token.trim();
        if token.is_empty() {
            return Err(QuantaError::parse(format!("empty unit token in: {}", expr)));
        }

        let (base, exponent) = match token.split_once('^') {
            Some((base, exp)) => {
                let exponent: i32 = exp.trim().parse().map_err(|_| {
                    QuantaError::parse(format!("invalid exponent '{}' in: {}", exp, expr))
                })?;
                (base.trim(), exponent)
            }
            None => (token, 1),
        };

        if base.is_empty() {
            return Err(QuantaError::parse(format!("missing unit before '^' in: {}", expr)));
        }
        if base == "1" {
            continue;
        }
        tokens.push((base.to_string(), exponent * sign));
    }
    Ok(())
}

/// Format `(token, exponent)` pairs, numerator first: `kg^2*mi/hr`.
///
/// Repeated tokens are combined, zero exponents vanish and an expression
/// with only denominator tokens is written `1/...`.
pub fn format_expression(tokens: &[(String, i32)]) -> String {
    let mut combined: Vec<(String, i32)> = Vec::new();
    for (token, exponent) in tokens {
        match combined.iter_mut().find(|(t, _)| t == token) {
            Some(entry) => entry.1 += exponent,
            None => combined.push((token.clone(), *exponent)),
        }
    }

    let render = |token: &str, exponent: i32| {
        if exponent == 1 {
            token.to_string()
        } else {
            format!("{}^{}", token, exponent)
        }
    };

    let numerator: Vec<String> = combined
        .iter()
        .filter(|(_, e)| *e > 0)
        .map(|(t, e)| render(t, *e))
        .collect();
    let denominator: Vec<String> = combined
        .iter()
        .filter(|(_, e)| *e < 0)
        .map(|(t, e)| render(t, -e))
        .collect();

    match (numerator.is_empty(), denominator.is_empty()) {
        (true, true) => String::new(),
        (false, true) => numerator.join("*"),
        (true, false) => format!("1/{}", denominator.join("*")),
        (false, false) => format!("{}/{}", numerator.join("*"), denominator.join("*")),
    }
}

/// Combine already-valid unit expressions raised to exponents
pub(crate) fn combine_expressions(parts: &[(&str, i32)]) -> String {
    let mut tokens = Vec::new();
    for (expr, exp) in parts {
        // Registered expressions were validated on load; a malformed one is
        // kept verbatim rather than dropped.
        match split_expression(expr) {
            Ok(split) => tokens.extend(split.into_iter().map(|(t, e)| (t, e * exp))),
            Err(_) => tokens.push((expr.to_string(), *exp)),
        }
    }
    format_expression(&tokens)
}
