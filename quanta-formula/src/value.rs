//! Formula results: a quantity plus the unit tag carried for display

use quanta_core::Result;
use quanta_units::{filter_expression, format_expression, split_expression, QuantityRegistry, QuantityValue};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaValue {
    /// SI magnitude and dimension
    pub quantity: QuantityValue,
    /// Unit expression the value is shown in; empty when none was carried
    pub tag: String,
}

impl FormulaValue {
    pub fn new(quantity: QuantityValue, tag: impl Into<String>) -> Self {
        FormulaValue {
            quantity,
            tag: tag.into(),
        }
    }

    pub fn untagged(quantity: QuantityValue) -> Self {
        Self::new(quantity, String::new())
    }

    /// 1 for true, 0 for false
    pub fn boolean(value: bool) -> Self {
        Self::untagged(QuantityValue::ratio(if value { 1.0 } else { 0.0 }))
    }

    /// Anything but an exact zero is true
    pub fn is_truthy(&self) -> bool {
        self.quantity.magnitude != 0.0
    }

    /// The value in its tag, with the unit it ended up in.
    ///
    /// An empty tag, or one whose dimension no longer matches the value,
    /// falls back to the SI unit of the value's quantity.
    pub fn value_in_tag(&self, registry: &QuantityRegistry) -> Result<(f64, String)> {
        if !self.tag.is_empty() {
            let filtered = filter_expression(registry, &self.tag)?;
            if filtered.dimension == self.quantity.dimension {
                return Ok((filtered.from_si(self.quantity.magnitude), filtered.user_expression));
            }
        }
        let unit = registry
            .find_by_dimension(self.quantity.dimension)
            .and_then(|q| q.si_unit().map(|u| u.expression.clone()))
            .unwrap_or_else(|| self.quantity.dimension.to_string());
        Ok((self.quantity.magnitude, unit))
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}", self.quantity)
        } else {
            write!(f, "{} (SI) {{{}}}", self.quantity, self.tag)
        }
    }
}

/// Tag of a sum or difference: the left tag, or the right one when the left
/// is empty
pub(crate) fn additive_tag(left: &str, right: &str) -> String {
    if left.is_empty() {
        right.to_string()
    } else {
        left.to_string()
    }
}

/// Tag of a product (`sign = 1`) or quotient (`sign = -1`)
pub(crate) fn multiplicative_tag(left: &str, right: &str, sign: i32) -> String {
    let (Ok(mut tokens), Ok(right)) = (split_expression(left), split_expression(right)) else {
        return String::new();
    };
    tokens.extend(right.into_iter().map(|(t, e)| (t, e * sign)));
    format_expression(&tokens)
}
