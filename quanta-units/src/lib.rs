//! Quanta Units - Dimensions, Quantities and Unit Conversion
//!
//! Provides the unit algebra under every numeric value:
//! - `DimensionVector`: packed exponents of mass, length, time and currency
//! - `Unit` / `Quantity`: affine SI conversions grouped by physical quantity
//! - `QuantityRegistry`: lookup by dimension, name or unit token, growing
//!   derived quantities on demand
//! - `filter_expression`: normalization of free-form unit expressions
//! - `QuantityValue`: SI magnitudes with dimension-checked arithmetic
//!
//! Built-in quantities:
//! - Ratio ("", %, ppm, ppb)
//! - Mass (kg, g, tonne, lb, etc.)
//! - Length (m, km, mi, ft, etc.)
//! - Time (s, min, hr, day, yr)
//! - Currency ($, cent, k$, M$)
//! - Area, Volume, Energy, Power, Velocity, Density

mod convert;
mod definitions;
mod dimension;
mod parse;
mod quantity;
mod registry;
mod unit;
mod value;

pub use convert::{
    convert, convert_from_si_to_specific, convert_from_specific_to_si, ConversionPlan,
    ConversionStep,
};
pub use definitions::{DefinitionDocument, QuantityDefinition};
pub use dimension::{DimensionVector, MAX_EXPONENT, MIN_EXPONENT};
pub use parse::{factors_dimension, filter_expression, parse_expression, FilteredExpression, ParsedFactor};
pub use quantity::{Quantity, QuantityKind};
pub use registry::{QuantityRegistry, UnitRef};
pub use unit::{format_expression, split_expression, Unit};
pub use value::{diagnostics_enabled, set_diagnostics, QuantityValue};
