//! Quantity definition source
//!
//! A definition document lists the base quantities with their units plus a
//! legacy map of renamed quantity and unit names. It is read from JSON:
//!
//! ```json
//! {
//!   "quantities": [
//!     { "name": "mass", "symbol": "m", "dimension": [1, 0, 0, 0], "preferred": 0,
//!       "units": [ { "expression": "kg", "name": "kilogram", "slope": 1.0 } ] }
//!   ],
//!   "legacy": { "weight": "mass" }
//! }
//! ```
//!
//! [`DefinitionDocument::builtin`] supplies the quantities used when no file
//! is configured.

use crate::{DimensionVector, Unit};
use quanta_core::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One base quantity as written in a definition document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityDefinition {
    pub name: String,
    pub symbol: String,
    pub dimension: DimensionVector,
    #[serde(default)]
    pub preferred: usize,
    pub units: Vec<Unit>,
}

/// A full definition source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDocument {
    pub quantities: Vec<QuantityDefinition>,
    /// Old quantity or unit name -> current name
    #[serde(default)]
    pub legacy: BTreeMap<String, String>,
}

impl DefinitionDocument {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| QuantaError::Definition(format!("invalid definition JSON: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            QuantaError::Definition(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| QuantaError::Definition(format!("cannot serialize definitions: {}", e)))
    }

    /// The built-in quantities
    pub fn builtin() -> Self {
        let mut doc = DefinitionDocument::default();
        doc.register_ratio_units();
        doc.register_mass_units();
        doc.register_length_units();
        doc.register_time_units();
        doc.register_currency_units();
        doc.register_area_units();
        doc.register_volume_units();
        doc.register_energy_units();
        doc.register_power_units();
        doc.register_velocity_units();
        doc.register_density_units();
        doc.register_legacy_names();
        doc
    }

    fn quantity(
        &mut self,
        name: &str,
        symbol: &str,
        dimension: DimensionVector,
        preferred: usize,
        units: Vec<Unit>,
    ) {
        self.quantities.push(QuantityDefinition {
            name: name.to_string(),
            symbol: symbol.to_string(),
            dimension,
            preferred,
            units,
        });
    }

    fn register_ratio_units(&mut self) {
        self.quantity(
            "ratio",
            "r",
            DimensionVector::RATIO,
            0,
            vec![
                Unit::new("", "ratio", 1.0),
                Unit::new("%", "percent", 0.01),
                Unit::new("ppm", "part per million", 1e-6),
                Unit::new("ppb", "part per billion", 1e-9),
            ],
        );
    }

    fn register_mass_units(&mut self) {
        self.quantity(
            "mass",
            "m",
            DimensionVector::MASS,
            0,
            vec![
                Unit::new("kg", "kilogram", 1.0).with_neighbors(Some("g"), Some("tonne")),
                Unit::new("g", "gram", 0.001).with_neighbors(Some("mg"), Some("kg")),
                Unit::new("mg", "milligram", 1e-6).with_neighbors(None, Some("g")),
                Unit::new("tonne", "metric tonne", 1000.0).with_neighbors(Some("kg"), None),
                Unit::new("ton", "short ton", 907.18474),
                Unit::new("lb", "pound", 0.45359237),
                Unit::new("oz", "ounce", 0.028349523125),
            ],
        );
    }

    fn register_length_units(&mut self) {
        self.quantity(
            "length",
            "l",
            DimensionVector::LENGTH,
            0,
            vec![
                Unit::new("m", "meter", 1.0).with_neighbors(Some("mm"), Some("km")),
                Unit::new("km", "kilometer", 1000.0).with_neighbors(Some("m"), None),
                Unit::new("cm", "centimeter", 0.01),
                Unit::new("mm", "millimeter", 0.001).with_neighbors(None, Some("m")),
                Unit::new("mi", "mile", 1609.344),
                Unit::new("ft", "foot", 0.3048),
                Unit::new("in", "inch", 0.0254),
                Unit::new("yd", "yard", 0.9144),
            ],
        );
    }

    fn register_time_units(&mut self) {
        self.quantity(
            "time",
            "t",
            DimensionVector::TIME,
            0,
            vec![
                Unit::new("s", "second", 1.0).with_neighbors(None, Some("min")),
                Unit::new("min", "minute", 60.0).with_neighbors(Some("s"), Some("hr")),
                Unit::new("hr", "hour", 3600.0).with_neighbors(Some("min"), Some("day")),
                Unit::new("day", "day", 86_400.0).with_neighbors(Some("hr"), Some("yr")),
                // 365-day accounting year
                Unit::new("yr", "year", 31_536_000.0).with_neighbors(Some("day"), None),
            ],
        );
    }

    fn register_currency_units(&mut self) {
        self.quantity(
            "currency",
            "$",
            DimensionVector::CURRENCY,
            0,
            vec![
                Unit::new("$", "dollar", 1.0).with_neighbors(None, Some("k$")),
                Unit::new("cent", "cent", 0.01),
                Unit::new("k$", "thousand dollars", 1e3).with_neighbors(Some("$"), Some("M$")),
                Unit::new("M$", "million dollars", 1e6).with_neighbors(Some("k$"), None),
            ],
        );
    }

    fn register_area_units(&mut self) {
        self.quantity(
            "area",
            "a",
            DimensionVector::AREA,
            0,
            vec![
                Unit::new("m^2", "square meter", 1.0).with_neighbors(None, Some("ha")),
                Unit::new("km^2", "square kilometer", 1e6).with_neighbors(Some("ha"), None),
                Unit::new("ha", "hectare", 1e4).with_neighbors(Some("m^2"), Some("km^2")),
                Unit::new("acre", "acre", 4046.8564224),
                Unit::new("ft^2", "square foot", 0.09290304),
            ],
        );
    }

    fn register_volume_units(&mut self) {
        self.quantity(
            "volume",
            "v",
            DimensionVector::VOLUME,
            0,
            vec![
                Unit::new("m^3", "cubic meter", 1.0).with_neighbors(Some("L"), None),
                Unit::new("L", "liter", 0.001).with_neighbors(Some("mL"), Some("m^3")),
                Unit::new("mL", "milliliter", 1e-6).with_neighbors(None, Some("L")),
                Unit::new("ML", "megaliter", 1000.0),
                Unit::new("gal", "US gallon", 0.003785411784),
                Unit::new("bbl", "barrel", 0.158987294928),
                Unit::new("ft^3", "cubic foot", 0.028316846592),
            ],
        );
    }

    fn register_energy_units(&mut self) {
        self.quantity(
            "energy",
            "e",
            DimensionVector::ENERGY,
            2,
            vec![
                Unit::new("J", "joule", 1.0).with_neighbors(None, Some("kJ")),
                Unit::new("kJ", "kilojoule", 1e3).with_neighbors(Some("J"), Some("MJ")),
                Unit::new("MJ", "megajoule", 1e6).with_neighbors(Some("kJ"), Some("GJ")),
                Unit::new("GJ", "gigajoule", 1e9).with_neighbors(Some("MJ"), None),
                Unit::new("kWh", "kilowatt hour", 3.6e6),
                Unit::new("Btu", "British thermal unit", 1055.05585),
                Unit::new("mmBtu", "million Btu", 1055.05585e6),
                Unit::new("cal", "calorie", 4.184).hidden(),
                Unit::new("kcal", "kilocalorie", 4184.0),
            ],
        );
    }

    fn register_power_units(&mut self) {
        self.quantity(
            "power",
            "p",
            DimensionVector::POWER,
            0,
            vec![
                Unit::new("W", "watt", 1.0).with_neighbors(None, Some("kW")),
                Unit::new("kW", "kilowatt", 1e3).with_neighbors(Some("W"), Some("MW")),
                Unit::new("MW", "megawatt", 1e6).with_neighbors(Some("kW"), None),
                Unit::new("hp", "horsepower", 745.6998715822702),
            ],
        );
    }

    fn register_velocity_units(&mut self) {
        self.quantity(
            "velocity",
            "u",
            DimensionVector::VELOCITY,
            0,
            vec![
                Unit::new("m/s", "meter per second", 1.0),
                Unit::new("km/hr", "kilometer per hour", 1000.0 / 3600.0),
                Unit::new("mph", "mile per hour", 1609.344 / 3600.0),
            ],
        );
    }

    fn register_density_units(&mut self) {
        self.quantity(
            "density",
            "rho",
            DimensionVector::DENSITY,
            0,
            vec![
                Unit::new("kg/m^3", "kilogram per cubic meter", 1.0),
                Unit::new("g/L", "gram per liter", 1.0),
                Unit::new("lb/gal", "pound per gallon", 0.45359237 / 0.003785411784),
            ],
        );
    }

    fn register_legacy_names(&mut self) {
        for (old, new) in [
            ("heat", "energy"),
            ("distance", "length"),
            ("weight", "mass"),
            ("MMBtu", "mmBtu"),
            ("Kwh", "kWh"),
            ("bbl_oil", "bbl"),
        ] {
            self.legacy.insert(old.to_string(), new.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_core_quantities() {
        let doc = DefinitionDocument::builtin();
        for name in ["ratio", "mass", "length", "time", "currency", "energy", "volume"] {
            assert!(doc.quantities.iter().any(|q| q.name == name), "missing {}", name);
        }
        assert_eq!(doc.legacy.get("heat").map(String::as_str), Some("energy"));
    }

    #[test]
    fn test_every_builtin_quantity_has_si_unit() {
        for q in DefinitionDocument::builtin().quantities {
            assert!(q.units.iter().any(Unit::is_si), "{} has no SI unit", q.name);
            assert!(q.preferred < q.units.len());
        }
    }

    #[test]
    fn test_from_json_defaults() {
        let doc = DefinitionDocument::from_json_str(
            r#"{
                "quantities": [
                    { "name": "mass", "symbol": "m", "dimension": [1, 0, 0, 0],
                      "units": [
                        { "expression": "kg", "name": "kilogram", "slope": 1.0 },
                        { "expression": "g", "name": "gram", "slope": 0.001, "visible": false }
                      ] }
                ]
            }"#,
        )
        .unwrap();
        let mass = &doc.quantities[0];
        assert_eq!(mass.preferred, 0);
        assert_eq!(mass.dimension, DimensionVector::MASS);
        assert_eq!(mass.units[0].intercept, 0.0);
        assert!(mass.units[0].visible);
        assert!(!mass.units[1].visible);
        assert!(doc.legacy.is_empty());
    }

    #[test]
    fn test_from_json_rejects_bad_dimension() {
        let err = DefinitionDocument::from_json_str(
            r#"{ "quantities": [ { "name": "x", "symbol": "x", "dimension": [99, 0, 0, 0], "units": [] } ] }"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::DEFINITION);
    }

    #[test]
    fn test_builtin_survives_json() {
        let doc = DefinitionDocument::builtin();
        let text = doc.to_json_string().unwrap();
        let back = DefinitionDocument::from_json_str(&text).unwrap();
        assert_eq!(back.quantities.len(), doc.quantities.len());
        assert_eq!(back.legacy, doc.legacy);
        assert_eq!(back.quantities[1].units[1].expression, "g");
    }
}
