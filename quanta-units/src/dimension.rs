//! Dimensional analysis types
//!
//! Each physical quantity has dimensions represented as exponents of four
//! base axes: [mass, length, time, currency]. The exponents are packed into a
//! single `u32`, five two's-complement bits per axis, so a vector is `Copy`,
//! hashable and compared with a single integer comparison. The packing never
//! leaves this module.

use quanta_core::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest representable exponent
pub const MIN_EXPONENT: i32 = -16;
/// Largest representable exponent
pub const MAX_EXPONENT: i32 = 15;

const FIELD_BITS: u32 = 5;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;
const AXES: [&str; 4] = ["mass", "length", "time", "currency"];

/// Exponents of mass, length, time and currency
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct DimensionVector {
    packed: u32,
}

const fn pack(exponents: [i32; 4]) -> u32 {
    let mut packed = 0u32;
    let mut axis = 0;
    while axis < 4 {
        packed |= ((exponents[axis] as u32) & FIELD_MASK) << (axis as u32 * FIELD_BITS);
        axis += 1;
    }
    packed
}

impl DimensionVector {
    /// Dimensionless ratio (all exponents zero). Identity of `plus`.
    pub const RATIO: DimensionVector = DimensionVector { packed: 0 };

    pub const MASS: DimensionVector = DimensionVector { packed: pack([1, 0, 0, 0]) };
    pub const LENGTH: DimensionVector = DimensionVector { packed: pack([0, 1, 0, 0]) };
    pub const TIME: DimensionVector = DimensionVector { packed: pack([0, 0, 1, 0]) };
    pub const CURRENCY: DimensionVector = DimensionVector { packed: pack([0, 0, 0, 1]) };

    /// Area [L^2]
    pub const AREA: DimensionVector = DimensionVector { packed: pack([0, 2, 0, 0]) };
    /// Volume [L^3]
    pub const VOLUME: DimensionVector = DimensionVector { packed: pack([0, 3, 0, 0]) };
    /// Velocity [L T^-1]
    pub const VELOCITY: DimensionVector = DimensionVector { packed: pack([0, 1, -1, 0]) };
    /// Energy [M L^2 T^-2]
    pub const ENERGY: DimensionVector = DimensionVector { packed: pack([1, 2, -2, 0]) };
    /// Power [M L^2 T^-3]
    pub const POWER: DimensionVector = DimensionVector { packed: pack([1, 2, -3, 0]) };
    /// Density [M L^-3]
    pub const DENSITY: DimensionVector = DimensionVector { packed: pack([1, -3, 0, 0]) };

    /// Create a dimension from exponents.
    ///
    /// Fails with `RangeOverflow` if any exponent is outside [-16, 15].
    pub fn from_exponents(mass: i32, length: i32, time: i32, currency: i32) -> Result<Self> {
        Self::from_array([mass, length, time, currency])
    }

    fn from_array(exponents: [i32; 4]) -> Result<Self> {
        for (axis, &exponent) in exponents.iter().enumerate() {
            if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
                return Err(QuantaError::RangeOverflow { axis: AXES[axis], exponent });
            }
        }
        Ok(DimensionVector { packed: pack(exponents) })
    }

    fn field(&self, axis: usize) -> i32 {
        let raw = (self.packed >> (axis as u32 * FIELD_BITS)) & FIELD_MASK;
        // sign-extend the 5-bit field
        ((raw << (32 - FIELD_BITS)) as i32) >> (32 - FIELD_BITS)
    }

    pub fn mass(&self) -> i32 {
        self.field(0)
    }

    pub fn length(&self) -> i32 {
        self.field(1)
    }

    pub fn time(&self) -> i32 {
        self.field(2)
    }

    pub fn currency(&self) -> i32 {
        self.field(3)
    }

    /// [mass, length, time, currency]
    pub fn exponents(&self) -> [i32; 4] {
        [self.field(0), self.field(1), self.field(2), self.field(3)]
    }

    /// Check if this is a dimensionless quantity
    pub fn is_ratio(&self) -> bool {
        self.packed == 0
    }

    /// Reciprocal: negate every exponent
    pub fn flip(self) -> Result<Self> {
        let e = self.exponents();
        Self::from_array([-e[0], -e[1], -e[2], -e[3]])
    }

    /// Quantity multiplication: add exponents field-wise
    pub fn plus(self, other: Self) -> Result<Self> {
        let a = self.exponents();
        let b = other.exponents();
        Self::from_array([a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]])
    }

    /// Quantity division: `plus(self, flip(other))`
    pub fn minus(self, other: Self) -> Result<Self> {
        let a = self.exponents();
        let b = other.exponents();
        // Not routed through flip(): flip(-16) overflows even when the
        // difference itself is representable.
        Self::from_array([a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]])
    }

    /// Integer power: repeat `plus` (k > 0) or `minus` (k < 0) |k| times
    pub fn times(self, k: i32) -> Result<Self> {
        let mut result = Self::RATIO;
        for _ in 0..k.unsigned_abs() {
            result = if k > 0 { result.plus(self)? } else { result.minus(self)? };
        }
        Ok(result)
    }

    /// Get the dimension name if it matches a common dimension
    pub fn name(&self) -> Option<&'static str> {
        match self.exponents() {
            [0, 0, 0, 0] => Some("ratio"),
            [1, 0, 0, 0] => Some("mass"),
            [0, 1, 0, 0] => Some("length"),
            [0, 0, 1, 0] => Some("time"),
            [0, 0, 0, 1] => Some("currency"),
            [0, 2, 0, 0] => Some("area"),
            [0, 3, 0, 0] => Some("volume"),
            [0, 1, -1, 0] => Some("velocity"),
            [1, 2, -2, 0] => Some("energy"),
            [1, 2, -3, 0] => Some("power"),
            [1, -3, 0, 0] => Some("density"),
            [0, 0, -1, 0] => Some("frequency"),
            _ => None,
        }
    }
}

impl fmt::Display for DimensionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = ["M", "L", "T", "$"];
        let mut parts = Vec::new();

        for (i, exp) in self.exponents().into_iter().enumerate() {
            if exp != 0 {
                if exp == 1 {
                    parts.push(names[i].to_string());
                } else {
                    parts.push(format!("{}^{}", names[i], exp));
                }
            }
        }

        if parts.is_empty() {
            write!(f, "1")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

impl fmt::Debug for DimensionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DimensionVector({})", self)
    }
}

impl Default for DimensionVector {
    fn default() -> Self {
        Self::RATIO
    }
}

impl From<DimensionVector> for [i32; 4] {
    fn from(dim: DimensionVector) -> Self {
        dim.exponents()
    }
}

impl TryFrom<[i32; 4]> for DimensionVector {
    type Error = QuantaError;

    fn try_from(exponents: [i32; 4]) -> Result<Self> {
        Self::from_array(exponents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(m: i32, l: i32, t: i32, c: i32) -> DimensionVector {
        DimensionVector::from_exponents(m, l, t, c).unwrap()
    }

    #[test]
    fn test_decode_recovers_every_exponent() {
        for m in MIN_EXPONENT..=MAX_EXPONENT {
            for l in [-16, -3, 0, 7, 15] {
                for t in [-16, -1, 0, 1, 15] {
                    for c in [-16, 0, 15] {
                        let v = dim(m, l, t, c);
                        assert_eq!(v.exponents(), [m, l, t, c]);
                        assert_eq!((v.mass(), v.length(), v.time(), v.currency()), (m, l, t, c));
                    }
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_exponent() {
        let err = DimensionVector::from_exponents(0, 16, 0, 0).unwrap_err();
        assert_eq!(err, QuantaError::RangeOverflow { axis: "length", exponent: 16 });
        assert!(DimensionVector::from_exponents(-17, 0, 0, 0).is_err());
    }

    #[test]
    fn test_group_laws() {
        let samples = [
            DimensionVector::RATIO,
            DimensionVector::ENERGY,
            DimensionVector::VELOCITY,
            dim(3, -2, 5, -1),
            dim(-4, 1, 0, 2),
        ];
        for a in samples {
            assert_eq!(a.plus(DimensionVector::RATIO).unwrap(), a);
            assert_eq!(a.flip().unwrap().flip().unwrap(), a);
            assert_eq!(a.plus(a.flip().unwrap()).unwrap(), DimensionVector::RATIO);
            for b in samples {
                assert_eq!(a.plus(b).unwrap().minus(b).unwrap(), a);
                assert_eq!(a.plus(b).unwrap(), b.plus(a).unwrap());
                assert_eq!(a.minus(b).unwrap(), a.plus(b.flip().unwrap()).unwrap());
            }
        }
    }

    #[test]
    fn test_derived_dimensions() {
        let velocity = DimensionVector::LENGTH.minus(DimensionVector::TIME).unwrap();
        assert_eq!(velocity, DimensionVector::VELOCITY);

        let energy = DimensionVector::MASS
            .plus(DimensionVector::VELOCITY.times(2).unwrap())
            .unwrap();
        assert_eq!(energy, DimensionVector::ENERGY);
        assert_eq!(DimensionVector::LENGTH.times(3).unwrap(), DimensionVector::VOLUME);
    }

    #[test]
    fn test_times() {
        let a = dim(1, -2, 0, 1);
        assert_eq!(a.times(0).unwrap(), DimensionVector::RATIO);
        assert_eq!(a.times(1).unwrap(), a);
        assert_eq!(a.times(-1).unwrap(), a.flip().unwrap());
        assert_eq!(a.times(3).unwrap().exponents(), [3, -6, 0, 3]);
    }

    #[test]
    fn test_overflow_fails_fast() {
        let big = dim(15, 0, 0, 0);
        assert!(big.plus(DimensionVector::MASS).is_err());
        assert!(dim(-16, 0, 0, 0).flip().is_err());
        assert!(DimensionVector::LENGTH.times(16).is_err());
        // representable difference even though flip(-16) is not
        assert_eq!(dim(-1, 0, 0, 0).minus(dim(-16, 0, 0, 0)).unwrap().mass(), 15);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DimensionVector::RATIO), "1");
        assert_eq!(format!("{}", DimensionVector::LENGTH), "L");
        assert_eq!(format!("{}", DimensionVector::ENERGY), "M L^2 T^-2");
        assert_eq!(format!("{}", DimensionVector::CURRENCY), "$");
    }

    #[test]
    fn test_names() {
        assert_eq!(DimensionVector::ENERGY.name(), Some("energy"));
        assert_eq!(DimensionVector::RATIO.name(), Some("ratio"));
        assert_eq!(dim(2, 2, 2, 2).name(), None);
    }

    #[test]
    fn test_serde_as_exponents() {
        let json = serde_json::to_string(&DimensionVector::ENERGY).unwrap();
        assert_eq!(json, "[1,2,-2,0]");
        let back: DimensionVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DimensionVector::ENERGY);
        assert!(serde_json::from_str::<DimensionVector>("[40,0,0,0]").is_err());
    }
}
