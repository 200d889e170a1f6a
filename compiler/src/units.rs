// units.rs — Physical unit registry and dimension algebra
//
// Units attach to numeric types and literals. Each unit carries a dimension
// vector and a scale relative to the base unit of that dimension. Time is
// based on nanoseconds so that `timespan` values need no further scaling.
//
// Preconditions: none.
// Postconditions: `lookup` returns a fresh `Unit` for every registered name.
// Failure modes: unknown unit names yield `None`.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exponents over (length, mass, time, current, temperature, amount, luminosity).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions(pub [i8; 7]);

impl Dimensions {
    pub const NONE: Dimensions = Dimensions([0; 7]);
    pub const LENGTH: Dimensions = Dimensions([1, 0, 0, 0, 0, 0, 0]);
    pub const MASS: Dimensions = Dimensions([0, 1, 0, 0, 0, 0, 0]);
    pub const TIME: Dimensions = Dimensions([0, 0, 1, 0, 0, 0, 0]);
    pub const CURRENT: Dimensions = Dimensions([0, 0, 0, 1, 0, 0, 0]);
    pub const FREQUENCY: Dimensions = Dimensions([0, 0, -1, 0, 0, 0, 0]);
    pub const FORCE: Dimensions = Dimensions([1, 1, -2, 0, 0, 0, 0]);
    pub const PRESSURE: Dimensions = Dimensions([-1, 1, -2, 0, 0, 0, 0]);
    pub const VOLTAGE: Dimensions = Dimensions([2, 1, -3, -1, 0, 0, 0]);

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::NONE
    }

    pub fn mul(self, other: Dimensions) -> Dimensions {
        let mut out = self.0;
        for (o, b) in out.iter_mut().zip(other.0) {
            *o += b;
        }
        Dimensions(out)
    }

    pub fn div(self, other: Dimensions) -> Dimensions {
        let mut out = self.0;
        for (o, b) in out.iter_mut().zip(other.0) {
            *o -= b;
        }
        Dimensions(out)
    }

    pub fn pow(self, exp: i32) -> Dimensions {
        let mut out = self.0;
        for o in out.iter_mut() {
            *o = (*o as i32 * exp) as i8;
        }
        Dimensions(out)
    }
}

/// A named physical unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub dimensions: Dimensions,
    pub scale: f64,
}

impl Unit {
    fn new(name: &str, dimensions: Dimensions, scale: f64) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            scale,
        }
    }

    /// Nanoseconds, the unit every `timespan` value is expressed in.
    pub fn nanoseconds() -> Self {
        Self::new("ns", Dimensions::TIME, 1.0)
    }

    pub fn product(&self, other: &Unit) -> Unit {
        Unit {
            name: format!("{}*{}", self.name, other.name),
            dimensions: self.dimensions.mul(other.dimensions),
            scale: self.scale * other.scale,
        }
    }

    pub fn quotient(&self, other: &Unit) -> Unit {
        Unit {
            name: format!("{}/{}", self.name, other.name),
            dimensions: self.dimensions.div(other.dimensions),
            scale: self.scale / other.scale,
        }
    }

    pub fn powi(&self, exp: i32) -> Unit {
        Unit {
            name: format!("{}^{}", self.name, exp),
            dimensions: self.dimensions.pow(exp),
            scale: self.scale.powi(exp),
        }
    }

    pub fn same_dimensions(&self, other: &Unit) -> bool {
        self.dimensions == other.dimensions
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Resolve a unit suffix (`ms`, `psi`, `khz`, ...) to its definition.
pub fn lookup(name: &str) -> Option<Unit> {
    let (dims, scale) = match name {
        // time, nanosecond based
        "ns" => (Dimensions::TIME, 1.0),
        "us" => (Dimensions::TIME, 1e3),
        "ms" => (Dimensions::TIME, 1e6),
        "s" => (Dimensions::TIME, 1e9),
        "min" => (Dimensions::TIME, 60e9),
        "h" => (Dimensions::TIME, 3600e9),
        "hz" => (Dimensions::FREQUENCY, 1.0),
        "khz" => (Dimensions::FREQUENCY, 1e3),
        "mhz" => (Dimensions::FREQUENCY, 1e6),
        "mm" => (Dimensions::LENGTH, 1e-3),
        "cm" => (Dimensions::LENGTH, 1e-2),
        "m" => (Dimensions::LENGTH, 1.0),
        "km" => (Dimensions::LENGTH, 1e3),
        "g" => (Dimensions::MASS, 1e-3),
        "kg" => (Dimensions::MASS, 1.0),
        "pa" => (Dimensions::PRESSURE, 1.0),
        "kpa" => (Dimensions::PRESSURE, 1e3),
        "psi" => (Dimensions::PRESSURE, 6894.757293168361),
        "bar" => (Dimensions::PRESSURE, 1e5),
        "atm" => (Dimensions::PRESSURE, 101_325.0),
        "mv" => (Dimensions::VOLTAGE, 1e-3),
        "v" => (Dimensions::VOLTAGE, 1.0),
        "ma" => (Dimensions::CURRENT, 1e-3),
        "a" => (Dimensions::CURRENT, 1.0),
        "n" => (Dimensions::FORCE, 1.0),
        _ => return None,
    };
    Some(Unit::new(name, dims, scale))
}

/// Factor converting a value in `from` into `to`. `None` when the two units
/// measure different quantities.
pub fn scale_factor(from: &Unit, to: &Unit) -> Option<f64> {
    if !from.same_dimensions(to) {
        return None;
    }
    Some(from.scale / to.scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_and_unknown() {
        let ms = lookup("ms").unwrap();
        assert_eq!(ms.dimensions, Dimensions::TIME);
        assert_eq!(ms.scale, 1e6);
        assert!(lookup("furlong").is_none());
    }

    #[test]
    fn scale_between_time_units() {
        let ms = lookup("ms").unwrap();
        assert_eq!(scale_factor(&ms, &Unit::nanoseconds()), Some(1e6));
        let s = lookup("s").unwrap();
        assert_eq!(scale_factor(&s, &ms), Some(1e3));
    }

    #[test]
    fn scale_across_dimensions_is_none() {
        let m = lookup("m").unwrap();
        let s = lookup("s").unwrap();
        assert_eq!(scale_factor(&m, &s), None);
    }

    #[test]
    fn algebra_combines_dimensions() {
        let m = lookup("m").unwrap();
        let s = lookup("s").unwrap();
        let velocity = m.quotient(&s);
        assert_eq!(velocity.dimensions, Dimensions([1, 0, -1, 0, 0, 0, 0]));
        let area = m.powi(2);
        assert_eq!(area.dimensions, Dimensions([2, 0, 0, 0, 0, 0, 0]));
        assert!(m.product(&s).quotient(&s).same_dimensions(&m));
    }
}
