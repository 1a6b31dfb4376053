use nalgebra::Vector3;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ORTHOGONALITY_TOLERANCE: f64 = 1e-9;
const MAX_MILLER_SCALE: i64 = 12;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CrystalError {
    #[error("Crystallographic vector '{0}' must have exactly three components")]
    WrongArity(String),
    #[error("Invalid component '{component}' in crystallographic vector '{vector}'")]
    InvalidComponent { vector: String, component: String },
    #[error("Component '{0}' has a zero denominator")]
    ZeroDenominator(String),
    #[error("The {name} must not be the zero vector")]
    ZeroVector { name: &'static str },
    #[error("The {name} {vector} has a non-finite component")]
    NonFinite {
        name: &'static str,
        vector: CrystalVector,
    },
    #[error("The {name} {vector} does not lie in the slip plane {plane} (dot product {dot:.6})")]
    NotInSlipPlane {
        name: &'static str,
        vector: CrystalVector,
        plane: CrystalVector,
        dot: f64,
    },
    #[error("Crystallographic vector {0} cannot be expressed with small integer indices")]
    NotRational(CrystalVector),
}

/// A crystallographic direction or plane normal given as a rational triple.
///
/// Accepts the notations used in input files and on the command line: `1/2 1/2 1/2`,
/// `[0.5, 0.5, 0.5]`, `(1 -1 0)` or `<1,1,1>`. Components are kept as `f64`; the
/// rational form only matters for parsing and for [`CrystalVector::miller_indices`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrystalVector(pub [f64; 3]);

impl CrystalVector {
    pub fn new(u: f64, v: f64, w: f64) -> Self {
        Self([u, v, w])
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    pub fn norm(&self) -> f64 {
        self.as_vector().norm()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|c| c.abs() < ORTHOGONALITY_TOLERANCE)
    }

    pub fn dot(&self, other: &CrystalVector) -> f64 {
        self.as_vector().dot(&other.as_vector())
    }

    /// Smallest integer triple parallel to this vector, e.g. `1/2 1/2 1/2` -> `[1, 1, 1]`.
    pub fn miller_indices(&self) -> Result<[i64; 3], CrystalError> {
        if self.is_zero() {
            return Err(CrystalError::ZeroVector { name: "direction" });
        }
        for scale in 1..=MAX_MILLER_SCALE {
            let scaled = self.0.map(|c| c * scale as f64);
            if scaled.iter().all(|c| (c - c.round()).abs() < 1e-6) {
                let ints = scaled.map(|c| c.round() as i64);
                let divisor = ints.iter().fold(0, |acc, &v| gcd(acc, v.abs()));
                return Ok(ints.map(|v| v / divisor.max(1)));
            }
        }
        Err(CrystalError::NotRational(*self))
    }

    /// Shortest lattice translation along this direction in a BCC crystal.
    ///
    /// For `[uvw]` in lowest terms the repeat is `a·|uvw|`, halved when all indices are odd
    /// because the body-centering vector `½[111]` family then lies on the line.
    pub fn bcc_period(&self, lattice_constant: f64) -> Result<f64, CrystalError> {
        let [u, v, w] = self.miller_indices()?;
        let length = ((u * u + v * v + w * w) as f64).sqrt() * lattice_constant;
        if u % 2 != 0 && v % 2 != 0 && w % 2 != 0 {
            Ok(0.5 * length)
        } else {
            Ok(length)
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn parse_component(vector: &str, token: &str) -> Result<f64, CrystalError> {
    let invalid = || CrystalError::InvalidComponent {
        vector: vector.to_string(),
        component: token.to_string(),
    };
    let number = |text: &str| -> Result<f64, CrystalError> {
        let value: f64 = text.trim().parse().map_err(|_| invalid())?;
        if value.is_finite() { Ok(value) } else { Err(invalid()) }
    };
    match token.split_once('/') {
        Some((num, den)) => {
            let num = number(num)?;
            let den = number(den)?;
            if den == 0.0 {
                return Err(CrystalError::ZeroDenominator(token.to_string()));
            }
            Ok(num / den)
        }
        None => number(token),
    }
}

impl FromStr for CrystalVector {
    type Err = CrystalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .trim_start_matches(['[', '(', '<', '{'])
            .trim_end_matches([']', ')', '>', '}']);
        let tokens: Vec<&str> = inner
            .split([',', ' ', '\t'])
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() != 3 {
            return Err(CrystalError::WrongArity(s.to_string()));
        }
        let mut components = [0.0; 3];
        for (slot, token) in components.iter_mut().zip(tokens) {
            *slot = parse_component(s, token)?;
        }
        Ok(Self(components))
    }
}

impl fmt::Display for CrystalVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.0[0], self.0[1], self.0[2])
    }
}

impl<'de> Deserialize<'de> for CrystalVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Components([f64; 3]),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Components(c) => Ok(Self(c)),
        }
    }
}

/// Burgers vector, slip-plane normal and line direction of a dislocation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SlipSystem {
    pub burgers: CrystalVector,
    pub slip_plane: CrystalVector,
    pub line_direction: CrystalVector,
}

impl SlipSystem {
    /// Screw dislocation `½[111](1-10)` used by the iron study.
    pub fn bcc_screw() -> Self {
        Self {
            burgers: CrystalVector::new(0.5, 0.5, 0.5),
            slip_plane: CrystalVector::new(1.0, -1.0, 0.0),
            line_direction: CrystalVector::new(0.5, 0.5, 0.5),
        }
    }

    /// Rejects degenerate slip systems before any geometry is constructed.
    pub fn validate(&self) -> Result<(), CrystalError> {
        for (name, vector) in [
            ("Burgers vector", &self.burgers),
            ("slip-plane normal", &self.slip_plane),
            ("line direction", &self.line_direction),
        ] {
            if !vector.is_finite() {
                return Err(CrystalError::NonFinite {
                    name,
                    vector: *vector,
                });
            }
            if vector.is_zero() {
                return Err(CrystalError::ZeroVector { name });
            }
        }
        for (name, vector) in [
            ("Burgers vector", &self.burgers),
            ("line direction", &self.line_direction),
        ] {
            let cosine = vector.dot(&self.slip_plane) / (vector.norm() * self.slip_plane.norm());
            if !(cosine.abs() <= ORTHOGONALITY_TOLERANCE) {
                return Err(CrystalError::NotInSlipPlane {
                    name,
                    vector: *vector,
                    plane: self.slip_plane,
                    dot: vector.dot(&self.slip_plane),
                });
            }
        }
        Ok(())
    }

    /// Angle between Burgers vector and line direction in degrees (0 = screw, 90 = edge).
    pub fn character_angle(&self) -> f64 {
        let b = self.burgers.as_vector();
        let xi = self.line_direction.as_vector();
        let cosine = (b.dot(&xi) / (b.norm() * xi.norm())).clamp(-1.0, 1.0);
        cosine.acos().to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_and_decimal_notations() {
        let expected = CrystalVector::new(0.5, 0.5, 0.5);
        assert_eq!("1/2 1/2 1/2".parse::<CrystalVector>(), Ok(expected));
        assert_eq!("[0.5, 0.5, 0.5]".parse::<CrystalVector>(), Ok(expected));
        assert_eq!("<1/2,1/2,1/2>".parse::<CrystalVector>(), Ok(expected));
        assert_eq!(
            "(1 -1 0)".parse::<CrystalVector>(),
            Ok(CrystalVector::new(1.0, -1.0, 0.0))
        );
    }

    #[test]
    fn rejects_malformed_vectors() {
        assert!(matches!(
            "1 2".parse::<CrystalVector>(),
            Err(CrystalError::WrongArity(_))
        ));
        assert!(matches!(
            "1 a 0".parse::<CrystalVector>(),
            Err(CrystalError::InvalidComponent { .. })
        ));
        assert!(matches!(
            "1/0 1 1".parse::<CrystalVector>(),
            Err(CrystalError::ZeroDenominator(_))
        ));
    }

    #[test]
    fn rejects_non_finite_components() {
        for text in ["nan 1 1", "inf -1 0", "1/2 -inf 1/2", "1/nan 1 1"] {
            assert!(
                matches!(
                    text.parse::<CrystalVector>(),
                    Err(CrystalError::InvalidComponent { .. })
                ),
                "{text} should not parse"
            );
        }
    }

    #[test]
    fn deserializes_from_string_or_array() {
        #[derive(Deserialize)]
        struct Holder {
            a: CrystalVector,
            b: CrystalVector,
        }
        let holder: Holder = toml::from_str("a = \"1/2 1/2 1/2\"\nb = [1.0, -1.0, 0.0]").unwrap();
        assert_eq!(holder.a, CrystalVector::new(0.5, 0.5, 0.5));
        assert_eq!(holder.b, CrystalVector::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn miller_indices_reduce_to_lowest_terms() {
        assert_eq!(
            CrystalVector::new(0.5, 0.5, 0.5).miller_indices(),
            Ok([1, 1, 1])
        );
        assert_eq!(
            CrystalVector::new(2.0, -2.0, 0.0).miller_indices(),
            Ok([1, -1, 0])
        );
        assert_eq!(
            CrystalVector::new(1.0 / 3.0, 0.0, 2.0 / 3.0).miller_indices(),
            Ok([1, 0, 2])
        );
    }

    #[test]
    fn bcc_period_halves_all_odd_directions() {
        let a = 2.855;
        let p111 = CrystalVector::new(1.0, 1.0, 1.0).bcc_period(a).unwrap();
        assert!((p111 - a * 3f64.sqrt() / 2.0).abs() < 1e-12);
        let p110 = CrystalVector::new(1.0, -1.0, 0.0).bcc_period(a).unwrap();
        assert!((p110 - a * 2f64.sqrt()).abs() < 1e-12);
        let p112 = CrystalVector::new(1.0, 1.0, -2.0).bcc_period(a).unwrap();
        assert!((p112 - a * 6f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn default_screw_slip_system_is_valid() {
        let system = SlipSystem::bcc_screw();
        assert_eq!(system.validate(), Ok(()));
        assert!(system.character_angle().abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_zero_and_out_of_plane_vectors() {
        let mut system = SlipSystem::bcc_screw();
        system.slip_plane = CrystalVector::new(0.0, 0.0, 0.0);
        assert_eq!(
            system.validate(),
            Err(CrystalError::ZeroVector {
                name: "slip-plane normal"
            })
        );

        let mut system = SlipSystem::bcc_screw();
        system.slip_plane = CrystalVector::new(1.0, 1.0, 0.0);
        assert!(matches!(
            system.validate(),
            Err(CrystalError::NotInSlipPlane {
                name: "Burgers vector",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_non_finite_vectors() {
        let mut system = SlipSystem::bcc_screw();
        system.burgers = CrystalVector::new(f64::NAN, 1.0, 1.0);
        assert!(matches!(
            system.validate(),
            Err(CrystalError::NonFinite {
                name: "Burgers vector",
                ..
            })
        ));

        let mut system = SlipSystem::bcc_screw();
        system.slip_plane = CrystalVector::new(f64::INFINITY, -1.0, 0.0);
        assert!(matches!(
            system.validate(),
            Err(CrystalError::NonFinite {
                name: "slip-plane normal",
                ..
            })
        ));
    }

    #[test]
    fn edge_character_is_ninety_degrees() {
        let system = SlipSystem {
            burgers: CrystalVector::new(0.5, 0.5, 0.5),
            slip_plane: CrystalVector::new(1.0, -1.0, 0.0),
            line_direction: CrystalVector::new(1.0, 1.0, -2.0),
        };
        assert_eq!(system.validate(), Ok(()));
        assert!((system.character_angle() - 90.0).abs() < 1e-9);
    }
}
