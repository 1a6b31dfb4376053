use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three Cartesian axes of the simulation box.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// Unit vector along this axis scaled by `magnitude`.
    pub fn vector(self, magnitude: f64) -> Vector3<f64> {
        let mut v = Vector3::zeros();
        v[self.index()] = magnitude;
        v
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{}', expected x, y or z", other)),
        }
    }
}

/// Boundary treatment along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Periodic,
    Fixed,
}

impl Boundary {
    /// The letter the engine's `boundary` directive uses.
    pub fn symbol(self) -> &'static str {
        match self {
            Boundary::Periodic => "p",
            Boundary::Fixed => "f",
        }
    }
}

impl FromStr for Boundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "periodic" => Ok(Boundary::Periodic),
            "f" | "fixed" | "free" => Ok(Boundary::Fixed),
            other => Err(format!(
                "unknown boundary '{}', expected 'p' (periodic) or 'f' (fixed)",
                other
            )),
        }
    }
}

/// Per-axis boundary flags of a simulation box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Periodicity(pub [Boundary; 3]);

impl Periodicity {
    pub fn fully_periodic() -> Self {
        Self([Boundary::Periodic; 3])
    }

    /// Periodic along every axis except `free_axis`.
    pub fn slab(free_axis: Axis) -> Self {
        let mut flags = [Boundary::Periodic; 3];
        flags[free_axis.index()] = Boundary::Fixed;
        Self(flags)
    }

    pub fn boundary(&self, axis: Axis) -> Boundary {
        self.0[axis.index()]
    }

    pub fn is_periodic(&self, axis: Axis) -> bool {
        self.boundary(axis) == Boundary::Periodic
    }

    pub fn fixed_axes(&self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|axis| !self.is_periodic(*axis))
            .collect()
    }

    /// The three arguments of the engine's `boundary` directive.
    pub fn directive_args(&self) -> [&'static str; 3] {
        [self.0[0].symbol(), self.0[1].symbol(), self.0[2].symbol()]
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.directive_args();
        write!(f, "{} {} {}", a, b, c)
    }
}

impl FromStr for Periodicity {
    type Err = String;

    /// Parses `"p f p"`, `"p,f,p"` or `"pfp"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<String> = if s.contains([',', ' ']) {
            s.split([',', ' '])
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            s.chars().map(|c| c.to_string()).collect()
        };
        if tokens.len() != 3 {
            return Err(format!(
                "boundary specification '{}' must name exactly three axes",
                s
            ));
        }
        let mut flags = [Boundary::Periodic; 3];
        for (slot, token) in flags.iter_mut().zip(&tokens) {
            *slot = token.parse()?;
        }
        Ok(Self(flags))
    }
}

/// An axis-aligned (optionally tilted) simulation box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationBox {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
    /// Triclinic tilt factors `xy xz yz`; geometry in this crate ignores them.
    pub tilt: Option<[f64; 3]>,
    pub periodicity: Periodicity,
}

impl SimulationBox {
    pub fn new(lower: [f64; 3], upper: [f64; 3], periodicity: Periodicity) -> Self {
        Self {
            lower,
            upper,
            tilt: None,
            periodicity,
        }
    }

    pub fn extent(&self, axis: Axis) -> f64 {
        self.upper[axis.index()] - self.lower[axis.index()]
    }

    pub fn extents(&self) -> [f64; 3] {
        [
            self.extent(Axis::X),
            self.extent(Axis::Y),
            self.extent(Axis::Z),
        ]
    }

    /// Geometric center computed from the actual bounds.
    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            0.5 * (self.lower[0] + self.upper[0]),
            0.5 * (self.lower[1] + self.upper[1]),
            0.5 * (self.lower[2] + self.upper[2]),
        )
    }

    /// Smallest extent and the axis it belongs to.
    pub fn shortest_axis(&self) -> (Axis, f64) {
        Axis::ALL
            .into_iter()
            .map(|axis| (axis, self.extent(axis)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((Axis::X, 0.0))
    }

    pub fn is_triclinic(&self) -> bool {
        self.tilt.is_some_and(|t| t.iter().any(|v| *v != 0.0))
    }

    /// Maps a point back into the box along periodic axes; fixed axes are left untouched.
    pub fn wrap(&self, point: &Point3<f64>) -> Point3<f64> {
        let mut wrapped = *point;
        for axis in Axis::ALL {
            let i = axis.index();
            let length = self.extent(axis);
            if !self.periodicity.is_periodic(axis) || length <= 0.0 {
                continue;
            }
            let shifted = (wrapped[i] - self.lower[i]).rem_euclid(length);
            wrapped[i] = self.lower[i] + shifted;
        }
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_box() -> SimulationBox {
        SimulationBox::new(
            [0.0, -10.0, 0.0],
            [40.0, 10.0, 30.0],
            Periodicity::slab(Axis::Y),
        )
    }

    #[test]
    fn axis_parses_case_insensitively() {
        assert_eq!("X".parse::<Axis>(), Ok(Axis::X));
        assert_eq!(" y ".parse::<Axis>(), Ok(Axis::Y));
        assert!("w".parse::<Axis>().is_err());
    }

    #[test]
    fn periodicity_parses_all_supported_spellings() {
        let expected = Periodicity::slab(Axis::Y);
        assert_eq!("p f p".parse::<Periodicity>(), Ok(expected));
        assert_eq!("p,f,p".parse::<Periodicity>(), Ok(expected));
        assert_eq!("pfp".parse::<Periodicity>(), Ok(expected));
        assert_eq!("periodic,fixed,periodic".parse::<Periodicity>(), Ok(expected));
        assert!("p f".parse::<Periodicity>().is_err());
        assert!("p q p".parse::<Periodicity>().is_err());
    }

    #[test]
    fn slab_periodicity_renders_boundary_directive_args() {
        let periodicity = Periodicity::slab(Axis::Y);
        assert_eq!(periodicity.directive_args(), ["p", "f", "p"]);
        assert_eq!(periodicity.fixed_axes(), vec![Axis::Y]);
        assert_eq!(periodicity.to_string(), "p f p");
    }

    #[test]
    fn center_and_extents_use_actual_bounds() {
        let b = test_box();
        assert_eq!(b.center(), Point3::new(20.0, 0.0, 15.0));
        assert_eq!(b.extents(), [40.0, 20.0, 30.0]);
        assert_eq!(b.shortest_axis(), (Axis::Y, 20.0));
    }

    #[test]
    fn wrap_only_moves_points_along_periodic_axes() {
        let b = test_box();
        let wrapped = b.wrap(&Point3::new(45.0, 12.0, -5.0));
        assert!((wrapped.x - 5.0).abs() < 1e-12);
        assert!((wrapped.y - 12.0).abs() < 1e-12);
        assert!((wrapped.z - 25.0).abs() < 1e-12);
    }

    #[test]
    fn zero_tilt_is_not_triclinic() {
        let mut b = test_box();
        assert!(!b.is_triclinic());
        b.tilt = Some([0.0, 0.0, 0.0]);
        assert!(!b.is_triclinic());
        b.tilt = Some([0.5, 0.0, 0.0]);
        assert!(b.is_triclinic());
    }
}
