use crate::core::models::simulation_box::Axis;
use nalgebra::Point3;

/// A geometric predicate over atom positions, in box units.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Sphere {
        center: Point3<f64>,
        radius: f64,
    },
    /// All points whose coordinate along `axis` lies in `[lower, upper]`; `None` is unbounded.
    Slab {
        axis: Axis,
        lower: Option<f64>,
        upper: Option<f64>,
    },
    /// Axis-aligned box `[lower, upper]`.
    Block { lower: [f64; 3], upper: [f64; 3] },
}

fn bound(value: Option<f64>) -> String {
    value.map_or_else(|| "INF".to_string(), |v| v.to_string())
}

impl Region {
    /// Boundary points count as inside, matching the engine's region semantics.
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        match self {
            Region::Sphere { center, radius } => (point - center).norm_squared() <= radius * radius,
            Region::Slab { axis, lower, upper } => {
                let c = point[axis.index()];
                lower.is_none_or(|lo| c >= lo) && upper.is_none_or(|hi| c <= hi)
            }
            Region::Block { lower, upper } => {
                (0..3).all(|i| point[i] >= lower[i] && point[i] <= upper[i])
            }
        }
    }

    /// Arguments following `region <name>`.
    pub fn directive_args(&self) -> String {
        match self {
            Region::Sphere { center, radius } => format!(
                "sphere {} {} {} {} units box",
                center.x, center.y, center.z, radius
            ),
            Region::Slab { axis, lower, upper } => {
                let mut bounds: [String; 6] = std::array::from_fn(|_| bound(None));
                bounds[2 * axis.index()] = bound(*lower);
                bounds[2 * axis.index() + 1] = bound(*upper);
                format!("block {} units box", bounds.join(" "))
            }
            Region::Block { lower, upper } => format!(
                "block {} {} {} {} {} {} units box",
                lower[0], upper[0], lower[1], upper[1], lower[2], upper[2]
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedRegion {
    pub name: String,
    pub region: Region,
}

impl NamedRegion {
    pub fn new(name: impl Into<String>, region: Region) -> Self {
        Self {
            name: name.into(),
            region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_boundary_is_inside() {
        let sphere = Region::Sphere {
            center: Point3::new(0.0, 0.0, 0.0),
            radius: 2.0,
        };
        assert!(sphere.contains(&Point3::new(2.0, 0.0, 0.0)));
        assert!(!sphere.contains(&Point3::new(2.0, 0.1, 0.0)));
    }

    #[test]
    fn open_slab_bounds_extend_to_infinity() {
        let top = Region::Slab {
            axis: Axis::Y,
            lower: Some(15.0),
            upper: None,
        };
        assert!(top.contains(&Point3::new(-1e6, 15.0, 1e6)));
        assert!(top.contains(&Point3::new(0.0, 1e9, 0.0)));
        assert!(!top.contains(&Point3::new(0.0, 14.999, 0.0)));
    }

    #[test]
    fn block_contains_its_corners() {
        let block = Region::Block {
            lower: [0.0; 3],
            upper: [1.0, 2.0, 3.0],
        };
        assert!(block.contains(&Point3::new(1.0, 2.0, 3.0)));
        assert!(!block.contains(&Point3::new(1.0, 2.0, 3.1)));
        assert_eq!(block.directive_args(), "block 0 1 0 2 0 3 units box");
    }

    #[test]
    fn renders_engine_region_arguments() {
        let sphere = Region::Sphere {
            center: Point3::new(20.0, 0.5, 15.0),
            radius: 25.0,
        };
        assert_eq!(sphere.directive_args(), "sphere 20 0.5 15 25 units box");

        let bottom = Region::Slab {
            axis: Axis::Y,
            lower: None,
            upper: Some(-15.0),
        };
        assert_eq!(
            bottom.directive_args(),
            "block INF INF INF -15 INF INF units box"
        );
    }
}
