//! Region predicates and the owning-group partition of a configuration.
//!
//! The defect-interaction stage computes the same partition in-process that the engine
//! builds from `region`/`group` directives, so degenerate geometry is rejected before any
//! dynamics is requested and the engine's group sizes can be cross-checked afterwards.

pub mod partition;
pub mod region;

use crate::core::models::simulation_box::Axis;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error(
        "Precipitate radius {radius} Å must be smaller than half the shortest box extent ({half_extent} Å along {axis})"
    )]
    RadiusExceedsBox {
        radius: f64,
        half_extent: f64,
        axis: Axis,
    },
    #[error(
        "Surface layers of depth {depth} Å cover the whole free axis {axis} (extent {extent} Å)"
    )]
    SurfacesOverlap { depth: f64, extent: f64, axis: Axis },
    #[error("Displacement axis {0} must be periodic")]
    DisplacementAxisNotPeriodic(Axis),
    #[error("Shear axis {0} must be periodic")]
    ShearAxisNotPeriodic(Axis),
    #[error("Group '{0}' would contain no atoms")]
    EmptyGroup(&'static str),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}
