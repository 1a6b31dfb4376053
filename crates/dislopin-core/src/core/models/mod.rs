//! # Core Models Module
//!
//! Data structures describing what the pipeline moves between stages.
//!
//! ## Key Components
//!
//! - [`atom`] - A single atom record (id, type, position, optional velocity and image flags)
//! - [`simulation_box`] - Box bounds, triclinic tilt and per-axis periodicity
//! - [`configuration`] - An ordered atom collection with its box and per-type masses
//! - [`crystal`] - Rational crystallographic triples and slip-system validation
//! - [`potential`] - Interatomic potential description and fitted elastic constants

pub mod atom;
pub mod configuration;
pub mod crystal;
pub mod potential;
pub mod simulation_box;
