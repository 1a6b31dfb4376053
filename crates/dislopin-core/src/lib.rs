//! # dislopin Core Library
//!
//! Staged set-up and execution of molecular-dynamics studies of a dislocation interacting
//! with a precipitate in body-centered-cubic iron.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split used throughout the project:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`AtomicConfiguration`,
//!   `SimulationBox`, crystallographic vectors), geometric regions and the atom partition,
//!   and readers/writers for the LAMMPS data, dump and log formats.
//!
//! - **[`engine`]: The Collaborator Layer.** Immutable run configuration, the directive
//!   script builder, typed stage artifacts, stage workspaces, and the drivers for the
//!   external programs (MD engine, structure-building tool, dislocation generator).
//!
//! - **[`workflows`]: The Public API.** The three stages (build, relax, shear) and the
//!   pipeline that chains them through typed artifact handles.

pub mod core;
pub mod engine;
pub mod workflows;
