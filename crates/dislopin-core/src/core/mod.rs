//! # Core Module
//!
//! Data models, geometry and file formats shared by every pipeline stage.
//!
//! ## Architecture
//!
//! - **Structures** ([`models`]) - Atoms, simulation boxes, configurations, crystallographic
//!   vectors and potential descriptions
//! - **Geometry** ([`geometry`]) - Region predicates and the owning-group partition used by
//!   the defect-interaction stage
//! - **File I/O** ([`io`]) - LAMMPS data files, custom dumps and engine log parsing
//! - **Units** ([`units`]) - The single place where engine units are converted
//! - **Elements** ([`elements`]) - Static element mass table

pub mod elements;
pub mod geometry;
pub mod io;
pub mod models;
pub mod units;
