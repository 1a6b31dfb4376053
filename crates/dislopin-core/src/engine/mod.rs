//! # Engine Module
//!
//! Everything between the pure data models of [`crate::core`] and the stage workflows:
//! run configuration, the directive script builder, stage workspaces and typed artifacts,
//! and the drivers for the external programs the pipeline delegates to.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Immutable, builder-validated records per stage
//! - **Collaborators** ([`lammps`], [`atomsk`], [`generator`], [`fitting`]) - Traits for the
//!   MD engine, the structure-building tool, the dislocation generator and the potential
//!   fitter, each with a shipped implementation that launches an external program
//! - **Scripts** ([`script`]) - Phase-checked LAMMPS directive scripts
//! - **Artifacts** ([`artifact`], [`workspace`]) - Stage directory trees and the manifests
//!   that carry boundary flags from one stage to the next
//! - **Processes** ([`process`]) - Blocking child-process execution with streamed output
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - The stage-tagged [`error::PipelineError`]

pub mod artifact;
pub mod atomsk;
pub mod config;
pub mod context;
pub mod error;
pub mod fitting;
pub mod generator;
pub mod lammps;
pub mod process;
pub mod progress;
pub mod script;
pub mod workspace;
