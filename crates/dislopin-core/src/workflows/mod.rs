//! # Workflows Module
//!
//! The public entry points of the library: one workflow per pipeline stage and a pipeline
//! that chains them.
//!
//! ## Architecture
//!
//! - **Configuration Builder** ([`build`]) - Fits the lattice constant and elastic
//!   constants, then produces either a periodic dislocation array or a strained bicrystal
//! - **Relaxation** ([`relax`]) - Energy minimization of the built configuration
//! - **Defect Interaction** ([`shear`]) - Shear dynamics with a pinned precipitate and
//!   driven surface layers
//! - **Pipeline** ([`pipeline`]) - All three stages in order, each consuming the typed
//!   artifact the previous one produced
//!
//! Every workflow reports phases through the [`crate::engine::progress`] reporter and
//! returns a stage-tagged [`crate::engine::error::PipelineError`] on failure.

pub mod build;
pub mod pipeline;
pub mod relax;
pub mod shear;

#[cfg(test)]
pub(crate) mod testing;
