//! Readers and writers for the files exchanged with the MD engine.
//!
//! The structured atom-data format carries configurations between stages, custom dumps
//! carry per-atom diagnostics out of the engine, and the engine log carries thermodynamic
//! tables and minimizer statistics.

pub mod dump;
pub mod lammps_data;
pub mod log;
pub mod traits;
