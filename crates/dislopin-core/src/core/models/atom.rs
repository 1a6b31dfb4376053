use nalgebra::{Point3, Vector3};

/// A single atom as stored in a LAMMPS data file.
///
/// Atom ids are the engine's global ids and are preserved across every stage; the
/// position of an atom in [`AtomicConfiguration`](super::configuration::AtomicConfiguration)
/// is only its file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Global atom id (1-based in LAMMPS).
    pub id: u64,
    /// Atom type index (1-based).
    pub type_id: u32,
    /// Cartesian position in Angstroms.
    pub position: Point3<f64>,
    /// Partial charge, present only for the `charge` atom style.
    pub charge: Option<f64>,
    /// Periodic image flags, when the file carries them.
    pub image: Option<[i32; 3]>,
    /// Velocity in Angstrom/ps, when the file has a `Velocities` section.
    pub velocity: Option<Vector3<f64>>,
}

impl Atom {
    /// Creates an atom with no charge, image flags or velocity.
    pub fn new(id: u64, type_id: u32, position: Point3<f64>) -> Self {
        Self {
            id,
            type_id,
            position,
            charge: None,
            image: None,
            velocity: None,
        }
    }
}
