use super::atom::Atom;
use super::simulation_box::{Periodicity, SimulationBox};
use nalgebra::Vector3;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Duplicate atom id {0}")]
    DuplicateAtomId(u64),
    #[error("Atom {id} has type {type_id}, but the configuration declares {atom_types} atom type(s)")]
    UnknownAtomType { id: u64, type_id: u32, atom_types: u32 },
    #[error("Atom type index 0 is not allowed (atom {0})")]
    ZeroAtomType(u64),
}

/// An ordered collection of atoms inside a simulation box.
///
/// This is what each stage holds in memory for the duration of its own run and what
/// gets persisted through a LAMMPS data file between stages.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicConfiguration {
    /// Free-form title written as the first line of the data file.
    pub title: String,
    pub simulation_box: SimulationBox,
    /// Declared number of atom types; may exceed the largest type actually used.
    pub atom_types: u32,
    /// Per-type masses in g/mol.
    pub masses: BTreeMap<u32, f64>,
    atoms: Vec<Atom>,
    ids: HashSet<u64>,
}

impl AtomicConfiguration {
    pub fn new(simulation_box: SimulationBox, atom_types: u32) -> Self {
        Self {
            title: String::new(),
            simulation_box,
            atom_types,
            masses: BTreeMap::new(),
            atoms: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn with_capacity(simulation_box: SimulationBox, atom_types: u32, capacity: usize) -> Self {
        let mut config = Self::new(simulation_box, atom_types);
        config.atoms.reserve(capacity);
        config.ids.reserve(capacity);
        config
    }

    /// Appends an atom, rejecting duplicate ids and undeclared types.
    pub fn push(&mut self, atom: Atom) -> Result<(), ConfigurationError> {
        if atom.type_id == 0 {
            return Err(ConfigurationError::ZeroAtomType(atom.id));
        }
        if atom.type_id > self.atom_types {
            return Err(ConfigurationError::UnknownAtomType {
                id: atom.id,
                type_id: atom.type_id,
                atom_types: self.atom_types,
            });
        }
        if !self.ids.insert(atom.id) {
            return Err(ConfigurationError::DuplicateAtomId(atom.id));
        }
        self.atoms.push(atom);
        Ok(())
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Mutable access to atom records. Ids must not be changed through this slice.
    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Atom ids in file order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.atoms.iter().map(|a| a.id)
    }

    pub fn set_periodicity(&mut self, periodicity: Periodicity) {
        self.simulation_box.periodicity = periodicity;
    }

    /// Rigidly translates every atom, wrapping along periodic axes.
    ///
    /// Image flags are dropped because the wrap already folds positions back into the box.
    pub fn displace(&mut self, displacement: &Vector3<f64>) {
        let simulation_box = self.simulation_box.clone();
        for atom in &mut self.atoms {
            atom.position = simulation_box.wrap(&(atom.position + displacement));
            atom.image = None;
        }
    }

    /// True when both configurations hold the same set of atom ids.
    pub fn same_ids_as(&self, other: &AtomicConfiguration) -> bool {
        self.len() == other.len() && self.ids.iter().all(|id| other.ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::simulation_box::Axis;
    use nalgebra::Point3;

    fn empty_config() -> AtomicConfiguration {
        let b = SimulationBox::new([0.0; 3], [10.0; 3], Periodicity::slab(Axis::Y));
        AtomicConfiguration::new(b, 1)
    }

    #[test]
    fn push_rejects_duplicate_ids() {
        let mut config = empty_config();
        config.push(Atom::new(1, 1, Point3::origin())).unwrap();
        let err = config.push(Atom::new(1, 1, Point3::new(1.0, 1.0, 1.0)));
        assert_eq!(err, Err(ConfigurationError::DuplicateAtomId(1)));
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn push_rejects_undeclared_types() {
        let mut config = empty_config();
        assert!(matches!(
            config.push(Atom::new(1, 2, Point3::origin())),
            Err(ConfigurationError::UnknownAtomType { type_id: 2, .. })
        ));
        assert_eq!(
            config.push(Atom::new(1, 0, Point3::origin())),
            Err(ConfigurationError::ZeroAtomType(1))
        );
    }

    #[test]
    fn displace_wraps_periodic_axes_and_keeps_fixed_axes() {
        let mut config = empty_config();
        let mut atom = Atom::new(1, 1, Point3::new(8.0, 5.0, 9.0));
        atom.image = Some([0, 0, 1]);
        config.push(atom).unwrap();

        config.displace(&Vector3::new(4.0, 1.0, 3.0));

        let moved = &config.atoms()[0];
        assert!((moved.position.x - 2.0).abs() < 1e-12);
        assert!((moved.position.y - 6.0).abs() < 1e-12);
        assert!((moved.position.z - 2.0).abs() < 1e-12);
        assert!(moved.image.is_none());
    }

    #[test]
    fn same_ids_as_ignores_order() {
        let mut a = empty_config();
        let mut b = empty_config();
        a.push(Atom::new(1, 1, Point3::origin())).unwrap();
        a.push(Atom::new(2, 1, Point3::origin())).unwrap();
        b.push(Atom::new(2, 1, Point3::origin())).unwrap();
        b.push(Atom::new(1, 1, Point3::origin())).unwrap();
        assert!(a.same_ids_as(&b));

        b.push(Atom::new(3, 1, Point3::origin())).unwrap();
        assert!(!a.same_ids_as(&b));
    }
}
