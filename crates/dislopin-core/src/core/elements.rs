use phf::{Map, phf_map};

/// Standard atomic masses (g/mol) for the elements the iron studies use.
static ATOMIC_MASSES: Map<&'static str, f64> = phf_map! {
    "H" => 1.008,
    "C" => 12.011,
    "N" => 14.007,
    "O" => 15.999,
    "Al" => 26.982,
    "Si" => 28.085,
    "P" => 30.974,
    "S" => 32.06,
    "Ti" => 47.867,
    "V" => 50.942,
    "Cr" => 51.996,
    "Mn" => 54.938,
    "Fe" => 55.845,
    "Co" => 58.933,
    "Ni" => 58.693,
    "Cu" => 63.546,
    "Nb" => 92.906,
    "Mo" => 95.95,
    "W" => 183.84,
};

pub fn atomic_mass(symbol: &str) -> Option<f64> {
    ATOMIC_MASSES.get(symbol.trim()).copied()
}
