use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A tabulated interatomic potential as the MD engine consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialModel {
    /// Path to the potential file (e.g. an `eam/fs` setfl file).
    pub file: PathBuf,
    /// Engine pair style, e.g. `eam/fs`.
    pub pair_style: String,
    /// Element names mapped onto atom types 1..=n, in order.
    pub elements: Vec<String>,
}

impl PotentialModel {
    pub fn new(file: impl Into<PathBuf>, pair_style: &str, elements: &[&str]) -> Self {
        Self {
            file: file.into(),
            pair_style: pair_style.to_string(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Element assigned to atom type 1.
    pub fn primary_element(&self) -> Option<&str> {
        self.elements.first().map(String::as_str)
    }

    /// Arguments of `pair_coeff * * <file> <elements...>`.
    pub fn pair_coeff_args(&self) -> Vec<String> {
        let mut args = vec![
            "*".to_string(),
            "*".to_string(),
            self.file.to_string_lossy().into_owned(),
        ];
        args.extend(self.elements.iter().cloned());
        args
    }
}

/// Independent elastic moduli of a cubic crystal, in GPa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticConstants {
    pub c11: f64,
    pub c12: f64,
    pub c44: f64,
}

impl ElasticConstants {
    /// Born stability criteria for a cubic lattice.
    pub fn is_mechanically_stable(&self) -> bool {
        self.c11 > self.c12.abs() && self.c44 > 0.0 && self.c11 + 2.0 * self.c12 > 0.0
    }

    pub fn bulk_modulus(&self) -> f64 {
        (self.c11 + 2.0 * self.c12) / 3.0
    }

    /// Zener ratio `2·C44 / (C11 − C12)`; 1 for an isotropic crystal.
    pub fn zener_anisotropy(&self) -> f64 {
        2.0 * self.c44 / (self.c11 - self.c12)
    }
}

/// Equilibrium properties obtained by fitting a potential, in Angstrom and GPa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedPotential {
    pub lattice_constant: f64,
    pub elastic: ElasticConstants,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_coeff_args_list_file_then_elements() {
        let potential = PotentialModel::new("/pots/malerba.fs", "eam/fs", &["Fe"]);
        assert_eq!(
            potential.pair_coeff_args(),
            vec!["*", "*", "/pots/malerba.fs", "Fe"]
        );
        assert_eq!(potential.primary_element(), Some("Fe"));
    }

    #[test]
    fn iron_like_constants_are_stable_and_anisotropic() {
        let c = ElasticConstants {
            c11: 243.0,
            c12: 145.0,
            c44: 116.0,
        };
        assert!(c.is_mechanically_stable());
        assert!((c.bulk_modulus() - 177.666_666_666).abs() < 1e-6);
        assert!((c.zener_anisotropy() - 2.367_346_938).abs() < 1e-6);
    }

    #[test]
    fn negative_shear_modulus_is_unstable() {
        let c = ElasticConstants {
            c11: 200.0,
            c12: 100.0,
            c44: -5.0,
        };
        assert!(!c.is_mechanically_stable());
    }
}
