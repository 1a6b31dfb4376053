//! Unit conversions between the engine's `metal` unit set and the units used by the
//! rest of the pipeline (Angstrom, GPa). Every pressure that crosses a stage boundary
//! passes through here.

/// `metal` pressures are reported in bar.
pub const BAR_TO_GPA: f64 = 1.0e-4;

/// Energy density in eV/Å³ expressed in GPa.
pub const EV_PER_CUBIC_ANGSTROM_TO_GPA: f64 = 160.217_663_4;

pub fn bar_to_gpa(pressure_bar: f64) -> f64 {
    pressure_bar * BAR_TO_GPA
}

pub fn gpa_to_bar(pressure_gpa: f64) -> f64 {
    pressure_gpa / BAR_TO_GPA
}

pub fn ev_per_cubic_angstrom_to_gpa(value: f64) -> f64 {
    value * EV_PER_CUBIC_ANGSTROM_TO_GPA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_and_gpa_round_trip() {
        assert!((bar_to_gpa(1.0e4) - 1.0).abs() < 1e-12);
        assert!((gpa_to_bar(bar_to_gpa(2.5e6)) - 2.5e6).abs() < 1e-6);
    }

    #[test]
    fn energy_density_conversion_matches_reference() {
        assert!((ev_per_cubic_angstrom_to_gpa(1.0) - 160.2177).abs() < 1e-3);
    }
}
