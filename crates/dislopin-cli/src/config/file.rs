use crate::error::{CliError, Result};
use dislopin::core::models::crystal::CrystalVector;
use dislopin::core::models::simulation_box::Axis;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub data_root: Option<PathBuf>,
    pub paths: Option<FilePathsConfig>,
    pub potential: Option<FilePotentialConfig>,
    pub engine: Option<FileEngineConfig>,
    pub tools: Option<FileToolsConfig>,
    pub build: Option<FileBuildConfig>,
    pub relax: Option<FileRelaxConfig>,
    pub shear: Option<FileShearConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePathsConfig {
    pub build_dir: Option<String>,
    pub relax_dir: Option<String>,
    pub shear_dir: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePotentialConfig {
    pub file: Option<PathBuf>,
    pub pair_style: Option<String>,
    pub elements: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileEngineConfig {
    pub binary: Option<PathBuf>,
    pub mpi_launcher: Option<PathBuf>,
    pub mpi_processes: Option<u32>,
    pub accelerator_args: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileToolsConfig {
    pub atomsk: Option<PathBuf>,
    pub generator: Option<PathBuf>,
    pub generator_args: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileBuildMode {
    PeriodicArray,
    Bicrystal,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileFitSource {
    Engine,
    Known,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBuildConfig {
    pub mode: Option<FileBuildMode>,
    pub output_name: Option<String>,
    pub fit: Option<FileFitConfig>,
    pub periodic_array: Option<FilePeriodicArrayConfig>,
    pub bicrystal: Option<FileBicrystalConfig>,
}

/// Either the engine fit settings or known constants, selected by `source`.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileFitConfig {
    pub source: Option<FileFitSource>,
    pub lattice_guess: Option<f64>,
    pub strain: Option<f64>,
    pub lattice_constant: Option<f64>,
    pub c11: Option<f64>,
    pub c12: Option<f64>,
    pub c44: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePeriodicArrayConfig {
    pub burgers: Option<CrystalVector>,
    pub slip_plane: Option<CrystalVector>,
    pub line_direction: Option<CrystalVector>,
    pub min_lengths: Option<[f64; 3]>,
    pub boundary_width: Option<f64>,
    pub boundary_scale: Option<bool>,
    pub shift: Option<[f64; 3]>,
    pub shift_scale: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBicrystalConfig {
    pub orientation: Option<[CrystalVector; 3]>,
    pub min_lengths: Option<[f64; 3]>,
    pub transport_axis: Option<Axis>,
    pub merge_axis: Option<Axis>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRelaxConfig {
    pub energy_tolerance: Option<f64>,
    pub force_tolerance: Option<f64>,
    pub max_iterations: Option<u64>,
    pub max_evaluations: Option<u64>,
    pub thermo_every: Option<u64>,
    pub dump_columns: Option<Vec<String>>,
    pub output_name: Option<String>,
    pub dump_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileShearConfig {
    pub precipitate_radius: Option<f64>,
    pub initial_offset: Option<f64>,
    pub surface_depth: Option<f64>,
    pub displacement_axis: Option<Axis>,
    pub shear_axis: Option<Axis>,
    pub timestep: Option<f64>,
    pub temperature: Option<f64>,
    pub shear_velocity: Option<f64>,
    pub damping_factor: Option<f64>,
    pub velocity_seed: Option<u32>,
    pub steps: Option<u64>,
    pub thermo_every: Option<u64>,
    pub dump_every: Option<u64>,
    pub restart_every: Option<u64>,
    pub dump_columns: Option<Vec<String>>,
    pub final_name: Option<String>,
}

impl FileConfig {
    /// Reads `path` and applies `-S key=value` overrides before deserializing, so overridden
    /// keys are validated exactly like keys written in the file.
    pub fn load(path: Option<&Path>, set_values: &[String]) -> Result<Self> {
        let mut table = match path {
            Some(path) => {
                debug!("Reading configuration file {}", path.display());
                let text = fs::read_to_string(path).map_err(|e| CliError::FileParsing {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?;
                toml::from_str::<Table>(&text).map_err(|e| CliError::FileParsing {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?
            }
            None => Table::new(),
        };
        apply_set_values(&mut table, set_values)?;
        let merged = toml::to_string(&table).map_err(|e| CliError::Config(e.to_string()))?;
        toml::from_str(&merged).map_err(|e| CliError::Config(e.to_string()))
    }
}

/// Parses the right-hand side of an override as a TOML value; bare words become strings.
fn parse_override_value(raw: &str) -> Value {
    let raw = raw.trim();
    toml::from_str::<Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn apply_set_values(table: &mut Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let Some((key, raw_value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let segments: Vec<&str> = key.trim().split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CliError::Config(format!(
                "Invalid configuration key for --set: '{}'",
                key
            )));
        }
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| CliError::Config(format!("Empty key in --set '{}'", kv_pair)))?;
        let mut current = &mut *table;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert(Value::Table(Table::new()));
            current = entry.as_table_mut().ok_or_else(|| {
                CliError::Config(format!("'{}' in '{}' is not a table", segment, key))
            })?;
        }
        debug!("Override {} = {}", key, raw_value);
        current.insert(last.to_string(), parse_override_value(raw_value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_nested_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dislopin.toml");
        fs::write(
            &path,
            r#"
            data-root = "/scratch/fe"

            [potential]
            file = "pots/malerba.fs"

            [build]
            mode = "bicrystal"

            [build.bicrystal]
            orientation = ["[1 1 1]", "[-1 1 0]", "[-1 -1 2]"]
            merge-axis = "y"

            [shear]
            precipitate-radius = 20.0
            shear-axis = "z"
            "#,
        )
        .unwrap();

        let config = FileConfig::load(Some(&path), &[]).unwrap();
        assert_eq!(config.data_root, Some(PathBuf::from("/scratch/fe")));
        let build = config.build.unwrap();
        assert_eq!(build.mode, Some(FileBuildMode::Bicrystal));
        let bicrystal = build.bicrystal.unwrap();
        assert_eq!(
            bicrystal.orientation.unwrap()[1],
            CrystalVector::new(-1.0, 1.0, 0.0)
        );
        assert_eq!(bicrystal.merge_axis, Some(Axis::Y));
        let shear = config.shear.unwrap();
        assert_eq!(shear.precipitate_radius, Some(20.0));
        assert_eq!(shear.shear_axis, Some(Axis::Z));
    }

    #[test]
    fn set_values_create_and_replace_keys() {
        let config = FileConfig::load(
            None,
            &[
                "shear.steps=5000".to_string(),
                "shear.temperature=600".to_string(),
                "shear.dump-columns=[\"id\", \"x\"]".to_string(),
                "paths.shear-dir=pin_run".to_string(),
                "engine.mpi-processes=8".to_string(),
            ],
        )
        .unwrap();
        let shear = config.shear.unwrap();
        assert_eq!(shear.steps, Some(5000));
        assert_eq!(shear.temperature, Some(600.0));
        assert_eq!(shear.dump_columns, Some(vec!["id".to_string(), "x".to_string()]));
        assert_eq!(config.paths.unwrap().shear_dir.as_deref(), Some("pin_run"));
        assert_eq!(config.engine.unwrap().mpi_processes, Some(8));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = FileConfig::load(None, &["shear.pressure=1.0".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn malformed_override_is_rejected() {
        let err = FileConfig::load(None, &["shear.steps".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Expected KEY=VALUE"));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = FileConfig::load(Some(Path::new("/nonexistent/dislopin.toml")), &[]).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { .. }));
    }
}
