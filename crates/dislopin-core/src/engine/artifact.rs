use super::error::PipelineError;
use super::workspace::Stage;
use crate::core::io::lammps_data::LammpsDataFile;
use crate::core::io::traits::ConfigurationFile;
use crate::core::models::configuration::AtomicConfiguration;
use crate::core::models::simulation_box::{Periodicity, SimulationBox};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MANIFEST_SUFFIX: &str = "manifest.toml";

/// Sidecar record written next to every stage output data file.
///
/// LAMMPS data files do not carry boundary flags, so the manifest is where a downstream
/// stage learns the periodicity it must declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ArtifactManifest {
    pub stage: Stage,
    pub data_file: String,
    pub atom_count: usize,
    pub atom_types: u32,
    #[serde(rename = "box")]
    pub simulation_box: SimulationBox,
}

/// A data file together with its manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationArtifact {
    pub data_path: PathBuf,
    pub manifest: ArtifactManifest,
}

impl ConfigurationArtifact {
    pub fn manifest_path(data_path: &Path) -> PathBuf {
        let mut name = data_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(MANIFEST_SUFFIX);
        data_path.with_file_name(name)
    }

    /// Writes the manifest for a data file `stage` has just produced.
    pub fn record(
        stage: Stage,
        data_path: &Path,
        config: &AtomicConfiguration,
    ) -> Result<Self, PipelineError> {
        let manifest = ArtifactManifest {
            stage,
            data_file: data_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            atom_count: config.len(),
            atom_types: config.atom_types,
            simulation_box: config.simulation_box.clone(),
        };
        let text = toml::to_string_pretty(&manifest).map_err(|e| PipelineError::Artifact {
            stage,
            message: format!("cannot serialize manifest: {}", e),
        })?;
        let manifest_path = Self::manifest_path(data_path);
        fs::write(&manifest_path, text).map_err(PipelineError::io(stage, &manifest_path))?;
        debug!("Recorded artifact manifest {}", manifest_path.display());
        Ok(Self {
            data_path: data_path.to_path_buf(),
            manifest,
        })
    }

    /// Opens an artifact on behalf of the `consumer` stage.
    pub fn open(data_path: &Path, consumer: Stage) -> Result<Self, PipelineError> {
        let rejected = |message: String| PipelineError::Artifact {
            stage: consumer,
            message,
        };
        if !data_path.is_file() {
            return Err(rejected(format!(
                "data file '{}' does not exist",
                data_path.display()
            )));
        }
        let manifest_path = Self::manifest_path(data_path);
        let text = fs::read_to_string(&manifest_path).map_err(|e| {
            rejected(format!(
                "cannot read manifest '{}': {}",
                manifest_path.display(),
                e
            ))
        })?;
        let manifest: ArtifactManifest = toml::from_str(&text).map_err(|e| {
            rejected(format!(
                "malformed manifest '{}': {}",
                manifest_path.display(),
                e
            ))
        })?;
        Ok(Self {
            data_path: data_path.to_path_buf(),
            manifest,
        })
    }

    pub fn periodicity(&self) -> Periodicity {
        self.manifest.simulation_box.periodicity
    }

    /// Reads the data file and applies the recorded boundary flags.
    pub fn load(&self, consumer: Stage) -> Result<AtomicConfiguration, PipelineError> {
        let mut config = LammpsDataFile::read_from_path(&self.data_path)
            .map_err(PipelineError::data_file(consumer, &self.data_path))?;
        if config.len() != self.manifest.atom_count {
            return Err(PipelineError::Artifact {
                stage: consumer,
                message: format!(
                    "'{}' holds {} atoms but its manifest records {}",
                    self.data_path.display(),
                    config.len(),
                    self.manifest.atom_count
                ),
            });
        }
        config.set_periodicity(self.periodicity());
        info!(
            "Loaded {} atoms from {} ({})",
            config.len(),
            self.data_path.display(),
            config.simulation_box.periodicity
        );
        Ok(config)
    }

    fn expect_stage(self, producer: Stage, consumer: Stage) -> Result<Self, PipelineError> {
        if self.manifest.stage != producer {
            return Err(PipelineError::Artifact {
                stage: consumer,
                message: format!(
                    "'{}' was produced by the {} stage, expected the {} stage",
                    self.data_path.display(),
                    self.manifest.stage,
                    producer
                ),
            });
        }
        Ok(self)
    }

    /// Wraps a foreign data file without a manifest, taking its boundary flags from the caller.
    fn adopt(
        producer: Stage,
        consumer: Stage,
        data_path: &Path,
        periodicity: Periodicity,
    ) -> Result<Self, PipelineError> {
        let mut config = LammpsDataFile::read_from_path(data_path)
            .map_err(PipelineError::data_file(consumer, data_path))?;
        config.set_periodicity(periodicity);
        Ok(Self {
            data_path: data_path.to_path_buf(),
            manifest: ArtifactManifest {
                stage: producer,
                data_file: data_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                atom_count: config.len(),
                atom_types: config.atom_types,
                simulation_box: config.simulation_box,
            },
        })
    }
}

/// Output of the configuration builder, consumed by the relaxation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltConfiguration(ConfigurationArtifact);

impl BuiltConfiguration {
    pub(crate) fn new(artifact: ConfigurationArtifact) -> Self {
        Self(artifact)
    }

    pub fn open(data_path: &Path) -> Result<Self, PipelineError> {
        ConfigurationArtifact::open(data_path, Stage::Relax)?
            .expect_stage(Stage::Build, Stage::Relax)
            .map(Self)
    }

    pub fn adopt(data_path: &Path, periodicity: Periodicity) -> Result<Self, PipelineError> {
        ConfigurationArtifact::adopt(Stage::Build, Stage::Relax, data_path, periodicity).map(Self)
    }

    pub fn artifact(&self) -> &ConfigurationArtifact {
        &self.0
    }

    pub fn path(&self) -> &Path {
        &self.0.data_path
    }
}

/// Output of the relaxation stage, consumed by the defect-interaction stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxedConfiguration(ConfigurationArtifact);

impl RelaxedConfiguration {
    pub(crate) fn new(artifact: ConfigurationArtifact) -> Self {
        Self(artifact)
    }

    pub fn open(data_path: &Path) -> Result<Self, PipelineError> {
        ConfigurationArtifact::open(data_path, Stage::Shear)?
            .expect_stage(Stage::Relax, Stage::Shear)
            .map(Self)
    }

    pub fn adopt(data_path: &Path, periodicity: Periodicity) -> Result<Self, PipelineError> {
        ConfigurationArtifact::adopt(Stage::Relax, Stage::Shear, data_path, periodicity).map(Self)
    }

    pub fn artifact(&self) -> &ConfigurationArtifact {
        &self.0
    }

    pub fn path(&self) -> &Path {
        &self.0.data_path
    }
}
