use super::process::{ExternalCommand, ProcessError};
use super::workspace::discard_stale;
use crate::core::models::crystal::{CrystalError, CrystalVector};
use crate::core::models::simulation_box::Axis;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureToolError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Orientation vector {vector} is not a lattice direction: {source}")]
    Orientation {
        vector: CrystalVector,
        #[source]
        source: CrystalError,
    },
    #[error("Failed to clear '{path}' before writing it: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Structure tool finished but produced no file at '{}'", .0.display())]
    MissingOutput(PathBuf),
}

/// A crystal-building tool that writes every result to a file.
///
/// Each operation is one blocking invocation whose exit status is checked.
pub trait StructureTool {
    /// Writes the oriented cubic unit cell of `element` with lattice constant `a`.
    fn create_unit_cell(
        &self,
        lattice: &str,
        lattice_constant: f64,
        element: &str,
        orientation: &[CrystalVector; 3],
        output: &Path,
    ) -> Result<(), StructureToolError>;

    /// Replicates `input` and optionally applies a uniaxial strain along one axis.
    fn duplicate(
        &self,
        input: &Path,
        replicas: [u32; 3],
        strain: Option<(Axis, f64)>,
        output: &Path,
    ) -> Result<(), StructureToolError>;

    /// Stacks `inputs` along `axis` into a single configuration.
    fn merge(&self, axis: Axis, inputs: &[PathBuf], output: &Path) -> Result<(), StructureToolError>;
}

fn orient_arg(vector: &CrystalVector) -> Result<String, StructureToolError> {
    let [u, v, w] = vector
        .miller_indices()
        .map_err(|source| StructureToolError::Orientation {
            vector: *vector,
            source,
        })?;
    if [u, v, w].iter().any(|i| i.abs() > 9) {
        Ok(format!("[{}_{}_{}]", u, v, w))
    } else {
        Ok(format!("[{}{}{}]", u, v, w))
    }
}

/// Drives the `atomsk` command-line program.
#[derive(Debug, Clone)]
pub struct Atomsk {
    pub program: PathBuf,
    pub working_dir: Option<PathBuf>,
}

impl Atomsk {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
        }
    }

    /// Runs `cmd` so that only a file it writes now can satisfy `output`.
    fn run_into(&self, cmd: ExternalCommand, output: &Path) -> Result<(), StructureToolError> {
        discard_stale(output).map_err(|source| StructureToolError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        cmd.run()?;
        if output.is_file() {
            Ok(())
        } else {
            Err(StructureToolError::MissingOutput(output.to_path_buf()))
        }
    }

    fn command(&self) -> ExternalCommand {
        let cmd = ExternalCommand::new(&self.program);
        match &self.working_dir {
            Some(dir) => cmd.current_dir(dir),
            None => cmd,
        }
    }

    pub fn create_command(
        &self,
        lattice: &str,
        lattice_constant: f64,
        element: &str,
        orientation: &[CrystalVector; 3],
        output: &Path,
    ) -> Result<ExternalCommand, StructureToolError> {
        let mut cmd = self
            .command()
            .args(["--create", lattice])
            .arg(lattice_constant.to_string())
            .args([element, "orient"]);
        for vector in orientation {
            cmd = cmd.arg(orient_arg(vector)?);
        }
        Ok(cmd.arg(output.to_string_lossy()).arg("-ow"))
    }

    pub fn duplicate_command(
        &self,
        input: &Path,
        replicas: [u32; 3],
        strain: Option<(Axis, f64)>,
        output: &Path,
    ) -> ExternalCommand {
        let mut cmd = self
            .command()
            .arg(input.to_string_lossy())
            .arg("-duplicate")
            .args(replicas.map(|n| n.to_string()));
        if let Some((axis, epsilon)) = strain {
            cmd = cmd
                .arg("-deform")
                .args([axis.label().to_string(), epsilon.to_string(), "0.0".to_string()]);
        }
        cmd.arg(output.to_string_lossy()).arg("-ow")
    }

    pub fn merge_command(&self, axis: Axis, inputs: &[PathBuf], output: &Path) -> ExternalCommand {
        self.command()
            .arg("--merge")
            .arg(axis.label())
            .arg(inputs.len().to_string())
            .args(inputs.iter().map(|p| p.to_string_lossy().into_owned()))
            .arg(output.to_string_lossy())
            .arg("-ow")
    }
}

impl StructureTool for Atomsk {
    fn create_unit_cell(
        &self,
        lattice: &str,
        lattice_constant: f64,
        element: &str,
        orientation: &[CrystalVector; 3],
        output: &Path,
    ) -> Result<(), StructureToolError> {
        let cmd = self.create_command(lattice, lattice_constant, element, orientation, output)?;
        self.run_into(cmd, output)
    }

    fn duplicate(
        &self,
        input: &Path,
        replicas: [u32; 3],
        strain: Option<(Axis, f64)>,
        output: &Path,
    ) -> Result<(), StructureToolError> {
        self.run_into(self.duplicate_command(input, replicas, strain, output), output)
    }

    fn merge(&self, axis: Axis, inputs: &[PathBuf], output: &Path) -> Result<(), StructureToolError> {
        self.run_into(self.merge_command(axis, inputs, output), output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orientation() -> [CrystalVector; 3] {
        [
            CrystalVector::new(1.0, 1.0, 1.0),
            CrystalVector::new(-1.0, -1.0, 2.0),
            CrystalVector::new(1.0, -1.0, 0.0),
        ]
    }

    #[test]
    fn create_command_uses_integer_orientations() {
        let tool = Atomsk::new("atomsk");
        let cmd = tool
            .create_command("bcc", 2.855, "Fe", &orientation(), Path::new("unit.lmp"))
            .unwrap();
        assert_eq!(
            cmd.to_string(),
            "atomsk --create bcc 2.855 Fe orient [111] [-1-12] [1-10] unit.lmp -ow"
        );
    }

    #[test]
    fn duplicate_command_with_strain() {
        let tool = Atomsk::new("atomsk");
        let cmd = tool.duplicate_command(
            Path::new("unit.lmp"),
            [20, 10, 8],
            Some((Axis::X, 0.025)),
            Path::new("lower.lmp"),
        );
        assert_eq!(
            cmd.to_string(),
            "atomsk unit.lmp -duplicate 20 10 8 -deform x 0.025 0.0 lower.lmp -ow"
        );
    }

    #[test]
    fn merge_command_lists_inputs() {
        let tool = Atomsk::new("/opt/atomsk");
        let cmd = tool.merge_command(
            Axis::Y,
            &[PathBuf::from("lower.lmp"), PathBuf::from("upper.lmp")],
            Path::new("input.lmp"),
        );
        assert_eq!(
            cmd.to_string(),
            "/opt/atomsk --merge y 2 lower.lmp upper.lmp input.lmp -ow"
        );
    }

    #[test]
    fn large_indices_are_underscore_separated() {
        let tool = Atomsk::new("atomsk");
        let orientation = [
            CrystalVector::new(1.0, 1.0, 10.0),
            CrystalVector::new(-10.0, 0.0, 1.0),
            CrystalVector::new(1.0, -101.0, 10.0),
        ];
        let cmd = tool
            .create_command("bcc", 2.855, "Fe", &orientation, Path::new("unit.lmp"))
            .unwrap();
        assert_eq!(
            cmd.to_string(),
            "atomsk --create bcc 2.855 Fe orient [1_1_10] [-10_0_1] [1_-101_10] unit.lmp -ow"
        );
    }

    #[cfg(unix)]
    #[test]
    fn stale_output_is_cleared_before_the_tool_runs() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("lower.lmp");
        std::fs::write(&output, "previous run").unwrap();
        let tool = Atomsk::new("true");
        let err = tool
            .duplicate(&dir.path().join("unit.lmp"), [2, 2, 2], None, &output)
            .unwrap_err();
        assert!(matches!(err, StructureToolError::MissingOutput(ref path) if *path == output));
        assert!(!output.exists());
    }

    #[test]
    fn irrational_orientation_is_rejected() {
        let tool = Atomsk::new("atomsk");
        let bad = [
            CrystalVector::new(std::f64::consts::PI, 0.0, 0.0),
            CrystalVector::new(0.0, 1.0, 0.0),
            CrystalVector::new(0.0, 0.0, 1.0),
        ];
        assert!(matches!(
            tool.create_command("bcc", 2.855, "Fe", &bad, Path::new("unit.lmp")),
            Err(StructureToolError::Orientation { .. })
        ));
    }
}
