use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Build,
    Relax,
    Shear,
}

impl Stage {
    /// Short identifier used for script and log file names.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Relax => "relax",
            Stage::Shear => "shear",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Build => "configuration builder",
            Stage::Relax => "relaxation",
            Stage::Shear => "defect-interaction",
        })
    }
}

/// Removes a file left by an earlier run. A missing file is not an error.
pub fn discard_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// The directory tree a stage writes into.
///
/// `<root>/{output,dump,logs}` for every stage, plus `restarts/` for the dynamics stage.
/// Directories are created on demand and never cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWorkspace {
    pub stage: Stage,
    pub root: PathBuf,
}

impl StageWorkspace {
    pub fn new(stage: Stage, root: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            root: root.into(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn dump_dir(&self) -> PathBuf {
        self.root.join("dump")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn restarts_dir(&self) -> PathBuf {
        self.root.join("restarts")
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }

    pub fn dump(&self, name: &str) -> PathBuf {
        self.dump_dir().join(name)
    }

    pub fn log(&self, name: &str) -> PathBuf {
        self.logs_dir().join(name)
    }

    pub fn restart(&self, name: &str) -> PathBuf {
        self.restarts_dir().join(name)
    }

    fn directories(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.output_dir(), self.dump_dir(), self.logs_dir()];
        if self.stage == Stage::Shear {
            dirs.push(self.restarts_dir());
        }
        dirs
    }

    /// Creates the stage directories if missing. Existing contents are left untouched.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in self.directories() {
            fs::create_dir_all(&dir)?;
            debug!("Ensured {} directory {}", self.stage, dir.display());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_creates_stage_directories() {
        let dir = tempdir().unwrap();
        let ws = StageWorkspace::new(Stage::Relax, dir.path().join("02_minimize"));
        ws.ensure().unwrap();
        assert!(ws.output_dir().is_dir());
        assert!(ws.dump_dir().is_dir());
        assert!(ws.logs_dir().is_dir());
        assert!(!ws.restarts_dir().exists());
    }

    #[test]
    fn shear_workspace_has_restarts() {
        let dir = tempdir().unwrap();
        let ws = StageWorkspace::new(Stage::Shear, dir.path());
        ws.ensure().unwrap();
        assert!(ws.restarts_dir().is_dir());
    }

    #[test]
    fn ensure_is_idempotent_and_keeps_contents() {
        let dir = tempdir().unwrap();
        let ws = StageWorkspace::new(Stage::Build, dir.path());
        ws.ensure().unwrap();
        fs::write(ws.output("input.lmp"), "keep me").unwrap();
        ws.ensure().unwrap();
        assert_eq!(fs::read_to_string(ws.output("input.lmp")).unwrap(), "keep me");
    }

    #[test]
    fn discard_stale_tolerates_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.lmp");
        discard_stale(&path).unwrap();
        fs::write(&path, "old").unwrap();
        discard_stale(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Shear.to_string(), "defect-interaction");
        assert_eq!(Stage::Relax.key(), "relax");
    }
}
