//! In-process stand-ins for the external programs, used by the workflow tests.
//!
//! They write the same files the real collaborators would, so the workflows run end to end
//! inside a temporary directory.

use crate::core::geometry::region::Region;
use crate::core::io::dump::{DumpFrame, expand_step_template, write_frame};
use crate::core::io::lammps_data::LammpsDataFile;
use crate::core::io::traits::ConfigurationFile;
use crate::core::models::atom::Atom;
use crate::core::models::configuration::AtomicConfiguration;
use crate::core::models::crystal::CrystalVector;
use crate::core::models::potential::{ElasticConstants, FittedPotential, PotentialModel};
use crate::core::models::simulation_box::{Axis, Periodicity, SimulationBox};
use crate::engine::atomsk::{StructureTool, StructureToolError};
use crate::engine::generator::{DislocationGenerator, DislocationJob, GeneratorError};
use crate::engine::lammps::{EngineJob, MdEngine};
use crate::engine::process::ProcessError;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::{Point3, Vector3};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub fn fitted_iron() -> FittedPotential {
    FittedPotential {
        lattice_constant: 2.8553,
        elastic: ElasticConstants {
            c11: 243.0,
            c12: 145.0,
            c44: 116.0,
        },
    }
}

pub fn potential_file(dir: &Path) -> PotentialModel {
    let file = dir.join("malerba.fs");
    fs::write(&file, "# tabulated potential placeholder\n").unwrap();
    PotentialModel::new(file, "eam/fs", &["Fe"])
}

/// A reporter that keeps every event it receives.
pub fn recording_reporter() -> (ProgressReporter<'static>, Arc<Mutex<Vec<Progress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let reporter = ProgressReporter::with_callback(Box::new(move |event| {
        sink.lock().unwrap().push(event);
    }));
    (reporter, events)
}

/// A cubic grid of atoms filling `[0, extents]`, `spacing` apart.
pub fn grid(extents: [f64; 3], spacing: f64, periodicity: Periodicity) -> AtomicConfiguration {
    let counts = extents.map(|e| (e / spacing).round().max(1.0) as usize);
    let mut config = AtomicConfiguration::new(SimulationBox::new([0.0; 3], extents, periodicity), 1);
    config.masses.insert(1, 55.845);
    let mut id = 1;
    for i in 0..counts[0] {
        for j in 0..counts[1] {
            for k in 0..counts[2] {
                let position = Point3::new(
                    (i as f64 + 0.5) * spacing,
                    (j as f64 + 0.5) * spacing,
                    (k as f64 + 0.5) * spacing,
                );
                config.push(Atom::new(id, 1, position)).unwrap();
                id += 1;
            }
        }
    }
    config
}

fn process_failure(message: &str) -> ProcessError {
    ProcessError::Reported {
        command: "fake".to_string(),
        message: message.to_string(),
    }
}

/// An engine that must not be reached.
pub struct NoEngine;

impl MdEngine for NoEngine {
    fn execute(&self, _: &EngineJob, _: &mut dyn FnMut(&str)) -> Result<(), ProcessError> {
        Err(process_failure("no engine available in this test"))
    }
}

/// Writes a lattice-aligned grid covering `shrink` times the requested lengths.
pub struct FakeGenerator {
    pub shrink: f64,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self { shrink: 1.0 }
    }
}

impl DislocationGenerator for FakeGenerator {
    fn generate(&self, job: &DislocationJob, job_path: &Path) -> Result<(), GeneratorError> {
        fs::write(job_path, job.to_toml()?).unwrap();
        let a = job.lattice_constant;
        let extents = job
            .min_lengths
            .map(|m| ((m * self.shrink) / a).ceil() * a);
        let config = grid(extents, a, Periodicity::fully_periodic());
        LammpsDataFile::write_to_path(&config, &job.output).unwrap();
        Ok(())
    }
}

/// Creates, replicates and stacks boxes the way the structure tool would, with one atom per
/// cell.
pub struct FakeStructureTool;

impl StructureTool for FakeStructureTool {
    fn create_unit_cell(
        &self,
        _: &str,
        lattice_constant: f64,
        _: &str,
        orientation: &[CrystalVector; 3],
        output: &Path,
    ) -> Result<(), StructureToolError> {
        let mut extents = [0.0; 3];
        for (extent, vector) in extents.iter_mut().zip(orientation) {
            let [u, v, w] = vector.miller_indices().unwrap();
            *extent = lattice_constant * ((u * u + v * v + w * w) as f64).sqrt();
        }
        let mut config = AtomicConfiguration::new(
            SimulationBox::new([0.0; 3], extents, Periodicity::fully_periodic()),
            1,
        );
        config.masses.insert(1, 55.845);
        let center = Point3::from(Vector3::from(extents) * 0.5);
        config.push(Atom::new(1, 1, center)).unwrap();
        LammpsDataFile::write_to_path(&config, output).unwrap();
        Ok(())
    }

    fn duplicate(
        &self,
        input: &Path,
        replicas: [u32; 3],
        strain: Option<(Axis, f64)>,
        output: &Path,
    ) -> Result<(), StructureToolError> {
        let cell = LammpsDataFile::read_from_path(input).unwrap();
        let mut scale = [1.0; 3];
        if let Some((axis, epsilon)) = strain {
            scale[axis.index()] += epsilon;
        }
        let cell_extents = cell.simulation_box.extents();
        let extents = std::array::from_fn(|i| cell_extents[i] * f64::from(replicas[i]) * scale[i]);
        let mut config = AtomicConfiguration::new(
            SimulationBox::new([0.0; 3], extents, Periodicity::fully_periodic()),
            1,
        );
        config.masses = cell.masses.clone();
        let mut id = 1;
        for i in 0..replicas[0] {
            for j in 0..replicas[1] {
                for k in 0..replicas[2] {
                    let offset = Vector3::new(
                        f64::from(i) * cell_extents[0],
                        f64::from(j) * cell_extents[1],
                        f64::from(k) * cell_extents[2],
                    );
                    for atom in cell.atoms() {
                        let p = atom.position + offset;
                        let position = Point3::new(p.x * scale[0], p.y * scale[1], p.z * scale[2]);
                        config.push(Atom::new(id, 1, position)).unwrap();
                        id += 1;
                    }
                }
            }
        }
        LammpsDataFile::write_to_path(&config, output).unwrap();
        Ok(())
    }

    fn merge(&self, axis: Axis, inputs: &[PathBuf], output: &Path) -> Result<(), StructureToolError> {
        let parts: Vec<AtomicConfiguration> = inputs
            .iter()
            .map(|p| LammpsDataFile::read_from_path(p).unwrap())
            .collect();
        let mut upper = [0.0f64; 3];
        let mut offset = 0.0;
        let mut atoms = Vec::new();
        for part in &parts {
            for atom in part.atoms() {
                let mut position = atom.position;
                position[axis.index()] += offset;
                atoms.push(position);
            }
            for other in Axis::ALL.into_iter().filter(|a| *a != axis) {
                upper[other.index()] = upper[other.index()].max(part.simulation_box.extent(other));
            }
            offset += part.simulation_box.extent(axis);
        }
        upper[axis.index()] = offset;
        let mut config = AtomicConfiguration::new(
            SimulationBox::new([0.0; 3], upper, Periodicity::fully_periodic()),
            1,
        );
        config.masses.insert(1, 55.845);
        for (index, position) in atoms.into_iter().enumerate() {
            config.push(Atom::new(index as u64 + 1, 1, position)).unwrap();
        }
        LammpsDataFile::write_to_path(&config, output).unwrap();
        Ok(())
    }
}

/// Interprets the handful of directives the workflows rely on and fabricates the engine's
/// outputs: log file, thermo tables, minimization stats, dumps, restarts and data files.
pub struct FakeLammps {
    pub criterion: &'static str,
    /// Potential energies reported by a minimization, first to last.
    pub energies: Vec<f64>,
    pub scripts: RefCell<Vec<String>>,
}

impl Default for FakeLammps {
    fn default() -> Self {
        Self {
            criterion: "energy tolerance",
            energies: vec![-1000.0, -1000.4, -1000.45],
            scripts: RefCell::new(Vec::new()),
        }
    }
}

fn thermo_header(columns: &[&str]) -> String {
    let names: Vec<&str> = columns
        .iter()
        .map(|c| match *c {
            "step" => "Step",
            "temp" => "Temp",
            "pe" => "PotEng",
            "etotal" => "TotEng",
            "fnorm" => "Fnorm",
            other => other,
        })
        .collect();
    names.join(" ")
}

impl FakeLammps {
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.borrow().clone()
    }
}

impl MdEngine for FakeLammps {
    fn execute(&self, job: &EngineJob, on_line: &mut dyn FnMut(&str)) -> Result<(), ProcessError> {
        job.write_script()?;
        self.scripts.borrow_mut().push(job.script.render());

        let mut log = String::new();
        let mut config: Option<AtomicConfiguration> = None;
        let mut thermo_columns: Vec<String> = Vec::new();
        let mut precipitate: Option<Region> = None;
        let mut dump: Option<(u64, String)> = None;
        let mut restart: Option<(u64, String)> = None;

        for line in job.script.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(command) = tokens.first() else { continue };
            log.push_str(line);
            log.push('\n');
            match *command {
                "read_data" => {
                    config = Some(LammpsDataFile::read_from_path(tokens[1]).map_err(|e| {
                        process_failure(&format!("ERROR: read_data failed: {}", e))
                    })?);
                }
                "displace_atoms" => {
                    let d: Vec<f64> = tokens[3..6].iter().map(|t| t.parse().unwrap()).collect();
                    if let Some(config) = config.as_mut() {
                        config.displace(&Vector3::new(d[0], d[1], d[2]));
                    }
                }
                "region" if tokens[2] == "sphere" => {
                    let v: Vec<f64> = tokens[3..7].iter().map(|t| t.parse().unwrap()).collect();
                    precipitate = Some(Region::Sphere {
                        center: Point3::new(v[0], v[1], v[2]),
                        radius: v[3],
                    });
                }
                "thermo_style" => {
                    thermo_columns = tokens[2..].iter().map(|t| t.to_string()).collect();
                }
                "dump" => dump = Some((tokens[4].parse().unwrap(), tokens[5].to_string())),
                "restart" => restart = Some((tokens[1].parse().unwrap(), tokens[2].to_string())),
                "minimize" => {
                    let columns: Vec<&str> = thermo_columns.iter().map(String::as_str).collect();
                    let header = thermo_header(&columns);
                    log.push_str(&header);
                    log.push('\n');
                    on_line(&header);
                    for (step, energy) in self.energies.iter().enumerate() {
                        let mut row = vec![(step * 10).to_string(), energy.to_string()];
                        row.resize(columns.len(), "0.001".to_string());
                        let row = row.join(" ");
                        log.push_str(&row);
                        log.push('\n');
                        on_line(&row);
                    }
                    let n = self.energies.len();
                    log.push_str(&format!(
                        "Loop time of 0.5 on 1 procs for {} steps with 100 atoms\n\n\
                         Minimization stats:\n  Stopping criterion = {}\n  \
                         Energy initial, next-to-last, final = \n    {} {} {}\n  \
                         Iterations, force evaluations = {} {}\n",
                        (n - 1) * 10,
                        self.criterion,
                        self.energies[0],
                        self.energies[n.saturating_sub(2)],
                        self.energies[n - 1],
                        (n - 1) * 10,
                        (n - 1) * 20,
                    ));
                }
                "run" => {
                    let steps: u64 = tokens[1].parse().unwrap();
                    let columns: Vec<&str> = thermo_columns.iter().map(String::as_str).collect();
                    let header = thermo_header(&columns);
                    log.push_str(&header);
                    log.push('\n');
                    on_line(&header);
                    for step in [0, steps / 2, steps] {
                        let mut row = vec![step.to_string(), "800.0".to_string()];
                        row.resize(columns.len(), "-1.5".to_string());
                        let row = row.join(" ");
                        log.push_str(&row);
                        log.push('\n');
                        on_line(&row);
                    }
                    log.push_str(&format!("Loop time of 1.0 on 1 procs for {} steps\n", steps));
                    if let (Some((every, template)), Some(config)) = (&dump, &config) {
                        for step in (0..=steps).step_by(*every as usize) {
                            let path = expand_step_template(template, step);
                            let mut frame = DumpFrame::new(step, [[0.0, 1.0]; 3], &["id"]);
                            frame.rows = config.ids().map(|id| vec![id as f64]).collect();
                            write_frame(&frame, &mut fs::File::create(path).unwrap()).unwrap();
                        }
                    }
                    if let Some((every, template)) = &restart {
                        for step in (*every..=steps).step_by(*every as usize) {
                            fs::write(expand_step_template(template, step), b"restart").unwrap();
                        }
                    }
                }
                "write_dump" => {
                    let group = tokens[1];
                    let Some(config) = &config else { continue };
                    let columns: Vec<&str> = tokens[4..].to_vec();
                    let mut frame = DumpFrame::new(0, [[0.0, 1.0]; 3], &columns);
                    for atom in config.atoms() {
                        let selected = match (group, &precipitate) {
                            ("all", _) => true,
                            ("precipitate", Some(region)) => region.contains(&atom.position),
                            _ => false,
                        };
                        if selected {
                            let mut row = vec![atom.id as f64];
                            row.resize(columns.len(), 0.0);
                            frame.rows.push(row);
                        }
                    }
                    write_frame(&frame, &mut fs::File::create(tokens[3]).unwrap()).unwrap();
                }
                "write_data" => {
                    let Some(config) = &config else { continue };
                    LammpsDataFile::write_to_path(config, tokens[1]).unwrap();
                }
                _ => {}
            }
        }
        fs::write(&job.log_path, log).map_err(|source| ProcessError::Io {
            command: "fake".to_string(),
            source,
        })?;
        Ok(())
    }
}
