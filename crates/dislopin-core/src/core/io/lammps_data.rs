use super::traits::ConfigurationFile;
use crate::core::models::atom::Atom;
use crate::core::models::configuration::{AtomicConfiguration, ConfigurationError};
use crate::core::models::simulation_box::{Periodicity, SimulationBox};
use nalgebra::{Point3, Vector3};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::debug;

const DEFAULT_TITLE: &str = "LAMMPS data file written by dislopin";

/// Atom styles whose `Atoms` section layout this module understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomStyle {
    /// `id type x y z [ix iy iz]`
    Atomic,
    /// `id type q x y z [ix iy iz]`
    Charge,
}

impl AtomStyle {
    pub fn name(self) -> &'static str {
        match self {
            AtomStyle::Atomic => "atomic",
            AtomStyle::Charge => "charge",
        }
    }

    fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim() {
            "atomic" => Some(AtomStyle::Atomic),
            "charge" => Some(AtomStyle::Charge),
            _ => None,
        }
    }

    fn infer(token_count: usize) -> Option<Self> {
        match token_count {
            5 | 8 => Some(AtomStyle::Atomic),
            6 | 9 => Some(AtomStyle::Charge),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LammpsDataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Missing required header entry: {0}")]
    MissingHeader(&'static str),
    #[error("Header declares {expected} atoms but the Atoms section has {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("Unsupported atom style '{0}' (supported: atomic, charge)")]
    UnsupportedAtomStyle(String),
    #[error("Velocity given for unknown atom id {0}")]
    UnknownVelocityId(u64),
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Header,
    Masses,
    Atoms(Option<AtomStyle>),
    Velocities,
    Skipped,
}

#[derive(Debug, Default)]
struct Header {
    atoms: Option<usize>,
    atom_types: Option<u32>,
    bounds: [Option<(f64, f64)>; 3],
    tilt: Option<[f64; 3]>,
}

fn parse_error(line: usize, message: impl Into<String>) -> LammpsDataError {
    LammpsDataError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_field<T: std::str::FromStr>(token: &str, what: &str, line: usize) -> Result<T, LammpsDataError> {
    token
        .parse()
        .map_err(|_| parse_error(line, format!("invalid {} '{}'", what, token)))
}

fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.split_once('#') {
        Some((content, comment)) => (content, Some(comment)),
        None => (line, None),
    }
}

impl Header {
    fn parse_line(&mut self, tokens: &[&str], line: usize) -> Result<(), LammpsDataError> {
        match tokens {
            [count, "atoms"] => self.atoms = Some(parse_field(count, "atom count", line)?),
            [count, "atom", "types"] => {
                self.atom_types = Some(parse_field(count, "atom type count", line)?)
            }
            [lo, hi, lo_label, hi_label] if lo_label.ends_with("lo") && hi_label.ends_with("hi") => {
                let index = match *lo_label {
                    "xlo" => 0,
                    "ylo" => 1,
                    "zlo" => 2,
                    other => return Err(parse_error(line, format!("unknown bound '{}'", other))),
                };
                let lo: f64 = parse_field(lo, "lower bound", line)?;
                let hi: f64 = parse_field(hi, "upper bound", line)?;
                if hi < lo {
                    return Err(parse_error(line, "upper bound below lower bound"));
                }
                self.bounds[index] = Some((lo, hi));
            }
            [xy, xz, yz, "xy", "xz", "yz"] => {
                self.tilt = Some([
                    parse_field(xy, "tilt factor", line)?,
                    parse_field(xz, "tilt factor", line)?,
                    parse_field(yz, "tilt factor", line)?,
                ]);
            }
            _ => debug!("Ignoring data file header line {}: {:?}", line, tokens),
        }
        Ok(())
    }
}

fn parse_atom_line(
    tokens: &[&str],
    style: Option<AtomStyle>,
    line: usize,
) -> Result<Atom, LammpsDataError> {
    let style = match style.or_else(|| AtomStyle::infer(tokens.len())) {
        Some(style) => style,
        None => {
            return Err(parse_error(
                line,
                format!("cannot infer atom style from {} columns", tokens.len()),
            ));
        }
    };
    let coordinate_offset = match style {
        AtomStyle::Atomic => 2,
        AtomStyle::Charge => 3,
    };
    let expected_short = coordinate_offset + 3;
    if tokens.len() != expected_short && tokens.len() != expected_short + 3 {
        return Err(parse_error(
            line,
            format!(
                "expected {} or {} columns for atom style '{}', found {}",
                expected_short,
                expected_short + 3,
                style.name(),
                tokens.len()
            ),
        ));
    }

    let id: u64 = parse_field(tokens[0], "atom id", line)?;
    let type_id: u32 = parse_field(tokens[1], "atom type", line)?;
    let mut atom = Atom::new(
        id,
        type_id,
        Point3::new(
            parse_field(tokens[coordinate_offset], "x coordinate", line)?,
            parse_field(tokens[coordinate_offset + 1], "y coordinate", line)?,
            parse_field(tokens[coordinate_offset + 2], "z coordinate", line)?,
        ),
    );
    if style == AtomStyle::Charge {
        atom.charge = Some(parse_field(tokens[2], "charge", line)?);
    }
    if tokens.len() == expected_short + 3 {
        atom.image = Some([
            parse_field(tokens[expected_short], "image flag", line)?,
            parse_field(tokens[expected_short + 1], "image flag", line)?,
            parse_field(tokens[expected_short + 2], "image flag", line)?,
        ]);
    }
    Ok(atom)
}

/// The LAMMPS structured atom-data format (`read_data` / `write_data`).
///
/// Box bounds, optional tilt factors, per-type masses, atoms and velocities are carried;
/// topology sections are skipped. Boundary flags are not part of the format, so a read
/// configuration is reported as fully periodic until the caller applies the real flags.
pub struct LammpsDataFile;

impl ConfigurationFile for LammpsDataFile {
    type Error = LammpsDataError;

    fn read_from(reader: &mut impl BufRead) -> Result<AtomicConfiguration, Self::Error> {
        let mut lines = reader.lines();
        let title = match lines.next() {
            Some(line) => line?.trim().to_string(),
            None => return Err(LammpsDataError::MissingHeader("atoms")),
        };

        let mut header = Header::default();
        let mut section = Section::Header;
        let mut atoms: Vec<Atom> = Vec::new();
        let mut velocities: Vec<(u64, Vector3<f64>)> = Vec::new();
        let mut masses = BTreeMap::new();

        for (index, line_res) in lines.enumerate() {
            let line = line_res?;
            let line_num = index + 2;
            let (content, comment) = split_comment(&line);
            let content = content.trim();
            if content.is_empty() {
                continue;
            }

            if content.starts_with(|c: char| c.is_ascii_alphabetic()) {
                section = match content {
                    "Masses" => Section::Masses,
                    "Atoms" => {
                        let style = match comment.map(str::trim).filter(|c| !c.is_empty()) {
                            Some(hint) => Some(AtomStyle::from_hint(hint).ok_or_else(|| {
                                LammpsDataError::UnsupportedAtomStyle(hint.to_string())
                            })?),
                            None => None,
                        };
                        if let Some(expected) = header.atoms {
                            atoms.reserve(expected);
                        }
                        Section::Atoms(style)
                    }
                    "Velocities" => Section::Velocities,
                    other => {
                        debug!("Skipping data file section '{}' at line {}", other, line_num);
                        Section::Skipped
                    }
                };
                continue;
            }

            let tokens: Vec<&str> = content.split_whitespace().collect();
            match section {
                Section::Header => header.parse_line(&tokens, line_num)?,
                Section::Masses => {
                    let [type_id, mass] = tokens[..] else {
                        return Err(parse_error(line_num, "expected 'type mass'"));
                    };
                    masses.insert(
                        parse_field::<u32>(type_id, "atom type", line_num)?,
                        parse_field::<f64>(mass, "mass", line_num)?,
                    );
                }
                Section::Atoms(style) => atoms.push(parse_atom_line(&tokens, style, line_num)?),
                Section::Velocities => {
                    let [id, vx, vy, vz] = tokens[..] else {
                        return Err(parse_error(line_num, "expected 'id vx vy vz'"));
                    };
                    velocities.push((
                        parse_field(id, "atom id", line_num)?,
                        Vector3::new(
                            parse_field(vx, "velocity", line_num)?,
                            parse_field(vy, "velocity", line_num)?,
                            parse_field(vz, "velocity", line_num)?,
                        ),
                    ));
                }
                Section::Skipped => {}
            }
        }

        let expected = header
            .atoms
            .ok_or(LammpsDataError::MissingHeader("atoms"))?;
        let atom_types = header
            .atom_types
            .ok_or(LammpsDataError::MissingHeader("atom types"))?;
        let labels = ["xlo xhi", "ylo yhi", "zlo zhi"];
        let mut lower = [0.0; 3];
        let mut upper = [0.0; 3];
        for (i, bound) in header.bounds.iter().enumerate() {
            let (lo, hi) = bound.ok_or(LammpsDataError::MissingHeader(labels[i]))?;
            lower[i] = lo;
            upper[i] = hi;
        }
        if atoms.len() != expected {
            return Err(LammpsDataError::CountMismatch {
                expected,
                found: atoms.len(),
            });
        }

        let mut simulation_box = SimulationBox::new(lower, upper, Periodicity::fully_periodic());
        simulation_box.tilt = header.tilt;
        let mut config = AtomicConfiguration::with_capacity(simulation_box, atom_types, expected);
        config.title = title;
        config.masses = masses;
        for atom in atoms {
            config.push(atom)?;
        }

        if !velocities.is_empty() {
            let index_of: HashMap<u64, usize> = config
                .atoms()
                .iter()
                .enumerate()
                .map(|(i, a)| (a.id, i))
                .collect();
            for (id, velocity) in velocities {
                let i = *index_of
                    .get(&id)
                    .ok_or(LammpsDataError::UnknownVelocityId(id))?;
                config.atoms_mut()[i].velocity = Some(velocity);
            }
        }

        Ok(config)
    }

    fn write_to(config: &AtomicConfiguration, writer: &mut impl Write) -> Result<(), Self::Error> {
        let title = if config.title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            config.title.replace(['\n', '\r'], " ")
        };
        writeln!(writer, "{}", title)?;
        writeln!(writer)?;
        writeln!(writer, "{} atoms", config.len())?;
        writeln!(writer, "{} atom types", config.atom_types)?;
        writeln!(writer)?;

        let b = &config.simulation_box;
        for (i, label) in ["xlo xhi", "ylo yhi", "zlo zhi"].iter().enumerate() {
            writeln!(writer, "{:.10} {:.10} {}", b.lower[i], b.upper[i], label)?;
        }
        if let Some([xy, xz, yz]) = b.tilt {
            writeln!(writer, "{:.10} {:.10} {:.10} xy xz yz", xy, xz, yz)?;
        }

        if !config.masses.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Masses")?;
            writeln!(writer)?;
            for (type_id, mass) in &config.masses {
                writeln!(writer, "{} {}", type_id, mass)?;
            }
        }

        let atoms = config.atoms();
        let style = if atoms.iter().any(|a| a.charge.is_some()) {
            AtomStyle::Charge
        } else {
            AtomStyle::Atomic
        };
        let with_images = !atoms.is_empty() && atoms.iter().all(|a| a.image.is_some());

        writeln!(writer)?;
        writeln!(writer, "Atoms # {}", style.name())?;
        writeln!(writer)?;
        for atom in atoms {
            write!(writer, "{} {}", atom.id, atom.type_id)?;
            if style == AtomStyle::Charge {
                write!(writer, " {}", atom.charge.unwrap_or(0.0))?;
            }
            write!(
                writer,
                " {:.10} {:.10} {:.10}",
                atom.position.x, atom.position.y, atom.position.z
            )?;
            if let (true, Some([ix, iy, iz])) = (with_images, atom.image) {
                write!(writer, " {} {} {}", ix, iy, iz)?;
            }
            writeln!(writer)?;
        }

        if atoms.iter().any(|a| a.velocity.is_some()) {
            writeln!(writer)?;
            writeln!(writer, "Velocities")?;
            writeln!(writer)?;
            for atom in atoms {
                let v = atom.velocity.unwrap_or_else(Vector3::zeros);
                writeln!(writer, "{} {:.10} {:.10} {:.10}", atom.id, v.x, v.y, v.z)?;
            }
        }
        Ok(())
    }
}
