use crate::core::geometry::region::NamedRegion;
use crate::core::models::potential::PotentialModel;
use crate::core::models::simulation_box::Periodicity;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// How far a directive script has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScriptPhase {
    /// Only global settings so far.
    Setup,
    /// A simulation box and atoms exist.
    Structure,
    /// The interatomic potential is fully declared.
    Interaction,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScriptPhase::Setup => "setup",
            ScriptPhase::Structure => "structure loaded",
            ScriptPhase::Interaction => "potential declared",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Directive '{command}' is not allowed after the script reached '{phase}': {requirement}")]
    OutOfOrder {
        command: String,
        phase: ScriptPhase,
        requirement: &'static str,
    },
    #[error("Directive 'pair_coeff' issued before 'pair_style'")]
    PairCoeffBeforeStyle,
    #[error("Empty directive")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKind {
    /// Allowed anywhere.
    Free,
    /// Global settings that must precede the structure.
    Setup,
    /// Creates or loads the box and its atoms.
    Load,
    PairStyle,
    PairCoeff,
    /// Everything that needs atoms and a potential.
    Operation,
}

impl DirectiveKind {
    fn of(command: &str) -> Self {
        match command {
            "log" | "print" | "variable" | "echo" | "shell" | "lattice" | "#" => Self::Free,
            "units" | "dimension" | "boundary" | "atom_style" | "atom_modify" | "newton"
            | "processors" => Self::Setup,
            "read_data" | "read_restart" | "create_box" | "create_atoms" | "mass" => Self::Load,
            "pair_style" => Self::PairStyle,
            "pair_coeff" => Self::PairCoeff,
            _ => Self::Operation,
        }
    }
}

fn quote_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text.contains(char::is_whitespace) {
        format!("\"{}\"", text)
    } else {
        text.into_owned()
    }
}

/// An ordered LAMMPS directive script.
///
/// Every directive is checked against the script's phase when it is appended, so a script
/// that loads atoms before `units`, declares `pair_coeff` without a structure, or issues a
/// `run` before the potential is complete cannot be built.
#[derive(Debug, Clone, PartialEq)]
pub struct InputScript {
    lines: Vec<String>,
    phase: ScriptPhase,
    pair_style_set: bool,
}

impl Default for InputScript {
    fn default() -> Self {
        Self::new()
    }
}

impl InputScript {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            phase: ScriptPhase::Setup,
            pair_style_set: false,
        }
    }

    pub fn phase(&self) -> ScriptPhase {
        self.phase
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("# {}", text));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    /// Appends a raw directive line after checking it against the current phase.
    pub fn command(&mut self, line: impl Into<String>) -> Result<&mut Self, ScriptError> {
        let line = line.into();
        let word = line
            .split_whitespace()
            .next()
            .ok_or(ScriptError::Empty)?
            .to_string();
        let out_of_order = |requirement| ScriptError::OutOfOrder {
            command: word.clone(),
            phase: self.phase,
            requirement,
        };
        let next_phase = match DirectiveKind::of(&word) {
            DirectiveKind::Free => self.phase,
            DirectiveKind::Setup => {
                if self.phase != ScriptPhase::Setup {
                    return Err(out_of_order("settings must precede structure loading"));
                }
                ScriptPhase::Setup
            }
            DirectiveKind::Load => {
                if self.phase == ScriptPhase::Interaction {
                    return Err(out_of_order("structure must be loaded before the potential"));
                }
                ScriptPhase::Structure
            }
            DirectiveKind::PairStyle => {
                if self.phase == ScriptPhase::Setup {
                    return Err(out_of_order("the potential needs a loaded structure"));
                }
                self.pair_style_set = true;
                self.phase
            }
            DirectiveKind::PairCoeff => {
                if self.phase == ScriptPhase::Setup {
                    return Err(out_of_order("the potential needs a loaded structure"));
                }
                if !self.pair_style_set {
                    return Err(ScriptError::PairCoeffBeforeStyle);
                }
                ScriptPhase::Interaction
            }
            DirectiveKind::Operation => {
                if self.phase != ScriptPhase::Interaction {
                    return Err(out_of_order("needs a loaded structure and a potential"));
                }
                ScriptPhase::Interaction
            }
        };
        self.phase = next_phase;
        self.lines.push(line);
        Ok(self)
    }

    pub fn log(&mut self, path: &Path) -> Result<&mut Self, ScriptError> {
        self.command(format!("log {}", quote_path(path)))
    }

    pub fn print(&mut self, text: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("print \"{}\"", text))
    }

    pub fn units(&mut self, style: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("units {}", style))
    }

    pub fn dimension(&mut self, dimension: u8) -> Result<&mut Self, ScriptError> {
        self.command(format!("dimension {}", dimension))
    }

    pub fn boundary(&mut self, periodicity: &Periodicity) -> Result<&mut Self, ScriptError> {
        self.command(format!("boundary {}", periodicity))
    }

    pub fn atom_style(&mut self, style: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("atom_style {}", style))
    }

    /// `units metal`, `dimension 3`, `boundary ...`, `atom_style atomic`.
    pub fn metal_setup(&mut self, periodicity: &Periodicity) -> Result<&mut Self, ScriptError> {
        self.units("metal")?
            .dimension(3)?
            .boundary(periodicity)?
            .atom_style("atomic")
    }

    pub fn read_data(&mut self, path: &Path) -> Result<&mut Self, ScriptError> {
        self.command(format!("read_data {}", quote_path(path)))
    }

    pub fn read_restart(&mut self, path: &Path) -> Result<&mut Self, ScriptError> {
        self.command(format!("read_restart {}", quote_path(path)))
    }

    /// Defines `region` and creates the box from it in one step.
    pub fn create_box(&mut self, atom_types: u32, region: &NamedRegion) -> Result<&mut Self, ScriptError> {
        if self.phase == ScriptPhase::Interaction {
            return Err(ScriptError::OutOfOrder {
                command: "create_box".to_string(),
                phase: self.phase,
                requirement: "structure must be loaded before the potential",
            });
        }
        self.lines.push(format!(
            "region {} {}",
            region.name,
            region.region.directive_args()
        ));
        self.command(format!("create_box {} {}", atom_types, region.name))
    }

    pub fn pair_style(&mut self, style: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("pair_style {}", style))
    }

    pub fn pair_coeff(&mut self, args: &[String]) -> Result<&mut Self, ScriptError> {
        self.command(format!("pair_coeff {}", args.join(" ")))
    }

    /// `pair_style` followed by `pair_coeff * * <file> <elements>`.
    pub fn potential(&mut self, potential: &PotentialModel) -> Result<&mut Self, ScriptError> {
        self.pair_style(&potential.pair_style)?
            .pair_coeff(&potential.pair_coeff_args())
    }

    pub fn region(&mut self, region: &NamedRegion) -> Result<&mut Self, ScriptError> {
        self.command(format!(
            "region {} {}",
            region.name,
            region.region.directive_args()
        ))
    }

    pub fn group_region(&mut self, group: &str, region: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("group {} region {}", group, region))
    }

    /// `group <name> subtract <from> <minus...>`.
    pub fn group_subtract(
        &mut self,
        group: &str,
        from: &str,
        minus: &[&str],
    ) -> Result<&mut Self, ScriptError> {
        self.command(format!("group {} subtract {} {}", group, from, minus.join(" ")))
    }

    pub fn compute(&mut self, id: &str, group: &str, style: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("compute {} {} {}", id, group, style))
    }

    pub fn fix(&mut self, id: &str, group: &str, style: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("fix {} {} {}", id, group, style))
    }

    pub fn velocity(&mut self, group: &str, args: &str) -> Result<&mut Self, ScriptError> {
        self.command(format!("velocity {} {}", group, args))
    }

    pub fn timestep(&mut self, dt: f64) -> Result<&mut Self, ScriptError> {
        self.command(format!("timestep {}", dt))
    }

    pub fn thermo(&mut self, every: u64) -> Result<&mut Self, ScriptError> {
        self.command(format!("thermo {}", every))
    }

    pub fn thermo_style(&mut self, columns: &[&str]) -> Result<&mut Self, ScriptError> {
        self.command(format!("thermo_style custom {}", columns.join(" ")))
    }

    pub fn minimize(
        &mut self,
        energy_tolerance: f64,
        force_tolerance: f64,
        max_iterations: u64,
        max_evaluations: u64,
    ) -> Result<&mut Self, ScriptError> {
        self.command(format!(
            "minimize {} {} {} {}",
            energy_tolerance, force_tolerance, max_iterations, max_evaluations
        ))
    }

    pub fn dump_custom(
        &mut self,
        id: &str,
        group: &str,
        every: u64,
        path: &Path,
        columns: &[String],
    ) -> Result<&mut Self, ScriptError> {
        self.command(format!(
            "dump {} {} custom {} {} {}",
            id,
            group,
            every,
            quote_path(path),
            columns.join(" ")
        ))
    }

    pub fn write_dump(&mut self, group: &str, path: &Path, columns: &[String]) -> Result<&mut Self, ScriptError> {
        self.command(format!(
            "write_dump {} custom {} {}",
            group,
            quote_path(path),
            columns.join(" ")
        ))
    }

    pub fn restart(&mut self, every: u64, template: &Path) -> Result<&mut Self, ScriptError> {
        self.command(format!("restart {} {}", every, quote_path(template)))
    }

    pub fn run(&mut self, steps: u64) -> Result<&mut Self, ScriptError> {
        self.command(format!("run {}", steps))
    }

    pub fn write_data(&mut self, path: &Path) -> Result<&mut Self, ScriptError> {
        self.command(format!("write_data {}", quote_path(path)))
    }

    pub fn render(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    pub fn write_to_path(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render())
    }
}
