use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "dislopin - Build, relax and shear a dislocation meeting a precipitate in BCC iron with LAMMPS.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for in-process parallel work.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit the potential and build the initial dislocation configuration.
    Build(BuildArgs),
    /// Minimize the energy of a built configuration.
    Relax(RelaxArgs),
    /// Shear a relaxed configuration against a pinned precipitate.
    Shear(ShearArgs),
    /// Run build, relax and shear as one pipeline.
    Run(RunArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Build(_) => "build",
            Commands::Relax(_) => "relax",
            Commands::Shear(_) => "shear",
            Commands::Run(_) => "run",
        }
    }
}

/// Options shared by every stage command.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Path to the configuration file in TOML format.
    /// Falls back to the per-user config file when present.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory holding the stage directories.
    #[arg(short = 'd', long, value_name = "PATH")]
    pub data_root: Option<PathBuf>,

    /// Override the interatomic potential file.
    #[arg(long, value_name = "PATH")]
    pub potential: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S shear.temperature=600
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// How the MD engine is launched.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Override the LAMMPS executable.
    #[arg(long, value_name = "PATH")]
    pub lmp: Option<PathBuf>,

    /// Launch the engine under MPI with this many workers.
    #[arg(short = 'n', long, value_name = "NUM")]
    pub np: Option<u32>,

    /// Extra switches passed to the engine, e.g. "-k on g 1 -sf kk".
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub accel: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    PeriodicArray,
    Bicrystal,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildFlags {
    /// Override the construction mode.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Override the minimum box length along every axis (Å).
    #[arg(long, value_name = "FLOAT")]
    pub min_length: Option<f64>,

    /// Use the lattice and elastic constants from the config file instead of fitting them.
    #[arg(long)]
    pub known_constants: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RelaxFlags {
    /// Override the energy tolerance of the minimization.
    #[arg(long, value_name = "FLOAT")]
    pub etol: Option<f64>,

    /// Override the force tolerance of the minimization (eV/Å).
    #[arg(long, value_name = "FLOAT")]
    pub ftol: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ShearFlags {
    /// Override the precipitate radius (Å).
    #[arg(short = 'r', long, value_name = "FLOAT")]
    pub radius: Option<f64>,

    /// Override the thermostat temperature (K).
    #[arg(short = 't', long, value_name = "FLOAT")]
    pub temperature: Option<f64>,

    /// Override the relative velocity of the surface layers (Å/ps).
    #[arg(long, value_name = "FLOAT", allow_hyphen_values = true)]
    pub velocity: Option<f64>,

    /// Override the number of dynamics steps.
    #[arg(long, value_name = "INT")]
    pub steps: Option<u64>,
}

/// A stage input given explicitly instead of taken from the previous stage directory.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Data file to start from. Defaults to the previous stage's output.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Boundary flags for a data file produced outside this tool, e.g. "p f p".
    #[arg(long, value_name = "FLAGS", requires = "input")]
    pub boundary: Option<String>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub engine: EngineArgs,
    #[command(flatten)]
    pub flags: BuildFlags,
}

#[derive(Args, Debug)]
pub struct RelaxArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub engine: EngineArgs,
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub flags: RelaxFlags,
}

#[derive(Args, Debug)]
pub struct ShearArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub engine: EngineArgs,
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub flags: ShearFlags,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub engine: EngineArgs,
    #[command(flatten)]
    pub build: BuildFlags,
    #[command(flatten)]
    pub relax: RelaxFlags,
    #[command(flatten)]
    pub shear: ShearFlags,
}
