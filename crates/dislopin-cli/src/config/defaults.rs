use dislopin::core::models::crystal::SlipSystem;
use dislopin::core::models::simulation_box::Axis;
use dislopin::engine::config::{DEFAULT_BUILD_DIR, DEFAULT_RELAX_DIR, DEFAULT_SHEAR_DIR};

pub struct DefaultsConfig {
    pub build_dir: &'static str,
    pub relax_dir: &'static str,
    pub shear_dir: &'static str,

    pub potential_file: &'static str,
    pub pair_style: &'static str,
    pub element: &'static str,

    pub lmp: &'static str,
    pub mpi_launcher: &'static str,
    pub atomsk: &'static str,
    pub generator: &'static str,

    pub min_length: f64,
    pub slip: SlipSystem,
    pub boundary_width: f64,
    pub shift: [f64; 3],
    pub lattice_guess: f64,
    pub fit_strain: f64,
    pub build_output: &'static str,

    pub energy_tolerance: f64,
    pub force_tolerance: f64,
    pub max_iterations: u64,
    pub max_evaluations: u64,
    pub relax_thermo_every: u64,
    pub relax_output: &'static str,
    pub relax_dump: &'static str,
    pub relax_dump_columns: &'static [&'static str],

    pub precipitate_radius: f64,
    pub initial_offset: f64,
    pub surface_depth: f64,
    pub displacement_axis: Axis,
    pub shear_axis: Axis,
    pub timestep: f64,
    pub temperature: f64,
    pub shear_velocity: f64,
    pub damping_factor: f64,
    pub velocity_seed: u32,
    pub steps: u64,
    pub shear_thermo_every: u64,
    pub dump_every: u64,
    pub restart_every: u64,
    pub shear_dump_columns: &'static [&'static str],
    pub final_name: &'static str,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            build_dir: DEFAULT_BUILD_DIR,
            relax_dir: DEFAULT_RELAX_DIR,
            shear_dir: DEFAULT_SHEAR_DIR,

            potential_file: "malerba.fs",
            pair_style: "eam/fs",
            element: "Fe",

            lmp: "lmp",
            mpi_launcher: "mpirun",
            atomsk: "atomsk",
            generator: "dislocation-generator",

            min_length: 300.0,
            slip: SlipSystem::bcc_screw(),
            boundary_width: 3.0,
            shift: [0.0, 0.0, 2.0 / 3.0],
            lattice_guess: 2.855,
            fit_strain: 0.005,
            build_output: "input.lmp",

            energy_tolerance: 1e-6,
            force_tolerance: 1e-8,
            max_iterations: 1000,
            max_evaluations: 10000,
            relax_thermo_every: 10,
            relax_output: "output.lmp",
            relax_dump: "dump",
            relax_dump_columns: &["id", "type", "x", "y", "z", "c_peratom"],

            precipitate_radius: 25.0,
            initial_offset: 10.0,
            surface_depth: 5.0,
            displacement_axis: Axis::X,
            shear_axis: Axis::X,
            timestep: 0.001,
            temperature: 800.0,
            shear_velocity: 1.0,
            damping_factor: 100.0,
            velocity_seed: 1234,
            steps: 100,
            shear_thermo_every: 1000,
            dump_every: 1000,
            restart_every: 10000,
            shear_dump_columns: &["id", "x", "y", "z", "c_peratom", "c_stress[4]"],
            final_name: "final.lmp",
        }
    }
}
