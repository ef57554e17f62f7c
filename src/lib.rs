pub mod atomtypes;
pub mod cells;
pub mod configuration;
pub mod data;
pub mod deck;
pub mod driver;
pub mod forcefield;
pub mod generic;
pub mod kernel;
pub mod messenger;
pub mod pool;
pub mod potentials;
pub mod procedure;
pub mod restart;
pub mod simbox;
pub mod species;

/// dimensional analysis types
pub type Energy = f64; // kJ/mol
pub type Degrees = f64;
pub type Scale = f64;

// physical conversion factors
pub const COULOMB_CONSTANT: f64 = 1389.35458; // kJ Å mol⁻¹ e⁻²
pub const AVOGADRO: f64 = 6.02214076e23;
pub const DEGRAD: f64 = std::f64::consts::PI / 180.0;

// pair potential tabulation defaults
pub const PAIR_POTENTIAL_DELTA: f64 = 0.005; // Å
pub const PAIR_POTENTIAL_RANGE: f64 = 15.0; // Å

// intramolecular scaling factors below this threshold skip the term entirely
pub const SCALING_THRESHOLD: Scale = 1.0e-3;

/// randomly populated values for test fixtures
pub trait Arbitrary {
    fn random() -> Self;
}

/// progress bar over the main-loop iterations
pub fn progress(n_iterations: usize) -> indicatif::ProgressBar {
    let template = "{spinner:.green} iteration {pos}/{len} [{elapsed_precise}] {wide_bar:.green}";
    let style = indicatif::ProgressStyle::with_template(template).expect("static template is valid");
    let bar = indicatif::ProgressBar::new(n_iterations as u64);
    bar.set_style(style);
    // iterations are seconds to minutes long; a lazy tick is plenty
    bar.enable_steady_tick(std::time::Duration::from_millis(500));
    bar
}
