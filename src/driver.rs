use crate::atomtypes::AtomTypes;
use crate::configuration::Configuration;
use crate::forcefield::Forcefield;
use crate::generic::GenericList;
use crate::generic::IN_RESTART_FILE;
use crate::kernel::EnergyKernel;
use crate::messenger::Messenger;
use crate::pool::DivisionStrategy;
use crate::pool::ProcessPool;
use crate::potentials::PotentialMap;
use crate::potentials::TruncationScheme;
use crate::procedure::NodeResult;
use crate::procedure::Procedure;
use crate::restart;
use crate::species::AngleForm;
use crate::species::BondForm;
use crate::species::Species;
use crate::species::TorsionForm;
use crate::data::Data1D;
use anyhow::bail;
use anyhow::Context;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

/// Evaluates the total inter- and intramolecular energy of one
/// configuration over an in-process rank team and records it.
#[derive(Debug)]
pub struct EnergyModule {
    pub name: String,
    pub configuration: String,
}

/// Wraps an analysis procedure targeting one configuration.
#[derive(Debug)]
pub struct AnalysisModule {
    pub name: String,
    pub configuration: String,
    pub procedure: Procedure,
}

/// The closed set of processing modules.
#[derive(Debug)]
pub enum Module {
    Energy(EnergyModule),
    Analysis(AnalysisModule),
}

impl Module {
    pub fn name(&self) -> &str {
        match self {
            Self::Energy(m) => &m.name,
            Self::Analysis(m) => &m.name,
        }
    }
}

/// A named group of modules run at a common frequency.
#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub frequency: u64,
    pub modules: Vec<Module>,
}

/// The engine aggregate: master definitions, configurations with their
/// generators, processing layers, and the blackboard everything writes
/// results into.
#[derive(Debug)]
pub struct Dissolve {
    pub types: AtomTypes,
    pub forcefield: Forcefield,
    pub species: Vec<Arc<Species>>,
    pub configurations: Vec<Configuration>,
    pub generators: Vec<Option<Procedure>>,
    pub layers: Vec<Layer>,
    pub processing: GenericList,
    pub pair_range: f64,
    pub pair_delta: f64,
    pub truncation: TruncationScheme,
    potential_map: Option<PotentialMap>,
    pub iteration: u64,
    pub restart_frequency: u64,
    pub write_restart_and_heartbeat: bool,
    input_path: Option<PathBuf>,
    restart_path: Option<PathBuf>,
}

impl Default for Dissolve {
    fn default() -> Self {
        Self {
            types: AtomTypes::default(),
            forcefield: Forcefield::default(),
            species: Vec::new(),
            configurations: Vec::new(),
            generators: Vec::new(),
            layers: Vec::new(),
            processing: GenericList::default(),
            pair_range: crate::PAIR_POTENTIAL_RANGE,
            pair_delta: crate::PAIR_POTENTIAL_DELTA,
            truncation: TruncationScheme::default(),
            potential_map: None,
            iteration: 0,
            restart_frequency: 10,
            write_restart_and_heartbeat: true,
            input_path: None,
            restart_path: None,
        }
    }
}

impl Dissolve {
    pub fn species_named(&self, name: &str) -> Option<Arc<Species>> {
        self.species.iter().find(|sp| sp.name() == name).cloned()
    }

    fn configuration_index(&self, name: &str) -> anyhow::Result<usize> {
        self.configurations
            .iter()
            .position(|c| c.name() == name)
            .with_context(|| format!("no configuration named '{}'", name))
    }

    pub fn potential_map(&self) -> Option<&PotentialMap> {
        self.potential_map.as_ref()
    }

    /// Parse an input deck from disk.
    pub fn load_input(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open input file '{}'", path.display()))?;
        let mut dissolve = crate::deck::parse(&contents)
            .with_context(|| format!("while parsing '{}'", path.display()))?;
        dissolve.input_path = Some(path.to_path_buf());
        dissolve.restart_path = Some(path.with_extension("restart"));
        Ok(dissolve)
    }

    pub fn set_restart_path(&mut self, path: PathBuf) {
        self.restart_path = Some(path);
    }

    pub fn restart_path(&self) -> Option<&PathBuf> {
        self.restart_path.as_ref()
    }

    /// Load previously-saved processing data and the iteration counter.
    pub fn load_restart(&mut self, path: &Path) -> anyhow::Result<()> {
        let restored = restart::load(&mut self.processing, path)?;
        self.iteration = self.processing.value("Iteration", "", 0i64) as u64;
        log::info!(
            "restored {} items from '{}', continuing from iteration {}",
            restored,
            path.display(),
            self.iteration,
        );
        Ok(())
    }

    pub fn save_restart(&mut self) -> anyhow::Result<()> {
        let Some(path) = self.restart_path.clone() else {
            return Ok(());
        };
        *self.processing.realise::<i64>("Iteration", "", IN_RESTART_FILE) = self.iteration as i64;
        restart::save(&self.processing, &path)
    }

    fn write_heartbeat(&self) -> anyhow::Result<()> {
        let Some(input) = &self.input_path else {
            return Ok(());
        };
        let contents = format!("Iteration  {}\nRestartFrequency  {}\n", self.iteration, self.restart_frequency);
        std::fs::write(input.with_extension("heartbeat"), contents)?;
        Ok(())
    }

    /// Tabulate pair potentials and generate any empty configurations.
    pub fn prepare(&mut self, pool: &ProcessPool) -> anyhow::Result<()> {
        if self.types.is_empty() {
            bail!("no atom types are defined; nothing to simulate");
        }
        log::info!(
            "tabulating {} pair potentials at dr = {} over {} A",
            self.types.len() * (self.types.len() + 1) / 2,
            self.pair_delta,
            self.pair_range,
        );
        self.potential_map = Some(PotentialMap::generate(
            &self.types,
            self.pair_delta,
            self.pair_range,
            self.truncation,
        ));
        for n in 0..self.configurations.len() {
            let config = &mut self.configurations[n];
            if config.n_molecules() == 0 {
                if let Some(generator) = &mut self.generators[n] {
                    log::info!("generating configuration '{}'", config.name());
                    if generator.execute(pool, config, "generator", &mut self.processing) == NodeResult::Failure {
                        bail!("generator for configuration '{}' failed", config.name());
                    }
                }
            }
            config.apply_size_factor();
            config.update_cells(self.pair_range);
            log::info!(
                "configuration '{}': {} molecules, {} atoms, density {:.6} atoms/A3",
                config.name(),
                config.n_molecules(),
                config.n_atoms(),
                config.atomic_density(),
            );
        }
        Ok(())
    }

    /// Run the main loop for the requested number of iterations.
    pub fn iterate(&mut self, n: u64, pool: &ProcessPool) -> anyhow::Result<()> {
        let progress = crate::progress(n as usize);
        for _ in 0..n {
            self.iteration += 1;
            Messenger::banner(&format!("Iteration {}", self.iteration));
            for layer in 0..self.layers.len() {
                if self.iteration % self.layers[layer].frequency.max(1) != 0 {
                    continue;
                }
                for module in 0..self.layers[layer].modules.len() {
                    self.run_module(layer, module, pool)?;
                }
            }
            if self.write_restart_and_heartbeat {
                if self.restart_frequency > 0 && self.iteration % self.restart_frequency == 0 {
                    self.save_restart()?;
                }
                self.write_heartbeat()?;
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(())
    }

    fn run_module(&mut self, layer: usize, module: usize, pool: &ProcessPool) -> anyhow::Result<()> {
        let (name, configuration) = match &self.layers[layer].modules[module] {
            Module::Energy(m) => (m.name.clone(), m.configuration.clone()),
            Module::Analysis(m) => (m.name.clone(), m.configuration.clone()),
        };
        let target = self.configuration_index(&configuration)?;
        if matches!(&self.layers[layer].modules[module], Module::Energy(_)) {
            return self.run_energy(&name, target);
        }
        let Module::Analysis(m) = &mut self.layers[layer].modules[module] else {
            unreachable!("only two module kinds exist");
        };
        let result = m.procedure.execute(
            pool,
            &mut self.configurations[target],
            &name,
            &mut self.processing,
        );
        match result {
            NodeResult::Failure => bail!("analysis module '{}' failed", name),
            _ => Ok(()),
        }
    }

    /// Total energies over an in-process rank team sized from the host.
    fn run_energy(&mut self, name: &str, target: usize) -> anyhow::Result<()> {
        let map = self.potential_map.as_ref().context("pair potentials have not been tabulated")?;
        let config = &self.configurations[target];
        let ranks = num_cpus::get().clamp(1, 8);
        let team = ProcessPool::team(ranks, ranks);
        let inter = std::thread::scope(|scope| {
            let handles: Vec<_> = team
                .iter()
                .map(|rank| {
                    scope.spawn(move || {
                        let kernel = EnergyKernel::new(rank, config, map, None);
                        kernel.total_energy(false, DivisionStrategy::PoolParallel, true)
                    })
                })
                .collect();
            let totals: Vec<f64> = handles.into_iter().map(|h| h.join().expect("energy rank panicked")).collect();
            totals[0]
        });
        let serial = ProcessPool::serial();
        let kernel = EnergyKernel::new(&serial, config, map, None);
        let intra: f64 = (0..config.n_molecules()).map(|m| kernel.intramolecular_energy(m)).sum();
        if !serial.equality(inter + intra) {
            bail!("energy replicas diverged for configuration '{}'", config.name());
        }
        log::info!(
            "'{}': interatomic = {:.6} kJ/mol, intramolecular = {:.6} kJ/mol, total = {:.6} kJ/mol",
            config.name(),
            inter,
            intra,
            inter + intra,
        );
        let config_name = config.name().to_string();
        let history = self
            .processing
            .realise::<Data1D>(&format!("Energy_{}", config_name), name, IN_RESTART_FILE);
        history.x.push(self.iteration as f64);
        history.values.push(inter + intra);
        Ok(())
    }

    /// Write the canonicalised input deck.
    pub fn save_input(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.canonical_input())
            .with_context(|| format!("cannot write input file '{}'", path.display()))?;
        Ok(())
    }

    fn write_bond_form(form: &BondForm) -> String {
        match form {
            BondForm::Harmonic { k, r0 } => format!("Harmonic  {}  {}", k, r0),
        }
    }

    fn write_angle_form(form: &AngleForm) -> String {
        match form {
            AngleForm::Harmonic { k, theta0 } => format!("Harmonic  {}  {}", k, theta0),
        }
    }

    fn write_torsion_form(form: &TorsionForm) -> String {
        match form {
            TorsionForm::Cosine { k, n, phi0 } => format!("Cos  {}  {}  {}", k, n, phi0),
        }
    }

    /// The whole state as a deck, in a fixed block order.
    pub fn canonical_input(&self) -> String {
        let mut out = String::new();
        if !self.forcefield.is_empty() {
            out += "Master\n";
            for ((i, j), form) in self.forcefield.bonds() {
                out += &format!("  Bond  '{}'  '{}'  {}\n", i, j, Self::write_bond_form(form));
            }
            for ((i, j, k), form) in self.forcefield.angles() {
                out += &format!("  Angle  '{}'  '{}'  '{}'  {}\n", i, j, k, Self::write_angle_form(form));
            }
            for ((i, j, k, l), form) in self.forcefield.torsions() {
                out += &format!(
                    "  Torsion  '{}'  '{}'  '{}'  '{}'  {}\n",
                    i, j, k, l,
                    Self::write_torsion_form(form),
                );
            }
            out += "EndMaster\n\n";
        }
        for species in &self.species {
            out += &format!("Species  '{}'\n", species.name());
            for (n, atom) in species.atoms().iter().enumerate() {
                let type_name = self
                    .types
                    .get(atom.atom_type)
                    .map(|t| t.name.as_str())
                    .unwrap_or("??");
                out += &format!(
                    "  Atom  {}  '{}'  {}  {}  {}  {}\n",
                    n + 1,
                    type_name,
                    atom.r.x,
                    atom.r.y,
                    atom.r.z,
                    atom.charge,
                );
            }
            for bond in species.bonds() {
                out += &format!(
                    "  Bond  {}  {}  {}\n",
                    bond.i + 1,
                    bond.j + 1,
                    Self::write_bond_form(&bond.form),
                );
            }
            for angle in species.angles() {
                out += &format!(
                    "  Angle  {}  {}  {}  {}\n",
                    angle.i + 1,
                    angle.j + 1,
                    angle.k + 1,
                    Self::write_angle_form(&angle.form),
                );
            }
            for torsion in species.torsions() {
                out += &format!(
                    "  Torsion  {}  {}  {}  {}  {}\n",
                    torsion.i + 1,
                    torsion.j + 1,
                    torsion.k + 1,
                    torsion.l + 1,
                    Self::write_torsion_form(&torsion.form),
                );
            }
            for improper in species.impropers() {
                out += &format!(
                    "  Improper  {}  {}  {}  {}  {}\n",
                    improper.i + 1,
                    improper.j + 1,
                    improper.k + 1,
                    improper.l + 1,
                    Self::write_torsion_form(&improper.form),
                );
            }
            for site in species.sites() {
                out += &format!("  Site  '{}'\n", site.name);
                let origins: Vec<String> = site.origins.iter().map(|o| (o + 1).to_string()).collect();
                out += &format!("    Origin  {}\n", origins.join("  "));
                out += "  EndSite\n";
            }
            out += "EndSpecies\n\n";
        }
        out += "PairPotentials\n";
        out += &format!("  Range  {}\n", self.pair_range);
        out += &format!("  Delta  {}\n", self.pair_delta);
        out += &format!("  TruncationScheme  {}\n", self.truncation);
        for atom_type in self.types.iter() {
            out += &format!(
                "  Parameters  '{}'  {}  {}\n",
                atom_type.name,
                atom_type.charge,
                atom_type.short_range,
            );
        }
        out += "EndPairPotentials\n\n";
        for (n, config) in self.configurations.iter().enumerate() {
            out += &format!("Configuration  '{}'\n", config.name());
            out += &format!("  Temperature  {}\n", config.temperature());
            out += &format!("  Seed  {}\n", config.seed());
            if config.requested_size_factor() != 1.0 {
                out += &format!("  SizeFactor  {}\n", config.requested_size_factor());
            }
            if let Some(generator) = &self.generators[n] {
                out += "  Generator\n";
                out += &generator.write(2);
                out += "  EndGenerator\n";
            }
            out += "EndConfiguration\n\n";
        }
        for layer in &self.layers {
            out += &format!("Layer  '{}'\n", layer.name);
            out += &format!("  Frequency  {}\n", layer.frequency);
            for module in &layer.modules {
                match module {
                    Module::Energy(m) => {
                        out += &format!("  Module  Energy  '{}'\n", m.name);
                        out += &format!("    Configuration  '{}'\n", m.configuration);
                        out += "  EndModule\n";
                    }
                    Module::Analysis(m) => {
                        out += &format!("  Module  Analysis  '{}'\n", m.name);
                        out += &format!("    Configuration  '{}'\n", m.configuration);
                        out += &m.procedure.write(2);
                        out += "  EndModule\n";
                    }
                }
            }
            out += "EndLayer\n\n";
        }
        out
    }
}
