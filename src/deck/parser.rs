use super::lexer::LineParser;
use crate::configuration::Configuration;
use crate::driver::AnalysisModule;
use crate::driver::Dissolve;
use crate::driver::EnergyModule;
use crate::driver::Layer;
use crate::driver::Module;
use crate::procedure::nodes::AddSpeciesNode;
use crate::procedure::nodes::BoxNode;
use crate::procedure::nodes::CalculateKind;
use crate::procedure::nodes::CalculateNode;
use crate::procedure::nodes::Collect1DNode;
use crate::procedure::nodes::Collect2DNode;
use crate::procedure::nodes::Collect3DNode;
use crate::procedure::nodes::ExcludeNode;
use crate::procedure::nodes::NodeRef;
use crate::procedure::nodes::Normalisation;
use crate::procedure::nodes::ParametersNode;
use crate::procedure::nodes::Process1DNode;
use crate::procedure::nodes::Process2DNode;
use crate::procedure::nodes::Process3DNode;
use crate::procedure::nodes::SelectNode;
use crate::procedure::Procedure;
use crate::procedure::ProcedureContext;
use crate::procedure::ProcedureNode;
use crate::procedure::Sequence;
use crate::species::AngleForm;
use crate::species::BondForm;
use crate::species::Species;
use crate::species::TorsionForm;
use crate::potentials::ShortRange;
use anyhow::bail;
use anyhow::Context;
use nalgebra::Vector3;
use std::sync::Arc;

/// what kind of node a name in scope refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Select,
    Calculate,
    Collect1D,
    Collect2D,
    Collect3D,
}

/// The scope stack seen while parsing a procedure: a frame per nesting
/// level, plus a registry of every node for the references (Process
/// sources and normalisers) that resolve across the whole procedure.
#[derive(Debug, Default)]
struct Scope {
    frames: Vec<Vec<(String, usize, NodeKind)>>,
    all: Vec<(String, usize, NodeKind)>,
}

impl Scope {
    fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, name: &str, id: usize, kind: NodeKind) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name.to_string(), id, kind));
        }
        self.all.push((name.to_string(), id, kind));
    }

    /// resolve against ancestors and prior siblings only
    fn resolve(&self, name: &str, kind: NodeKind) -> Option<NodeRef> {
        self.frames
            .iter()
            .flatten()
            .find(|(n, _, k)| n == name && *k == kind)
            .map(|(n, id, _)| NodeRef {
                id: *id,
                name: n.clone(),
            })
    }

    /// resolve against every node of the procedure
    fn resolve_anywhere(&self, name: &str, kind: NodeKind) -> Option<NodeRef> {
        self.all
            .iter()
            .find(|(n, _, k)| n == name && *k == kind)
            .map(|(n, id, _)| NodeRef {
                id: *id,
                name: n.clone(),
            })
    }
}

struct DeckParser {
    lines: LineParser,
    dissolve: Dissolve,
    next_id: usize,
}

fn number(token: &str, line: usize) -> anyhow::Result<f64> {
    token
        .parse()
        .with_context(|| format!("line {}: '{}' is not a number", line, token))
}

fn count(token: &str, line: usize) -> anyhow::Result<usize> {
    token
        .parse()
        .with_context(|| format!("line {}: '{}' is not a count", line, token))
}

fn switch(token: &str, line: usize) -> anyhow::Result<bool> {
    match token {
        "On" | "True" => Ok(true),
        "Off" | "False" => Ok(false),
        other => bail!("line {}: expected On or Off, got '{}'", line, other),
    }
}

fn argument<'a>(tokens: &'a [String], index: usize, line: usize, what: &str) -> anyhow::Result<&'a str> {
    tokens
        .get(index)
        .map(|s| s.as_str())
        .with_context(|| format!("line {}: missing {}", line, what))
}

fn bond_form(tokens: &[String], line: usize) -> anyhow::Result<BondForm> {
    match argument(tokens, 0, line, "bond form")? {
        "Harmonic" => Ok(BondForm::Harmonic {
            k: number(argument(tokens, 1, line, "force constant")?, line)?,
            r0: number(argument(tokens, 2, line, "equilibrium length")?, line)?,
        }),
        other => bail!("line {}: unrecognised bond form '{}'", line, other),
    }
}

fn angle_form(tokens: &[String], line: usize) -> anyhow::Result<AngleForm> {
    match argument(tokens, 0, line, "angle form")? {
        "Harmonic" => Ok(AngleForm::Harmonic {
            k: number(argument(tokens, 1, line, "force constant")?, line)?,
            theta0: number(argument(tokens, 2, line, "equilibrium angle")?, line)?,
        }),
        other => bail!("line {}: unrecognised angle form '{}'", line, other),
    }
}

fn torsion_form(tokens: &[String], line: usize) -> anyhow::Result<TorsionForm> {
    match argument(tokens, 0, line, "torsion form")? {
        "Cos" => Ok(TorsionForm::Cosine {
            k: number(argument(tokens, 1, line, "barrier height")?, line)?,
            n: number(argument(tokens, 2, line, "periodicity")?, line)?,
            phi0: number(argument(tokens, 3, line, "phase")?, line)?,
        }),
        other => bail!("line {}: unrecognised torsion form '{}'", line, other),
    }
}

fn short_range_form(tokens: &[String], line: usize) -> anyhow::Result<ShortRange> {
    match argument(tokens, 0, line, "short-range form")? {
        "None" => Ok(ShortRange::None),
        "LJ" => Ok(ShortRange::LennardJones {
            epsilon: number(argument(tokens, 1, line, "epsilon")?, line)?,
            sigma: number(argument(tokens, 2, line, "sigma")?, line)?,
        }),
        other => bail!("line {}: unrecognised short-range form '{}'", line, other),
    }
}

/// Parse an input deck into a ready-to-prepare engine aggregate.
pub fn parse(contents: &str) -> anyhow::Result<Dissolve> {
    let mut parser = DeckParser {
        lines: LineParser::new(contents)?,
        dissolve: Dissolve::default(),
        next_id: 0,
    };
    while let Some((line, tokens)) = parser.lines.next() {
        match tokens[0].as_str() {
            "Master" => parser.parse_master()?,
            "PairPotentials" => parser.parse_pair_potentials()?,
            "Species" => {
                let name = argument(&tokens, 1, line, "species name")?.to_string();
                parser.parse_species(&name)?;
            }
            "Configuration" => {
                let name = argument(&tokens, 1, line, "configuration name")?.to_string();
                parser.parse_configuration(&name)?;
            }
            "Layer" => {
                let name = argument(&tokens, 1, line, "layer name")?.to_string();
                parser.parse_layer(&name)?;
            }
            other => bail!("line {}: unrecognised block keyword '{}'", line, other),
        }
    }
    Ok(parser.dissolve)
}

impl DeckParser {
    fn take(&mut self, terminator: &str) -> anyhow::Result<(usize, Vec<String>)> {
        self.lines
            .next()
            .with_context(|| format!("unexpected end of input while looking for {}", terminator))
    }

    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id - 1
    }

    fn parse_master(&mut self) -> anyhow::Result<()> {
        loop {
            let (line, tokens) = self.take("EndMaster")?;
            match tokens[0].as_str() {
                "EndMaster" => return Ok(()),
                "Bond" => {
                    let i = argument(&tokens, 1, line, "first atom type")?.to_string();
                    let j = argument(&tokens, 2, line, "second atom type")?.to_string();
                    let form = bond_form(&tokens[3..], line)?;
                    self.dissolve.forcefield.add_bond_term(&i, &j, form);
                }
                "Angle" => {
                    let i = argument(&tokens, 1, line, "first atom type")?.to_string();
                    let j = argument(&tokens, 2, line, "second atom type")?.to_string();
                    let k = argument(&tokens, 3, line, "third atom type")?.to_string();
                    let form = angle_form(&tokens[4..], line)?;
                    self.dissolve.forcefield.add_angle_term(&i, &j, &k, form);
                }
                "Torsion" => {
                    let i = argument(&tokens, 1, line, "first atom type")?.to_string();
                    let j = argument(&tokens, 2, line, "second atom type")?.to_string();
                    let k = argument(&tokens, 3, line, "third atom type")?.to_string();
                    let l = argument(&tokens, 4, line, "fourth atom type")?.to_string();
                    let form = torsion_form(&tokens[5..], line)?;
                    self.dissolve.forcefield.add_torsion_term(&i, &j, &k, &l, form);
                }
                other => bail!("line {}: unrecognised Master keyword '{}'", line, other),
            }
        }
    }

    fn parse_pair_potentials(&mut self) -> anyhow::Result<()> {
        loop {
            let (line, tokens) = self.take("EndPairPotentials")?;
            match tokens[0].as_str() {
                "EndPairPotentials" => return Ok(()),
                "Range" => self.dissolve.pair_range = number(argument(&tokens, 1, line, "range")?, line)?,
                "Delta" => self.dissolve.pair_delta = number(argument(&tokens, 1, line, "delta")?, line)?,
                "TruncationScheme" => {
                    self.dissolve.truncation = argument(&tokens, 1, line, "scheme")?
                        .parse()
                        .map_err(|e| anyhow::anyhow!("line {}: {}", line, e))?;
                }
                "Parameters" => {
                    let name = argument(&tokens, 1, line, "atom type name")?.to_string();
                    let charge = number(argument(&tokens, 2, line, "charge")?, line)?;
                    let form = short_range_form(&tokens[3..], line)?;
                    self.dissolve.types.register(&name, form, charge);
                    self.dissolve.forcefield.add_atom_type(&name, form, charge);
                }
                other => bail!("line {}: unrecognised PairPotentials keyword '{}'", line, other),
            }
        }
    }

    /// 1-based deck index to a species atom index
    fn atom_index(token: &str, species: &Species, line: usize) -> anyhow::Result<usize> {
        let index = count(token, line)?;
        if index == 0 || index > species.n_atoms() {
            bail!(
                "line {}: atom index {} is out of range for species '{}'",
                line,
                index,
                species.name(),
            );
        }
        Ok(index - 1)
    }

    fn type_name(&self, species: &Species, atom: usize) -> String {
        species
            .atom(atom)
            .and_then(|a| self.dissolve.types.get(a.atom_type))
            .map(|t| t.name.clone())
            .unwrap_or_default()
    }

    fn parse_species(&mut self, name: &str) -> anyhow::Result<()> {
        let mut species = Species::new(name);
        loop {
            let (line, tokens) = self.take("EndSpecies")?;
            match tokens[0].as_str() {
                "EndSpecies" => break,
                "Atom" => {
                    let type_name = argument(&tokens, 2, line, "atom type")?.to_string();
                    let x = number(argument(&tokens, 3, line, "x coordinate")?, line)?;
                    let y = number(argument(&tokens, 4, line, "y coordinate")?, line)?;
                    let z = number(argument(&tokens, 5, line, "z coordinate")?, line)?;
                    let charge = number(argument(&tokens, 6, line, "charge")?, line)?;
                    let atom_type = match self.dissolve.types.index_of(&type_name) {
                        Some(index) => index,
                        None => self.dissolve.types.register(&type_name, ShortRange::None, charge),
                    };
                    species.add_atom(&type_name, atom_type, charge, Vector3::new(x, y, z));
                }
                "Bond" => {
                    let i = Self::atom_index(argument(&tokens, 1, line, "atom index")?, &species, line)?;
                    let j = Self::atom_index(argument(&tokens, 2, line, "atom index")?, &species, line)?;
                    let form = match tokens.len() {
                        3 => {
                            let (ti, tj) = (self.type_name(&species, i), self.type_name(&species, j));
                            self.dissolve.forcefield.bond_term(&ti, &tj).with_context(|| {
                                format!("line {}: no master bond term for {}-{}", line, ti, tj)
                            })?
                        }
                        _ => bond_form(&tokens[3..], line)?,
                    };
                    species.add_bond(i, j, form)?;
                }
                "Angle" => {
                    let i = Self::atom_index(argument(&tokens, 1, line, "atom index")?, &species, line)?;
                    let j = Self::atom_index(argument(&tokens, 2, line, "atom index")?, &species, line)?;
                    let k = Self::atom_index(argument(&tokens, 3, line, "atom index")?, &species, line)?;
                    let form = match tokens.len() {
                        4 => {
                            let (ti, tj, tk) = (
                                self.type_name(&species, i),
                                self.type_name(&species, j),
                                self.type_name(&species, k),
                            );
                            self.dissolve.forcefield.angle_term(&ti, &tj, &tk).with_context(|| {
                                format!("line {}: no master angle term for {}-{}-{}", line, ti, tj, tk)
                            })?
                        }
                        _ => angle_form(&tokens[4..], line)?,
                    };
                    species.add_angle(i, j, k, form)?;
                }
                "Torsion" | "Improper" => {
                    let i = Self::atom_index(argument(&tokens, 1, line, "atom index")?, &species, line)?;
                    let j = Self::atom_index(argument(&tokens, 2, line, "atom index")?, &species, line)?;
                    let k = Self::atom_index(argument(&tokens, 3, line, "atom index")?, &species, line)?;
                    let l = Self::atom_index(argument(&tokens, 4, line, "atom index")?, &species, line)?;
                    let form = match tokens.len() {
                        5 => {
                            let names = (
                                self.type_name(&species, i),
                                self.type_name(&species, j),
                                self.type_name(&species, k),
                                self.type_name(&species, l),
                            );
                            self.dissolve
                                .forcefield
                                .torsion_term(&names.0, &names.1, &names.2, &names.3)
                                .with_context(|| {
                                    format!(
                                        "line {}: no master torsion term for {}-{}-{}-{}",
                                        line, names.0, names.1, names.2, names.3,
                                    )
                                })?
                        }
                        _ => torsion_form(&tokens[5..], line)?,
                    };
                    match tokens[0].as_str() {
                        "Torsion" => species.add_torsion(i, j, k, l, form)?,
                        _ => species.add_improper(i, j, k, l, form)?,
                    }
                }
                "Site" => {
                    let site_name = argument(&tokens, 1, line, "site name")?.to_string();
                    let mut origins = Vec::new();
                    loop {
                        let (line, tokens) = self.take("EndSite")?;
                        match tokens[0].as_str() {
                            "EndSite" => break,
                            "Origin" => {
                                for token in &tokens[1..] {
                                    origins.push(Self::atom_index(token, &species, line)?);
                                }
                            }
                            other => bail!("line {}: unrecognised Site keyword '{}'", line, other),
                        }
                    }
                    species.add_site(&site_name, origins)?;
                }
                other => bail!("line {}: unrecognised Species keyword '{}'", line, other),
            }
        }
        species.finalise();
        self.dissolve.species.push(Arc::new(species));
        Ok(())
    }

    fn parse_configuration(&mut self, name: &str) -> anyhow::Result<()> {
        let mut config = Configuration::new(name);
        let mut generator = None;
        loop {
            let (line, tokens) = self.take("EndConfiguration")?;
            match tokens[0].as_str() {
                "EndConfiguration" => break,
                "Temperature" => config.set_temperature(number(argument(&tokens, 1, line, "temperature")?, line)?),
                "Seed" => config.set_seed(count(argument(&tokens, 1, line, "seed")?, line)? as u64),
                "SizeFactor" => config.request_size_factor(number(argument(&tokens, 1, line, "size factor")?, line)?),
                "Generator" => {
                    let mut procedure = Procedure::new(ProcedureContext::Generation);
                    let mut scope = Scope::default();
                    scope.push_frame();
                    loop {
                        let (line, tokens) = self.take("EndGenerator")?;
                        if tokens[0] == "EndGenerator" {
                            break;
                        }
                        let node = self.parse_node(line, &tokens, &mut scope, ProcedureContext::Generation)?;
                        procedure.add_node(node)?;
                    }
                    generator = Some(procedure);
                }
                other => bail!("line {}: unrecognised Configuration keyword '{}'", line, other),
            }
        }
        self.dissolve.configurations.push(config);
        self.dissolve.generators.push(generator);
        Ok(())
    }

    fn parse_layer(&mut self, name: &str) -> anyhow::Result<()> {
        let mut layer = Layer {
            name: name.to_string(),
            frequency: 1,
            modules: Vec::new(),
        };
        loop {
            let (line, tokens) = self.take("EndLayer")?;
            match tokens[0].as_str() {
                "EndLayer" => break,
                "Frequency" => layer.frequency = count(argument(&tokens, 1, line, "frequency")?, line)? as u64,
                "Module" => {
                    let kind = argument(&tokens, 1, line, "module kind")?.to_string();
                    let module_name = argument(&tokens, 2, line, "module name")?.to_string();
                    match kind.as_str() {
                        "Energy" => layer.modules.push(self.parse_energy_module(&module_name)?),
                        "Analysis" => layer.modules.push(self.parse_analysis_module(&module_name)?),
                        other => bail!("line {}: unrecognised module kind '{}'", line, other),
                    }
                }
                other => bail!("line {}: unrecognised Layer keyword '{}'", line, other),
            }
        }
        self.dissolve.layers.push(layer);
        Ok(())
    }

    fn parse_energy_module(&mut self, name: &str) -> anyhow::Result<Module> {
        let mut configuration = None;
        loop {
            let (line, tokens) = self.take("EndModule")?;
            match tokens[0].as_str() {
                "EndModule" => break,
                "Configuration" => configuration = Some(argument(&tokens, 1, line, "configuration name")?.to_string()),
                other => bail!("line {}: unrecognised Energy module keyword '{}'", line, other),
            }
        }
        Ok(Module::Energy(EnergyModule {
            name: name.to_string(),
            configuration: configuration.context("Energy module needs a target Configuration")?,
        }))
    }

    fn parse_analysis_module(&mut self, name: &str) -> anyhow::Result<Module> {
        let mut configuration = None;
        let mut procedure = Procedure::new(ProcedureContext::Analysis);
        let mut scope = Scope::default();
        scope.push_frame();
        loop {
            let (line, tokens) = self.take("EndModule")?;
            match tokens[0].as_str() {
                "EndModule" => break,
                "Configuration" => configuration = Some(argument(&tokens, 1, line, "configuration name")?.to_string()),
                _ => {
                    let node = self.parse_node(line, &tokens, &mut scope, ProcedureContext::Analysis)?;
                    procedure.add_node(node)?;
                }
            }
        }
        Ok(Module::Analysis(AnalysisModule {
            name: name.to_string(),
            configuration: configuration.context("Analysis module needs a target Configuration")?,
            procedure,
        }))
    }

    /// species/site reference of a Select target
    fn site_target(&self, species: &str, site: &str, line: usize) -> anyhow::Result<(Arc<Species>, usize)> {
        let species = self
            .dissolve
            .species_named(species)
            .with_context(|| format!("line {}: no species named '{}'", line, species))?;
        let (index, _) = species
            .site(site)
            .with_context(|| format!("line {}: species '{}' has no site '{}'", line, species.name(), site))?;
        Ok((species.clone(), index))
    }

    fn resolve(scope: &Scope, name: &str, kind: NodeKind, line: usize) -> anyhow::Result<NodeRef> {
        scope
            .resolve(name, kind)
            .with_context(|| format!("line {}: no {:?} node named '{}' in scope", line, kind, name))
    }

    fn resolve_anywhere(scope: &Scope, name: &str, kind: NodeKind, line: usize) -> anyhow::Result<NodeRef> {
        scope
            .resolve_anywhere(name, kind)
            .with_context(|| format!("line {}: no {:?} node named '{}' in this procedure", line, kind, name))
    }

    /// Parse one procedure node from its opening line. Dispatches on the
    /// node keyword and recurses through ForEach branches.
    fn parse_node(
        &mut self,
        line: usize,
        tokens: &[String],
        scope: &mut Scope,
        context: ProcedureContext,
    ) -> anyhow::Result<ProcedureNode> {
        let node = match tokens[0].as_str() {
            "Select" => self.parse_select(line, tokens, scope, context)?,
            "CalculateDistance" | "CalculateAngle" | "CalculateVector" => {
                let kind = match tokens[0].as_str() {
                    "CalculateDistance" => CalculateKind::Distance,
                    "CalculateAngle" => CalculateKind::Angle,
                    _ => CalculateKind::Vector,
                };
                let name = argument(tokens, 1, line, "node name")?.to_string();
                let mut sites = Vec::new();
                for n in 0..kind.n_sites() {
                    let reference = argument(tokens, 2 + n, line, "site reference")?;
                    sites.push(Self::resolve(scope, reference, NodeKind::Select, line)?);
                }
                let id = self.next_id();
                scope.declare(&name, id, NodeKind::Calculate);
                ProcedureNode::Calculate(CalculateNode { id, name, kind, sites })
            }
            "Collect1D" => self.parse_collect1d(line, tokens, scope)?,
            "Collect2D" => self.parse_collect2d(line, tokens, scope)?,
            "Collect3D" => self.parse_collect3d(line, tokens, scope)?,
            "Process1D" => self.parse_process1d(line, tokens, scope)?,
            "Process2D" => self.parse_process2d(line, tokens, scope)?,
            "Process3D" => self.parse_process3d(line, tokens, scope)?,
            "Exclude" => {
                let mut same_site = None;
                loop {
                    let (line, tokens) = self.take("EndExclude")?;
                    match tokens[0].as_str() {
                        "EndExclude" => break,
                        "SameSite" => {
                            let a = Self::resolve(scope, argument(&tokens, 1, line, "site reference")?, NodeKind::Select, line)?;
                            let b = Self::resolve(scope, argument(&tokens, 2, line, "site reference")?, NodeKind::Select, line)?;
                            same_site = Some((a, b));
                        }
                        other => bail!("line {}: unrecognised Exclude keyword '{}'", line, other),
                    }
                }
                ProcedureNode::Exclude(ExcludeNode {
                    id: self.next_id(),
                    name: "exclude".to_string(),
                    same_site,
                })
            }
            "AddSpecies" => {
                let mut species = None;
                let mut population = 0;
                loop {
                    let (line, tokens) = self.take("EndAddSpecies")?;
                    match tokens[0].as_str() {
                        "EndAddSpecies" => break,
                        "Species" => {
                            let name = argument(&tokens, 1, line, "species name")?;
                            species = Some(self.dissolve.species_named(name).with_context(|| {
                                format!("line {}: no species named '{}'", line, name)
                            })?);
                        }
                        "Population" => population = count(argument(&tokens, 1, line, "population")?, line)?,
                        other => bail!("line {}: unrecognised AddSpecies keyword '{}'", line, other),
                    }
                }
                let species = species.context("AddSpecies needs a Species")?;
                ProcedureNode::AddSpecies(AddSpeciesNode {
                    id: self.next_id(),
                    name: species.name().to_string(),
                    species,
                    population,
                })
            }
            "Box" => {
                let mut lengths = Vector3::new(1.0, 1.0, 1.0);
                let mut angles = Vector3::new(90.0, 90.0, 90.0);
                let mut non_periodic = false;
                loop {
                    let (line, tokens) = self.take("EndBox")?;
                    match tokens[0].as_str() {
                        "EndBox" => break,
                        "Lengths" => {
                            lengths = Vector3::new(
                                number(argument(&tokens, 1, line, "length")?, line)?,
                                number(argument(&tokens, 2, line, "length")?, line)?,
                                number(argument(&tokens, 3, line, "length")?, line)?,
                            );
                        }
                        "Angles" => {
                            angles = Vector3::new(
                                number(argument(&tokens, 1, line, "angle")?, line)?,
                                number(argument(&tokens, 2, line, "angle")?, line)?,
                                number(argument(&tokens, 3, line, "angle")?, line)?,
                            );
                        }
                        "NonPeriodic" => non_periodic = switch(argument(&tokens, 1, line, "switch")?, line)?,
                        other => bail!("line {}: unrecognised Box keyword '{}'", line, other),
                    }
                }
                ProcedureNode::Box(BoxNode {
                    id: self.next_id(),
                    name: "box".to_string(),
                    lengths,
                    angles,
                    non_periodic,
                })
            }
            "Parameters" => {
                let mut parameters = Vec::new();
                loop {
                    let (line, tokens) = self.take("EndParameters")?;
                    match tokens[0].as_str() {
                        "EndParameters" => break,
                        "Parameter" => {
                            let name = argument(&tokens, 1, line, "parameter name")?.to_string();
                            let value = number(argument(&tokens, 2, line, "parameter value")?, line)?;
                            parameters.push((name, value));
                        }
                        other => bail!("line {}: unrecognised Parameters keyword '{}'", line, other),
                    }
                }
                ProcedureNode::Parameters(ParametersNode {
                    id: self.next_id(),
                    name: "parameters".to_string(),
                    parameters,
                })
            }
            other => bail!("line {}: unrecognised node keyword '{}'", line, other),
        };
        if !node.is_context_relevant(context) {
            bail!("line {}: node '{}' is not valid in the {:?} context", line, node.name(), context);
        }
        Ok(node)
    }

    fn parse_select(
        &mut self,
        line: usize,
        tokens: &[String],
        scope: &mut Scope,
        context: ProcedureContext,
    ) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let id = self.next_id();
        scope.declare(&name, id, NodeKind::Select);
        let mut node = SelectNode {
            id,
            name,
            targets: Vec::new(),
            exclude_same_molecule: Vec::new(),
            exclude_same_site: Vec::new(),
            for_each: Sequence::default(),
        };
        loop {
            let (line, tokens) = self.take("EndSelect")?;
            match tokens[0].as_str() {
                "EndSelect" => break,
                "Species" => {
                    let species = argument(&tokens, 1, line, "species name")?;
                    let site = argument(&tokens, 2, line, "site name")?;
                    node.targets.push(self.site_target(species, site, line)?);
                }
                "ExcludeSameMolecule" => {
                    for reference in &tokens[1..] {
                        node.exclude_same_molecule
                            .push(Self::resolve(scope, reference, NodeKind::Select, line)?);
                    }
                }
                "ExcludeSameSite" => {
                    for reference in &tokens[1..] {
                        node.exclude_same_site
                            .push(Self::resolve(scope, reference, NodeKind::Select, line)?);
                    }
                }
                "ForEach" => {
                    scope.push_frame();
                    loop {
                        let (line, tokens) = self.take("EndForEach")?;
                        if tokens[0] == "EndForEach" {
                            break;
                        }
                        let child = self.parse_node(line, &tokens, scope, context)?;
                        node.for_each.nodes.push(child);
                    }
                    scope.pop_frame();
                }
                other => bail!("line {}: unrecognised Select keyword '{}'", line, other),
            }
        }
        Ok(ProcedureNode::Select(node))
    }

    fn parse_collect1d(&mut self, line: usize, tokens: &[String], scope: &mut Scope) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let mut observable = None;
        let (mut minimum, mut maximum, mut bin_width) = (0.0, 10.0, 0.05);
        loop {
            let (line, tokens) = self.take("EndCollect1D")?;
            match tokens[0].as_str() {
                "EndCollect1D" => break,
                "QuantityX" => {
                    observable = Some(Self::resolve(
                        scope,
                        argument(&tokens, 1, line, "observable reference")?,
                        NodeKind::Calculate,
                        line,
                    )?);
                }
                "RangeX" => {
                    minimum = number(argument(&tokens, 1, line, "minimum")?, line)?;
                    maximum = number(argument(&tokens, 2, line, "maximum")?, line)?;
                    bin_width = number(argument(&tokens, 3, line, "bin width")?, line)?;
                }
                other => bail!("line {}: unrecognised Collect1D keyword '{}'", line, other),
            }
        }
        let id = self.next_id();
        scope.declare(&name, id, NodeKind::Collect1D);
        Ok(ProcedureNode::Collect1D(Collect1DNode {
            id,
            name,
            observable: observable.context("Collect1D needs a QuantityX")?,
            minimum,
            maximum,
            bin_width,
        }))
    }

    fn parse_collect2d(&mut self, line: usize, tokens: &[String], scope: &mut Scope) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let (mut x_observable, mut y_observable) = (None, None);
        let mut minima = [0.0; 2];
        let mut maxima = [10.0; 2];
        let mut bin_widths = [0.05; 2];
        loop {
            let (line, tokens) = self.take("EndCollect2D")?;
            match tokens[0].as_str() {
                "EndCollect2D" => break,
                "QuantityX" | "QuantityY" => {
                    let reference = Self::resolve(
                        scope,
                        argument(&tokens, 1, line, "observable reference")?,
                        NodeKind::Calculate,
                        line,
                    )?;
                    match tokens[0].as_str() {
                        "QuantityX" => x_observable = Some(reference),
                        _ => y_observable = Some(reference),
                    }
                }
                "RangeX" | "RangeY" => {
                    let axis = match tokens[0].as_str() {
                        "RangeX" => 0,
                        _ => 1,
                    };
                    minima[axis] = number(argument(&tokens, 1, line, "minimum")?, line)?;
                    maxima[axis] = number(argument(&tokens, 2, line, "maximum")?, line)?;
                    bin_widths[axis] = number(argument(&tokens, 3, line, "bin width")?, line)?;
                }
                other => bail!("line {}: unrecognised Collect2D keyword '{}'", line, other),
            }
        }
        let id = self.next_id();
        scope.declare(&name, id, NodeKind::Collect2D);
        Ok(ProcedureNode::Collect2D(Collect2DNode {
            id,
            name,
            x_observable: x_observable.context("Collect2D needs a QuantityX")?,
            y_observable: y_observable.context("Collect2D needs a QuantityY")?,
            minima,
            maxima,
            bin_widths,
        }))
    }

    fn parse_collect3d(&mut self, line: usize, tokens: &[String], scope: &mut Scope) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let mut observable = None;
        let mut minima = [0.0; 3];
        let mut maxima = [10.0; 3];
        let mut bin_widths = [0.5; 3];
        loop {
            let (line, tokens) = self.take("EndCollect3D")?;
            match tokens[0].as_str() {
                "EndCollect3D" => break,
                "QuantityXYZ" => {
                    observable = Some(Self::resolve(
                        scope,
                        argument(&tokens, 1, line, "observable reference")?,
                        NodeKind::Calculate,
                        line,
                    )?);
                }
                "RangeX" | "RangeY" | "RangeZ" => {
                    let axis = match tokens[0].as_str() {
                        "RangeX" => 0,
                        "RangeY" => 1,
                        _ => 2,
                    };
                    minima[axis] = number(argument(&tokens, 1, line, "minimum")?, line)?;
                    maxima[axis] = number(argument(&tokens, 2, line, "maximum")?, line)?;
                    bin_widths[axis] = number(argument(&tokens, 3, line, "bin width")?, line)?;
                }
                other => bail!("line {}: unrecognised Collect3D keyword '{}'", line, other),
            }
        }
        let id = self.next_id();
        scope.declare(&name, id, NodeKind::Collect3D);
        Ok(ProcedureNode::Collect3D(Collect3DNode {
            id,
            name,
            observable: observable.context("Collect3D needs a QuantityXYZ")?,
            minima,
            maxima,
            bin_widths,
        }))
    }

    /// the keywords shared by every process node
    fn parse_normalisation_keyword(
        &mut self,
        tokens: &[String],
        line: usize,
        scope: &Scope,
        normalisation: &mut Normalisation,
    ) -> anyhow::Result<bool> {
        match tokens[0].as_str() {
            "NSites" => {
                for reference in &tokens[1..] {
                    normalisation
                        .site_population
                        .push(Self::resolve_anywhere(scope, reference, NodeKind::Select, line)?);
                }
            }
            "NumberDensity" => {
                for reference in &tokens[1..] {
                    normalisation
                        .number_density
                        .push(Self::resolve_anywhere(scope, reference, NodeKind::Select, line)?);
                }
            }
            "SphericalShellVolume" => {
                normalisation.spherical_shell_volume = switch(argument(tokens, 1, line, "switch")?, line)?;
            }
            "Factor" => normalisation.factor = Some(number(argument(tokens, 1, line, "factor")?, line)?),
            "NormaliseToOne" => normalisation.to_one = switch(argument(tokens, 1, line, "switch")?, line)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn parse_process1d(&mut self, line: usize, tokens: &[String], scope: &mut Scope) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let mut source = None;
        let mut normalisation = Normalisation::default();
        let mut value_label = String::new();
        let mut x_label = String::new();
        let mut save = false;
        loop {
            let (line, tokens) = self.take("EndProcess1D")?;
            match tokens[0].as_str() {
                "EndProcess1D" => break,
                "SourceData" => {
                    source = Some(Self::resolve_anywhere(
                        scope,
                        argument(&tokens, 1, line, "source reference")?,
                        NodeKind::Collect1D,
                        line,
                    )?);
                }
                "LabelValue" => value_label = argument(&tokens, 1, line, "label")?.to_string(),
                "LabelX" => x_label = argument(&tokens, 1, line, "label")?.to_string(),
                "Save" => save = switch(argument(&tokens, 1, line, "switch")?, line)?,
                _ => {
                    if !self.parse_normalisation_keyword(&tokens, line, scope, &mut normalisation)? {
                        bail!("line {}: unrecognised Process1D keyword '{}'", line, tokens[0]);
                    }
                }
            }
        }
        Ok(ProcedureNode::Process1D(Process1DNode {
            id: self.next_id(),
            name,
            source: source.context("Process1D needs a SourceData")?,
            normalisation,
            value_label,
            x_label,
            save,
        }))
    }

    fn parse_process2d(&mut self, line: usize, tokens: &[String], scope: &mut Scope) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let mut source = None;
        let mut normalisation = Normalisation::default();
        let mut save = false;
        loop {
            let (line, tokens) = self.take("EndProcess2D")?;
            match tokens[0].as_str() {
                "EndProcess2D" => break,
                "SourceData" => {
                    source = Some(Self::resolve_anywhere(
                        scope,
                        argument(&tokens, 1, line, "source reference")?,
                        NodeKind::Collect2D,
                        line,
                    )?);
                }
                "Save" => save = switch(argument(&tokens, 1, line, "switch")?, line)?,
                _ => {
                    if !self.parse_normalisation_keyword(&tokens, line, scope, &mut normalisation)? {
                        bail!("line {}: unrecognised Process2D keyword '{}'", line, tokens[0]);
                    }
                }
            }
        }
        Ok(ProcedureNode::Process2D(Process2DNode {
            id: self.next_id(),
            name,
            source: source.context("Process2D needs a SourceData")?,
            normalisation,
            save,
        }))
    }

    fn parse_process3d(&mut self, line: usize, tokens: &[String], scope: &mut Scope) -> anyhow::Result<ProcedureNode> {
        let name = argument(tokens, 1, line, "node name")?.to_string();
        let mut source = None;
        let mut normalisation = Normalisation::default();
        let mut save = false;
        loop {
            let (line, tokens) = self.take("EndProcess3D")?;
            match tokens[0].as_str() {
                "EndProcess3D" => break,
                "SourceData" => {
                    source = Some(Self::resolve_anywhere(
                        scope,
                        argument(&tokens, 1, line, "source reference")?,
                        NodeKind::Collect3D,
                        line,
                    )?);
                }
                "Save" => save = switch(argument(&tokens, 1, line, "switch")?, line)?,
                _ => {
                    if !self.parse_normalisation_keyword(&tokens, line, scope, &mut normalisation)? {
                        bail!("line {}: unrecognised Process3D keyword '{}'", line, tokens[0]);
                    }
                }
            }
        }
        Ok(ProcedureNode::Process3D(Process3DNode {
            id: self.next_id(),
            name,
            source: source.context("Process3D needs a SourceData")?,
            normalisation,
            save,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::BondForm;

    pub const WATER_DECK: &str = "
# bulk water
Master
  Bond  'OW'  'HW'  Harmonic  4637.0  1.0
  Angle  'HW'  'OW'  'HW'  Harmonic  383.0  109.5
EndMaster

Species  'water'
  Atom  1  'OW'  0.0  0.0  0.0  -0.82
  Atom  2  'HW'  0.96  0.0  0.0  0.41
  Atom  3  'HW'  -0.24  0.93  0.0  0.41
  Bond  1  2
  Bond  1  3
  Angle  2  1  3
  Site  'COM'
    Origin  1  2  3
  EndSite
EndSpecies

PairPotentials
  Range  9.0
  Delta  0.005
  TruncationScheme  Shifted
  Parameters  'OW'  -0.82  LJ  0.6503  3.166
  Parameters  'HW'  0.41  None
EndPairPotentials

Configuration  'bulk'
  Temperature  300
  Seed  7
  Generator
    Box
      Lengths  22.0  22.0  22.0
      Angles  90  90  90
    EndBox
    AddSpecies
      Species  'water'
      Population  40
    EndAddSpecies
  EndGenerator
EndConfiguration

Layer  'processing'
  Frequency  1
  Module  Energy  'energy01'
    Configuration  'bulk'
  EndModule
  Module  Analysis  'rdf'
    Configuration  'bulk'
    Select  'A'
      Species  'water'  'COM'
      ForEach
        Select  'B'
          Species  'water'  'COM'
          ExcludeSameMolecule  'A'
          ForEach
            CalculateDistance  'rAB'  'A'  'B'
            Collect1D  'histo'
              QuantityX  'rAB'
              RangeX  0.0  9.0  0.05
            EndCollect1D
          EndForEach
        EndSelect
      EndForEach
    EndSelect
    Process1D  'gr'
      SourceData  'histo'
      NSites  'A'
      NumberDensity  'B'
      SphericalShellVolume  On
      Save  Off
    EndProcess1D
  EndModule
EndLayer
";

    #[test]
    fn full_deck_parses_into_the_aggregate() {
        let dissolve = parse(WATER_DECK).unwrap();
        assert_eq!(dissolve.species.len(), 1);
        let water = &dissolve.species[0];
        assert_eq!(water.n_atoms(), 3);
        assert_eq!(water.bonds().len(), 2);
        assert_eq!(water.angles().len(), 1);
        assert_eq!(water.sites().len(), 1);
        // master terms resolved through the forcefield adapter
        assert_eq!(water.bonds()[0].form, BondForm::Harmonic { k: 4637.0, r0: 1.0 });
        // scaling matrix built at finalise
        assert_eq!(water.scaling(1, 2), 0.0);
        assert_eq!(dissolve.types.len(), 2);
        assert_eq!(dissolve.pair_range, 9.0);
        assert_eq!(dissolve.configurations.len(), 1);
        assert!(dissolve.generators[0].is_some());
        assert_eq!(dissolve.layers.len(), 1);
        assert_eq!(dissolve.layers[0].modules.len(), 2);
        let Module::Analysis(analysis) = &dissolve.layers[0].modules[1] else {
            panic!("second module should be the analysis one");
        };
        assert_eq!(analysis.configuration, "bulk");
        assert_eq!(analysis.procedure.root().nodes.len(), 2);
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        let dissolve = parse(WATER_DECK).unwrap();
        let canonical = dissolve.canonical_input();
        let reparsed = parse(&canonical).unwrap();
        assert_eq!(reparsed.canonical_input(), canonical);
    }

    #[test]
    fn unknown_keywords_are_parse_errors() {
        assert!(parse("Nonsense 'x'\nEndNonsense\n").is_err());
        let bad_block = "Species 'x'\n  Wobble 1\nEndSpecies\n";
        assert!(parse(bad_block).is_err());
    }

    #[test]
    fn unresolved_references_are_reported() {
        let deck = "
Species  'ball'
  Atom  1  'B'  0  0  0  0.0
  Site  'COM'
    Origin  1
  EndSite
EndSpecies
Layer  'l'
  Module  Analysis  'a'
    Configuration  'bulk'
    Select  'A'
      Species  'ball'  'COM'
      ExcludeSameMolecule  'Missing'
    EndSelect
  EndModule
EndLayer
";
        let error = format!("{:#}", parse(deck).unwrap_err());
        assert!(error.contains("Missing"), "error was: {}", error);
        // species without the named site
        let deck = "
Species  'ball'
  Atom  1  'B'  0  0  0  0.0
EndSpecies
Layer  'l'
  Module  Analysis  'a'
    Configuration  'bulk'
    Select  'A'
      Species  'ball'  'COM'
    EndSelect
  EndModule
EndLayer
";
        assert!(parse(deck).is_err());
    }

    #[test]
    fn sibling_scope_is_not_visible_to_outsiders() {
        // rAB is declared inside B's ForEach; a Collect at A's level
        // cannot see it once the frame is popped
        let deck = "
Species  'ball'
  Atom  1  'B'  0  0  0  0.0
  Site  'COM'
    Origin  1
  EndSite
EndSpecies
Layer  'l'
  Module  Analysis  'a'
    Configuration  'bulk'
    Select  'A'
      Species  'ball'  'COM'
      ForEach
        Select  'B'
          Species  'ball'  'COM'
          ForEach
            CalculateDistance  'rAB'  'A'  'B'
          EndForEach
        EndSelect
        Collect1D  'histo'
          QuantityX  'rAB'
          RangeX  0  10  0.1
        EndCollect1D
      EndForEach
    EndSelect
  EndModule
EndLayer
";
        assert!(parse(deck).is_err());
    }

    #[test]
    fn missing_master_term_is_a_reference_error() {
        let deck = "
Species  'pair'
  Atom  1  'X'  0  0  0  0.0
  Atom  2  'Y'  1  0  0  0.0
  Bond  1  2
EndSpecies
";
        let error = format!("{:#}", parse(deck).unwrap_err());
        assert!(error.contains("master bond term"), "error was: {}", error);
    }
}
