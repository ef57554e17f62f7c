use super::on_off;
use super::pad;
use crate::procedure::NodeResult;
use crate::procedure::RunContext;
use crate::simbox::SimBox;
use crate::species::Species;
use nalgebra::Rotation3;
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use std::f64::consts::TAU;
use std::sync::Arc;

/// Generation node: insert a population of a species at random
/// positions and orientations. Placement derives deterministically from
/// the configuration's seed so every replica builds identical contents.
#[derive(Debug)]
pub struct AddSpeciesNode {
    pub id: usize,
    pub name: String,
    pub species: Arc<Species>,
    pub population: usize,
}

impl AddSpeciesNode {
    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let seed = ctx.config.seed().wrapping_add(ctx.config.n_molecules() as u64);
        let mut rng = SmallRng::seed_from_u64(seed);
        let centre_of_template = self.species.centre();
        for _ in 0..self.population {
            let frac = Vector3::new(rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>());
            let centre = ctx.config.sim_box().from_fractional(frac);
            let rotation = Rotation3::from_euler_angles(
                rng.random::<f64>() * TAU,
                rng.random::<f64>() * TAU,
                rng.random::<f64>() * TAU,
            );
            let coordinates: Vec<Vector3<f64>> = self
                .species
                .atoms()
                .iter()
                .map(|a| centre + rotation * (a.r - centre_of_template))
                .collect();
            ctx.config.add_molecule(self.species.clone(), Some(&coordinates));
        }
        log::info!(
            "added {} molecules of species '{}' to configuration '{}'",
            self.population,
            self.species.name(),
            ctx.config.name(),
        );
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}AddSpecies\n", pad(indent));
        out += &format!("{}Species  '{}'\n", pad(indent + 1), self.species.name());
        out += &format!("{}Population  {}\n", pad(indent + 1), self.population);
        out += &format!("{}EndAddSpecies\n", pad(indent));
        out
    }
}

/// Generation node: define the configuration's box.
#[derive(Debug)]
pub struct BoxNode {
    pub id: usize,
    pub name: String,
    pub lengths: Vector3<f64>,
    pub angles: Vector3<f64>,
    pub non_periodic: bool,
}

impl BoxNode {
    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let bx = match self.non_periodic {
            true => SimBox::non_periodic(self.lengths.x),
            false => SimBox::from_parameters(self.lengths, self.angles),
        };
        match bx {
            Ok(bx) => {
                ctx.config.set_box(bx);
                NodeResult::Success
            }
            Err(e) => {
                log::error!("box node '{}' failed: {:#}", self.name, e);
                NodeResult::Failure
            }
        }
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Box\n", pad(indent));
        out += &format!(
            "{}Lengths  {}  {}  {}\n",
            pad(indent + 1),
            self.lengths.x,
            self.lengths.y,
            self.lengths.z,
        );
        out += &format!(
            "{}Angles  {}  {}  {}\n",
            pad(indent + 1),
            self.angles.x,
            self.angles.y,
            self.angles.z,
        );
        if self.non_periodic {
            out += &format!("{}NonPeriodic  {}\n", pad(indent + 1), on_off(true));
        }
        out += &format!("{}EndBox\n", pad(indent));
        out
    }
}

/// Named scalar parameters exposed to later nodes through the run state.
#[derive(Debug)]
pub struct ParametersNode {
    pub id: usize,
    pub name: String,
    pub parameters: Vec<(String, f64)>,
}

impl ParametersNode {
    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        for (name, value) in &self.parameters {
            ctx.state.set_parameter(name, *value);
        }
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Parameters\n", pad(indent));
        for (name, value) in &self.parameters {
            out += &format!("{}Parameter  '{}'  {}\n", pad(indent + 1), name, value);
        }
        out += &format!("{}EndParameters\n", pad(indent));
        out
    }
}
