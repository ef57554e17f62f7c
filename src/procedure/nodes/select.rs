use super::pad;
use super::NodeRef;
use super::Sequence;
use crate::procedure::NodeResult;
use crate::procedure::RunContext;
use crate::species::Site;
use crate::species::Species;
use std::sync::Arc;

/// Select iterates over the sites its targets define across the
/// configuration, exposing each in turn as the "current site" to the
/// nodes of its ForEach branch. Exclusions suppress candidates that
/// coincide with the current site or molecule of another named select.
#[derive(Debug)]
pub struct SelectNode {
    pub id: usize,
    pub name: String,
    /// (species, site definition index) pairs to realise
    pub targets: Vec<(Arc<Species>, usize)>,
    /// selects whose current molecule disqualifies a candidate
    pub exclude_same_molecule: Vec<NodeRef>,
    /// selects whose current site disqualifies a candidate
    pub exclude_same_site: Vec<NodeRef>,
    pub for_each: Sequence,
}

impl SelectNode {
    pub fn prepare(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        self.for_each.prepare(ctx)
    }

    /// realise every site of every target species over the configuration
    fn gather(&self, ctx: &RunContext) -> Vec<Site> {
        let mut sites = Vec::new();
        for (species, definition) in &self.targets {
            let origins = &species.sites()[*definition].origins;
            for (m, molecule) in ctx.config.molecules().iter().enumerate() {
                if molecule.species.name() != species.name() {
                    continue;
                }
                let bx = ctx.config.sim_box();
                let atoms = ctx.config.atoms();
                let first = atoms[molecule.atoms[origins[0]]].r;
                let mut total = first;
                for origin in origins.iter().skip(1) {
                    total += first + bx.minimum_vector(first, atoms[molecule.atoms[*origin]].r);
                }
                sites.push(Site {
                    origin: bx.fold(total / origins.len() as f64),
                    molecule: m,
                    definition: *definition,
                });
            }
        }
        sites
    }

    fn excluded(&self, candidate: &Site, ctx: &RunContext) -> bool {
        let same_molecule = self.exclude_same_molecule.iter().any(|other| {
            ctx.state
                .current_site(other.id)
                .is_some_and(|current| current.same_molecule(candidate))
        });
        let same_site = self.exclude_same_site.iter().any(|other| {
            ctx.state
                .current_site(other.id)
                .is_some_and(|current| current.same_site(candidate))
        });
        same_molecule || same_site
    }

    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let mut selected = 0;
        for site in self.gather(ctx) {
            if self.excluded(&site, ctx) {
                continue;
            }
            selected += 1;
            ctx.state.set_current_site(self.id, site);
            match self.for_each.execute(ctx) {
                NodeResult::Failure => return NodeResult::Failure,
                // Skip abandons this site and moves on to the next
                NodeResult::Skip | NodeResult::Success => continue,
            }
        }
        let state = ctx.state.select_mut(self.id);
        state.total_selected += selected;
        state.executions += 1;
        NodeResult::Success
    }

    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        self.for_each.finalise(ctx)
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Select  '{}'\n", pad(indent), self.name);
        for (species, definition) in &self.targets {
            out += &format!(
                "{}Species  '{}'  '{}'\n",
                pad(indent + 1),
                species.name(),
                species.sites()[*definition].name,
            );
        }
        for other in &self.exclude_same_molecule {
            out += &format!("{}ExcludeSameMolecule  '{}'\n", pad(indent + 1), other.name);
        }
        for other in &self.exclude_same_site {
            out += &format!("{}ExcludeSameSite  '{}'\n", pad(indent + 1), other.name);
        }
        if !self.for_each.nodes.is_empty() {
            out += &format!("{}ForEach\n", pad(indent + 1));
            out += &self.for_each.write(indent + 2);
            out += &format!("{}EndForEach\n", pad(indent + 1));
        }
        out += &format!("{}EndSelect\n", pad(indent));
        out
    }
}
