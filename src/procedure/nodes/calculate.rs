use super::pad;
use super::NodeRef;
use crate::procedure::NodeResult;
use crate::procedure::RunContext;
use crate::simbox::SimBox;
use crate::species::Site;

/// What a calculate node derives from its referenced sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculateKind {
    /// minimum-image distance between two sites
    Distance,
    /// angle i-j-k in degrees, legs resolved under minimum image
    Angle,
    /// minimum-image vector from the first site to the second
    Vector,
}

impl CalculateKind {
    pub fn n_sites(&self) -> usize {
        match self {
            Self::Distance => 2,
            Self::Angle => 3,
            Self::Vector => 2,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Distance => "CalculateDistance",
            Self::Angle => "CalculateAngle",
            Self::Vector => "CalculateVector",
        }
    }
}

/// Computes an observable from the current sites of named selects; the
/// result is read by collect nodes further down the sequence.
#[derive(Debug)]
pub struct CalculateNode {
    pub id: usize,
    pub name: String,
    pub kind: CalculateKind,
    pub sites: Vec<NodeRef>,
}

impl CalculateNode {
    fn resolve(&self, ctx: &RunContext) -> Option<Vec<Site>> {
        self.sites
            .iter()
            .map(|site| ctx.state.current_site(site.id))
            .collect()
    }

    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let Some(sites) = self.resolve(ctx) else {
            log::error!("node '{}' has no current site for one of its references", self.name);
            return NodeResult::Failure;
        };
        let bx = ctx.config.sim_box();
        match self.kind {
            CalculateKind::Distance => {
                let r = bx.minimum_distance(sites[0].origin, sites[1].origin);
                ctx.state.set_value(self.id, r);
            }
            CalculateKind::Angle => {
                let ji = bx.minimum_vector(sites[1].origin, sites[0].origin);
                let jk = bx.minimum_vector(sites[1].origin, sites[2].origin);
                ctx.state.set_value(self.id, SimBox::angle_in_degrees(ji, jk));
            }
            CalculateKind::Vector => {
                let v = bx.minimum_vector(sites[0].origin, sites[1].origin);
                ctx.state.set_vector(self.id, v);
            }
        }
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let sites: Vec<String> = self.sites.iter().map(|s| format!("'{}'", s.name)).collect();
        format!(
            "{}{}  '{}'  {}\n",
            pad(indent),
            self.kind.keyword(),
            self.name,
            sites.join("  "),
        )
    }
}
