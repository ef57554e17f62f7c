pub mod calculate;
pub mod collect;
pub mod exclude;
pub mod generate;
pub mod process;
pub mod select;

pub use calculate::CalculateKind;
pub use calculate::CalculateNode;
pub use collect::Collect1DNode;
pub use collect::Collect2DNode;
pub use collect::Collect3DNode;
pub use exclude::ExcludeNode;
pub use generate::AddSpeciesNode;
pub use generate::BoxNode;
pub use generate::ParametersNode;
pub use process::Normalisation;
pub use process::Process1DNode;
pub use process::Process2DNode;
pub use process::Process3DNode;
pub use select::SelectNode;

use super::NodeResult;
use super::ProcedureContext;
use super::RunContext;

/// A reference from one node to another, resolved by name against the
/// scope stack when the tree is built.
#[derive(Debug, Clone)]
pub struct NodeRef {
    pub id: usize,
    pub name: String,
}

/// The closed set of procedure node kinds.
#[derive(Debug)]
pub enum ProcedureNode {
    Select(SelectNode),
    Exclude(ExcludeNode),
    Calculate(CalculateNode),
    Collect1D(Collect1DNode),
    Collect2D(Collect2DNode),
    Collect3D(Collect3DNode),
    Process1D(Process1DNode),
    Process2D(Process2DNode),
    Process3D(Process3DNode),
    AddSpecies(AddSpeciesNode),
    Box(BoxNode),
    Parameters(ParametersNode),
}

impl ProcedureNode {
    pub fn id(&self) -> usize {
        match self {
            Self::Select(n) => n.id,
            Self::Exclude(n) => n.id,
            Self::Calculate(n) => n.id,
            Self::Collect1D(n) => n.id,
            Self::Collect2D(n) => n.id,
            Self::Collect3D(n) => n.id,
            Self::Process1D(n) => n.id,
            Self::Process2D(n) => n.id,
            Self::Process3D(n) => n.id,
            Self::AddSpecies(n) => n.id,
            Self::Box(n) => n.id,
            Self::Parameters(n) => n.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Select(n) => &n.name,
            Self::Exclude(n) => &n.name,
            Self::Calculate(n) => &n.name,
            Self::Collect1D(n) => &n.name,
            Self::Collect2D(n) => &n.name,
            Self::Collect3D(n) => &n.name,
            Self::Process1D(n) => &n.name,
            Self::Process2D(n) => &n.name,
            Self::Process3D(n) => &n.name,
            Self::AddSpecies(n) => &n.name,
            Self::Box(n) => &n.name,
            Self::Parameters(n) => &n.name,
        }
    }

    pub fn is_context_relevant(&self, context: ProcedureContext) -> bool {
        match self {
            Self::AddSpecies(_) | Self::Box(_) => context == ProcedureContext::Generation,
            Self::Parameters(_) => true,
            _ => context == ProcedureContext::Analysis,
        }
    }

    pub fn prepare(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        match self {
            Self::Select(n) => n.prepare(ctx),
            Self::Collect1D(n) => n.prepare(ctx),
            Self::Collect2D(n) => n.prepare(ctx),
            Self::Collect3D(n) => n.prepare(ctx),
            _ => Ok(()),
        }
    }

    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        match self {
            Self::Select(n) => n.execute(ctx),
            Self::Exclude(n) => n.execute(ctx),
            Self::Calculate(n) => n.execute(ctx),
            Self::Collect1D(n) => n.execute(ctx),
            Self::Collect2D(n) => n.execute(ctx),
            Self::Collect3D(n) => n.execute(ctx),
            Self::Process1D(_) | Self::Process2D(_) | Self::Process3D(_) => NodeResult::Success,
            Self::AddSpecies(n) => n.execute(ctx),
            Self::Box(n) => n.execute(ctx),
            Self::Parameters(n) => n.execute(ctx),
        }
    }

    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        match self {
            Self::Select(n) => n.finalise(ctx),
            Self::Collect1D(n) => n.finalise(ctx),
            Self::Collect2D(n) => n.finalise(ctx),
            Self::Collect3D(n) => n.finalise(ctx),
            Self::Process1D(n) => n.finalise(ctx),
            Self::Process2D(n) => n.finalise(ctx),
            Self::Process3D(n) => n.finalise(ctx),
            _ => Ok(()),
        }
    }

    /// canonical deck form
    pub fn write(&self, indent: usize) -> String {
        match self {
            Self::Select(n) => n.write(indent),
            Self::Exclude(n) => n.write(indent),
            Self::Calculate(n) => n.write(indent),
            Self::Collect1D(n) => n.write(indent),
            Self::Collect2D(n) => n.write(indent),
            Self::Collect3D(n) => n.write(indent),
            Self::Process1D(n) => n.write(indent),
            Self::Process2D(n) => n.write(indent),
            Self::Process3D(n) => n.write(indent),
            Self::AddSpecies(n) => n.write(indent),
            Self::Box(n) => n.write(indent),
            Self::Parameters(n) => n.write(indent),
        }
    }
}

/// An ordered run of sibling nodes.
#[derive(Debug, Default)]
pub struct Sequence {
    pub nodes: Vec<ProcedureNode>,
}

impl Sequence {
    pub fn prepare(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        for node in self.relevant(ctx.context) {
            node.prepare(ctx)?;
        }
        Ok(())
    }

    /// Run the sequence once. Skip from any node abandons the rest of
    /// this pass and is handed to the enclosing iteration.
    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        for node in self.relevant(ctx.context) {
            match node.execute(ctx) {
                NodeResult::Success => continue,
                other => return other,
            }
        }
        NodeResult::Success
    }

    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        for node in self.relevant(ctx.context) {
            node.finalise(ctx)?;
        }
        Ok(())
    }

    fn relevant(&self, context: ProcedureContext) -> impl Iterator<Item = &ProcedureNode> {
        self.nodes.iter().filter(move |n| n.is_context_relevant(context))
    }

    pub fn write(&self, indent: usize) -> String {
        self.nodes.iter().map(|n| n.write(indent)).collect()
    }
}

/// indentation helper shared by the node writers
pub(crate) fn pad(indent: usize) -> String {
    "  ".repeat(indent)
}

/// deck boolean
pub(crate) fn on_off(value: bool) -> &'static str {
    match value {
        true => "On",
        false => "Off",
    }
}
