pub mod nodes;
pub mod state;

#[cfg(test)]
mod tests;

pub use nodes::ProcedureNode;
pub use nodes::Sequence;
pub use state::ProcedureState;

use crate::configuration::Configuration;
use crate::generic::GenericList;
use crate::pool::ProcessPool;

/// The two situations a procedure can run in; each node declares which
/// it is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureContext {
    Analysis,
    Generation,
}

/// Trivalent outcome of node execution. Skip aborts the current
/// iteration of the enclosing selection loop; Failure aborts the whole
/// procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeResult {
    Success,
    Skip,
    Failure,
}

/// Everything a node sees while running.
pub struct RunContext<'a> {
    pub pool: &'a ProcessPool,
    pub config: &'a mut Configuration,
    pub prefix: &'a str,
    pub list: &'a mut GenericList,
    pub state: &'a mut ProcedureState,
    pub context: ProcedureContext,
}

/// A rooted sequence of nodes operating on a configuration and a
/// generic list scratch space.
///
/// Node state (current sites, observables, histograms) persists on the
/// procedure between executions. Analysis procedures additionally keep
/// a per-configuration visit record in the generic list, so a
/// configuration whose contents version has not changed is refused -
/// and the refusal survives a restart.
#[derive(Debug)]
pub struct Procedure {
    context: ProcedureContext,
    root: Sequence,
    state: ProcedureState,
}

impl Procedure {
    pub fn new(context: ProcedureContext) -> Self {
        Self {
            context,
            root: Sequence::default(),
            state: ProcedureState::default(),
        }
    }

    pub fn context(&self) -> ProcedureContext {
        self.context
    }

    pub fn root(&self) -> &Sequence {
        &self.root
    }

    pub fn state(&self) -> &ProcedureState {
        &self.state
    }

    /// Nodes invalid for this procedure's context are rejected at build
    /// time.
    pub fn add_node(&mut self, node: ProcedureNode) -> anyhow::Result<()> {
        if !node.is_context_relevant(self.context) {
            anyhow::bail!(
                "node '{}' is not relevant in the {:?} context",
                node.name(),
                self.context,
            );
        }
        self.root.nodes.push(node);
        Ok(())
    }

    /// Run prepare, execute and finalise over the root sequence.
    pub fn execute(
        &mut self,
        pool: &ProcessPool,
        config: &mut Configuration,
        prefix: &str,
        list: &mut GenericList,
    ) -> NodeResult {
        if self.context == ProcedureContext::Analysis {
            let visit = format!("Visit_{}", config.name());
            if list.value(&visit, prefix, -1i64) == config.contents_version() as i64 {
                log::warn!(
                    "refusing to analyse configuration '{}' since it has not changed",
                    config.name(),
                );
                return NodeResult::Success;
            }
            *list.realise::<i64>(&visit, prefix, crate::generic::IN_RESTART_FILE) =
                config.contents_version() as i64;
        }
        let mut ctx = RunContext {
            pool,
            config,
            prefix,
            list,
            state: &mut self.state,
            context: self.context,
        };
        if let Err(e) = self.root.prepare(&mut ctx) {
            log::error!("failed to prepare procedure sequence: {:#}", e);
            return NodeResult::Failure;
        }
        if self.root.execute(&mut ctx) == NodeResult::Failure {
            log::error!("failed to execute procedure sequence");
            return NodeResult::Failure;
        }
        if let Err(e) = self.root.finalise(&mut ctx) {
            log::error!("failed to finalise procedure sequence: {:#}", e);
            return NodeResult::Failure;
        }
        NodeResult::Success
    }

    /// canonical deck form of the node tree
    pub fn write(&self, indent: usize) -> String {
        self.root.write(indent)
    }
}
