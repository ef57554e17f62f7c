use super::pad;
use super::NodeRef;
use crate::procedure::NodeResult;
use crate::procedure::RunContext;

/// Guard node: within a selection loop, skip the current iteration when
/// two named selects have resolved to the same physical site.
#[derive(Debug)]
pub struct ExcludeNode {
    pub id: usize,
    pub name: String,
    pub same_site: Option<(NodeRef, NodeRef)>,
}

impl ExcludeNode {
    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        if let Some((a, b)) = &self.same_site {
            let site_a = ctx.state.current_site(a.id);
            let site_b = ctx.state.current_site(b.id);
            if let (Some(site_a), Some(site_b)) = (site_a, site_b) {
                if site_a.same_site(&site_b) {
                    return NodeResult::Skip;
                }
            }
        }
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Exclude\n", pad(indent));
        if let Some((a, b)) = &self.same_site {
            out += &format!("{}SameSite  '{}'  '{}'\n", pad(indent + 1), a.name, b.name);
        }
        out += &format!("{}EndExclude\n", pad(indent));
        out
    }
}
