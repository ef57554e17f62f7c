use super::pad;
use super::NodeRef;
use crate::data::Histogram1D;
use crate::data::Histogram2D;
use crate::data::Histogram3D;
use crate::generic::IN_RESTART_FILE;
use crate::procedure::NodeResult;
use crate::procedure::RunContext;

/// list key under which a collect node accumulates across restarts
fn accumulated_key(name: &str, ctx: &RunContext) -> String {
    format!("Accumulated_{}_{}", name, ctx.config.name())
}

/// Accumulates the value of a named observable into a one-dimensional
/// histogram. The working histogram lives in the procedure state; a
/// copy is kept in the generic list so accumulation survives restarts.
#[derive(Debug)]
pub struct Collect1DNode {
    pub id: usize,
    pub name: String,
    pub observable: NodeRef,
    pub minimum: f64,
    pub maximum: f64,
    pub bin_width: f64,
}

impl Collect1DNode {
    pub fn prepare(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        if !ctx.state.hist1d.contains_key(&self.id) {
            let key = accumulated_key(&self.name, ctx);
            let fresh = Histogram1D::new(self.minimum, self.maximum, self.bin_width);
            let adopted = ctx.list.value(&key, ctx.prefix, fresh);
            ctx.state.hist1d.insert(self.id, adopted);
        }
        Ok(())
    }

    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        if let Some(hist) = ctx.state.hist1d.get(&self.id) {
            let hist = hist.clone();
            let key = accumulated_key(&self.name, ctx);
            *ctx.list.realise::<Histogram1D>(&key, ctx.prefix, IN_RESTART_FILE) = hist;
        }
        Ok(())
    }

    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let Some(value) = ctx.state.value(self.observable.id) else {
            log::error!("node '{}' has no observable value from '{}'", self.name, self.observable.name);
            return NodeResult::Failure;
        };
        ctx.state
            .hist1d
            .get_mut(&self.id)
            .expect("histogram realised in prepare")
            .bin(value);
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Collect1D  '{}'\n", pad(indent), self.name);
        out += &format!("{}QuantityX  '{}'\n", pad(indent + 1), self.observable.name);
        out += &format!(
            "{}RangeX  {}  {}  {}\n",
            pad(indent + 1),
            self.minimum,
            self.maximum,
            self.bin_width,
        );
        out += &format!("{}EndCollect1D\n", pad(indent));
        out
    }
}

/// Accumulates a pair of observables into a two-dimensional histogram.
#[derive(Debug)]
pub struct Collect2DNode {
    pub id: usize,
    pub name: String,
    pub x_observable: NodeRef,
    pub y_observable: NodeRef,
    pub minima: [f64; 2],
    pub maxima: [f64; 2],
    pub bin_widths: [f64; 2],
}

impl Collect2DNode {
    pub fn prepare(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        if !ctx.state.hist2d.contains_key(&self.id) {
            let key = accumulated_key(&self.name, ctx);
            let fresh = Histogram2D::new(self.minima, self.maxima, self.bin_widths);
            let adopted = ctx.list.value(&key, ctx.prefix, fresh);
            ctx.state.hist2d.insert(self.id, adopted);
        }
        Ok(())
    }

    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        if let Some(hist) = ctx.state.hist2d.get(&self.id) {
            let hist = hist.clone();
            let key = accumulated_key(&self.name, ctx);
            *ctx.list.realise::<Histogram2D>(&key, ctx.prefix, IN_RESTART_FILE) = hist;
        }
        Ok(())
    }

    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let x = ctx.state.value(self.x_observable.id);
        let y = ctx.state.value(self.y_observable.id);
        let (Some(x), Some(y)) = (x, y) else {
            log::error!("node '{}' is missing an observable value", self.name);
            return NodeResult::Failure;
        };
        ctx.state
            .hist2d
            .get_mut(&self.id)
            .expect("histogram realised in prepare")
            .bin(x, y);
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Collect2D  '{}'\n", pad(indent), self.name);
        out += &format!("{}QuantityX  '{}'\n", pad(indent + 1), self.x_observable.name);
        out += &format!("{}QuantityY  '{}'\n", pad(indent + 1), self.y_observable.name);
        out += &format!(
            "{}RangeX  {}  {}  {}\n",
            pad(indent + 1),
            self.minima[0],
            self.maxima[0],
            self.bin_widths[0],
        );
        out += &format!(
            "{}RangeY  {}  {}  {}\n",
            pad(indent + 1),
            self.minima[1],
            self.maxima[1],
            self.bin_widths[1],
        );
        out += &format!("{}EndCollect2D\n", pad(indent));
        out
    }
}

/// Accumulates the components of a vector observable into a
/// three-dimensional histogram.
#[derive(Debug)]
pub struct Collect3DNode {
    pub id: usize,
    pub name: String,
    pub observable: NodeRef,
    pub minima: [f64; 3],
    pub maxima: [f64; 3],
    pub bin_widths: [f64; 3],
}

impl Collect3DNode {
    pub fn prepare(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        if !ctx.state.hist3d.contains_key(&self.id) {
            let key = accumulated_key(&self.name, ctx);
            let fresh = Histogram3D::new(self.minima, self.maxima, self.bin_widths);
            let adopted = ctx.list.value(&key, ctx.prefix, fresh);
            ctx.state.hist3d.insert(self.id, adopted);
        }
        Ok(())
    }

    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        if let Some(hist) = ctx.state.hist3d.get(&self.id) {
            let hist = hist.clone();
            let key = accumulated_key(&self.name, ctx);
            *ctx.list.realise::<Histogram3D>(&key, ctx.prefix, IN_RESTART_FILE) = hist;
        }
        Ok(())
    }

    pub fn execute(&self, ctx: &mut RunContext) -> NodeResult {
        let Some(v) = ctx.state.vector(self.observable.id) else {
            log::error!("node '{}' has no vector observable from '{}'", self.name, self.observable.name);
            return NodeResult::Failure;
        };
        ctx.state
            .hist3d
            .get_mut(&self.id)
            .expect("histogram realised in prepare")
            .bin(v.x, v.y, v.z);
        NodeResult::Success
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Collect3D  '{}'\n", pad(indent), self.name);
        out += &format!("{}QuantityXYZ  '{}'\n", pad(indent + 1), self.observable.name);
        for (axis, n) in [("RangeX", 0), ("RangeY", 1), ("RangeZ", 2)] {
            out += &format!(
                "{}{}  {}  {}  {}\n",
                pad(indent + 1),
                axis,
                self.minima[n],
                self.maxima[n],
                self.bin_widths[n],
            );
        }
        out += &format!("{}EndCollect3D\n", pad(indent));
        out
    }
}
