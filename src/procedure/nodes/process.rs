use super::on_off;
use super::pad;
use super::NodeRef;
use crate::data::Data1D;
use crate::data::Data2D;
use crate::data::Data3D;
use crate::generic::IN_RESTART_FILE;
use crate::procedure::RunContext;
use anyhow::bail;
use std::io::Write;

/// Normalisers shared by the process nodes, applied in a fixed order:
/// site population, number density, spherical shell volume (1D only),
/// scalar factor, unit integral.
#[derive(Debug, Default)]
pub struct Normalisation {
    pub site_population: Vec<NodeRef>,
    pub number_density: Vec<NodeRef>,
    pub spherical_shell_volume: bool,
    pub factor: Option<f64>,
    pub to_one: bool,
}

impl Normalisation {
    fn write(&self, indent: usize) -> String {
        let mut out = String::new();
        for select in &self.site_population {
            out += &format!("{}NSites  '{}'\n", pad(indent), select.name);
        }
        for select in &self.number_density {
            out += &format!("{}NumberDensity  '{}'\n", pad(indent), select.name);
        }
        if self.spherical_shell_volume {
            out += &format!("{}SphericalShellVolume  On\n", pad(indent));
        }
        if let Some(factor) = self.factor {
            out += &format!("{}Factor  {}\n", pad(indent), factor);
        }
        if self.to_one {
            out += &format!("{}NormaliseToOne  On\n", pad(indent));
        }
        out
    }
}

/// population divisor: total sites selected over the whole run, which
/// against raw accumulated counts averages over executions as well
fn population(ctx: &RunContext, select: &NodeRef) -> anyhow::Result<f64> {
    match ctx.state.total_selected(select.id) {
        0 => bail!("select '{}' never selected any sites", select.name),
        n => Ok(n as f64),
    }
}

/// instantaneous number density of a select's sites
fn number_density(ctx: &RunContext, select: &NodeRef) -> anyhow::Result<f64> {
    let average = ctx.state.average_sites(select.id);
    if average == 0.0 {
        bail!("select '{}' never selected any sites", select.name);
    }
    Ok(average / ctx.config.sim_box().volume())
}

/// master-only export behind the pool's collective decision
fn export(ctx: &RunContext, path: &str, rows: &mut dyn Iterator<Item = String>) -> anyhow::Result<()> {
    if ctx.pool.is_master() {
        let written = std::fs::File::create(path)
            .map_err(anyhow::Error::from)
            .and_then(|mut file| {
                for row in rows {
                    writeln!(file, "{}", row)?;
                }
                Ok(())
            });
        match written {
            Ok(()) => {
                ctx.pool.decide_true();
            }
            Err(e) => {
                ctx.pool.decide_false();
                return Err(e.context(format!("failed to export '{}'", path)));
            }
        }
    } else if !ctx.pool.decision() {
        bail!("master failed to export '{}'", path);
    }
    Ok(())
}

/// Normalises the accumulated data of a Collect1D node and saves the
/// result to the generic list (and optionally to disk) at finalise time.
#[derive(Debug)]
pub struct Process1DNode {
    pub id: usize,
    pub name: String,
    pub source: NodeRef,
    pub normalisation: Normalisation,
    pub value_label: String,
    pub x_label: String,
    pub save: bool,
}

impl Process1DNode {
    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        let Some(hist) = ctx.state.hist1d.get(&self.source.id) else {
            bail!("no accumulated data available from '{}'", self.source.name);
        };
        let mut data = hist.data();
        let half_bin = hist.bin_width * 0.5;
        data.name = self.name.clone();
        data.tag = format!("{}//Process1D//{}//{}", ctx.prefix, ctx.config.name(), self.name);
        for select in &self.normalisation.site_population {
            data /= population(ctx, select)?;
        }
        for select in &self.normalisation.number_density {
            data /= number_density(ctx, select)?;
        }
        if self.normalisation.spherical_shell_volume {
            let mut r1_cubed = (data.x[0] - half_bin).powi(3);
            for n in 0..data.n_values() {
                let r2_cubed = (data.x[n] + half_bin).powi(3);
                data.values[n] /= (4.0 / 3.0) * std::f64::consts::PI * (r2_cubed - r1_cubed);
                r1_cubed = r2_cubed;
            }
        }
        if let Some(factor) = self.normalisation.factor {
            data /= factor;
        }
        if self.normalisation.to_one {
            data /= data.abs_sum();
        }
        if self.save {
            let path = format!("{}_{}.txt", self.name, ctx.config.name());
            let mut rows = data
                .x
                .iter()
                .zip(&data.values)
                .map(|(x, v)| format!("{:16.9e}  {:16.9e}", x, v));
            export(ctx, &path, &mut rows)?;
        }
        let stored = ctx.list.realise::<Data1D>(
            &format!("{}_{}", self.name, ctx.config.name()),
            ctx.prefix,
            IN_RESTART_FILE,
        );
        *stored = data;
        Ok(())
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Process1D  '{}'\n", pad(indent), self.name);
        out += &format!("{}SourceData  '{}'\n", pad(indent + 1), self.source.name);
        out += &self.normalisation.write(indent + 1);
        out += &format!("{}LabelValue  '{}'\n", pad(indent + 1), self.value_label);
        out += &format!("{}LabelX  '{}'\n", pad(indent + 1), self.x_label);
        out += &format!("{}Save  {}\n", pad(indent + 1), on_off(self.save));
        out += &format!("{}EndProcess1D\n", pad(indent));
        out
    }
}

/// Two-dimensional counterpart of Process1D; no shell normalisation.
#[derive(Debug)]
pub struct Process2DNode {
    pub id: usize,
    pub name: String,
    pub source: NodeRef,
    pub normalisation: Normalisation,
    pub save: bool,
}

impl Process2DNode {
    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        let Some(hist) = ctx.state.hist2d.get(&self.source.id) else {
            bail!("no accumulated data available from '{}'", self.source.name);
        };
        let mut data = hist.data();
        data.name = self.name.clone();
        data.tag = format!("{}//Process2D//{}//{}", ctx.prefix, ctx.config.name(), self.name);
        for select in &self.normalisation.site_population {
            data /= population(ctx, select)?;
        }
        for select in &self.normalisation.number_density {
            data /= number_density(ctx, select)?;
        }
        if let Some(factor) = self.normalisation.factor {
            data /= factor;
        }
        if self.normalisation.to_one {
            let sum: f64 = data.values.iter().map(|v| v.abs()).sum();
            data /= sum;
        }
        if self.save {
            let path = format!("{}_{}.txt", self.name, ctx.config.name());
            let mut rows = data
                .x
                .iter()
                .enumerate()
                .flat_map(|(i, x)| data.y.iter().enumerate().map(move |(j, y)| (i, j, *x, *y)))
                .map(|(i, j, x, y)| format!("{:16.9e}  {:16.9e}  {:16.9e}", x, y, data.value(i, j)));
            export(ctx, &path, &mut rows)?;
        }
        let stored = ctx.list.realise::<Data2D>(
            &format!("{}_{}", self.name, ctx.config.name()),
            ctx.prefix,
            IN_RESTART_FILE,
        );
        *stored = data;
        Ok(())
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Process2D  '{}'\n", pad(indent), self.name);
        out += &format!("{}SourceData  '{}'\n", pad(indent + 1), self.source.name);
        out += &self.normalisation.write(indent + 1);
        out += &format!("{}Save  {}\n", pad(indent + 1), on_off(self.save));
        out += &format!("{}EndProcess2D\n", pad(indent));
        out
    }
}

/// Three-dimensional counterpart of Process1D; no shell normalisation.
#[derive(Debug)]
pub struct Process3DNode {
    pub id: usize,
    pub name: String,
    pub source: NodeRef,
    pub normalisation: Normalisation,
    pub save: bool,
}

impl Process3DNode {
    pub fn finalise(&self, ctx: &mut RunContext) -> anyhow::Result<()> {
        let Some(hist) = ctx.state.hist3d.get(&self.source.id) else {
            bail!("no accumulated data available from '{}'", self.source.name);
        };
        let mut data = hist.data();
        data.name = self.name.clone();
        data.tag = format!("{}//Process3D//{}//{}", ctx.prefix, ctx.config.name(), self.name);
        for select in &self.normalisation.site_population {
            data /= population(ctx, select)?;
        }
        for select in &self.normalisation.number_density {
            data /= number_density(ctx, select)?;
        }
        if let Some(factor) = self.normalisation.factor {
            data /= factor;
        }
        if self.normalisation.to_one {
            let sum: f64 = data.values.iter().map(|v| v.abs()).sum();
            data /= sum;
        }
        let stored = ctx.list.realise::<Data3D>(
            &format!("{}_{}", self.name, ctx.config.name()),
            ctx.prefix,
            IN_RESTART_FILE,
        );
        *stored = data;
        Ok(())
    }

    pub fn write(&self, indent: usize) -> String {
        let mut out = format!("{}Process3D  '{}'\n", pad(indent), self.name);
        out += &format!("{}SourceData  '{}'\n", pad(indent + 1), self.source.name);
        out += &self.normalisation.write(indent + 1);
        out += &format!("{}Save  {}\n", pad(indent + 1), on_off(self.save));
        out += &format!("{}EndProcess3D\n", pad(indent));
        out
    }
}
