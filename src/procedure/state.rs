use crate::data::Histogram1D;
use crate::data::Histogram2D;
use crate::data::Histogram3D;
use crate::species::Site;
use nalgebra::Vector3;
use std::collections::HashMap;

/// Per-select runtime bookkeeping: the site currently exposed to
/// descendant nodes, plus population counters for normalisation.
#[derive(Debug, Clone, Default)]
pub struct SelectState {
    pub current: Option<Site>,
    pub total_selected: u64,
    pub executions: u64,
}

impl SelectState {
    /// mean number of selected sites per execution
    pub fn average_sites(&self) -> f64 {
        match self.executions {
            0 => 0.0,
            n => self.total_selected as f64 / n as f64,
        }
    }
}

/// Runtime state of a procedure's nodes, keyed by node id. Kept apart
/// from the node definitions so the tree itself stays immutable during
/// execution.
#[derive(Debug, Default)]
pub struct ProcedureState {
    selects: HashMap<usize, SelectState>,
    values: HashMap<usize, f64>,
    vectors: HashMap<usize, Vector3<f64>>,
    pub hist1d: HashMap<usize, Histogram1D>,
    pub hist2d: HashMap<usize, Histogram2D>,
    pub hist3d: HashMap<usize, Histogram3D>,
    parameters: HashMap<String, f64>,
}

impl ProcedureState {
    pub fn select_mut(&mut self, id: usize) -> &mut SelectState {
        self.selects.entry(id).or_default()
    }

    pub fn select(&self, id: usize) -> Option<&SelectState> {
        self.selects.get(&id)
    }

    pub fn current_site(&self, id: usize) -> Option<Site> {
        self.selects.get(&id).and_then(|s| s.current)
    }

    pub fn set_current_site(&mut self, id: usize, site: Site) {
        self.select_mut(id).current = Some(site);
    }

    pub fn total_selected(&self, id: usize) -> u64 {
        self.selects.get(&id).map(|s| s.total_selected).unwrap_or(0)
    }

    pub fn average_sites(&self, id: usize) -> f64 {
        self.selects.get(&id).map(|s| s.average_sites()).unwrap_or(0.0)
    }

    pub fn value(&self, id: usize) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn set_value(&mut self, id: usize, value: f64) {
        self.values.insert(id, value);
    }

    pub fn vector(&self, id: usize) -> Option<Vector3<f64>> {
        self.vectors.get(&id).copied()
    }

    pub fn set_vector(&mut self, id: usize, vector: Vector3<f64>) {
        self.vectors.insert(id, vector);
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) {
        self.parameters.insert(name.to_string(), value);
    }
}
