use super::atom::Atom;
use crate::simbox::SimBox;
use crate::species::Species;
use nalgebra::Vector3;
use std::sync::Arc;

/// One instance of a species: an ordered list of atom indices into the
/// configuration's atom arena. The i-th atom instantiates the i-th
/// species atom, so topology never needs to be stored per molecule.
#[derive(Debug, Clone)]
pub struct Molecule {
    pub species: Arc<Species>,
    pub atoms: Vec<usize>,
}

impl Molecule {
    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// arena index of the n-th atom of this molecule
    pub fn atom(&self, n: usize) -> Option<usize> {
        self.atoms.get(n).copied()
    }

    /// Centre of geometry accumulated under minimum image: each atom
    /// contributes its image closest to the first atom, so molecules
    /// straddling a boundary resolve to a sensible centre.
    pub fn centre_of_geometry(&self, atoms: &[Atom], bx: &SimBox) -> Vector3<f64> {
        let mut indices = self.atoms.iter();
        let first = match indices.next() {
            Some(first) => atoms[*first].r,
            None => return Vector3::zeros(),
        };
        let mut total = first;
        for index in indices {
            total += first + bx.minimum_vector(first, atoms[*index].r);
        }
        total / self.atoms.len() as f64
    }
}
