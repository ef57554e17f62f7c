pub mod site;
pub mod terms;

pub use site::Site;
pub use site::SpeciesSite;
pub use terms::AngleForm;
pub use terms::BondForm;
pub use terms::SpeciesAngle;
pub use terms::SpeciesBond;
pub use terms::SpeciesImproper;
pub use terms::SpeciesTorsion;
pub use terms::TorsionForm;

use crate::Scale;
use anyhow::bail;
use nalgebra::Vector3;
use std::collections::VecDeque;

/// An atom template within a species.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesAtom {
    pub name: String,
    /// master atom type index into the global registry
    pub atom_type: usize,
    pub charge: f64,
    pub r: Vector3<f64>,
}

/// The molecular template: ordered atoms, intramolecular terms referring
/// to those atoms by index, named sites, and the 1-n scaling matrix
/// derived from topological distance once the topology is finalised.
#[derive(Debug, Clone, Default)]
pub struct Species {
    name: String,
    atoms: Vec<SpeciesAtom>,
    bonds: Vec<SpeciesBond>,
    angles: Vec<SpeciesAngle>,
    torsions: Vec<SpeciesTorsion>,
    impropers: Vec<SpeciesImproper>,
    sites: Vec<SpeciesSite>,
    scaling: Vec<Scale>,
}

impl Species {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[SpeciesAtom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&SpeciesAtom> {
        self.atoms.get(index)
    }

    pub fn bonds(&self) -> &[SpeciesBond] {
        &self.bonds
    }

    pub fn angles(&self) -> &[SpeciesAngle] {
        &self.angles
    }

    pub fn torsions(&self) -> &[SpeciesTorsion] {
        &self.torsions
    }

    pub fn impropers(&self) -> &[SpeciesImproper] {
        &self.impropers
    }

    pub fn sites(&self) -> &[SpeciesSite] {
        &self.sites
    }

    pub fn site(&self, name: &str) -> Option<(usize, &SpeciesSite)> {
        self.sites.iter().enumerate().find(|(_, s)| s.name == name)
    }

    /// geometric centre of the template coordinates
    pub fn centre(&self) -> Vector3<f64> {
        match self.atoms.len() {
            0 => Vector3::zeros(),
            n => self.atoms.iter().map(|a| a.r).sum::<Vector3<f64>>() / n as f64,
        }
    }

    pub fn add_atom(&mut self, name: &str, atom_type: usize, charge: f64, r: Vector3<f64>) -> usize {
        self.atoms.push(SpeciesAtom {
            name: name.to_string(),
            atom_type,
            charge,
            r,
        });
        self.atoms.len() - 1
    }

    fn check_indices(&self, indices: &[usize]) -> anyhow::Result<()> {
        for index in indices {
            if *index >= self.atoms.len() {
                bail!("atom index {} out of range in species '{}'", index, self.name);
            }
        }
        let mut unique = indices.to_vec();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != indices.len() {
            bail!("repeated atom index in term of species '{}'", self.name);
        }
        Ok(())
    }

    pub fn add_bond(&mut self, i: usize, j: usize, form: BondForm) -> anyhow::Result<()> {
        self.check_indices(&[i, j])?;
        self.bonds.push(SpeciesBond { i, j, form });
        Ok(())
    }

    pub fn add_angle(&mut self, i: usize, j: usize, k: usize, form: AngleForm) -> anyhow::Result<()> {
        self.check_indices(&[i, j, k])?;
        self.angles.push(SpeciesAngle { i, j, k, form });
        Ok(())
    }

    pub fn add_torsion(
        &mut self,
        i: usize,
        j: usize,
        k: usize,
        l: usize,
        form: TorsionForm,
    ) -> anyhow::Result<()> {
        self.check_indices(&[i, j, k, l])?;
        self.torsions.push(SpeciesTorsion { i, j, k, l, form });
        Ok(())
    }

    pub fn add_improper(
        &mut self,
        i: usize,
        j: usize,
        k: usize,
        l: usize,
        form: TorsionForm,
    ) -> anyhow::Result<()> {
        self.check_indices(&[i, j, k, l])?;
        self.impropers.push(SpeciesImproper { i, j, k, l, form });
        Ok(())
    }

    pub fn add_site(&mut self, name: &str, origins: Vec<usize>) -> anyhow::Result<()> {
        if origins.is_empty() {
            bail!("site '{}' on species '{}' has no origin atoms", name, self.name);
        }
        self.check_indices(&origins)?;
        if self.sites.iter().any(|s| s.name == name) {
            bail!("duplicate site name '{}' on species '{}'", name, self.name);
        }
        self.sites.push(SpeciesSite {
            name: name.to_string(),
            origins,
        });
        Ok(())
    }

    /// breadth-first topological distances from one atom over the bonds
    fn topological_distances(&self, from: usize) -> Vec<Option<usize>> {
        let mut distances = vec![None; self.atoms.len()];
        distances[from] = Some(0);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            let next = distances[current].expect("queued atoms have distances") + 1;
            for bond in &self.bonds {
                let neighbour = match (bond.i == current, bond.j == current) {
                    (true, _) => bond.j,
                    (_, true) => bond.i,
                    _ => continue,
                };
                if distances[neighbour].is_none() {
                    distances[neighbour] = Some(next);
                    queue.push_back(neighbour);
                }
            }
        }
        distances
    }

    /// Rebuild the 1-n scaling matrix from the current topology. Pairs
    /// separated by one or two bonds are excluded outright, 1-4 pairs are
    /// scaled by one half, everything further apart interacts in full.
    pub fn finalise(&mut self) {
        let n = self.atoms.len();
        self.scaling = vec![1.0; n * n];
        for i in 0..n {
            for (j, distance) in self.topological_distances(i).into_iter().enumerate() {
                self.scaling[i * n + j] = match distance {
                    Some(1) | Some(2) => 0.0,
                    Some(3) => 0.5,
                    _ => 1.0,
                };
            }
        }
    }

    /// intramolecular scaling factor between two atoms of this species
    pub fn scaling(&self, i: usize, j: usize) -> Scale {
        let n = self.atoms.len();
        match self.scaling.get(i * n + j) {
            Some(scale) => *scale,
            None => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// butane-like linear chain of four atoms
    fn chain() -> Species {
        let mut sp = Species::new("chain");
        for n in 0..4 {
            sp.add_atom(&format!("C{}", n + 1), 0, 0.0, Vector3::new(n as f64 * 1.5, 0.0, 0.0));
        }
        sp.add_bond(0, 1, BondForm::Harmonic { k: 1000.0, r0: 1.5 }).unwrap();
        sp.add_bond(1, 2, BondForm::Harmonic { k: 1000.0, r0: 1.5 }).unwrap();
        sp.add_bond(2, 3, BondForm::Harmonic { k: 1000.0, r0: 1.5 }).unwrap();
        sp.finalise();
        sp
    }

    #[test]
    fn scaling_follows_topological_distance() {
        let sp = chain();
        assert_eq!(sp.scaling(0, 1), 0.0);
        assert_eq!(sp.scaling(0, 2), 0.0);
        assert_eq!(sp.scaling(0, 3), 0.5);
        assert_eq!(sp.scaling(3, 0), 0.5);
    }

    #[test]
    fn disconnected_atoms_interact_in_full() {
        let mut sp = chain();
        sp.add_atom("X", 0, 0.0, Vector3::new(10.0, 0.0, 0.0));
        sp.finalise();
        assert_eq!(sp.scaling(0, 4), 1.0);
    }

    #[test]
    fn term_indices_are_validated() {
        let mut sp = Species::new("bad");
        sp.add_atom("A", 0, 0.0, Vector3::zeros());
        assert!(sp.add_bond(0, 5, BondForm::Harmonic { k: 1.0, r0: 1.0 }).is_err());
        assert!(sp.add_bond(0, 0, BondForm::Harmonic { k: 1.0, r0: 1.0 }).is_err());
    }

    #[test]
    fn sites_are_unique_and_validated() {
        let mut sp = chain();
        sp.add_site("head", vec![0]).unwrap();
        assert!(sp.add_site("head", vec![1]).is_err());
        assert!(sp.add_site("tail", vec![9]).is_err());
        assert!(sp.add_site("empty", vec![]).is_err());
        assert_eq!(sp.site("head").unwrap().0, 0);
    }
}
