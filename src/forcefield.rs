use crate::potentials::ShortRange;
use crate::species::AngleForm;
use crate::species::BondForm;
use crate::species::TorsionForm;
use std::collections::BTreeMap;

/// Short-range and charge parameters a forcefield assigns to one atom
/// type fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcefieldAtomType {
    pub name: String,
    pub short_range: ShortRange,
    pub charge: f64,
}

/// Read-only map from atom-type fingerprints to interaction parameters.
///
/// Bonded terms are keyed by the type names of the participating atoms
/// and looked up in both orientations, so a term declared as A-B-C
/// also answers C-B-A. Maps are ordered so canonical output is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct Forcefield {
    atom_types: BTreeMap<String, ForcefieldAtomType>,
    bonds: BTreeMap<(String, String), BondForm>,
    angles: BTreeMap<(String, String, String), AngleForm>,
    torsions: BTreeMap<(String, String, String, String), TorsionForm>,
}

impl Forcefield {
    pub fn add_atom_type(&mut self, name: &str, short_range: ShortRange, charge: f64) {
        self.atom_types.insert(
            name.to_string(),
            ForcefieldAtomType {
                name: name.to_string(),
                short_range,
                charge,
            },
        );
    }

    pub fn add_bond_term(&mut self, i: &str, j: &str, form: BondForm) {
        self.bonds.insert((i.to_string(), j.to_string()), form);
    }

    pub fn add_angle_term(&mut self, i: &str, j: &str, k: &str, form: AngleForm) {
        self.angles.insert((i.to_string(), j.to_string(), k.to_string()), form);
    }

    pub fn add_torsion_term(&mut self, i: &str, j: &str, k: &str, l: &str, form: TorsionForm) {
        self.torsions.insert(
            (i.to_string(), j.to_string(), k.to_string(), l.to_string()),
            form,
        );
    }

    pub fn atom_type(&self, fingerprint: &str) -> Option<&ForcefieldAtomType> {
        self.atom_types.get(fingerprint)
    }

    pub fn bond_term(&self, i: &str, j: &str) -> Option<BondForm> {
        self.bonds
            .get(&(i.to_string(), j.to_string()))
            .or_else(|| self.bonds.get(&(j.to_string(), i.to_string())))
            .copied()
    }

    pub fn angle_term(&self, i: &str, j: &str, k: &str) -> Option<AngleForm> {
        self.angles
            .get(&(i.to_string(), j.to_string(), k.to_string()))
            .or_else(|| self.angles.get(&(k.to_string(), j.to_string(), i.to_string())))
            .copied()
    }

    pub fn torsion_term(&self, i: &str, j: &str, k: &str, l: &str) -> Option<TorsionForm> {
        self.torsions
            .get(&(i.to_string(), j.to_string(), k.to_string(), l.to_string()))
            .or_else(|| {
                self.torsions
                    .get(&(l.to_string(), k.to_string(), j.to_string(), i.to_string()))
            })
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.atom_types.is_empty()
            && self.bonds.is_empty()
            && self.angles.is_empty()
            && self.torsions.is_empty()
    }

    pub fn bonds(&self) -> impl Iterator<Item = (&(String, String), &BondForm)> {
        self.bonds.iter()
    }

    pub fn angles(&self) -> impl Iterator<Item = (&(String, String, String), &AngleForm)> {
        self.angles.iter()
    }

    pub fn torsions(&self) -> impl Iterator<Item = (&(String, String, String, String), &TorsionForm)> {
        self.torsions.iter()
    }
}
