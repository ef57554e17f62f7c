pub mod atom;
pub mod molecule;

pub use atom::Atom;
pub use atom::UNASSIGNED_CELL;
pub use molecule::Molecule;

use crate::atomtypes::AtomTypeMix;
use crate::cells::CellArray;
use crate::simbox::SimBox;
use crate::species::Species;
use nalgebra::Vector3;
use std::sync::Arc;

/// One simulation box and everything in it.
///
/// The configuration owns the box, the cell partition, and the atom and
/// molecule arenas; every inter-object reference is an index into those
/// arenas. The contents version increases monotonically on every
/// mutation so that analyses can be memoised against it.
#[derive(Debug, Clone)]
pub struct Configuration {
    name: String,
    bx: SimBox,
    cells: CellArray,
    cell_range: f64,
    atoms: Vec<Atom>,
    molecules: Vec<Molecule>,
    used_types: AtomTypeMix,
    used_species: Vec<(Arc<Species>, usize)>,
    contents_version: u64,
    requested_size_factor: f64,
    applied_size_factor: f64,
    temperature: f64,
    seed: u64,
}

impl Configuration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bx: SimBox::cubic(1.0).expect("unit box is valid"),
            cells: CellArray::default(),
            cell_range: 0.0,
            atoms: Vec::new(),
            molecules: Vec::new(),
            used_types: AtomTypeMix::default(),
            used_species: Vec::new(),
            contents_version: 0,
            requested_size_factor: 1.0,
            applied_size_factor: 1.0,
            temperature: 300.0,
            seed: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sim_box(&self) -> &SimBox {
        &self.bx
    }

    pub fn cells(&self) -> &CellArray {
        &self.cells
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// nth atom; out-of-range indices resolve to nothing and are the
    /// caller's degenerate-input case
    pub fn atom(&self, n: usize) -> Option<&Atom> {
        self.atoms.get(n)
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    pub fn molecule(&self, n: usize) -> Option<&Molecule> {
        self.molecules.get(n)
    }

    pub fn n_molecules(&self) -> usize {
        self.molecules.len()
    }

    pub fn used_types(&self) -> &AtomTypeMix {
        &self.used_types
    }

    pub fn used_species(&self) -> &[(Arc<Species>, usize)] {
        &self.used_species
    }

    pub fn contents_version(&self) -> u64 {
        self.contents_version
    }

    pub fn increment_contents_version(&mut self) {
        self.contents_version += 1;
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn atomic_density(&self) -> f64 {
        self.atoms.len() as f64 / self.bx.volume()
    }

    /// Replace the box. Cell data is stale afterwards; callers must
    /// re-partition with update_cells before any kernel work.
    pub fn set_box(&mut self, bx: SimBox) {
        self.bx = bx;
        self.cell_range = 0.0;
    }

    /// Partition the current box for the given interaction range and
    /// (re)assign every atom to the cell containing its folded position.
    pub fn update_cells(&mut self, range: f64) {
        self.cells = CellArray::generate(&self.bx, range);
        self.cell_range = range;
        for n in 0..self.atoms.len() {
            let folded = self.bx.fold(self.atoms[n].r);
            let cell = self.cells.cell_containing(&self.bx, folded);
            self.atoms[n].r = folded;
            self.atoms[n].cell = cell;
            self.cells.cell_mut(cell).expect("cell index in range").add(n);
        }
    }

    /// Instantiate a molecule of the species, using supplied coordinates
    /// or the species' own template geometry.
    pub fn add_molecule(&mut self, species: Arc<Species>, coordinates: Option<&[Vector3<f64>]>) -> usize {
        let molecule = self.molecules.len();
        let mut indices = Vec::with_capacity(species.n_atoms());
        for (n, template) in species.atoms().iter().enumerate() {
            let r = match coordinates {
                Some(coords) => coords[n],
                None => template.r,
            };
            let local_type = self.used_types.add(template.atom_type, 1);
            indices.push(self.atoms.len());
            self.atoms.push(Atom {
                r,
                cell: UNASSIGNED_CELL,
                molecule,
                local_type,
                master_type: template.atom_type,
                charge: template.charge,
                species_atom: n,
            });
        }
        match self.used_species.iter_mut().find(|(sp, _)| Arc::ptr_eq(sp, &species)) {
            Some((_, population)) => *population += 1,
            None => self.used_species.push((species.clone(), 1)),
        }
        self.molecules.push(Molecule {
            species,
            atoms: indices,
        });
        self.contents_version += 1;
        molecule
    }

    /// Move an atom, reconciling its cell membership incrementally.
    pub fn set_atom_position(&mut self, n: usize, r: Vector3<f64>) {
        let Some(atom) = self.atoms.get_mut(n) else {
            log::error!("atom index {} out of range in configuration '{}'", n, self.name);
            return;
        };
        atom.r = self.bx.fold(r);
        self.contents_version += 1;
        self.update_cell_location(n);
    }

    /// Reconcile one atom's cell linkage with its current position.
    pub fn update_cell_location(&mut self, n: usize) {
        if self.cells.n_cells() == 0 {
            return;
        }
        let (old, r) = (self.atoms[n].cell, self.atoms[n].r);
        let new = self.cells.cell_containing(&self.bx, r);
        if new == old {
            return;
        }
        if old != UNASSIGNED_CELL {
            self.cells.cell_mut(old).expect("old cell exists").remove(n);
        }
        self.cells.cell_mut(new).expect("new cell exists").add(n);
        self.atoms[n].cell = new;
    }

    /// Clear contents, leaving the definition (name, temperature, seed)
    /// intact.
    pub fn empty(&mut self) {
        self.molecules.clear();
        self.atoms.clear();
        self.used_types.clear();
        self.used_species.clear();
        self.bx = SimBox::cubic(1.0).expect("unit box is valid");
        self.cells = CellArray::default();
        self.cell_range = 0.0;
        self.contents_version += 1;
    }

    pub fn requested_size_factor(&self) -> f64 {
        self.requested_size_factor
    }

    pub fn applied_size_factor(&self) -> f64 {
        self.applied_size_factor
    }

    pub fn request_size_factor(&mut self, factor: f64) {
        self.requested_size_factor = factor;
    }

    /// Bring the applied size factor in line with the requested one by
    /// scaling the box and the molecule centres, then re-partition.
    pub fn apply_size_factor(&mut self) {
        if (self.requested_size_factor - self.applied_size_factor).abs() < 1e-12 {
            return;
        }
        let factor = self.requested_size_factor / self.applied_size_factor;
        let lengths = self.bx.axis_lengths() * factor;
        let angles = self.bx.axis_angles();
        self.bx = SimBox::from_parameters(lengths, angles).expect("scaled box stays valid");
        self.scale_molecule_centres(factor);
        self.applied_size_factor = self.requested_size_factor;
        if self.cell_range > 0.0 {
            self.update_cells(self.cell_range);
        }
        self.contents_version += 1;
    }

    /// Scale molecule centres of geometry, keeping intramolecular
    /// geometry rigid.
    pub fn scale_molecule_centres(&mut self, factor: f64) {
        for m in 0..self.molecules.len() {
            let old_centre = self.bx.fold(self.molecules[m].centre_of_geometry(&self.atoms, &self.bx));
            let new_centre = old_centre * factor;
            for n in self.molecules[m].atoms.clone() {
                let offset = self.bx.minimum_vector(old_centre, self.atoms[n].r);
                self.atoms[n].r = new_centre + offset;
            }
        }
        self.contents_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::BondForm;

    fn water_like() -> Arc<Species> {
        let mut sp = Species::new("water");
        sp.add_atom("OW", 0, -0.8, Vector3::new(0.0, 0.0, 0.0));
        sp.add_atom("HW1", 1, 0.4, Vector3::new(0.96, 0.0, 0.0));
        sp.add_atom("HW2", 1, 0.4, Vector3::new(-0.24, 0.93, 0.0));
        sp.add_bond(0, 1, BondForm::Harmonic { k: 4637.0, r0: 1.0 }).unwrap();
        sp.add_bond(0, 2, BondForm::Harmonic { k: 4637.0, r0: 1.0 }).unwrap();
        sp.finalise();
        Arc::new(sp)
    }

    #[test]
    fn contents_version_is_strictly_monotonic() {
        let mut cfg = Configuration::new("bulk");
        let before = cfg.contents_version();
        cfg.set_box(SimBox::cubic(20.0).unwrap());
        cfg.add_molecule(water_like(), None);
        let after_add = cfg.contents_version();
        assert!(after_add > before);
        cfg.empty();
        assert!(cfg.contents_version() > after_add);
    }

    #[test]
    fn add_molecule_populates_arenas_and_histograms() {
        let mut cfg = Configuration::new("bulk");
        cfg.set_box(SimBox::cubic(20.0).unwrap());
        let sp = water_like();
        cfg.add_molecule(sp.clone(), None);
        cfg.add_molecule(sp.clone(), Some(&[
            Vector3::new(5.0, 5.0, 5.0),
            Vector3::new(5.96, 5.0, 5.0),
            Vector3::new(4.76, 5.93, 5.0),
        ]));
        assert_eq!(cfg.n_molecules(), 2);
        assert_eq!(cfg.n_atoms(), 6);
        assert_eq!(cfg.used_types().len(), 2);
        assert_eq!(cfg.used_types().get(0).unwrap().population, 2);
        assert_eq!(cfg.used_types().get(1).unwrap().population, 4);
        assert_eq!(cfg.used_species().len(), 1);
        assert_eq!(cfg.used_species()[0].1, 2);
        // molecule atom order mirrors species atom order
        let mol = cfg.molecule(1).unwrap();
        for (n, index) in mol.atoms.iter().enumerate() {
            assert_eq!(cfg.atom(*index).unwrap().species_atom, n);
        }
    }

    #[test]
    fn cells_track_atom_moves() {
        let mut cfg = Configuration::new("bulk");
        cfg.set_box(SimBox::cubic(30.0).unwrap());
        cfg.add_molecule(water_like(), Some(&[
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.96, 1.0, 1.0),
            Vector3::new(0.76, 1.93, 1.0),
        ]));
        cfg.update_cells(10.0);
        let home = cfg.atom(0).unwrap().cell;
        assert!(cfg.cells().cell(home).unwrap().contains(0));
        cfg.set_atom_position(0, Vector3::new(25.0, 25.0, 25.0));
        let moved = cfg.atom(0).unwrap().cell;
        assert_ne!(home, moved);
        assert!(!cfg.cells().cell(home).unwrap().contains(0));
        assert!(cfg.cells().cell(moved).unwrap().contains(0));
        // every atom sits in exactly the cell containing its position
        for (n, atom) in cfg.atoms().iter().enumerate() {
            let expected = cfg.cells().cell_containing(cfg.sim_box(), atom.r);
            assert_eq!(atom.cell, expected);
            assert!(cfg.cells().cell(expected).unwrap().contains(n));
        }
    }

    #[test]
    fn size_factor_scales_box_and_centres() {
        let mut cfg = Configuration::new("bulk");
        cfg.set_box(SimBox::cubic(20.0).unwrap());
        cfg.add_molecule(water_like(), Some(&[
            Vector3::new(10.0, 10.0, 10.0),
            Vector3::new(10.96, 10.0, 10.0),
            Vector3::new(9.76, 10.93, 10.0),
        ]));
        cfg.update_cells(5.0);
        let bond = (cfg.atom(0).unwrap().r - cfg.atom(1).unwrap().r).norm();
        cfg.request_size_factor(1.5);
        cfg.apply_size_factor();
        assert!((cfg.sim_box().axis_lengths().x - 30.0).abs() < 1e-9);
        assert_eq!(cfg.applied_size_factor(), 1.5);
        // intramolecular geometry is rigid under the scaling
        let scaled_bond = (cfg.atom(0).unwrap().r - cfg.atom(1).unwrap().r).norm();
        assert!((bond - scaled_bond).abs() < 1e-9);
    }
}
