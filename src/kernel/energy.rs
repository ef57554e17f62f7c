use super::flags::KernelFlags;
use crate::configuration::Atom;
use crate::configuration::Configuration;
use crate::pool::DivisionStrategy;
use crate::pool::ProcessPool;
use crate::potentials::PotentialMap;
use crate::species::SpeciesAngle;
use crate::species::SpeciesBond;
use crate::species::SpeciesImproper;
use crate::species::SpeciesTorsion;
use crate::simbox::SimBox;
use crate::Energy;
use crate::Scale;
use crate::SCALING_THRESHOLD;
use nalgebra::Vector3;

/// All pairwise and intramolecular energy queries over a configuration.
///
/// The kernel is stateless beyond its construction parameters and binds
/// to the configuration at its current contents version; topology must
/// not change between construction and use. Degenerate input (an index
/// that resolves to nothing, a zero-length term leg) is a programming
/// error: debug builds abort on it, release builds report it at error
/// level and yield zero.
pub struct EnergyKernel<'a> {
    pool: &'a ProcessPool,
    configuration: &'a Configuration,
    potential_map: &'a PotentialMap,
    cutoff_squared: f64,
}

/// degenerate query: fatal in debug builds, reported in release
fn degenerate(message: String) {
    log::error!("{}", message);
    if cfg!(debug_assertions) {
        panic!("{}", message);
    }
}

impl<'a> EnergyKernel<'a> {
    /// A negative or absent cutoff adopts the potential map's range.
    pub fn new(
        pool: &'a ProcessPool,
        configuration: &'a Configuration,
        potential_map: &'a PotentialMap,
        cutoff: Option<f64>,
    ) -> Self {
        let cutoff = match cutoff {
            Some(c) if c >= 0.0 => c,
            _ => potential_map.range(),
        };
        Self {
            pool,
            configuration,
            potential_map,
            cutoff_squared: cutoff * cutoff,
        }
    }

    fn bx(&self) -> &SimBox {
        self.configuration.sim_box()
    }

    /// intramolecular scaling between two atoms known to share a molecule
    fn scaling(&self, i: &Atom, j: &Atom) -> Scale {
        self.configuration.molecules()[i.molecule]
            .species
            .scaling(i.species_atom, j.species_atom)
    }

    /// pair potential lookup at a known separation
    pub fn pair_energy(&self, i: &Atom, j: &Atom, r: f64) -> Energy {
        self.potential_map.energy(i.master_type, j.master_type, r)
    }

    /// pair energy with geometry resolved here
    pub fn energy_between(&self, i: usize, j: usize, apply_mim: bool, exclude_ige_j: bool) -> Energy {
        if i == j {
            return 0.0;
        }
        if exclude_ige_j && i >= j {
            return 0.0;
        }
        let (Some(ai), Some(aj)) = (self.configuration.atom(i), self.configuration.atom(j)) else {
            degenerate(format!("atom index out of range in pair energy query ({}, {})", i, j));
            return 0.0;
        };
        let r = match apply_mim {
            true => self.bx().minimum_distance(ai.r, aj.r),
            false => (ai.r - aj.r).norm(),
        };
        self.pair_energy(ai, aj, r)
    }

    /// Pair energies between the atoms of two cells, the central cell's
    /// loop interleaved by the division strategy.
    pub fn cell_cell_energy(
        &self,
        central: usize,
        other: usize,
        apply_mim: bool,
        exclude_ige_j: bool,
        inter_molecular: bool,
        strategy: DivisionStrategy,
        perform_sum: bool,
    ) -> Energy {
        let cells = self.configuration.cells();
        let (Some(central_cell), Some(other_cell)) = (cells.cell(central), cells.cell(other)) else {
            degenerate(format!("cell index out of range in cell-cell energy query ({}, {})", central, other));
            return 0.0;
        };
        let atoms = self.configuration.atoms();
        let (start, stride) = self.pool.interleave(strategy);
        let mut total = 0.0;
        for n in (start..central_cell.n_atoms()).step_by(stride) {
            let i = central_cell.atoms()[n];
            let ai = &atoms[i];
            for &j in other_cell.atoms() {
                if exclude_ige_j && i >= j {
                    continue;
                }
                let aj = &atoms[j];
                let r_squared = match apply_mim {
                    true => self.bx().minimum_distance_squared(ai.r, aj.r),
                    false => (ai.r - aj.r).norm_squared(),
                };
                if r_squared > self.cutoff_squared {
                    continue;
                }
                if ai.molecule != aj.molecule {
                    total += self.pair_energy(ai, aj, r_squared.sqrt());
                } else if !inter_molecular {
                    let scale = self.scaling(ai, aj);
                    if scale > SCALING_THRESHOLD {
                        total += self.pair_energy(ai, aj, r_squared.sqrt()) * scale;
                    }
                }
            }
        }
        if perform_sum {
            let mut buffer = [total];
            self.pool.all_sum(&mut buffer, strategy);
            total = buffer[0];
        }
        total
    }

    /// Pair energies between a cell and all of its neighbours, direct
    /// neighbours without the wrap and mim-neighbours through it.
    pub fn cell_energy(
        &self,
        central: usize,
        exclude_ige_j: bool,
        inter_molecular: bool,
        strategy: DivisionStrategy,
        perform_sum: bool,
    ) -> Energy {
        let cells = self.configuration.cells();
        if cells.cell(central).is_none() {
            degenerate(format!("cell index {} out of range in cell energy query", central));
            return 0.0;
        }
        let mut total = 0.0;
        for (neighbours, mim) in [(cells.neighbours(central), false), (cells.mim_neighbours(central), true)] {
            for &other in neighbours {
                total += self.cell_cell_energy(
                    central,
                    other,
                    mim,
                    exclude_ige_j,
                    inter_molecular,
                    strategy,
                    false,
                );
            }
        }
        if perform_sum {
            let mut buffer = [total];
            self.pool.all_sum(&mut buffer, strategy);
            total = buffer[0];
        }
        total
    }

    /// Pair energies between one atom and the contents of a cell.
    pub fn atom_cell_energy(
        &self,
        i: usize,
        cell: usize,
        flags: KernelFlags,
        strategy: DivisionStrategy,
        perform_sum: bool,
    ) -> Energy {
        let Some(ai) = self.configuration.atom(i) else {
            degenerate(format!("atom index {} out of range in atom-cell energy query", i));
            return 0.0;
        };
        let Some(cell) = self.configuration.cells().cell(cell) else {
            degenerate(format!("cell index {} out of range in atom-cell energy query", cell));
            return 0.0;
        };
        let atoms = self.configuration.atoms();
        let apply_mim = flags.contains(KernelFlags::APPLY_MIM);
        let (start, stride) = self.pool.interleave(strategy);
        let mut total = 0.0;
        for n in (start..cell.n_atoms()).step_by(stride) {
            let j = cell.atoms()[n];
            if flags.contains(KernelFlags::EXCLUDE_SELF) && i == j {
                continue;
            }
            if flags.contains(KernelFlags::EXCLUDE_IGE_J) && i >= j {
                continue;
            }
            let aj = &atoms[j];
            let r_squared = match apply_mim {
                true => self.bx().minimum_distance_squared(ai.r, aj.r),
                false => (ai.r - aj.r).norm_squared(),
            };
            if r_squared > self.cutoff_squared {
                continue;
            }
            if ai.molecule != aj.molecule {
                total += self.pair_energy(ai, aj, r_squared.sqrt());
            } else {
                if flags.contains(KernelFlags::EXCLUDE_INTRA_IGE_J) && i >= j {
                    continue;
                }
                let scale = self.scaling(ai, aj);
                if scale > SCALING_THRESHOLD {
                    total += self.pair_energy(ai, aj, r_squared.sqrt()) * scale;
                }
            }
        }
        if perform_sum {
            let mut buffer = [total];
            self.pool.all_sum(&mut buffer, strategy);
            total = buffer[0];
        }
        total
    }

    /// Pair energy of one atom with the world: its own cell plus all
    /// neighbour and mim-neighbour cells.
    pub fn atom_energy(&self, i: usize, strategy: DivisionStrategy, perform_sum: bool) -> Energy {
        let Some(ai) = self.configuration.atom(i) else {
            degenerate(format!("atom index {} out of range in atom energy query", i));
            return 0.0;
        };
        let cells = self.configuration.cells();
        let home = ai.cell;
        let mut total = self.atom_cell_energy(i, home, KernelFlags::EXCLUDE_SELF, strategy, false);
        for &neighbour in cells.neighbours(home) {
            total += self.atom_cell_energy(i, neighbour, KernelFlags::NONE, strategy, false);
        }
        for &neighbour in cells.mim_neighbours(home) {
            total += self.atom_cell_energy(i, neighbour, KernelFlags::APPLY_MIM, strategy, false);
        }
        if perform_sum {
            let mut buffer = [total];
            self.pool.all_sum(&mut buffer, strategy);
            total = buffer[0];
        }
        total
    }

    /// Pair energy of a whole molecule with the world, each intra-pair
    /// counted once through the ordering exclusion.
    pub fn molecule_energy(&self, molecule: usize, strategy: DivisionStrategy, perform_sum: bool) -> Energy {
        let Some(mol) = self.configuration.molecule(molecule) else {
            degenerate(format!("molecule index {} out of range in molecule energy query", molecule));
            return 0.0;
        };
        let cells = self.configuration.cells();
        let mut total = 0.0;
        for &i in &mol.atoms {
            let home = self.configuration.atoms()[i].cell;
            total += self.atom_cell_energy(i, home, KernelFlags::EXCLUDE_INTRA_IGE_J, strategy, false);
            for &neighbour in cells.neighbours(home) {
                total += self.atom_cell_energy(i, neighbour, KernelFlags::EXCLUDE_INTRA_IGE_J, strategy, false);
            }
            for &neighbour in cells.mim_neighbours(home) {
                total += self.atom_cell_energy(
                    i,
                    neighbour,
                    KernelFlags::APPLY_MIM | KernelFlags::EXCLUDE_INTRA_IGE_J,
                    strategy,
                    false,
                );
            }
        }
        if perform_sum {
            let mut buffer = [total];
            self.pool.all_sum(&mut buffer, strategy);
            total = buffer[0];
        }
        total
    }

    /// Total interatomic pair potential energy of the system: every cell
    /// against itself and against its neighbourhood, the cell loop
    /// divided by the outer strategy and the atom loops by its
    /// sub-division.
    pub fn total_energy(&self, inter_molecular: bool, strategy: DivisionStrategy, perform_sum: bool) -> Energy {
        let sub_strategy = self.pool.sub_division_strategy(strategy);
        let (start, stride) = self.pool.interleave(strategy);
        let n_cells = self.configuration.cells().n_cells();
        let mut total = 0.0;
        for cell in (start..n_cells).step_by(stride) {
            total += self.cell_cell_energy(cell, cell, false, true, inter_molecular, sub_strategy, false);
            total += self.cell_energy(cell, true, inter_molecular, sub_strategy, false);
        }
        if perform_sum {
            let mut buffer = [total];
            self.pool.all_sum(&mut buffer, strategy);
            total = buffer[0];
        }
        total
    }

    /// Correction for intramolecular pairs counted at full strength in a
    /// non-bonded sum: returns the negative of the over-counted part, so
    /// callers add it.
    pub fn correct(&self, i: usize) -> Energy {
        let Some(ai) = self.configuration.atom(i) else {
            degenerate(format!("atom index {} out of range in correction energy query", i));
            return 0.0;
        };
        let mol = &self.configuration.molecules()[ai.molecule];
        let mut correction = 0.0;
        for &j in &mol.atoms {
            if j == i {
                continue;
            }
            let aj = &self.configuration.atoms()[j];
            let scale = 1.0 - self.scaling(ai, aj);
            if scale > SCALING_THRESHOLD {
                let r = self.bx().minimum_distance(ai.r, aj.r);
                correction += self.pair_energy(ai, aj, r) * scale;
            }
        }
        -correction
    }

    /// bond leg under minimum image only when the end cells demand it
    fn bond_vector(&self, i: &Atom, j: &Atom) -> Vector3<f64> {
        match self.configuration.cells().mim_required(i.cell, j.cell) {
            true => self.bx().minimum_vector(i.r, j.r),
            false => j.r - i.r,
        }
    }

    pub fn bond_energy(&self, bond: &SpeciesBond, i: usize, j: usize) -> Energy {
        let (Some(ai), Some(aj)) = (self.configuration.atom(i), self.configuration.atom(j)) else {
            degenerate(format!("atom index out of range in bond energy query ({}, {})", i, j));
            return 0.0;
        };
        bond.form.energy(self.bond_vector(ai, aj).norm())
    }

    pub fn angle_energy(&self, angle: &SpeciesAngle, i: usize, j: usize, k: usize) -> Energy {
        let (Some(ai), Some(aj), Some(ak)) = (
            self.configuration.atom(i),
            self.configuration.atom(j),
            self.configuration.atom(k),
        ) else {
            degenerate(format!("atom index out of range in angle energy query ({}, {}, {})", i, j, k));
            return 0.0;
        };
        let ji = self.bond_vector(aj, ai);
        let jk = self.bond_vector(aj, ak);
        if ji.norm_squared() < 1e-20 || jk.norm_squared() < 1e-20 {
            degenerate(format!("zero-length leg in angle energy query ({}, {}, {})", i, j, k));
            return 0.0;
        }
        angle.form.energy(SimBox::angle_in_degrees(ji, jk))
    }

    pub fn torsion_energy(&self, torsion: &SpeciesTorsion, i: usize, j: usize, k: usize, l: usize) -> Energy {
        let (Some(ai), Some(aj), Some(ak), Some(al)) = (
            self.configuration.atom(i),
            self.configuration.atom(j),
            self.configuration.atom(k),
            self.configuration.atom(l),
        ) else {
            degenerate(format!("atom index out of range in torsion energy query ({}, {}, {}, {})", i, j, k, l));
            return 0.0;
        };
        let ji = self.bond_vector(aj, ai);
        let jk = self.bond_vector(aj, ak);
        let kl = self.bond_vector(ak, al);
        if ji.norm_squared() < 1e-20 || jk.norm_squared() < 1e-20 || kl.norm_squared() < 1e-20 {
            degenerate(format!("zero-length leg in torsion energy query ({}, {}, {}, {})", i, j, k, l));
            return 0.0;
        }
        torsion.form.energy(SimBox::torsion_in_degrees(ji, jk, kl))
    }

    pub fn improper_energy(&self, improper: &SpeciesImproper, i: usize, j: usize, k: usize, l: usize) -> Energy {
        let term = SpeciesTorsion {
            i: improper.i,
            j: improper.j,
            k: improper.k,
            l: improper.l,
            form: improper.form,
        };
        self.torsion_energy(&term, i, j, k, l)
    }

    /// Sum of all bond, angle, torsion and improper terms of a molecule.
    pub fn intramolecular_energy(&self, molecule: usize) -> Energy {
        let Some(mol) = self.configuration.molecule(molecule) else {
            degenerate(format!("molecule index {} out of range in intramolecular energy query", molecule));
            return 0.0;
        };
        let arena = |n: usize| mol.atoms[n];
        let mut total = 0.0;
        for bond in mol.species.bonds() {
            total += self.bond_energy(bond, arena(bond.i), arena(bond.j));
        }
        for angle in mol.species.angles() {
            total += self.angle_energy(angle, arena(angle.i), arena(angle.j), arena(angle.k));
        }
        for torsion in mol.species.torsions() {
            total += self.torsion_energy(torsion, arena(torsion.i), arena(torsion.j), arena(torsion.k), arena(torsion.l));
        }
        for improper in mol.species.impropers() {
            total += self.improper_energy(improper, arena(improper.i), arena(improper.j), arena(improper.k), arena(improper.l));
        }
        total
    }

    /// Intramolecular terms involving one specific atom of a molecule.
    pub fn atom_intramolecular_energy(&self, molecule: usize, atom: usize) -> Energy {
        let Some(mol) = self.configuration.molecule(molecule) else {
            degenerate(format!("molecule index {} out of range in intramolecular energy query", molecule));
            return 0.0;
        };
        let Some(within) = mol.atoms.iter().position(|&n| n == atom) else {
            degenerate(format!("atom {} does not belong to molecule {}", atom, molecule));
            return 0.0;
        };
        let arena = |n: usize| mol.atoms[n];
        let mut total = 0.0;
        for bond in mol.species.bonds().iter().filter(|b| b.involves(within)) {
            total += self.bond_energy(bond, arena(bond.i), arena(bond.j));
        }
        for angle in mol.species.angles().iter().filter(|a| a.involves(within)) {
            total += self.angle_energy(angle, arena(angle.i), arena(angle.j), arena(angle.k));
        }
        for torsion in mol.species.torsions().iter().filter(|t| t.involves(within)) {
            total += self.torsion_energy(torsion, arena(torsion.i), arena(torsion.j), arena(torsion.k), arena(torsion.l));
        }
        for improper in mol.species.impropers().iter().filter(|t| t.involves(within)) {
            total += self.improper_energy(improper, arena(improper.i), arena(improper.j), arena(improper.k), arena(improper.l));
        }
        total
    }
}
