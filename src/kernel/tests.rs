use super::energy::EnergyKernel;
use super::flags::KernelFlags;
use crate::atomtypes::AtomTypes;
use crate::configuration::Configuration;
use crate::pool::DivisionStrategy;
use crate::pool::ProcessPool;
use crate::potentials::PotentialMap;
use crate::potentials::ShortRange;
use crate::potentials::TruncationScheme;
use crate::simbox::SimBox;
use crate::species::AngleForm;
use crate::species::BondForm;
use crate::species::Species;
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::Arc;

const RANGE: f64 = 10.0;

fn argon_types() -> AtomTypes {
    let mut types = AtomTypes::default();
    types.register("Ar", ShortRange::LennardJones { epsilon: 0.97, sigma: 3.4 }, 0.0);
    types
}

fn argon_map() -> PotentialMap {
    PotentialMap::generate(&argon_types(), 0.005, RANGE, TruncationScheme::Sharp)
}

fn argon() -> Arc<Species> {
    let mut sp = Species::new("argon");
    sp.add_atom("Ar", 0, 0.0, Vector3::zeros());
    sp.finalise();
    Arc::new(sp)
}

/// one argon atom per point, cells partitioned for the standard range
fn argon_configuration(box_length: f64, points: &[Vector3<f64>]) -> Configuration {
    let mut cfg = Configuration::new("bulk");
    cfg.set_box(SimBox::cubic(box_length).unwrap());
    let sp = argon();
    for point in points {
        cfg.add_molecule(sp.clone(), Some(std::slice::from_ref(point)));
    }
    cfg.update_cells(RANGE);
    cfg
}

fn scattered(n: usize, box_length: f64, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Vector3::new(rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()) * box_length
        })
        .collect()
}

#[test]
fn pair_across_the_boundary_sees_the_image() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(
        20.0,
        &[Vector3::zeros(), Vector3::new(19.9, 0.0, 0.0)],
    );
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let with_mim = kernel.energy_between(0, 1, true, false);
    assert!((with_mim - map.energy(0, 0, 0.1)).abs() < 1e-6 * with_mim.abs());
    // without minimum image the separation is beyond the table
    assert_eq!(kernel.energy_between(0, 1, false, false), 0.0);
}

#[test]
fn pair_energy_is_commutative() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(
        20.0,
        &[Vector3::new(1.0, 1.0, 1.0), Vector3::new(4.3, 2.0, 1.5)],
    );
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    for mim in [false, true] {
        assert_eq!(
            kernel.energy_between(0, 1, mim, false),
            kernel.energy_between(1, 0, mim, false),
        );
    }
}

#[test]
fn same_atom_and_ordering_exclusions_return_zero() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(
        20.0,
        &[Vector3::new(1.0, 1.0, 1.0), Vector3::new(4.0, 1.0, 1.0)],
    );
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    assert_eq!(kernel.energy_between(0, 0, true, false), 0.0);
    assert_eq!(kernel.energy_between(1, 0, false, true), 0.0);
    assert!(kernel.energy_between(0, 1, false, true) != 0.0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_atom_aborts_in_debug() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(20.0, &[Vector3::new(1.0, 1.0, 1.0)]);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    kernel.energy_between(0, 99, false, false);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_molecule_aborts_in_debug() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(20.0, &[Vector3::new(1.0, 1.0, 1.0)]);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    kernel.intramolecular_energy(7);
}

#[cfg(not(debug_assertions))]
#[test]
fn out_of_range_indices_are_zero_in_release() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(20.0, &[Vector3::new(1.0, 1.0, 1.0)]);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    assert_eq!(kernel.energy_between(0, 99, false, false), 0.0);
    assert_eq!(kernel.atom_energy(99, DivisionStrategy::Serial, false), 0.0);
    assert_eq!(kernel.intramolecular_energy(7), 0.0);
}

#[test]
fn cutoff_boundary_is_inclusive() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let at = |x: f64| Vector3::new(x, 5.0, 5.0);
    let cfg = argon_configuration(30.0, &[at(5.0), at(15.0)]);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let at_range = kernel.atom_energy(0, DivisionStrategy::Serial, false);
    assert!((at_range - map.energy(0, 0, RANGE)).abs() < 1e-9);
    let cfg = argon_configuration(30.0, &[at(5.0), at(15.05)]);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    assert_eq!(kernel.atom_energy(0, DivisionStrategy::Serial, false), 0.0);
}

#[test]
fn empty_configuration_yields_zero_everywhere() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let mut cfg = Configuration::new("void");
    cfg.set_box(SimBox::cubic(30.0).unwrap());
    cfg.update_cells(RANGE);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    assert_eq!(kernel.total_energy(false, DivisionStrategy::Serial, false), 0.0);
    assert_eq!(kernel.cell_energy(0, true, false, DivisionStrategy::Serial, false), 0.0);
}

#[test]
fn molecule_sum_halved_matches_total() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(30.0, &scattered(60, 30.0, 7));
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let total = kernel.total_energy(true, DivisionStrategy::Serial, false);
    let by_molecule: f64 = (0..cfg.n_molecules())
        .map(|m| kernel.molecule_energy(m, DivisionStrategy::Serial, false))
        .sum();
    assert!((by_molecule / 2.0 - total).abs() < 1e-9 * total.abs().max(1.0));
    // monatomic species have no scaled intramolecular pairs to exclude
    let with_intra = kernel.total_energy(false, DivisionStrategy::Serial, false);
    assert_eq!(total, with_intra);
}

#[test]
fn serial_and_pool_parallel_totals_agree() {
    let map = argon_map();
    let serial_pool = ProcessPool::serial();
    let cfg = argon_configuration(30.0, &scattered(100, 30.0, 11));
    let kernel = EnergyKernel::new(&serial_pool, &cfg, &map, None);
    let serial = kernel.total_energy(true, DivisionStrategy::Serial, false);
    assert!(serial != 0.0);
    for (ranks, groups) in [(4, 2), (4, 4), (3, 1)] {
        let team = ProcessPool::team(ranks, groups);
        std::thread::scope(|scope| {
            for pool in &team {
                let cfg = &cfg;
                let map = &map;
                scope.spawn(move || {
                    let kernel = EnergyKernel::new(pool, cfg, map, None);
                    let parallel = kernel.total_energy(true, DivisionStrategy::PoolParallel, true);
                    assert!(
                        (parallel - serial).abs() < 1e-8 * serial.abs(),
                        "{} ranks / {} groups diverged: {} vs {}",
                        ranks,
                        groups,
                        parallel,
                        serial,
                    );
                });
            }
        });
    }
}

/// water-like species for the intramolecular paths
fn water() -> Arc<Species> {
    let mut types = argon_types();
    types.register("OW", ShortRange::LennardJones { epsilon: 0.65, sigma: 3.17 }, 0.0);
    let mut sp = Species::new("water");
    sp.add_atom("OW", 1, 0.0, Vector3::zeros());
    sp.add_atom("HW1", 0, 0.0, Vector3::new(1.0, 0.0, 0.0));
    sp.add_atom("HW2", 0, 0.0, Vector3::new(-0.3, 0.95, 0.0));
    sp.add_bond(0, 1, BondForm::Harmonic { k: 4637.0, r0: 1.0 }).unwrap();
    sp.add_bond(0, 2, BondForm::Harmonic { k: 4637.0, r0: 1.0 }).unwrap();
    sp.add_angle(1, 0, 2, AngleForm::Harmonic { k: 383.0, theta0: 109.5 }).unwrap();
    sp.finalise();
    Arc::new(sp)
}

fn water_configuration(stretch: f64) -> (Configuration, PotentialMap) {
    let mut types = argon_types();
    types.register("OW", ShortRange::LennardJones { epsilon: 0.65, sigma: 3.17 }, 0.0);
    let map = PotentialMap::generate(&types, 0.005, RANGE, TruncationScheme::Sharp);
    let mut cfg = Configuration::new("single");
    cfg.set_box(SimBox::cubic(30.0).unwrap());
    cfg.add_molecule(
        water(),
        Some(&[
            Vector3::new(15.0, 15.0, 15.0),
            Vector3::new(15.0 + stretch, 15.0, 15.0),
            Vector3::new(14.7, 15.95, 15.0),
        ]),
    );
    cfg.update_cells(RANGE);
    (cfg, map)
}

#[test]
fn bond_energy_vanishes_at_equilibrium_and_grows_harmonically() {
    let pool = ProcessPool::serial();
    let (cfg, map) = water_configuration(1.0);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let bond = &cfg.molecule(0).unwrap().species.bonds()[0];
    assert_eq!(kernel.bond_energy(bond, 0, 1), 0.0);
    let (cfg, map) = water_configuration(1.1);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let bond = &cfg.molecule(0).unwrap().species.bonds()[0];
    let expected = 0.5 * 4637.0 * 0.01;
    assert!((kernel.bond_energy(bond, 0, 1) - expected).abs() < 1e-6);
}

#[test]
fn intramolecular_energy_accumulates_every_term() {
    let pool = ProcessPool::serial();
    let (cfg, map) = water_configuration(1.1);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let species = cfg.molecule(0).unwrap().species.clone();
    let by_term = kernel.bond_energy(&species.bonds()[0], 0, 1)
        + kernel.bond_energy(&species.bonds()[1], 0, 2)
        + kernel.angle_energy(&species.angles()[0], 1, 0, 2);
    let total = kernel.intramolecular_energy(0);
    assert!(by_term > 0.0);
    assert!((total - by_term).abs() < 1e-9);
    // the oxygen participates in every term, each hydrogen in two
    assert!((kernel.atom_intramolecular_energy(0, 0) - total).abs() < 1e-9);
    let h1 = kernel.atom_intramolecular_energy(0, 1);
    let expected = kernel.bond_energy(&species.bonds()[0], 0, 1)
        + kernel.angle_energy(&species.angles()[0], 1, 0, 2);
    assert!((h1 - expected).abs() < 1e-9);
}

#[test]
fn monatomic_intramolecular_energy_is_zero() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(20.0, &[Vector3::new(5.0, 5.0, 5.0)]);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    assert_eq!(kernel.intramolecular_energy(0), 0.0);
}

#[test]
fn correction_cancels_excluded_intramolecular_pairs() {
    let pool = ProcessPool::serial();
    let (cfg, map) = water_configuration(1.1);
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    // bonded pairs scale to zero, so the non-bonded world energy of the
    // oxygen is only its angle partner interactions, also excluded (1-2
    // and 1-3 both scale to zero for water)
    assert_eq!(kernel.atom_energy(0, DivisionStrategy::Serial, false), 0.0);
    // correct() returns the negative of the full-strength pair energies
    let full = kernel.energy_between(0, 1, true, false) + kernel.energy_between(0, 2, true, false);
    assert!((kernel.correct(0) + full).abs() < 1e-9);
    // with no scaled pairs the correction vanishes
    let map2 = argon_map();
    let cfg2 = argon_configuration(20.0, &[Vector3::new(5.0, 5.0, 5.0)]);
    let kernel2 = EnergyKernel::new(&pool, &cfg2, &map2, None);
    assert_eq!(kernel2.correct(0), 0.0);
}

#[test]
fn atom_cell_flags_control_exclusions() {
    let map = argon_map();
    let pool = ProcessPool::serial();
    let cfg = argon_configuration(
        30.0,
        &[Vector3::new(5.0, 5.0, 5.0), Vector3::new(8.0, 5.0, 5.0)],
    );
    let kernel = EnergyKernel::new(&pool, &cfg, &map, None);
    let cell = cfg.atom(0).unwrap().cell;
    let pair = kernel.atom_cell_energy(0, cell, KernelFlags::EXCLUDE_SELF, DivisionStrategy::Serial, false);
    assert!(pair != 0.0);
    // i >= j suppresses the pair seen from the higher-indexed atom
    assert_eq!(
        kernel.atom_cell_energy(1, cell, KernelFlags::EXCLUDE_IGE_J, DivisionStrategy::Serial, false),
        0.0,
    );
    assert_eq!(
        kernel.atom_cell_energy(0, cell, KernelFlags::EXCLUDE_IGE_J, DivisionStrategy::Serial, false),
        pair,
    );
}
