use super::pairpotential::PairPotential;
use super::shortrange::ShortRange;
use super::shortrange::TruncationScheme;
use crate::atomtypes::AtomTypes;
use crate::Energy;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;

/// The symmetric table of tabulated pair potentials between master atom
/// types. Immutable once generated; lookup by (i, j, r) is O(1).
#[derive(Debug, Clone)]
pub struct PotentialMap {
    n_types: usize,
    range: f64,
    range_squared: f64,
    potentials: Vec<PairPotential>,
}

impl PotentialMap {
    /// Tabulate every unlike and like type pairing, in parallel.
    pub fn generate(
        types: &AtomTypes,
        delta: f64,
        range: f64,
        scheme: TruncationScheme,
    ) -> Self {
        let n_types = types.len();
        let pairs: Vec<(usize, usize)> = (0..n_types)
            .flat_map(|i| (i..n_types).map(move |j| (i, j)))
            .collect();
        let potentials = pairs
            .into_par_iter()
            .map(|(i, j)| {
                let ti = types.get(i).expect("pair index in range");
                let tj = types.get(j).expect("pair index in range");
                let combined = ShortRange::combine(ti.short_range, tj.short_range);
                PairPotential::tabulate(i, j, combined, ti.charge * tj.charge, delta, range, scheme)
            })
            .collect();
        Self {
            n_types,
            range,
            range_squared: range * range,
            potentials,
        }
    }

    /// triangular index of the unordered type pair
    fn index(&self, i: usize, j: usize) -> usize {
        let (a, b) = (i.min(j), i.max(j));
        a * self.n_types - a * (a + 1) / 2 + b
    }

    /// energy between master types i and j at separation r
    pub fn energy(&self, i: usize, j: usize, r: f64) -> Energy {
        match self.potentials.get(self.index(i, j)) {
            Some(pp) => pp.energy(r),
            None => {
                log::error!("no pair potential tabulated for types {} and {}", i, j);
                0.0
            }
        }
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn range_squared(&self) -> f64 {
        self.range_squared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_types() -> AtomTypes {
        let mut types = AtomTypes::default();
        types.register("OW", ShortRange::LennardJones { epsilon: 0.65, sigma: 3.17 }, 0.0);
        types.register("CT", ShortRange::LennardJones { epsilon: 0.45, sigma: 3.40 }, 0.0);
        types
    }

    #[test]
    fn energy_is_symmetric_in_types() {
        let map = PotentialMap::generate(&two_types(), 0.005, 10.0, TruncationScheme::Sharp);
        for r in [3.0, 4.5, 8.0] {
            assert_eq!(map.energy(0, 1, r), map.energy(1, 0, r));
        }
    }

    #[test]
    fn triangular_index_covers_all_pairs() {
        let mut types = two_types();
        types.register("HW", ShortRange::None, 0.0);
        let map = PotentialMap::generate(&types, 0.01, 8.0, TruncationScheme::Sharp);
        assert_eq!(map.potentials.len(), 6);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(map.potentials[map.index(i, j)].types(), (i.min(j), i.max(j)));
            }
        }
    }

    #[test]
    fn range_squared_is_precomputed() {
        let map = PotentialMap::generate(&two_types(), 0.005, 10.0, TruncationScheme::Sharp);
        assert_eq!(map.range(), 10.0);
        assert_eq!(map.range_squared(), 100.0);
    }
}
