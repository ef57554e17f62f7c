use super::shortrange::ShortRange;
use super::shortrange::TruncationScheme;
use crate::COULOMB_CONSTANT;

// extra bins past the range so interpolation at r == range stays in-table
const OVERSHOOT_BINS: usize = 2;

/// A pair potential tabulated on a uniform r grid.
///
/// Bin n stores U((n + 1) * delta); queries below the first grid point
/// clamp to bin zero rather than extrapolating through the r -> 0
/// singularity. The table is immutable once built and lookup is O(1).
#[derive(Debug, Clone)]
pub struct PairPotential {
    type_i: usize,
    type_j: usize,
    delta: f64,
    range: f64,
    table: Vec<f64>,
}

impl PairPotential {
    pub fn tabulate(
        type_i: usize,
        type_j: usize,
        short_range: ShortRange,
        charge_product: f64,
        delta: f64,
        range: f64,
        scheme: TruncationScheme,
    ) -> Self {
        let full = |r: f64| short_range.energy(r) + COULOMB_CONSTANT * charge_product / r;
        let shift = match scheme {
            TruncationScheme::Sharp => 0.0,
            TruncationScheme::Shifted => full(range),
        };
        let bins = (range / delta).ceil() as usize + OVERSHOOT_BINS;
        let table = (0..bins)
            .map(|bin| (bin + 1) as f64 * delta)
            .map(|r| full(r) - shift)
            .collect();
        Self { type_i, type_j, delta, range, table }
    }

    pub fn types(&self) -> (usize, usize) {
        (self.type_i, self.type_j)
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    /// linearly interpolated energy at separation r
    pub fn energy(&self, r: f64) -> f64 {
        let x = r / self.delta;
        let bin = x as usize;
        if bin < 1 {
            self.table[0]
        } else if bin >= self.table.len() {
            0.0
        } else {
            let below = self.table[bin - 1];
            let above = self.table[bin];
            below + (above - below) * (x - bin as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lj(epsilon: f64, sigma: f64) -> PairPotential {
        PairPotential::tabulate(
            0,
            0,
            ShortRange::LennardJones { epsilon, sigma },
            0.0,
            0.005,
            10.0,
            TruncationScheme::Sharp,
        )
    }

    #[test]
    fn interpolation_tracks_analytic_form() {
        let pp = lj(0.65, 3.17);
        let form = ShortRange::LennardJones { epsilon: 0.65, sigma: 3.17 };
        for r in [2.9, 3.17, 3.5561, 5.0, 9.999] {
            assert!((pp.energy(r) - form.energy(r)).abs() < 1e-4, "r = {}", r);
        }
    }

    #[test]
    fn sub_grid_separation_clamps_to_first_bin() {
        let pp = lj(0.65, 3.17);
        assert_eq!(pp.energy(0.0001), pp.energy(0.004));
        assert!(pp.energy(0.0001).is_finite());
    }

    #[test]
    fn energy_at_range_is_tabulated_not_zero() {
        let pp = lj(0.65, 3.17);
        let form = ShortRange::LennardJones { epsilon: 0.65, sigma: 3.17 };
        assert!((pp.energy(10.0) - form.energy(10.0)).abs() < 1e-6);
    }

    #[test]
    fn shifted_scheme_vanishes_at_range() {
        let pp = PairPotential::tabulate(
            0,
            1,
            ShortRange::LennardJones { epsilon: 0.65, sigma: 3.17 },
            0.1,
            0.005,
            10.0,
            TruncationScheme::Shifted,
        );
        assert!(pp.energy(10.0).abs() < 1e-9);
    }
}
