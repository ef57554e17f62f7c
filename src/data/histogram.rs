use super::gridded::Data1D;
use super::gridded::Data2D;
use super::gridded::Data3D;
use serde::Deserialize;
use serde::Serialize;

fn bin_count(minimum: f64, maximum: f64, width: f64) -> usize {
    (((maximum - minimum) / width).round() as usize).max(1)
}

fn bin_of(value: f64, minimum: f64, width: f64, n_bins: usize) -> Option<usize> {
    if value < minimum {
        return None;
    }
    let bin = ((value - minimum) / width) as usize;
    match bin < n_bins {
        true => Some(bin),
        false => None,
    }
}

/// Accumulating histogram over a uniform one-dimensional axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    pub minimum: f64,
    pub maximum: f64,
    pub bin_width: f64,
    pub bins: Vec<u64>,
    pub n_binned: u64,
    pub n_missed: u64,
}

impl Histogram1D {
    pub fn new(minimum: f64, maximum: f64, bin_width: f64) -> Self {
        let n = bin_count(minimum, maximum, bin_width);
        Self {
            minimum,
            maximum,
            bin_width,
            bins: vec![0; n],
            n_binned: 0,
            n_missed: 0,
        }
    }

    pub fn bin(&mut self, value: f64) {
        match bin_of(value, self.minimum, self.bin_width, self.bins.len()) {
            Some(bin) => {
                self.bins[bin] += 1;
                self.n_binned += 1;
            }
            None => self.n_missed += 1,
        }
    }

    pub fn zero(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.n_binned = 0;
        self.n_missed = 0;
    }

    /// counts against bin centres
    pub fn data(&self) -> Data1D {
        Data1D {
            name: String::new(),
            tag: String::new(),
            x: (0..self.bins.len())
                .map(|n| self.minimum + (n as f64 + 0.5) * self.bin_width)
                .collect(),
            values: self.bins.iter().map(|b| *b as f64).collect(),
        }
    }
}

/// Accumulating histogram over two uniform axes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram2D {
    pub minima: [f64; 2],
    pub maxima: [f64; 2],
    pub bin_widths: [f64; 2],
    pub n_bins: [usize; 2],
    pub bins: Vec<u64>,
    pub n_binned: u64,
    pub n_missed: u64,
}

impl Histogram2D {
    pub fn new(minima: [f64; 2], maxima: [f64; 2], bin_widths: [f64; 2]) -> Self {
        let n = [
            bin_count(minima[0], maxima[0], bin_widths[0]),
            bin_count(minima[1], maxima[1], bin_widths[1]),
        ];
        Self {
            minima,
            maxima,
            bin_widths,
            n_bins: n,
            bins: vec![0; n[0] * n[1]],
            n_binned: 0,
            n_missed: 0,
        }
    }

    pub fn bin(&mut self, x: f64, y: f64) {
        let i = bin_of(x, self.minima[0], self.bin_widths[0], self.n_bins[0]);
        let j = bin_of(y, self.minima[1], self.bin_widths[1], self.n_bins[1]);
        match (i, j) {
            (Some(i), Some(j)) => {
                self.bins[i * self.n_bins[1] + j] += 1;
                self.n_binned += 1;
            }
            _ => self.n_missed += 1,
        }
    }

    pub fn zero(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.n_binned = 0;
        self.n_missed = 0;
    }

    pub fn data(&self) -> Data2D {
        Data2D {
            name: String::new(),
            tag: String::new(),
            x: (0..self.n_bins[0])
                .map(|n| self.minima[0] + (n as f64 + 0.5) * self.bin_widths[0])
                .collect(),
            y: (0..self.n_bins[1])
                .map(|n| self.minima[1] + (n as f64 + 0.5) * self.bin_widths[1])
                .collect(),
            values: self.bins.iter().map(|b| *b as f64).collect(),
        }
    }
}

/// Accumulating histogram over three uniform axes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram3D {
    pub minima: [f64; 3],
    pub maxima: [f64; 3],
    pub bin_widths: [f64; 3],
    pub n_bins: [usize; 3],
    pub bins: Vec<u64>,
    pub n_binned: u64,
    pub n_missed: u64,
}

impl Histogram3D {
    pub fn new(minima: [f64; 3], maxima: [f64; 3], bin_widths: [f64; 3]) -> Self {
        let n = [
            bin_count(minima[0], maxima[0], bin_widths[0]),
            bin_count(minima[1], maxima[1], bin_widths[1]),
            bin_count(minima[2], maxima[2], bin_widths[2]),
        ];
        Self {
            minima,
            maxima,
            bin_widths,
            n_bins: n,
            bins: vec![0; n[0] * n[1] * n[2]],
            n_binned: 0,
            n_missed: 0,
        }
    }

    pub fn bin(&mut self, x: f64, y: f64, z: f64) {
        let i = bin_of(x, self.minima[0], self.bin_widths[0], self.n_bins[0]);
        let j = bin_of(y, self.minima[1], self.bin_widths[1], self.n_bins[1]);
        let k = bin_of(z, self.minima[2], self.bin_widths[2], self.n_bins[2]);
        match (i, j, k) {
            (Some(i), Some(j), Some(k)) => {
                self.bins[(i * self.n_bins[1] + j) * self.n_bins[2] + k] += 1;
                self.n_binned += 1;
            }
            _ => self.n_missed += 1,
        }
    }

    pub fn zero(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.n_binned = 0;
        self.n_missed = 0;
    }

    pub fn data(&self) -> Data3D {
        Data3D {
            name: String::new(),
            tag: String::new(),
            x: (0..self.n_bins[0])
                .map(|n| self.minima[0] + (n as f64 + 0.5) * self.bin_widths[0])
                .collect(),
            y: (0..self.n_bins[1])
                .map(|n| self.minima[1] + (n as f64 + 0.5) * self.bin_widths[1])
                .collect(),
            z: (0..self.n_bins[2])
                .map(|n| self.minima[2] + (n as f64 + 0.5) * self.bin_widths[2])
                .collect(),
            values: self.bins.iter().map(|b| *b as f64).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arbitrary;
    use rand::Rng;

    impl Arbitrary for Histogram1D {
        fn random() -> Self {
            let mut hist = Histogram1D::new(0.0, 10.0, 0.1);
            let mut rng = rand::rng();
            for _ in 0..1000 {
                hist.bin(rng.random::<f64>() * 11.0);
            }
            hist
        }
    }

    #[test]
    fn every_sample_is_accounted_for() {
        let hist = Histogram1D::random();
        assert_eq!(hist.n_binned + hist.n_missed, 1000);
        assert_eq!(hist.bins.iter().sum::<u64>(), hist.n_binned);
    }

    #[test]
    fn values_land_in_their_bins() {
        let mut hist = Histogram1D::new(0.0, 10.0, 0.05);
        assert_eq!(hist.bins.len(), 200);
        hist.bin(0.01);
        hist.bin(0.06);
        hist.bin(9.99);
        hist.bin(10.0);
        hist.bin(-0.1);
        assert_eq!(hist.n_binned, 3);
        assert_eq!(hist.n_missed, 2);
        assert_eq!(hist.bins[0], 1);
        assert_eq!(hist.bins[1], 1);
        assert_eq!(hist.bins[199], 1);
    }

    #[test]
    fn data_exposes_bin_centres() {
        let mut hist = Histogram1D::new(0.0, 1.0, 0.25);
        hist.bin(0.3);
        let data = hist.data();
        assert_eq!(data.x, vec![0.125, 0.375, 0.625, 0.875]);
        assert_eq!(data.values, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn two_dimensional_binning_is_row_major() {
        let mut hist = Histogram2D::new([0.0, 0.0], [2.0, 2.0], [1.0, 1.0]);
        hist.bin(1.5, 0.5);
        assert_eq!(hist.bins, vec![0, 0, 1, 0]);
        assert_eq!(hist.data().value(1, 0), 1.0);
    }

    #[test]
    fn zeroing_resets_counts() {
        let mut hist = Histogram3D::new([0.0; 3], [1.0; 3], [0.5; 3]);
        hist.bin(0.1, 0.1, 0.1);
        hist.zero();
        assert_eq!(hist.n_binned, 0);
        assert!(hist.bins.iter().all(|b| *b == 0));
    }
}
