use serde::Deserialize;
use serde::Serialize;

/// One-dimensional gridded data: an x axis and a value at each point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data1D {
    pub name: String,
    pub tag: String,
    pub x: Vec<f64>,
    pub values: Vec<f64>,
}

impl Data1D {
    pub fn n_values(&self) -> usize {
        self.values.len()
    }

    /// sum of absolute values, the normalise-to-one denominator
    pub fn abs_sum(&self) -> f64 {
        self.values.iter().map(|v| v.abs()).sum()
    }

    /// trapezoidal integral over the x axis
    pub fn integral(&self) -> f64 {
        self.x
            .windows(2)
            .zip(self.values.windows(2))
            .map(|(x, v)| 0.5 * (v[0] + v[1]) * (x[1] - x[0]))
            .sum()
    }
}

impl std::ops::DivAssign<f64> for Data1D {
    fn div_assign(&mut self, rhs: f64) {
        for value in &mut self.values {
            *value /= rhs;
        }
    }
}

/// Two-dimensional gridded data, values stored x-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data2D {
    pub name: String,
    pub tag: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub values: Vec<f64>,
}

impl Data2D {
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.y.len() + j]
    }
}

impl std::ops::DivAssign<f64> for Data2D {
    fn div_assign(&mut self, rhs: f64) {
        for value in &mut self.values {
            *value /= rhs;
        }
    }
}

/// Three-dimensional gridded data, values stored x-major then y-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data3D {
    pub name: String,
    pub tag: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub values: Vec<f64>,
}

impl Data3D {
    pub fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[(i * self.y.len() + j) * self.z.len() + k]
    }
}

impl std::ops::DivAssign<f64> for Data3D {
    fn div_assign(&mut self, rhs: f64) {
        for value in &mut self.values {
            *value /= rhs;
        }
    }
}
