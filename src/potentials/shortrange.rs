use serde::Deserialize;
use serde::Serialize;

/// Short-range interaction form carried by a master atom type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ShortRange {
    #[default]
    None,
    LennardJones {
        epsilon: f64, // kJ/mol
        sigma: f64,   // Å
    },
}

impl ShortRange {
    /// Lorentz-Berthelot combination of two type forms
    pub fn combine(a: Self, b: Self) -> Self {
        match (a, b) {
            (
                Self::LennardJones { epsilon: e1, sigma: s1 },
                Self::LennardJones { epsilon: e2, sigma: s2 },
            ) => Self::LennardJones {
                epsilon: (e1 * e2).sqrt(),
                sigma: 0.5 * (s1 + s2),
            },
            _ => Self::None,
        }
    }

    pub fn energy(&self, r: f64) -> f64 {
        match self {
            Self::None => 0.0,
            Self::LennardJones { epsilon, sigma } => {
                let sr6 = (sigma / r).powi(6);
                4.0 * epsilon * (sr6 * sr6 - sr6)
            }
        }
    }
}

impl std::fmt::Display for ShortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::LennardJones { epsilon, sigma } => write!(f, "LJ  {}  {}", epsilon, sigma),
        }
    }
}

/// What happens to the tabulated potential at the configured range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncationScheme {
    /// cut at the range, leaving a step
    Sharp,
    /// shift so the potential reaches zero exactly at the range
    #[default]
    Shifted,
}

impl std::str::FromStr for TruncationScheme {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sharp" => Ok(Self::Sharp),
            "Shifted" => Ok(Self::Shifted),
            other => Err(anyhow::anyhow!("unrecognised truncation scheme '{}'", other)),
        }
    }
}

impl std::fmt::Display for TruncationScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Sharp => write!(f, "Sharp"),
            Self::Shifted => write!(f, "Shifted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lennard_jones_zero_at_sigma_minimum_at_well() {
        let lj = ShortRange::LennardJones { epsilon: 0.5, sigma: 3.0 };
        assert!(lj.energy(3.0).abs() < 1e-12);
        let r_min = 3.0 * 2f64.powf(1.0 / 6.0);
        assert!((lj.energy(r_min) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn combination_is_symmetric() {
        let a = ShortRange::LennardJones { epsilon: 0.2, sigma: 3.0 };
        let b = ShortRange::LennardJones { epsilon: 0.8, sigma: 4.0 };
        assert_eq!(ShortRange::combine(a, b), ShortRange::combine(b, a));
        assert_eq!(ShortRange::combine(a, ShortRange::None), ShortRange::None);
    }
}
