use crate::Degrees;
use crate::DEGRAD;
use anyhow::bail;
use nalgebra::Matrix3;
use nalgebra::Vector3;

/// The periodic cell of a configuration.
///
/// The closed set of shapes is dispatched by variant; cubic and
/// orthorhombic boxes use exact component arithmetic, the skewed shapes
/// go through the fractional-coordinate transform. Minimum image is
/// only ever applied when a caller asks for it - cells are sized so
/// that direct neighbours never need the wrap.
#[derive(Debug, Clone, PartialEq)]
pub enum SimBox {
    Cubic {
        length: f64,
    },
    Orthorhombic {
        lengths: Vector3<f64>,
    },
    Monoclinic {
        lengths: Vector3<f64>,
        beta: Degrees,
        axes: Matrix3<f64>,
        inverse: Matrix3<f64>,
    },
    Triclinic {
        lengths: Vector3<f64>,
        angles: Vector3<f64>,
        axes: Matrix3<f64>,
        inverse: Matrix3<f64>,
    },
    NonPeriodic {
        extent: f64,
    },
}

fn positive(lengths: &[f64]) -> anyhow::Result<()> {
    if lengths.iter().any(|l| *l <= 0.0) {
        bail!("box axis lengths must be positive, got {:?}", lengths);
    }
    Ok(())
}

fn open_angle(angles: &[Degrees]) -> anyhow::Result<()> {
    if angles.iter().any(|a| *a <= 0.0 || *a >= 180.0) {
        bail!("box angles must lie strictly between 0 and 180 degrees, got {:?}", angles);
    }
    Ok(())
}

/// column-vector cell matrix from lengths and angles
fn cell_axes(lengths: Vector3<f64>, angles: Vector3<f64>) -> anyhow::Result<Matrix3<f64>> {
    let (alpha, beta, gamma) = (angles.x * DEGRAD, angles.y * DEGRAD, angles.z * DEGRAD);
    let cx = lengths.z * beta.cos();
    let cy = lengths.z * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
    let cz_sq = lengths.z.powi(2) - cx.powi(2) - cy.powi(2);
    if cz_sq <= 0.0 {
        bail!("cell angles {:?} do not define a valid box", angles);
    }
    Ok(Matrix3::new(
        lengths.x,
        lengths.y * gamma.cos(),
        cx,
        0.0,
        lengths.y * gamma.sin(),
        cy,
        0.0,
        0.0,
        cz_sq.sqrt(),
    ))
}

impl SimBox {
    pub fn cubic(length: f64) -> anyhow::Result<Self> {
        positive(&[length])?;
        Ok(Self::Cubic { length })
    }

    pub fn orthorhombic(lengths: Vector3<f64>) -> anyhow::Result<Self> {
        positive(lengths.as_slice())?;
        Ok(Self::Orthorhombic { lengths })
    }

    pub fn monoclinic(lengths: Vector3<f64>, beta: Degrees) -> anyhow::Result<Self> {
        positive(lengths.as_slice())?;
        open_angle(&[beta])?;
        let axes = cell_axes(lengths, Vector3::new(90.0, beta, 90.0))?;
        let inverse = axes.try_inverse().expect("validated axes are invertible");
        Ok(Self::Monoclinic { lengths, beta, axes, inverse })
    }

    pub fn triclinic(lengths: Vector3<f64>, angles: Vector3<f64>) -> anyhow::Result<Self> {
        positive(lengths.as_slice())?;
        open_angle(angles.as_slice())?;
        let axes = cell_axes(lengths, angles)?;
        let inverse = axes.try_inverse().expect("validated axes are invertible");
        Ok(Self::Triclinic { lengths, angles, axes, inverse })
    }

    pub fn non_periodic(extent: f64) -> anyhow::Result<Self> {
        positive(&[extent])?;
        Ok(Self::NonPeriodic { extent })
    }

    /// construct the most specialised shape matching lengths and angles
    pub fn from_parameters(lengths: Vector3<f64>, angles: Vector3<f64>) -> anyhow::Result<Self> {
        let right = |a: f64| (a - 90.0).abs() < 1e-8;
        let equal = |a: f64, b: f64| (a - b).abs() < 1e-8;
        match (right(angles.x), right(angles.y), right(angles.z)) {
            (true, true, true) if equal(lengths.x, lengths.y) && equal(lengths.y, lengths.z) => {
                Self::cubic(lengths.x)
            }
            (true, true, true) => Self::orthorhombic(lengths),
            (true, false, true) => Self::monoclinic(lengths, angles.y),
            _ => Self::triclinic(lengths, angles),
        }
    }

    pub fn is_periodic(&self) -> bool {
        !matches!(self, Self::NonPeriodic { .. })
    }

    pub fn axis_lengths(&self) -> Vector3<f64> {
        match self {
            Self::Cubic { length } => Vector3::new(*length, *length, *length),
            Self::Orthorhombic { lengths } => *lengths,
            Self::Monoclinic { lengths, .. } => *lengths,
            Self::Triclinic { lengths, .. } => *lengths,
            Self::NonPeriodic { extent } => Vector3::new(*extent, *extent, *extent),
        }
    }

    pub fn axis_angles(&self) -> Vector3<Degrees> {
        match self {
            Self::Monoclinic { beta, .. } => Vector3::new(90.0, *beta, 90.0),
            Self::Triclinic { angles, .. } => *angles,
            _ => Vector3::new(90.0, 90.0, 90.0),
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Self::Cubic { length } => length.powi(3),
            Self::Orthorhombic { lengths } => lengths.x * lengths.y * lengths.z,
            Self::Monoclinic { axes, .. } => axes.determinant().abs(),
            Self::Triclinic { axes, .. } => axes.determinant().abs(),
            Self::NonPeriodic { extent } => extent.powi(3),
        }
    }

    /// fractional coordinates of a real-space position, unwrapped
    pub fn fractional(&self, r: Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Cubic { length } => r / *length,
            Self::Orthorhombic { lengths } => r.component_div(lengths),
            Self::Monoclinic { inverse, .. } => inverse * r,
            Self::Triclinic { inverse, .. } => inverse * r,
            Self::NonPeriodic { extent } => r / *extent,
        }
    }

    /// real-space position from fractional coordinates
    pub fn from_fractional(&self, frac: Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Cubic { length } => frac * *length,
            Self::Orthorhombic { lengths } => frac.component_mul(lengths),
            Self::Monoclinic { axes, .. } => axes * frac,
            Self::Triclinic { axes, .. } => axes * frac,
            Self::NonPeriodic { extent } => frac * *extent,
        }
    }

    /// map any real coordinate into the primary cell
    pub fn fold(&self, r: Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::NonPeriodic { .. } => r,
            _ => {
                let frac = self.fractional(r).map(|x| x - x.floor());
                self.from_fractional(frac)
            }
        }
    }

    /// fractional coordinates folded into [0, 1)
    pub fn folded_fractional(&self, r: Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::NonPeriodic { .. } => self.fractional(r),
            _ => self.fractional(r).map(|x| x - x.floor()),
        }
    }

    /// the shortest j - i under periodicity
    pub fn minimum_vector(&self, i: Vector3<f64>, j: Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::NonPeriodic { .. } => j - i,
            _ => {
                let frac = self.fractional(j - i).map(|x| x - x.round());
                self.from_fractional(frac)
            }
        }
    }

    pub fn minimum_distance(&self, i: Vector3<f64>, j: Vector3<f64>) -> f64 {
        self.minimum_vector(i, j).norm()
    }

    pub fn minimum_distance_squared(&self, i: Vector3<f64>, j: Vector3<f64>) -> f64 {
        self.minimum_vector(i, j).norm_squared()
    }

    /// angle between two already-resolved vectors, in degrees
    pub fn angle_in_degrees(ji: Vector3<f64>, jk: Vector3<f64>) -> Degrees {
        let cosine = ji.normalize().dot(&jk.normalize()).clamp(-1.0, 1.0);
        cosine.acos() / DEGRAD
    }

    /// torsion angle over three already-resolved leg vectors, in degrees
    pub fn torsion_in_degrees(ji: Vector3<f64>, jk: Vector3<f64>, kl: Vector3<f64>) -> Degrees {
        let xpj = ji.cross(&jk);
        let xpk = kl.cross(&jk);
        let y = xpj.cross(&xpk).dot(&jk.normalize());
        let x = xpj.dot(&xpk);
        y.atan2(x) / DEGRAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_bad_axes() {
        assert!(SimBox::cubic(0.0).is_err());
        assert!(SimBox::orthorhombic(Vector3::new(10.0, -1.0, 10.0)).is_err());
        assert!(SimBox::triclinic(Vector3::new(10.0, 10.0, 10.0), Vector3::new(0.0, 90.0, 90.0)).is_err());
    }

    #[test]
    fn fold_is_idempotent() {
        let boxes = [
            SimBox::cubic(20.0).unwrap(),
            SimBox::orthorhombic(Vector3::new(10.0, 15.0, 20.0)).unwrap(),
            SimBox::triclinic(Vector3::new(10.0, 12.0, 14.0), Vector3::new(80.0, 95.0, 100.0)).unwrap(),
        ];
        let r = Vector3::new(-3.7, 42.1, 7.3);
        for b in &boxes {
            let folded = b.fold(r);
            assert!((b.fold(folded) - folded).norm() < 1e-9);
            let frac = b.folded_fractional(folded);
            assert!(frac.iter().all(|x| (0.0..1.0).contains(x)));
        }
    }

    #[test]
    fn minimum_image_never_longer_than_direct() {
        let b = SimBox::triclinic(Vector3::new(10.0, 12.0, 14.0), Vector3::new(80.0, 95.0, 100.0)).unwrap();
        let i = Vector3::new(0.5, 0.5, 0.5);
        let j = Vector3::new(9.5, 11.0, 13.0);
        assert!(b.minimum_distance_squared(i, j) <= (j - i).norm_squared() + 1e-12);
    }

    #[test]
    fn cubic_wrap_across_boundary() {
        let b = SimBox::cubic(20.0).unwrap();
        let i = Vector3::new(0.0, 0.0, 0.0);
        let j = Vector3::new(19.9, 0.0, 0.0);
        assert!((b.minimum_distance(i, j) - 0.1).abs() < 1e-9);
        let v = b.minimum_vector(i, j);
        assert!((v.x + 0.1).abs() < 1e-9);
    }

    #[test]
    fn non_periodic_never_wraps() {
        let b = SimBox::non_periodic(10.0).unwrap();
        let i = Vector3::new(0.0, 0.0, 0.0);
        let j = Vector3::new(9.9, 0.0, 0.0);
        assert!((b.minimum_distance(i, j) - 9.9).abs() < 1e-12);
        assert_eq!(b.fold(j), j);
    }

    #[test]
    fn volume_matches_parameters() {
        let b = SimBox::cubic(3.0).unwrap();
        assert!((b.volume() - 27.0).abs() < 1e-12);
        let m = SimBox::monoclinic(Vector3::new(2.0, 3.0, 4.0), 60.0).unwrap();
        assert!((m.volume() - 2.0 * 3.0 * 4.0 * (60.0 * DEGRAD).sin()).abs() < 1e-9);
    }

    #[test]
    fn geometric_helpers() {
        let right = SimBox::angle_in_degrees(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0));
        assert!((right - 90.0).abs() < 1e-9);
        // trans arrangement in a plane
        let trans = SimBox::torsion_in_degrees(
            Vector3::new(-1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        );
        assert!((trans.abs() - 180.0).abs() < 1e-6);
    }
}
