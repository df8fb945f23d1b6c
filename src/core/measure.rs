use super::providers::*;
use super::{Matrix3f, Pos, Vector3f};
use nalgebra::SymmetricEigen;
use std::iter::zip;
use thiserror::Error;

/// Errors that can occur during measurements
#[derive(Error, Debug)]
pub enum MeasureError {
    /// No positions to measure
    #[error("empty set of positions")]
    Empty,

    /// Total mass of the subset is zero
    #[error("zero mass")]
    ZeroMass,
}

/// Centers of atom subsets which may be broken over periodic boundaries.
///
/// All atoms are unwrapped relative to the first one before averaging.
/// If no periodic box is provided the plain centers are computed.
pub trait MeasurePeriodic: PosIterProvider + MassesProvider + BoxProvider + LenProvider {
    fn center_of_mass_pbc(&self) -> Result<Pos, MeasureError> {
        let b = self.get_box();
        let mut pos_iter = self.iter_pos();
        let mut mass_iter = self.iter_masses();

        let p0 = pos_iter.next().ok_or(MeasureError::Empty)?;
        let mut mass = mass_iter.next().ok_or(MeasureError::Empty)?;
        let mut cm = p0.coords * mass;

        for (c, m) in zip(pos_iter, mass_iter) {
            let im = match b {
                Some(b) => b.closest_image(c, p0).coords,
                None => c.coords,
            };
            cm += im * m;
            mass += m;
        }

        if mass == 0.0 {
            Err(MeasureError::ZeroMass)
        } else {
            Ok(Pos::from(cm / mass))
        }
    }

    fn center_of_geometry_pbc(&self) -> Result<Pos, MeasureError> {
        let b = self.get_box();
        let mut pos_iter = self.iter_pos();

        let p0 = pos_iter.next().ok_or(MeasureError::Empty)?;
        let mut cm = p0.coords;

        for c in pos_iter {
            cm += match b {
                Some(b) => b.closest_image(c, p0).coords,
                None => c.coords,
            };
        }

        Ok(Pos::from(cm / self.len() as f32))
    }
}

/// Result of the least-squares plane fit
#[derive(Debug, Clone)]
pub struct PlaneFit {
    pub center: Vector3f,
    /// Unit normal (eigenvector of the smallest eigenvalue). Its sign is arbitrary.
    pub normal: Vector3f,
    /// Eigenvalues of the covariance matrix in ascending order
    pub eigenvalues: Vector3f,
    /// Eigenvectors as columns in the order of `eigenvalues`
    pub axes: Matrix3f,
}

impl PlaneFit {
    /// Plane is undefined if the points are (nearly) collinear
    pub fn is_degenerate(&self) -> bool {
        self.eigenvalues[1] <= 1e-6 * self.eigenvalues[2].max(f32::MIN_POSITIVE)
    }
}

/// Fits the plane to the set of points by the eigen decomposition
/// of their covariance matrix. Returns `None` for less than 3 points.
pub fn fit_plane(points: &[Vector3f]) -> Option<PlaneFit> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f32;
    let center = points.iter().sum::<Vector3f>() / n;

    let mut cov = Matrix3f::zeros();
    for p in points {
        let d = p - center;
        cov += d * d.transpose();
    }
    cov /= n;

    let eig = SymmetricEigen::new(cov);
    // Eigenvectors are NOT sorted, so sort them manually
    let mut order = [0usize, 1, 2];
    order.sort_by(|a, b| eig.eigenvalues[*a].total_cmp(&eig.eigenvalues[*b]));

    let eigenvalues = Vector3f::new(
        eig.eigenvalues[order[0]],
        eig.eigenvalues[order[1]],
        eig.eigenvalues[order[2]],
    );
    let axes = Matrix3f::from_columns(&[
        eig.eigenvectors.column(order[0]).into_owned(),
        eig.eigenvectors.column(order[1]).into_owned(),
        eig.eigenvectors.column(order[2]).into_owned(),
    ]);

    Some(PlaneFit {
        center,
        normal: axes.column(0).normalize(),
        eigenvalues,
        axes,
    })
}

/// Angle between two vectors in degrees with the axes treated as undirected,
/// so the result is always in [0, 90].
pub fn undirected_angle_deg(v1: &Vector3f, v2: &Vector3f) -> f32 {
    let a = v1.angle(v2).to_degrees();
    if a > 90.0 {
        180.0 - a
    } else {
        a
    }
}
