//! Local quadratic surface fit around every lipid.
//!
//! The mid marker of the lipid and the mid markers of its neighbours in the
//! same leaflet form a patch. The patch is transformed into a local frame
//! with z along the seed normal and fitted by
//! `z = a*x^2 + b*y^2 + c*xy + d*x + e*y + f`.
//! Normal, curvatures, smoothed marker position and Voronoi area of the
//! lipid are derived from the fitted surface at the origin of the frame.

use crate::core::*;
use crate::lipid::LipidMarkers;
use crate::neighbors::NeighborGraph;
use crate::voronoi_cell::{Vector2f, VoronoiCell};
use nalgebra::{SMatrix, SVector};
use rayon::prelude::*;

/// Relative threshold of singular values treated as zero
const SVD_REL_EPS: f32 = 1e-6;

/// Result of the surface fit for a single lipid
#[derive(Debug, Clone)]
pub struct SurfaceFit {
    pub normal: Vector3f,
    pub smoothed_mid: Pos,
    /// NaN if the lipid axis or the fitted normal is undefined
    pub tilt: f32,
    pub quad_fit_residual: f32,
    pub area: f32,
    pub gaussian_curvature: f32,
    pub mean_curvature: f32,
    /// Principal curvatures in ascending order
    pub principal_curvatures: [f32; 2],
    /// Principal directions in lab space as columns
    pub principal_directions: SMatrix<f32, 3, 2>,
    /// Too few neighbours for the fit
    pub degenerate: bool,
}

impl SurfaceFit {
    fn degenerate(markers: &LipidMarkers, orientation: &Vector3f) -> Self {
        let normal = if orientation.norm_squared() > 0.0 {
            orientation.normalize()
        } else {
            Vector3f::z()
        };
        Self {
            normal,
            smoothed_mid: markers.mid,
            tilt: f32::NAN,
            quad_fit_residual: f32::NAN,
            area: f32::NAN,
            gaussian_curvature: f32::NAN,
            mean_curvature: f32::NAN,
            principal_curvatures: [f32::NAN; 2],
            principal_directions: SMatrix::<f32, 3, 2>::from_element(f32::NAN),
            degenerate: true,
        }
    }
}

struct Curvature {
    normal: Vector3f,
    gaussian: f32,
    mean: f32,
    princ_curvs: [f32; 2],
    princ_dirs: SMatrix<f32, 3, 2>,
}

#[allow(non_snake_case)]
fn compute_curvature_and_normal(coefs: &SVector<f32, 6>, to_lab: &Matrix3f) -> Curvature {
    /*
    Parametric variables (u,v) are (x,y) of the local frame.
        r_u = {1, 0, 2ax+cy+d}
        r_v = {0, 1, 2by+cx+e}
    At the origin: r_u = {1,0,d}, r_v = {0,1,e}

    First fundamental form:
        E = 1+d^2, F = d*e, G = 1+e^2

    Unit normal at the origin: n = {-d,-e,1}/sqrt(1+d^2+e^2)
        r_uu = {0,0,2a}, r_uv = {0,0,c}, r_vv = {0,0,2b}

    Second fundamental form:
        L = 2a/w, M = c/w, N = 2b/w, w = sqrt(1+d^2+e^2)
    */
    let (a, b, c, d, e) = (coefs[0], coefs[1], coefs[2], coefs[3], coefs[4]);

    let E = 1.0 + d * d;
    let F = d * e;
    let G = 1.0 + e * e;

    let w = (1.0 + d * d + e * e).sqrt();
    let L = 2.0 * a / w;
    let M = c / w;
    let N = 2.0 * b / w;

    let det = E * G - F * F;
    let gaussian = (L * N - M * M) / det;
    let mean = 0.5 * (E * N - 2.0 * F * M + G * L) / det;

    let normal = to_lab * Vector3f::new(-d, -e, 1.0).normalize();

    // Shape operator W = [I]^-1 [II]. Its eigenvalues are the principal
    // curvatures. It is symmetrized to get real orthogonal eigenvectors.
    let mut W = SMatrix::<f32, 2, 2>::zeros();
    W[(0, 0)] = G * L - F * M;
    W[(0, 1)] = G * M - F * N;
    W[(1, 0)] = E * M - F * L;
    W[(1, 1)] = E * N - F * M;
    W /= det;
    let eig = (0.5 * (W + W.transpose())).symmetric_eigen();

    let (i1, i2) = if eig.eigenvalues[0] <= eig.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let dir = |i: usize| {
        to_lab * Vector3f::new(eig.eigenvectors[(0, i)], eig.eigenvectors[(1, i)], 0.0)
    };

    Curvature {
        normal,
        gaussian,
        mean,
        princ_curvs: [eig.eigenvalues[i1], eig.eigenvalues[i2]],
        princ_dirs: SMatrix::<f32, 3, 2>::from_columns(&[dir(i1), dir(i2)]),
    }
}

/// Orthonormal local-to-lab transform with z along `n`.
/// If `x_hint` is given it is projected to the tangent plane and used as x axis.
pub fn get_to_lab_transform(n: &Vector3f, x_hint: Option<&Vector3f>) -> Matrix3f {
    let x = x_hint
        .map(|h| h - n * n.dot(h))
        .filter(|x| x.norm() > 1e-3)
        .unwrap_or_else(|| {
            let x = n.cross(&Vector3f::x());
            if x.norm() > 1e-3 {
                x
            } else {
                n.cross(&Vector3f::y())
            }
        })
        .normalize();
    let y = n.cross(&x);
    Matrix3f::from_columns(&[x, y, *n])
}

/// Least squares coefficients of `z = a*x^2 + b*y^2 + c*xy + d*x + e*y + f`.
/// Rank deficient systems get the minimum norm solution.
pub fn get_quad_coefs(local_points: &[Vector3f]) -> SVector<f32, 6> {
    let mut m = SMatrix::<f32, 6, 6>::zeros();
    let mut rhs = SVector::<f32, 6>::zeros();

    let mut powers = SVector::<f32, 6>::zeros();
    powers[5] = 1.0; // free term
    for loc in local_points {
        powers[0] = loc.x * loc.x;
        powers[1] = loc.y * loc.y;
        powers[2] = loc.x * loc.y;
        powers[3] = loc.x;
        powers[4] = loc.y;
        m += powers * powers.transpose();
        rhs += powers * loc.z;
    }

    let svd = m.svd(true, true);
    let eps = SVD_REL_EPS * svd.singular_values.max();
    svd.solve(&rhs, eps).unwrap_or_else(|_| SVector::zeros())
}

pub fn z_surf(x: f32, y: f32, coefs: &SVector<f32, 6>) -> f32 {
    coefs[0] * x * x + coefs[1] * y * y + coefs[2] * x * y + coefs[3] * x + coefs[4] * y + coefs[5]
}

fn orient_along(v: Vector3f, dir: &Vector3f) -> Vector3f {
    if v.dot(dir) < 0.0 {
        -v
    } else {
        v
    }
}

fn seed_normal(patch: &[Vector3f], orientation: &Vector3f) -> Vector3f {
    if let Some(pl) = fit_plane(patch) {
        if !pl.is_degenerate() {
            return orient_along(pl.normal, orientation);
        }
    }
    if orientation.norm_squared() > 0.0 {
        orientation.normalize()
    } else {
        Vector3f::z()
    }
}

fn fit_single(
    i: usize,
    markers: &[LipidMarkers],
    pbox: Option<&PeriodicBox>,
    graph: &NeighborGraph,
    iterations: usize,
    prev_normal: Option<&Vector3f>,
) -> SurfaceFit {
    let m = &markers[i];
    let o = m.orientation(pbox);
    let neibs = graph.neighbors_of(i);
    if neibs.len() < 2 {
        return SurfaceFit::degenerate(m, &o);
    }

    // Patch is unwrapped around the lipid, which is at the origin
    let patch: Vec<Vector3f> = std::iter::once(Vector3f::zeros())
        .chain(
            neibs
                .iter()
                .map(|j| pbc_shortest_vector(pbox, &(markers[*j].mid - m.mid))),
        )
        .collect();

    let mut n = prev_normal
        .filter(|n| n.norm_squared() > 0.0 && n.iter().all(|v| v.is_finite()))
        .map(|n| orient_along(n.normalize(), &o))
        .unwrap_or_else(|| seed_normal(&patch, &o));

    let mut x_hint: Option<Vector3f> = None;
    let mut to_lab = Matrix3f::identity();
    let mut coefs = SVector::<f32, 6>::zeros();
    let mut local = vec![];
    let mut curv = None;

    for _ in 0..iterations.max(1) {
        to_lab = get_to_lab_transform(&n, x_hint.as_ref());
        let to_local = to_lab.transpose();
        local = patch.iter().map(|p| to_local * p).collect::<Vec<_>>();
        coefs = get_quad_coefs(&local);

        let c = compute_curvature_and_normal(&coefs, &to_lab);
        n = orient_along(c.normal, &o);
        // Next pass uses the principal directions as the frame
        x_hint = Some(c.princ_dirs.column(0).into_owned());
        curv = Some(c);
    }

    let Some(curv) = curv else {
        return SurfaceFit::degenerate(m, &o);
    };

    let residual = (local
        .iter()
        .map(|p| (z_surf(p.x, p.y, &coefs) - p.z).powi(2))
        .sum::<f32>()
        / local.len() as f32)
        .sqrt();

    // Voronoi cell in the tangent plane of the last frame
    let rmax = local[1..]
        .iter()
        .map(|p| p.xy().norm())
        .fold(1e-3f32, f32::max);
    let mut vc = VoronoiCell::with_half_size(10.0 * rmax);
    for (p, id) in local[1..].iter().zip(neibs.iter()) {
        vc.add_point(&Vector2f::new(p.x, p.y), *id);
    }
    let area = if vc.is_closed() { vc.area() } else { f32::NAN };

    let tilt = if o.norm_squared() > 0.0 {
        undirected_angle_deg(&o, &n)
    } else {
        f32::NAN
    };

    SurfaceFit {
        normal: n,
        smoothed_mid: m.mid + to_lab * Vector3f::new(0.0, 0.0, coefs[5]),
        tilt,
        quad_fit_residual: residual,
        area,
        gaussian_curvature: curv.gaussian,
        mean_curvature: curv.mean,
        principal_curvatures: curv.princ_curvs,
        principal_directions: curv.princ_dirs,
        degenerate: false,
    }
}

/// Fits local surfaces for all lipids in parallel.
///
/// `prev_normals` are used as seed normals if given.
pub fn fit_surfaces(
    markers: &[LipidMarkers],
    pbox: Option<&PeriodicBox>,
    graph: &NeighborGraph,
    iterations: usize,
    prev_normals: Option<&[Vector3f]>,
) -> Vec<SurfaceFit> {
    (0..markers.len())
        .into_par_iter()
        .map(|i| {
            let prev = prev_normals.and_then(|pn| pn.get(i));
            fit_single(i, markers, pbox, graph, iterations, prev)
        })
        .collect()
}
