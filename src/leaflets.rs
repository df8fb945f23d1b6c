//! Assignment of lipids to the two leaflets of the bilayer.
//!
//! Mid markers closer than the cutoff form a proximity graph. Edges between
//! lipids oriented to the same half-space connect lipids of the same
//! leaflet, edges between anti-parallel lipids cross the bilayer midplane.
//! Connected components of the same-side graph are colored starting from
//! the largest one, using the reference axis to seed the color and the
//! cross-midplane edges to propagate the opposite color.

use crate::core::*;
use crate::distance_search::search_pairs;
use crate::lipid::LipidMarkers;
use crate::membrane::MembraneError;
use log::{debug, warn};
use nalgebra::SymmetricEigen;
use std::collections::VecDeque;

/// |cos| between component orientation and reference below which
/// the orientation of the component is ambiguous
const AMBIGUOUS_COS: f32 = 0.1;

/// Total partition of lipids into leaflets 0 and 1
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletAssignment {
    ids: Vec<usize>,
    members: [Vec<usize>; 2],
}

impl LeafletAssignment {
    /// All ids must be 0 or 1
    pub(crate) fn from_ids(ids: Vec<usize>) -> Self {
        let mut members = [vec![], vec![]];
        for (i, l) in ids.iter().enumerate() {
            members[*l].push(i);
        }
        Self { ids, members }
    }

    pub fn leaflet_of(&self, lip: usize) -> usize {
        self.ids[lip]
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Sorted indexes of lipids in the leaflet 0 or 1
    pub fn members(&self, leaflet: usize) -> &[usize] {
        &self.members[leaflet]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl TryFrom<Vec<usize>> for LeafletAssignment {
    type Error = MembraneError;

    fn try_from(ids: Vec<usize>) -> Result<Self, Self::Error> {
        if let Some((lipid, leaflet)) = ids.iter().enumerate().find(|(_, l)| **l > 1) {
            return Err(MembraneError::InvalidLeaflet {
                lipid,
                leaflet: *leaflet,
            });
        }
        Ok(Self::from_ids(ids))
    }
}

/// Axis along which lipids are oriented. Computed as the director of
/// lipid orientations, falls back to the plane fitted through mid markers.
/// The sign is chosen such that the largest component is positive.
fn infer_reference_axis(orient: &[Vector3f], markers: &[LipidMarkers]) -> Vector3f {
    let mut q = Matrix3f::zeros();
    for o in orient.iter().filter(|o| o.norm_squared() > 0.0) {
        let u = o.normalize();
        q += u * u.transpose();
    }

    let axis = if q.norm() > 0.0 {
        let eig = SymmetricEigen::new(q);
        Some(eig.eigenvectors.column(eig.eigenvalues.imax()).into_owned())
    } else {
        let mids: Vec<Vector3f> = markers.iter().map(|m| m.mid.coords).collect();
        fit_plane(&mids)
            .filter(|pl| !pl.is_degenerate())
            .map(|pl| pl.normal)
    };

    match axis {
        Some(a) if a[a.iamax()] < 0.0 => -a,
        Some(a) => a,
        None => Vector3f::z(),
    }
}

/// Splits lipids into two leaflets.
///
/// `external_normal` is the reference axis of the bilayer if it is non-zero.
/// Lipids oriented along it are assigned to leaflet 0.
/// Never fails: pathological inputs give a degenerate but total partition.
pub fn classify_leaflets(
    markers: &[LipidMarkers],
    pbox: Option<&PeriodicBox>,
    cutoff: f32,
    external_normal: &Vector3f,
) -> LeafletAssignment {
    let n = markers.len();
    if n == 0 {
        return LeafletAssignment::from_ids(vec![]);
    }

    let orient: Vec<Vector3f> = markers.iter().map(|m| m.orientation(pbox)).collect();

    let data: Vec<(usize, Pos)> = markers.iter().map(|m| m.mid).enumerate().collect();
    let pairs = search_pairs(cutoff, &data, pbox);

    let mut same = vec![vec![]; n];
    let mut cross = vec![vec![]; n];
    for (i, j) in pairs {
        let dot = orient[i].dot(&orient[j]);
        if dot > 0.0 {
            same[i].push(j);
            same[j].push(i);
        } else if dot < 0.0 {
            cross[i].push(j);
            cross[j].push(i);
        }
    }

    // Connected components of the same-side graph
    let mut comp_of = vec![usize::MAX; n];
    let mut comps: Vec<Vec<usize>> = vec![];
    for start in 0..n {
        if comp_of[start] != usize::MAX {
            continue;
        }
        let c = comps.len();
        let mut members = vec![start];
        comp_of[start] = c;
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            for &j in &same[i] {
                if comp_of[j] == usize::MAX {
                    comp_of[j] = c;
                    members.push(j);
                    queue.push_back(j);
                }
            }
        }
        comps.push(members);
    }

    let reference = if external_normal.norm_squared() > 0.0 {
        external_normal.normalize()
    } else {
        infer_reference_axis(&orient, markers)
    };
    debug!(
        "leaflet reference axis {:?}, {} same-side components",
        reference.as_slice(),
        comps.len()
    );

    // Component adjacency over the cross-midplane edges
    let mut comp_cross: Vec<Vec<usize>> = vec![vec![]; comps.len()];
    for i in 0..n {
        for &j in &cross[i] {
            let (ci, cj) = (comp_of[i], comp_of[j]);
            if ci != cj && !comp_cross[ci].contains(&cj) {
                comp_cross[ci].push(cj);
            }
        }
    }

    // Largest components are colored first
    let mut order: Vec<usize> = (0..comps.len()).collect();
    order.sort_by(|a, b| comps[*b].len().cmp(&comps[*a].len()).then(a.cmp(b)));

    let mut color = vec![usize::MAX; comps.len()];
    for &c in &order {
        if color[c] != usize::MAX {
            continue;
        }

        let mean_orient: Vector3f = comps[c].iter().map(|i| orient[*i]).sum();
        let cos = if mean_orient.norm_squared() > 0.0 {
            mean_orient.normalize().dot(&reference)
        } else {
            0.0
        };

        let seed = if cos.abs() < AMBIGUOUS_COS && comp_cross[c].is_empty() {
            // Majority vote of individual lipids
            let up = comps[c]
                .iter()
                .filter(|i| orient[**i].dot(&reference) >= 0.0)
                .count();
            warn!(
                "orientation of the group of {} lipids is ambiguous, assigned by majority",
                comps[c].len()
            );
            if 2 * up >= comps[c].len() {
                0
            } else {
                1
            }
        } else if cos >= 0.0 {
            0
        } else {
            1
        };

        color[c] = seed;
        let mut queue = VecDeque::from([c]);
        while let Some(ci) = queue.pop_front() {
            for &cj in &comp_cross[ci] {
                if color[cj] == usize::MAX {
                    color[cj] = 1 - color[ci];
                    queue.push_back(cj);
                }
            }
        }
    }

    let ids: Vec<usize> = comp_of.iter().map(|c| color[*c]).collect();
    let res = LeafletAssignment::from_ids(ids);
    debug!(
        "leaflets: {} and {} lipids",
        res.members(0).len(),
        res.members(1).len()
    );
    res
}
