use crate::core::*;
use crate::membrane::MembraneError;
use crate::selection::{Sel, SelectionResolver};
use log::warn;
use rayon::prelude::*;
use serde::Deserialize;

/// Description of a lipid species.
///
/// `whole` selects all lipids of this species in the system, `head`, `tail`
/// and `mid` are evaluated inside each individual lipid.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LipidSpeciesDescr {
    pub name: String,
    pub whole: String,
    pub head: String,
    pub tail: String,
    pub mid: String,
}

/// Atoms of a lipid which are reduced to a single marker point
#[derive(Debug, Clone)]
pub struct MarkerSubset {
    sel: Sel,
    masses: Vec<f32>,
}

impl MarkerSubset {
    fn new(sel: Sel, resolver: &impl SelectionResolver) -> Self {
        let masses = sel.iter_index().map(|i| resolver.mass(i)).collect();
        Self { sel, masses }
    }

    pub fn sel(&self) -> &Sel {
        &self.sel
    }

    // The marker is written to the first atom of the subset
    fn marker_index(&self) -> usize {
        // Subsets are checked to be non-empty on construction
        self.sel.first_index().unwrap_or_default()
    }
}

struct SubsetView<'a> {
    state: &'a State,
    subset: &'a MarkerSubset,
}

impl LenProvider for SubsetView<'_> {
    fn len(&self) -> usize {
        self.subset.sel.len()
    }
}

impl PosIterProvider for SubsetView<'_> {
    fn iter_pos(&self) -> impl PosIterator<'_> {
        self.subset.sel.iter_index().map(|i| &self.state.coords[i])
    }
}

impl MassesProvider for SubsetView<'_> {
    fn iter_masses(&self) -> impl ExactSizeIterator<Item = f32> {
        self.subset.masses.iter().cloned()
    }
}

impl BoxProvider for SubsetView<'_> {
    fn get_box(&self) -> Option<&PeriodicBox> {
        self.state.pbox.as_ref()
    }
}

impl MeasurePeriodic for SubsetView<'_> {}

impl SubsetView<'_> {
    fn center(&self) -> Result<Pos, MeasureError> {
        match self.center_of_mass_pbc() {
            Err(MeasureError::ZeroMass) => {
                warn!("zero mass of marker atoms, using geometric center");
                self.center_of_geometry_pbc()
            }
            res => res,
        }
    }
}

/// Per-frame properties of a single lipid
#[derive(Debug, Clone)]
pub struct LipidProperties {
    /// Unit normal of the fitted surface pointing from tails to heads
    pub normal: Vector3f,
    /// Raw mid marker projected to the fitted surface
    pub smoothed_mid: Pos,
    /// Angle between head-tail axis and the normal, degrees in [0, 90]
    pub tilt: f32,
    /// RMS deviation of patch points from the fitted surface, NaN if undefined
    pub quad_fit_residual: f32,
    /// Area of the Voronoi cell in the tangent plane, NaN if the cell is open
    pub area: f32,
    /// Leaflet index 0 or 1, `None` before classification
    pub leaflet: Option<usize>,
    pub gaussian_curvature: f32,
    pub mean_curvature: f32,
    pub principal_curvatures: [f32; 2],
    /// Number of neighbours in the same leaflet
    pub coord_number: usize,
    /// True if the neighbourhood is too small for the surface fit
    pub degenerate: bool,
}

impl Default for LipidProperties {
    fn default() -> Self {
        Self {
            normal: Vector3f::zeros(),
            smoothed_mid: Pos::origin(),
            tilt: f32::NAN,
            quad_fit_residual: f32::NAN,
            area: f32::NAN,
            leaflet: None,
            gaussian_curvature: f32::NAN,
            mean_curvature: f32::NAN,
            principal_curvatures: [f32::NAN; 2],
            coord_number: 0,
            degenerate: false,
        }
    }
}

/// Single lipid molecule
#[derive(Debug, Clone)]
pub struct Lipid {
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) whole: Sel,
    pub(crate) head: MarkerSubset,
    pub(crate) tail: MarkerSubset,
    pub(crate) mid: MarkerSubset,
    pub(crate) props: LipidProperties,
}

impl Lipid {
    /// Resolves head, tail and mid subsets inside the given molecule
    pub fn new(
        id: usize,
        descr: &LipidSpeciesDescr,
        whole: Sel,
        resolver: &impl SelectionResolver,
    ) -> Result<Self, MembraneError> {
        if whole.is_empty() {
            return Err(MembraneError::EmptySpecies(descr.name.clone()));
        }
        if let Some(last) = whole.last_index() {
            if last >= resolver.num_atoms() {
                return Err(MembraneError::AtomIndex(last, resolver.num_atoms()));
            }
        }

        let resolve = |what: &str, expr: &str| -> Result<MarkerSubset, MembraneError> {
            let sel = resolver.subselect(&whole, expr)?;
            if sel.is_empty() {
                return Err(MembraneError::EmptyMarker {
                    species: descr.name.clone(),
                    lipid: id,
                    marker: what.to_owned(),
                });
            }
            if !sel.is_subset_of(&whole) {
                return Err(MembraneError::MarkerOutsideWhole {
                    species: descr.name.clone(),
                    lipid: id,
                    marker: what.to_owned(),
                });
            }
            Ok(MarkerSubset::new(sel, resolver))
        };

        let head = resolve("head", &descr.head)?;
        let tail = resolve("tail", &descr.tail)?;
        let mid = resolve("mid", &descr.mid)?;

        Ok(Self {
            id,
            name: descr.name.clone(),
            whole,
            head,
            tail,
            mid,
            props: Default::default(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn whole(&self) -> &Sel {
        &self.whole
    }

    pub fn head(&self) -> &MarkerSubset {
        &self.head
    }

    pub fn tail(&self) -> &MarkerSubset {
        &self.tail
    }

    pub fn mid(&self) -> &MarkerSubset {
        &self.mid
    }

    pub fn props(&self) -> &LipidProperties {
        &self.props
    }

    fn compute_markers(&self, state: &State) -> Result<LipidMarkers, MeasureError> {
        let center = |subset: &MarkerSubset| SubsetView { state, subset }.center();
        Ok(LipidMarkers {
            head: center(&self.head)?,
            tail: center(&self.tail)?,
            mid: center(&self.mid)?,
        })
    }
}

/// Marker points of a single lipid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LipidMarkers {
    pub head: Pos,
    pub tail: Pos,
    pub mid: Pos,
}

impl LipidMarkers {
    /// Tail to head vector of the lipid (minimum image)
    pub fn orientation(&self, pbox: Option<&PeriodicBox>) -> Vector3f {
        pbc_shortest_vector(pbox, &(self.head - self.tail))
    }
}

/// Scope in which the first atom of each marker subset holds the marker position.
///
/// Markers are computed and written to the coordinate buffer when the scope is
/// created. The original coordinates are restored when the scope is dropped,
/// so every exit path (including early returns by `?`) leaves the
/// buffer unmodified. The scope holds the exclusive borrow of the [State],
/// thus nested scopes and marker access outside of the scope are impossible.
///
/// Subsets may share their first atom (e.g. `mid = "all"`), in which case the
/// buffer keeps only the last written marker. Accessors of the scope always
/// return the computed markers.
pub struct MarkerScope<'a> {
    state: &'a mut State,
    markers: Vec<LipidMarkers>,
    saved: Vec<(usize, Pos)>,
}

impl<'a> MarkerScope<'a> {
    pub fn begin(lipids: &'a [Lipid], state: &'a mut State) -> Result<Self, MembraneError> {
        let natoms = state.len();
        for lip in lipids {
            if let Some(last) = lip.whole.last_index() {
                if last >= natoms {
                    return Err(MembraneError::AtomIndex(last, natoms));
                }
            }
        }

        // Centers are computed before anything is written
        let markers = {
            let st: &State = state;
            lipids
                .par_iter()
                .map(|lip| lip.compute_markers(st))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut saved = Vec::with_capacity(3 * lipids.len());
        for (lip, m) in lipids.iter().zip(markers.iter()) {
            for (subset, p) in [(&lip.head, m.head), (&lip.tail, m.tail), (&lip.mid, m.mid)] {
                let i = subset.marker_index();
                saved.push((i, state.coords[i]));
                state.coords[i] = p;
            }
        }

        Ok(Self {
            state,
            markers,
            saved,
        })
    }

    /// Explicitly closes the scope and restores the coordinates
    pub fn end(self) {}

    pub fn head_xyz(&self, lip: usize) -> Pos {
        self.markers[lip].head
    }

    pub fn tail_xyz(&self, lip: usize) -> Pos {
        self.markers[lip].tail
    }

    pub fn mid_xyz(&self, lip: usize) -> Pos {
        self.markers[lip].mid
    }

    pub fn get_box(&self) -> Option<&PeriodicBox> {
        self.state.pbox.as_ref()
    }

    /// Immutable snapshot of all markers
    pub fn markers(&self) -> Vec<LipidMarkers> {
        self.markers.clone()
    }
}

impl Drop for MarkerScope<'_> {
    fn drop(&mut self) {
        // Reverse order restores correctly even if subsets share the first atom
        for (i, p) in self.saved.iter().rev() {
            self.state.coords[*i] = *p;
        }
    }
}

pub fn begin_marker_scope<'a>(
    lipids: &'a [Lipid],
    state: &'a mut State,
) -> Result<MarkerScope<'a>, MembraneError> {
    MarkerScope::begin(lipids, state)
}

pub fn end_marker_scope(scope: MarkerScope<'_>) {
    scope.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::TopologySelector;

    fn one_lipid() -> (Topology, State, LipidSpeciesDescr) {
        let top = Topology::new(vec![
            Atom::new("P", "DOPC", 1, 31.0),
            Atom::new("N", "DOPC", 1, 14.0),
            Atom::new("C21", "DOPC", 1, 12.0),
            Atom::new("C22", "DOPC", 1, 12.0),
            Atom::new("C218", "DOPC", 1, 12.0),
            Atom::new("C316", "DOPC", 1, 12.0),
        ]);
        let pbox = PeriodicBox::from_extents(5.0, 5.0, 5.0).unwrap();
        let st = State::new(
            vec![
                Pos::new(1.0, 1.0, 3.0),
                Pos::new(1.2, 1.0, 3.1),
                Pos::new(4.9, 1.0, 2.0),
                Pos::new(0.1, 1.0, 2.0),
                Pos::new(1.0, 0.8, 1.0),
                Pos::new(1.0, 1.2, 1.0),
            ],
            Some(pbox),
        );
        let descr = LipidSpeciesDescr {
            name: "DOPC".into(),
            whole: "resname DOPC".into(),
            head: "name P N".into(),
            tail: "name C218 C316".into(),
            mid: "name C21 C22".into(),
        };
        (top, st, descr)
    }

    #[test]
    fn markers_are_restored() -> anyhow::Result<()> {
        let (top, mut st, descr) = one_lipid();
        let sel = TopologySelector::new(&top);
        let lips = vec![Lipid::new(0, &descr, sel.select(&descr.whole)?, &sel)?];
        let orig = st.clone();
        {
            let scope = MarkerScope::begin(&lips, &mut st)?;
            let m = scope.markers()[0];
            // Mid is unwrapped over the boundary
            assert!((m.mid.x - 5.0).abs() < 1e-4 || m.mid.x.abs() < 1e-4);
            assert!((m.tail - Pos::new(1.0, 1.0, 1.0)).norm() < 1e-5);
            assert!(m.orientation(scope.get_box()).z > 0.0);
            end_marker_scope(scope);
        }
        assert_eq!(st, orig);
        Ok(())
    }

    #[test]
    fn restored_on_early_exit() -> anyhow::Result<()> {
        let (top, mut st, descr) = one_lipid();
        let sel = TopologySelector::new(&top);
        let lips = vec![Lipid::new(0, &descr, sel.select(&descr.whole)?, &sel)?];
        let orig = st.clone();

        fn failing(lips: &[Lipid], st: &mut State) -> anyhow::Result<()> {
            let _scope = begin_marker_scope(lips, st)?;
            anyhow::bail!("failure inside of the scope");
        }
        assert!(failing(&lips, &mut st).is_err());
        assert_eq!(st, orig);
        Ok(())
    }

    #[test]
    fn shared_first_atom_keeps_markers() -> anyhow::Result<()> {
        let top = Topology::new(vec![
            Atom::new("ROH", "CHL", 1, 12.0),
            Atom::new("C1", "CHL", 1, 12.0),
            Atom::new("C2", "CHL", 1, 12.0),
        ]);
        let mut st = State::new(
            vec![
                Pos::new(0.0, 0.0, 2.0),
                Pos::new(0.0, 0.0, 1.0),
                Pos::new(0.0, 0.0, 0.0),
            ],
            None,
        );
        // Head and mid both start at ROH
        let descr = LipidSpeciesDescr {
            name: "CHL".into(),
            whole: "resname CHL".into(),
            head: "name ROH".into(),
            tail: "name C2".into(),
            mid: "all".into(),
        };
        let sel = TopologySelector::new(&top);
        let lips = vec![Lipid::new(0, &descr, sel.select(&descr.whole)?, &sel)?];
        let orig = st.clone();
        {
            let scope = MarkerScope::begin(&lips, &mut st)?;
            assert_eq!(scope.head_xyz(0), Pos::new(0.0, 0.0, 2.0));
            assert_eq!(scope.mid_xyz(0), Pos::new(0.0, 0.0, 1.0));
            assert_eq!(scope.tail_xyz(0), Pos::new(0.0, 0.0, 0.0));
            let m = scope.markers()[0];
            assert_eq!(m.head, Pos::new(0.0, 0.0, 2.0));
            assert_eq!(m.mid, Pos::new(0.0, 0.0, 1.0));
        }
        assert_eq!(st, orig);
        Ok(())
    }

    #[test]
    fn empty_marker_is_rejected() -> anyhow::Result<()> {
        let (top, _st, mut descr) = one_lipid();
        descr.mid = "name XX".into();
        let sel = TopologySelector::new(&top);
        let res = Lipid::new(0, &descr, sel.select(&descr.whole)?, &sel);
        assert!(matches!(res, Err(MembraneError::EmptyMarker { .. })));
        Ok(())
    }
}
