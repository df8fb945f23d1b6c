use crate::config::{MembraneConfig, MembraneOptions};
use crate::core::*;
use crate::leaflets::{classify_leaflets, LeafletAssignment};
use crate::lipid::{Lipid, LipidMarkers, LipidProperties, LipidSpeciesDescr, MarkerScope};
use crate::neighbors::{build_neighbor_graph, NeighborGraph};
use crate::selection::{SelectionError, SelectionResolver};
use crate::splay::{compute_splay, SplayPair};
use crate::stats::MembraneStats;
use crate::surface::{fit_surfaces, SurfaceFit};
use crate::vmd_visual::VmdVisual;
use log::{debug, info};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MembraneError {
    #[error("selection error")]
    Selection(#[from] SelectionError),

    #[error("can't compute marker")]
    Measure(#[from] MeasureError),

    #[error("no lipids of species '{0}' found")]
    EmptySpecies(String),

    #[error("{marker} marker of lipid {lipid} of species '{species}' is empty")]
    EmptyMarker {
        species: String,
        lipid: usize,
        marker: String,
    },

    #[error("{marker} marker of lipid {lipid} of species '{species}' is outside of the lipid")]
    MarkerOutsideWhole {
        species: String,
        lipid: usize,
        marker: String,
    },

    #[error("invalid configuration")]
    Config(#[from] toml::de::Error),

    #[error("no lipid species defined")]
    NoSpecies,

    #[error("cutoff must be positive, got {0}")]
    InvalidCutoff(f32),

    #[error("atom index {0} is out of range 0:{1}")]
    AtomIndex(usize, usize),

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("lipid {lipid} is assigned to leaflet {leaflet}, only 0 and 1 are valid")]
    InvalidLeaflet { lipid: usize, leaflet: usize },

    #[error("lipids {0} and {1} from different leaflets are connected")]
    CrossLeafletEdge(usize, usize),

    #[error("state has {got} atoms, while {expected} are expected")]
    StateSize { expected: usize, got: usize },

    #[error("membrane properties are not computed yet")]
    NotComputed,

    #[error("no statistics accumulated")]
    NoStats,
}

/// Results of a single frame. Each step of the computation
/// produces its own part from the parts of the preceding steps.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub time: f32,
    pub markers: Vec<LipidMarkers>,
    pub leaflets: LeafletAssignment,
    pub graph: NeighborGraph,
    pub fits: Vec<SurfaceFit>,
    pub splay: Vec<SplayPair>,
}

pub struct Membrane {
    species: Vec<LipidSpeciesDescr>,
    lipids: Vec<Lipid>,
    options: MembraneOptions,
    num_atoms: usize,
    snapshot: Option<FrameSnapshot>,
    stats: MembraneStats,
}

impl Membrane {
    pub fn new(
        resolver: &impl SelectionResolver,
        species: Vec<LipidSpeciesDescr>,
        options: MembraneOptions,
    ) -> Result<Self, MembraneError> {
        if species.is_empty() {
            return Err(MembraneError::NoSpecies);
        }
        options.validate()?;

        let mut lipids = vec![];
        for descr in &species {
            let whole = resolver.select(&descr.whole)?;
            let mols = resolver.split_molecules(&whole);
            if mols.is_empty() {
                return Err(MembraneError::EmptySpecies(descr.name.clone()));
            }
            info!("Creating {} '{}' lipids", mols.len(), descr.name);
            for mol in mols {
                lipids.push(Lipid::new(lipids.len(), descr, mol, resolver)?);
            }
        }

        Ok(Self {
            species,
            lipids,
            options,
            num_atoms: resolver.num_atoms(),
            snapshot: None,
            stats: Default::default(),
        })
    }

    pub fn from_config(
        resolver: &impl SelectionResolver,
        toml_str: &str,
    ) -> Result<Self, MembraneError> {
        let cfg = MembraneConfig::from_toml(toml_str)?;
        Self::new(resolver, cfg.species, cfg.options)
    }

    /// Computes properties of the current frame with the cutoff and
    /// the external normal from the options
    pub fn compute(&mut self, state: &mut State) -> Result<(), MembraneError> {
        let normal = self.options.external_normal();
        let cutoff = self.options.cutoff;
        self.compute_properties(state, cutoff, &normal)
    }

    /// Computes properties of all lipids in the current frame.
    ///
    /// Markers are written to the coordinates of `state` for the duration
    /// of the computation. The coordinates are restored on return,
    /// including the error paths. Lipids are updated only on success.
    pub fn compute_properties(
        &mut self,
        state: &mut State,
        cutoff: f32,
        external_normal: &Vector3f,
    ) -> Result<(), MembraneError> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(MembraneError::InvalidCutoff(cutoff));
        }
        if state.len() != self.num_atoms {
            return Err(MembraneError::StateSize {
                expected: self.num_atoms,
                got: state.len(),
            });
        }

        let prev_normals: Option<Vec<Vector3f>> = match &self.snapshot {
            Some(snap) if self.options.use_previous_normals => {
                Some(snap.fits.iter().map(|f| f.normal).collect())
            }
            _ => None,
        };

        let time = state.time;
        let snap = {
            let scope = MarkerScope::begin(&self.lipids, state)?;
            let markers = scope.markers();
            let pbox = scope.get_box().cloned();
            let pbox = pbox.as_ref();

            let leaflets = classify_leaflets(&markers, pbox, cutoff, external_normal);
            let graph = build_neighbor_graph(&markers, pbox, &leaflets, cutoff)?;
            let fits = fit_surfaces(
                &markers,
                pbox,
                &graph,
                self.options.fit_iterations,
                prev_normals.as_deref(),
            );
            let normals: Vec<Vector3f> = fits.iter().map(|f| f.normal).collect();
            let splay = compute_splay(&graph, &normals);

            scope.end();

            FrameSnapshot {
                time,
                markers,
                leaflets,
                graph,
                fits,
                splay,
            }
        };

        for (i, lip) in self.lipids.iter_mut().enumerate() {
            let fit = &snap.fits[i];
            lip.props = LipidProperties {
                normal: fit.normal,
                smoothed_mid: fit.smoothed_mid,
                tilt: fit.tilt,
                quad_fit_residual: fit.quad_fit_residual,
                area: fit.area,
                leaflet: Some(snap.leaflets.leaflet_of(i)),
                gaussian_curvature: fit.gaussian_curvature,
                mean_curvature: fit.mean_curvature,
                principal_curvatures: fit.principal_curvatures,
                coord_number: snap.graph.coord_number(i),
                degenerate: fit.degenerate,
            };
        }

        debug!(
            "frame at t={time}: {} neighbour pairs, {} degenerate lipids",
            snap.graph.pairs().len(),
            snap.fits.iter().filter(|f| f.degenerate).count()
        );

        self.stats.add_frame(&self.lipids, &snap.splay);
        self.snapshot = Some(snap);
        Ok(())
    }

    fn computed(&self) -> Result<&FrameSnapshot, MembraneError> {
        self.snapshot.as_ref().ok_or(MembraneError::NotComputed)
    }

    /// Writes VMD script with arrows along lipid normals
    pub fn write_vmd_arrows(&self, fname: impl AsRef<Path>) -> Result<(), MembraneError> {
        let snap = self.computed()?;
        let mut vis = VmdVisual::new();
        vis.comment(&format!("Lipid normals at t={}", snap.time));
        for (i, lip) in self.lipids.iter().enumerate() {
            let color = match lip.props.leaflet {
                Some(0) => "red",
                _ => "blue",
            };
            vis.arrow(
                &snap.markers[i].mid,
                &lip.props.normal,
                self.options.arrow_length,
                color,
            );
        }
        vis.save_to_file(fname)?;
        Ok(())
    }

    /// Writes smoothed mid markers, one lipid per line
    pub fn write_smoothed(&self, fname: impl AsRef<Path>) -> Result<(), MembraneError> {
        use std::io::Write;

        let snap = self.computed()?;
        let mut s = format!("# Smoothed lipid positions at t={}\n", snap.time);
        s.push_str("# index name x y z leaflet\n");
        for lip in &self.lipids {
            let p = &lip.props.smoothed_mid;
            let l = lip.props.leaflet.map(|l| l as i32).unwrap_or(-1);
            s.push_str(&format!(
                "{} {} {:.4} {:.4} {:.4} {l}\n",
                lip.id, lip.name, p.x, p.y, p.z
            ));
        }

        let mut f = std::fs::File::create(fname)?;
        write!(f, "{s}")?;
        Ok(())
    }

    /// Writes statistics accumulated over all computed frames
    pub fn write_stats(&self, fname: impl AsRef<Path>) -> Result<(), MembraneError> {
        self.stats.save_to_file(fname)
    }

    /// Table of per-species averages of the last frame
    pub fn frame_summary(&self) -> Result<comfy_table::Table, MembraneError> {
        let snap = self.computed()?;
        let mut st = MembraneStats::default();
        st.add_frame(&self.lipids, &snap.splay);
        Ok(st.to_table())
    }

    pub fn num_lipids(&self) -> usize {
        self.lipids.len()
    }

    pub fn lipid(&self, i: usize) -> Option<&Lipid> {
        self.lipids.get(i)
    }

    pub fn iter_lipids(&self) -> impl ExactSizeIterator<Item = &Lipid> + '_ {
        self.lipids.iter()
    }

    pub fn species(&self) -> &[LipidSpeciesDescr] {
        &self.species
    }

    pub fn options(&self) -> &MembraneOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut MembraneOptions {
        &mut self.options
    }

    pub fn snapshot(&self) -> Option<&FrameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn leaflets(&self) -> Option<&LeafletAssignment> {
        self.snapshot.as_ref().map(|s| &s.leaflets)
    }

    pub fn neighbors(&self) -> Option<&NeighborGraph> {
        self.snapshot.as_ref().map(|s| &s.graph)
    }

    /// Neighbour pairs of the last frame, empty before the first frame
    pub fn neighbor_pairs(&self) -> &[(usize, usize)] {
        self.snapshot.as_ref().map(|s| s.graph.pairs()).unwrap_or(&[])
    }

    /// Splay of all neighbour pairs in the order of [Self::neighbor_pairs]
    pub fn splay(&self) -> &[SplayPair] {
        self.snapshot
            .as_ref()
            .map(|s| s.splay.as_slice())
            .unwrap_or(&[])
    }

    /// Splay pairs involving the lipid
    pub fn splay_of(&self, lip: usize) -> impl Iterator<Item = &SplayPair> + '_ {
        self.splay()
            .iter()
            .filter(move |s| s.lip1 == lip || s.lip2 == lip)
    }

    pub fn stats(&self) -> &MembraneStats {
        &self.stats
    }
}
