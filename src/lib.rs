//! Structural analysis of lipid bilayers.
//!
//! For every frame the [Membrane](membrane::Membrane) computes marker points of
//! all lipids, splits them into leaflets, finds neighbours inside each leaflet,
//! fits local quadratic surfaces to get normals, curvatures, tilt and area,
//! and computes splay angles between neighbouring lipids.
//! Periodic boundary conditions are taken into account at every step.
//!
//! Reading of trajectories is not part of this crate. Coordinates are passed
//! as a [State](core::State) and lipid descriptors are resolved by any
//! implementation of [SelectionResolver](selection::SelectionResolver).

pub mod config;
pub mod core;
pub mod distance_search;
pub mod leaflets;
pub mod lipid;
pub mod membrane;
pub mod neighbors;
pub mod selection;
pub mod splay;
pub mod stats;
pub mod surface;
pub mod vmd_visual;
pub mod voronoi_cell;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::core::*;
    pub use crate::distance_search::search_pairs;
    pub use crate::leaflets::LeafletAssignment;
    pub use crate::lipid::{Lipid, LipidMarkers, LipidProperties, LipidSpeciesDescr, MarkerScope};
    pub use crate::membrane::*;
    pub use crate::neighbors::NeighborGraph;
    pub use crate::selection::*;
    pub use crate::splay::SplayPair;
    pub use crate::surface::SurfaceFit;
}
