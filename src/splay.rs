use crate::core::{undirected_angle_deg, Vector3f};
use crate::neighbors::NeighborGraph;

/// Splay angle between the normals of two neighbouring lipids
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplayPair {
    pub lip1: usize,
    pub lip2: usize,
    /// Degrees in [0, 90]
    pub splay: f32,
}

/// Computes splay for every edge of the graph in the order of [NeighborGraph::pairs]
pub fn compute_splay(graph: &NeighborGraph, normals: &[Vector3f]) -> Vec<SplayPair> {
    graph
        .pairs()
        .iter()
        .map(|(i, j)| SplayPair {
            lip1: *i,
            lip2: *j,
            splay: undirected_angle_deg(&normals[*i], &normals[*j]),
        })
        .collect()
}
