use crate::core::*;
use crate::distance_search::search_pairs;
use crate::leaflets::LeafletAssignment;
use crate::lipid::LipidMarkers;
use crate::membrane::MembraneError;
use log::debug;
use sorted_vec::SortedSet;

/// Neighbours of each lipid within its own leaflet
#[derive(Debug, Clone, Default)]
pub struct NeighborGraph {
    adjacency: Vec<SortedSet<usize>>,
    // i < j, sorted
    pairs: Vec<(usize, usize)>,
}

impl NeighborGraph {
    /// Builds the graph from the list of edges.
    /// Adjacency is symmetric regardless of the edge direction.
    pub fn from_pairs(num_lipids: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut adj = vec![vec![]; num_lipids];
        let mut pairs = vec![];
        for (i, j) in edges {
            if i == j {
                continue;
            }
            adj[i].push(j);
            adj[j].push(i);
            pairs.push((i.min(j), i.max(j)));
        }
        pairs.sort_unstable();
        pairs.dedup();
        Self {
            adjacency: adj.into_iter().map(SortedSet::from_unsorted).collect(),
            pairs,
        }
    }

    pub fn neighbors_of(&self, lip: usize) -> &SortedSet<usize> {
        &self.adjacency[lip]
    }

    pub fn coord_number(&self, lip: usize) -> usize {
        self.adjacency[lip].len()
    }

    /// All edges as `(i, j)` with `i < j` in lexicographical order
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn num_lipids(&self) -> usize {
        self.adjacency.len()
    }

    fn check_leaflet_purity(&self, leaflets: &LeafletAssignment) -> Result<(), MembraneError> {
        for (i, j) in &self.pairs {
            if leaflets.leaflet_of(*i) != leaflets.leaflet_of(*j) {
                return Err(MembraneError::CrossLeafletEdge(*i, *j));
            }
        }
        Ok(())
    }
}

fn leaflet_pairs(
    members: &[usize],
    markers: &[LipidMarkers],
    pbox: Option<&PeriodicBox>,
    cutoff: f32,
) -> Vec<(usize, usize)> {
    let data: Vec<(usize, Pos)> = members.iter().map(|i| (*i, markers[*i].mid)).collect();
    search_pairs(cutoff, &data, pbox)
}

/// Searches neighbours within `cutoff` in each leaflet independently
pub fn build_neighbor_graph(
    markers: &[LipidMarkers],
    pbox: Option<&PeriodicBox>,
    leaflets: &LeafletAssignment,
    cutoff: f32,
) -> Result<NeighborGraph, MembraneError> {
    let (p0, p1) = rayon::join(
        || leaflet_pairs(leaflets.members(0), markers, pbox, cutoff),
        || leaflet_pairs(leaflets.members(1), markers, pbox, cutoff),
    );
    debug!("neighbour pairs: {} and {} per leaflet", p0.len(), p1.len());

    let graph = NeighborGraph::from_pairs(markers.len(), p0.into_iter().chain(p1));
    graph.check_leaflet_purity(leaflets)?;
    Ok(graph)
}
