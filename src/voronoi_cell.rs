//! Voronoi cell of a single point in 2D built by successive half-plane cuts.
//!
//! The cell of the point at the origin starts as a rectangle bounded by
//! four walls. Each added neighbour cuts the cell by the perpendicular
//! bisector of the segment between the origin and the neighbour.
//! All positions are relative to the central point.

pub type Vector2f = nalgebra::Vector2<f32>;
const TOL: f32 = 1e-10;

#[derive(Debug)]
struct Vertex {
    pos: Vector2f,
    // Index of neighbour in ccw direction
    ccw_neib: usize,
    // Id of the point that created the ccw edge.
    // Negative numbers are reserved for the walls
    edge_id: i32,
}

struct CuttingLine {
    pos: Vector2f,
    r2: f32,
}

impl CuttingLine {
    fn new(point: &Vector2f) -> Self {
        let pos = 0.5 * point;
        let r2 = pos.norm_squared();
        Self { pos, r2 }
    }
}

#[derive(Debug)]
pub struct VoronoiCell {
    vert: Vec<Vertex>,
    init_vert: usize,
}

#[derive(Default, Debug)]
struct EdgeCut {
    in_ind: usize,
    in_dist: f32,
    out_ind: usize,
    out_dist: f32,
}

impl VoronoiCell {
    pub fn new(xmin: f32, xmax: f32, ymin: f32, ymax: f32) -> Self {
        let mut ret = Self {
            vert: Vec::with_capacity(8),
            init_vert: 0,
        };

        // Filled counterclockwise
        // (3)xmin,ymax----------(2)xmax,ymax
        //  |                     |
        //  |                     |
        //(0)xmin,ymin-----------(1)xmax,ymin
        ret.push_wall(xmin, ymin, 1, -1);
        ret.push_wall(xmax, ymin, 2, -2);
        ret.push_wall(xmax, ymax, 3, -3);
        ret.push_wall(xmin, ymax, 0, -4);
        ret
    }

    /// Square cell with walls at distance `half` from the origin
    pub fn with_half_size(half: f32) -> Self {
        Self::new(-half, half, -half, half)
    }

    fn push_wall(&mut self, x: f32, y: f32, ccw_neib: usize, edge_id: i32) {
        self.vert.push(Vertex {
            pos: Vector2f::new(x, y),
            ccw_neib,
            edge_id,
        });
    }

    #[inline(always)]
    fn dist(&self, i: usize, line: &CuttingLine) -> f32 {
        line.pos.dot(&self.vert[i].pos) - line.r2
    }

    #[inline(always)]
    fn next(&self, i: usize) -> usize {
        self.vert[i].ccw_neib
    }

    /// Cuts the cell by the bisector of the neighbour `point`.
    /// Returns false if the cell is not changed.
    pub fn add_point(&mut self, point: &Vector2f, id: usize) -> bool {
        // Coincident point does not define a bisector
        if point.norm_squared() < TOL {
            return false;
        }

        let line = CuttingLine::new(point);

        // Find first inside vertex. The origin is always inside,
        // but the whole cell could be outside of a degenerate line.
        let mut cur_i = self.init_vert;
        let mut cur_d = self.dist(cur_i, &line);
        let mut n_visited = 0;
        while cur_d >= TOL {
            cur_i = self.next(cur_i);
            cur_d = self.dist(cur_i, &line);
            n_visited += 1;
            if n_visited > self.vert.len() {
                return false;
            }
        }

        self.init_vert = cur_i;

        // Search for first outside vertex
        let cut1 = loop {
            let next_i = self.next(cur_i);
            if next_i == self.init_vert {
                // All vertices are inside
                return false;
            }
            let next_d = self.dist(next_i, &line);
            if next_d >= TOL {
                let cut = EdgeCut {
                    in_ind: cur_i,
                    in_dist: cur_d,
                    out_ind: next_i,
                    out_dist: next_d,
                };
                cur_i = next_i;
                cur_d = next_d;
                break cut;
            }
            cur_i = next_i;
            cur_d = next_d;
        };

        // Search for the next inside vertex
        let cut2 = loop {
            let next_i = self.next(cur_i);
            let next_d = self.dist(next_i, &line);
            if next_d < TOL {
                break EdgeCut {
                    out_ind: cur_i,
                    out_dist: cur_d,
                    in_ind: next_i,
                    in_dist: next_d,
                };
            }
            cur_i = next_i;
            cur_d = next_d;
        };

        let p = self.vertex_pos_from_cut(&cut2);
        if cut1.out_ind != cut2.out_ind {
            // Outer vertex of the second cut is reused
            self.vert[cut2.out_ind].pos = p;
            self.vert[cut1.out_ind].ccw_neib = cut2.out_ind;
        } else {
            // Single outer vertex, a new one is needed
            let old_id = self.vert[cut2.out_ind].edge_id;
            self.vert.push(Vertex {
                pos: p,
                ccw_neib: cut2.in_ind,
                edge_id: old_id,
            });
            self.vert[cut1.out_ind].ccw_neib = self.vert.len() - 1;
        }

        // Outer vertex of the first cut is always reused
        self.vert[cut1.out_ind].pos = self.vertex_pos_from_cut(&cut1);
        self.vert[cut1.out_ind].edge_id = id as i32;

        true
    }

    #[inline(always)]
    fn vertex_pos_from_cut(&self, cut: &EdgeCut) -> Vector2f {
        let frac = cut.out_dist / (cut.in_dist.abs() + cut.out_dist);
        (1.0 - frac) * self.vert[cut.out_ind].pos + frac * self.vert[cut.in_ind].pos
    }

    fn iter_vertex(&self) -> VoronoiCellVertexIter<'_> {
        VoronoiCellVertexIter {
            cell: self,
            cur: self.init_vert,
            stop: false,
        }
    }

    /// Cell is closed if no wall edges remain
    pub fn is_closed(&self) -> bool {
        self.iter_vertex().all(|v| v.edge_id >= 0)
    }

    /// Polygon area by the shoelace formula
    pub fn area(&self) -> f32 {
        0.5 * self
            .iter_vertex()
            .map(|v| v.pos.perp(&self.vert[v.ccw_neib].pos))
            .sum::<f32>()
    }
}

struct VoronoiCellVertexIter<'a> {
    cell: &'a VoronoiCell,
    cur: usize,
    stop: bool,
}

impl<'a> Iterator for VoronoiCellVertexIter<'a> {
    type Item = &'a Vertex;
    fn next(&mut self) -> Option<Self::Item> {
        if self.stop {
            None
        } else {
            let ret = &self.cell.vert[self.cur];
            self.cur = ret.ccw_neib;
            if self.cur == self.cell.init_vert {
                self.stop = true;
            }
            Some(ret)
        }
    }
}
