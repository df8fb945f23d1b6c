use crate::core::{IdPosIterator, PbcDims, PeriodicBox, Pos, Vector3f, PBC_FULL, PBC_NONE};
use num_traits::clamp_min;
use rayon::prelude::*;

/// Below this number of points the exhaustive search is used
pub const BRUTE_FORCE_LIMIT: usize = 64;

pub trait SearchOutputType {
    fn from_ijd(i: usize, j: usize, d: f32) -> Self;
}

impl SearchOutputType for (usize, usize) {
    fn from_ijd(i: usize, j: usize, _d: f32) -> Self {
        (i, j)
    }
}

impl SearchOutputType for (usize, usize, f32) {
    fn from_ijd(i: usize, j: usize, d: f32) -> Self {
        (i, j, d)
    }
}

//--------------------------------------------------------------------------------

// Cell location in the grid
type CellLoc = [usize; 3];

struct Grid {
    cells: ndarray::Array3<Vec<(usize, Pos)>>,
}

static MASK: [([usize; 3], [usize; 3]); 14] = [
    // Center
    ([0, 0, 0], [0, 0, 0]),
    // Edges
    ([0, 0, 0], [1, 0, 0]), //X
    ([0, 0, 0], [0, 1, 0]), //Y
    ([0, 0, 0], [0, 0, 1]), //Z
    // Face angles
    ([0, 0, 0], [1, 1, 0]), //XY
    ([0, 0, 0], [1, 0, 1]), //XZ
    ([0, 0, 0], [0, 1, 1]), //YZ
    // Far angls
    ([0, 0, 0], [1, 1, 1]), //XYZ
    // Face-diagonals
    ([1, 0, 0], [0, 1, 0]), // XY
    ([1, 0, 0], [0, 0, 1]), // XZ
    ([0, 1, 0], [0, 0, 1]), // YZ
    // Cross-diagonals
    ([1, 1, 0], [0, 0, 1]), // XY-Z
    ([1, 0, 1], [0, 1, 0]), // XZ-Y
    ([0, 1, 1], [1, 0, 0]), // YZ-X
];

impl Grid {
    fn new_with_dims(dims: [usize; 3]) -> Self {
        Self {
            cells: ndarray::Array3::from_shape_simple_fn(dims, Vec::new),
        }
    }

    fn from_cutoff_and_extents(cutoff: f32, extents: &Vector3f) -> Self {
        let mut sz = [0, 0, 0];
        // Cell size should be >= cutoff for all dimentions
        for d in 0..3 {
            sz[d] = clamp_min((extents[d] / cutoff).floor() as usize, 1);
        }
        Self::new_with_dims(sz)
    }

    fn get_dims(&self) -> [usize; 3] {
        let (x, y, z) = self.cells.dim();
        [x, y, z]
    }

    fn populate<'a>(&mut self, data: impl IdPosIterator<'a>, lower: &Vector3f, upper: &Vector3f) {
        let dims = self.get_dims();
        let dim_sz = upper - lower;
        for (id, pos) in data {
            let mut loc = [0usize, 0, 0];
            for d in 0..3 {
                let n = (dims[d] as f32 * (pos[d] - lower[d]) / dim_sz[d]).floor() as isize;
                loc[d] = n.clamp(0, dims[d] as isize - 1) as usize;
            }
            self.cells[loc].push((id, *pos));
        }
    }

    fn populate_pbc<'a>(
        &mut self,
        data: impl IdPosIterator<'a>,
        pbox: &PeriodicBox,
        pbc_dims: PbcDims,
    ) {
        let dims = self.get_dims();
        'outer: for (id, pos) in data {
            // Relative coordinates
            let mut rel = pbox.to_box_coords(&pos.coords);
            let mut loc = [0usize, 0, 0];
            for d in 0..3 {
                if pbc_dims.get_dim(d) {
                    rel[d] = rel[d].rem_euclid(1.0);
                } else if rel[d] < 0.0 || rel[d] >= 1.0 {
                    // Points outside non-periodic dimensions are ignored
                    continue 'outer;
                }
                // Accounts for float point errors when loc[d] could be 1.00001
                loc[d] = ((rel[d] * dims[d] as f32).floor() as usize).clamp(0, dims[d] - 1);
            }
            self.cells[loc].push((id, Pos::from(pbox.to_lab_coords(&rel))));
        }
    }
}

fn search_plan(grid: &Grid, pbc_dims: PbcDims) -> Vec<(CellLoc, CellLoc, PbcDims)> {
    let dims = grid.get_dims();
    let mut plan = Vec::with_capacity(14 * dims[0] * dims[1] * dims[2]);
    // Cycle over whole grid
    for x in 0..dims[0] {
        for y in 0..dims[1] {
            for z in 0..dims[2] {
                // go over possible pairs
                'mask: for (v1, v2) in MASK {
                    let mut c = [
                        [x + v1[0], y + v1[1], z + v1[2]],
                        [x + v2[0], y + v2[1], z + v2[2]],
                    ];
                    // we only go to the right, so need to check the right edge
                    let mut wrapped = PBC_NONE;
                    for cell in c.iter_mut() {
                        for d in 0..3 {
                            if cell[d] == dims[d] {
                                if pbc_dims.get_dim(d) {
                                    cell[d] = 0;
                                    wrapped.set_dim(d, true);
                                } else {
                                    // Drop cell pair for non-periodic dimension
                                    continue 'mask;
                                }
                            }
                        }
                    }
                    if !grid.cells[c[0]].is_empty() && !grid.cells[c[1]].is_empty() {
                        plan.push((c[0], c[1], wrapped));
                    }
                }
            }
        }
    }
    plan
}

fn search_cell_pair<T: SearchOutputType>(
    cutoff2: f32,
    grid: &Grid,
    pair: (CellLoc, CellLoc, PbcDims),
    pbox: Option<&PeriodicBox>,
) -> Vec<T> {
    let mut found = Vec::<T>::new();

    let dist2 = |p1: &Pos, p2: &Pos| match pbox {
        Some(b) if pair.2.any() => b.distance_squared(p1, p2, pair.2),
        _ => (p2 - p1).norm_squared(),
    };

    let cell1 = &grid.cells[pair.0];
    if pair.0 == pair.1 {
        for i in 0..cell1.len() {
            let (ind1, pos1) = &cell1[i];
            for (ind2, pos2) in &cell1[i + 1..] {
                let d2 = dist2(pos1, pos2);
                if d2 <= cutoff2 {
                    found.push(T::from_ijd(*ind1, *ind2, d2.sqrt()));
                }
            }
        }
    } else {
        let cell2 = &grid.cells[pair.1];
        for (ind1, pos1) in cell1 {
            for (ind2, pos2) in cell2 {
                let d2 = dist2(pos1, pos2);
                if d2 <= cutoff2 {
                    found.push(T::from_ijd(*ind1, *ind2, d2.sqrt()));
                }
            }
        }
    }
    found
}

//-------------------------------------------------------------------------

fn compute_bounding_box<'a>(cutoff: f32, data: impl Iterator<Item = &'a Pos>) -> (Vector3f, Vector3f) {
    let mut lower = Vector3f::repeat(f32::MAX);
    let mut upper = Vector3f::repeat(f32::MIN);
    for p in data {
        for d in 0..3 {
            lower[d] = lower[d].min(p[d]);
            upper[d] = upper[d].max(p[d]);
        }
    }
    lower.add_scalar_mut(-cutoff - f32::EPSILON);
    upper.add_scalar_mut(cutoff + f32::EPSILON);
    (lower, upper)
}

/// Grid search of all pairs within cutoff in non-periodic system
pub fn distance_search_single<T, C>(cutoff: f32, data: &[(usize, Pos)]) -> C
where
    T: SearchOutputType + Send + Sync,
    C: FromIterator<T> + FromParallelIterator<T>,
{
    if data.is_empty() {
        return C::from_iter(std::iter::empty());
    }
    let (lower, upper) = compute_bounding_box(cutoff, data.iter().map(|(_, p)| p));

    let mut grid = Grid::from_cutoff_and_extents(cutoff, &(upper - lower));
    grid.populate(data.iter().map(|(i, p)| (*i, p)), &lower, &upper);

    let plan = search_plan(&grid, PBC_NONE);

    // Cycle over search plan and perform search for each cell pair
    plan.into_par_iter()
        .with_min_len(3)
        .map(|pair| search_cell_pair(cutoff * cutoff, &grid, pair, None))
        .flatten()
        .collect()
}

/// Grid search of all pairs within cutoff in periodic system.
///
/// Each periodic dimension has to accomodate at least 3 grid cells and the
/// box has to be rectangular, see [can_use_grid_pbc].
pub fn distance_search_single_pbc<T, C>(
    cutoff: f32,
    data: &[(usize, Pos)],
    pbox: &PeriodicBox,
    pbc_dims: PbcDims,
) -> C
where
    T: SearchOutputType + Send + Sync,
    C: FromIterator<T> + FromParallelIterator<T>,
{
    let mut grid = Grid::from_cutoff_and_extents(cutoff, &pbox.get_box_extents());
    grid.populate_pbc(data.iter().map(|(i, p)| (*i, p)), pbox, pbc_dims);

    let plan = search_plan(&grid, pbc_dims);

    plan.into_par_iter()
        .with_min_len(3)
        .map(|pair| search_cell_pair(cutoff * cutoff, &grid, pair, Some(pbox)))
        .flatten()
        .collect()
}

/// Whether the cell grid gives exact results for this box and cutoff
pub fn can_use_grid_pbc(cutoff: f32, pbox: &PeriodicBox, pbc_dims: PbcDims) -> bool {
    if pbox.is_triclinic() {
        return false;
    }
    let ext = pbox.get_box_extents();
    (0..3).all(|d| !pbc_dims.get_dim(d) || (ext[d] / cutoff).floor() >= 3.0)
}

/// Exhaustive reference search
pub fn distance_search_single_brute<T, C>(
    cutoff: f32,
    data: &[(usize, Pos)],
    pbox: Option<&PeriodicBox>,
    pbc_dims: PbcDims,
) -> C
where
    T: SearchOutputType,
    C: FromIterator<T>,
{
    let cutoff2 = cutoff * cutoff;
    let mut found = vec![];
    for (k, (ind1, pos1)) in data.iter().enumerate() {
        for (ind2, pos2) in &data[k + 1..] {
            let d2 = match pbox {
                Some(b) => b.distance_squared(pos1, pos2, pbc_dims),
                None => (pos2 - pos1).norm_squared(),
            };
            if d2 <= cutoff2 {
                found.push(T::from_ijd(*ind1, *ind2, d2.sqrt()));
            }
        }
    }
    found.into_iter().collect()
}

/// Finds all unique pairs of points closer than `cutoff`.
///
/// Pairs are returned as `(i,j)` with `i<j` in lexicographic order,
/// so the result does not depend on the search strategy.
/// Periodic box, if present, is applied in all three dimensions.
pub fn search_pairs(cutoff: f32, data: &[(usize, Pos)], pbox: Option<&PeriodicBox>) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(usize, usize)> = match pbox {
        Some(b) if data.len() >= BRUTE_FORCE_LIMIT && can_use_grid_pbc(cutoff, b, PBC_FULL) => {
            distance_search_single_pbc::<(usize, usize), _>(cutoff, data, b, PBC_FULL)
        }
        None if data.len() >= BRUTE_FORCE_LIMIT => {
            distance_search_single::<(usize, usize), _>(cutoff, data)
        }
        _ => distance_search_single_brute::<(usize, usize), _>(cutoff, data, pbox, PBC_FULL),
    };

    for p in pairs.iter_mut() {
        if p.0 > p.1 {
            *p = (p.1, p.0);
        }
    }
    pairs.retain(|p| p.0 != p.1);
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

//-------------------------------------------------------------------------
