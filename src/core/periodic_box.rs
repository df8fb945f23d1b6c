use super::{Matrix3f, Pos, Vector3f};
use nalgebra::Const;
use thiserror::Error;

/// Triclinic periodic box. Columns of the matrix are the box vectors.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeriodicBox {
    matrix: Matrix3f,
    inv: Matrix3f,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PbcDims(u8);

impl PbcDims {
    pub fn set_dim(&mut self, n: usize, val: bool) {
        if n > 2 {
            panic!("pbc has only 3 dimentions")
        }
        if val {
            self.0 |= 1 << n;
        } else {
            self.0 &= !(1 << n);
        }
    }

    pub fn get_dim(&self, n: usize) -> bool {
        if n > 2 {
            panic!("pbc has only 3 dimentions")
        }
        (self.0 & (1 << n)) != 0
    }

    pub fn any(&self) -> bool {
        self.0 & 0b0000_0111 != 0
    }
}

pub const PBC_FULL: PbcDims = PbcDims(0b0000_0111);
pub const PBC_NONE: PbcDims = PbcDims(0b0000_0000);

#[derive(Error, Debug)]
pub enum PeriodicBoxError {
    #[error("zero length box vector")]
    ZeroLengthVector,

    #[error("inverse failed")]
    InverseFailed,
}

impl PeriodicBox {
    pub fn from_matrix<S>(
        matrix: nalgebra::Matrix<f32, Const<3>, Const<3>, S>,
    ) -> Result<Self, PeriodicBoxError>
    where
        S: nalgebra::storage::Storage<f32, Const<3>, Const<3>>,
    {
        // Sanity check
        for col in matrix.column_iter() {
            if col.norm() == 0.0 {
                Err(PeriodicBoxError::ZeroLengthVector)?
            }
        }

        Ok(Self {
            matrix: matrix.clone_owned(),
            inv: matrix
                .try_inverse()
                .ok_or_else(|| PeriodicBoxError::InverseFailed)?,
        })
    }

    /// Rectangular box with given extents
    pub fn from_extents(a: f32, b: f32, c: f32) -> Result<Self, PeriodicBoxError> {
        Self::from_matrix(Matrix3f::from_diagonal(&Vector3f::new(a, b, c)))
    }

    /// Minimum image of the vector
    #[inline(always)]
    pub fn shortest_vector<S>(&self, vec: &nalgebra::Vector<f32, Const<3>, S>) -> Vector3f
    where
        S: nalgebra::storage::Storage<f32, Const<3>>,
    {
        // Get vector in box fractional coordinates
        let mut box_vec = self.inv * vec;
        box_vec.apply(|v| {
            *v -= v.round();
        });
        self.matrix * box_vec
    }

    #[inline(always)]
    pub fn shortest_vector_dims<S>(
        &self,
        vec: &nalgebra::Vector<f32, Const<3>, S>,
        pbc_dims: PbcDims,
    ) -> Vector3f
    where
        S: nalgebra::storage::Storage<f32, Const<3>>,
    {
        let mut box_vec = self.inv * vec;
        for i in 0..3 {
            if pbc_dims.get_dim(i) {
                box_vec[i] -= box_vec[i].round();
            }
        }
        self.matrix * box_vec
    }

    /// Image of `point` closest to `target`
    #[inline(always)]
    pub fn closest_image(&self, point: &Pos, target: &Pos) -> Pos {
        target + self.shortest_vector(&(point - target))
    }

    #[inline(always)]
    pub fn to_box_coords<S>(&self, vec: &nalgebra::Vector<f32, Const<3>, S>) -> Vector3f
    where
        S: nalgebra::storage::Storage<f32, Const<3>>,
    {
        self.inv * vec
    }

    #[inline(always)]
    pub fn to_lab_coords<S>(&self, vec: &nalgebra::Vector<f32, Const<3>, S>) -> Vector3f
    where
        S: nalgebra::storage::Storage<f32, Const<3>>,
    {
        self.matrix * vec
    }

    #[inline(always)]
    pub fn get_box_extents(&self) -> Vector3f {
        Vector3f::from_iterator(self.matrix.column_iter().map(|c| c.norm()))
    }

    #[inline(always)]
    pub fn distance_squared(&self, p1: &Pos, p2: &Pos, pbc_dims: PbcDims) -> f32 {
        self.shortest_vector_dims(&(p2 - p1), pbc_dims).norm_squared()
    }

    pub fn is_triclinic(&self) -> bool {
        self.matrix[(0, 1)] != 0.0
            || self.matrix[(0, 2)] != 0.0
            || self.matrix[(1, 0)] != 0.0
            || self.matrix[(1, 2)] != 0.0
            || self.matrix[(2, 0)] != 0.0
            || self.matrix[(2, 1)] != 0.0
    }
}

/// Minimum image displacement if the box is present, plain difference otherwise.
#[inline(always)]
pub fn pbc_shortest_vector(pbox: Option<&PeriodicBox>, vec: &Vector3f) -> Vector3f {
    match pbox {
        Some(b) => b.shortest_vector(vec),
        None => *vec,
    }
}
