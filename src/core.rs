mod atom;
mod measure;
mod periodic_box;
mod providers;
mod state;
mod topology;

pub use {atom::*, measure::*, periodic_box::*, providers::*, state::*, topology::*};

// Aliases for vector and points
pub type Vector3f = nalgebra::Vector3<f32>;
pub type Matrix3f = nalgebra::Matrix3<f32>;
pub type Pos = nalgebra::Point3<f32>; // Atom position

// Define alias traits for iterators to make it less verbose
pub trait PosIterator<'a>: Iterator<Item = &'a Pos> {}
impl<'a, T> PosIterator<'a> for T where T: Iterator<Item = &'a Pos> {}

pub trait IdPosIterator<'a>: ExactSizeIterator<Item = (usize, &'a Pos)> {}
impl<'a, T> IdPosIterator<'a> for T where T: ExactSizeIterator<Item = (usize, &'a Pos)> {}
