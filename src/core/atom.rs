/// Information about the atom except its coordinates.
///
/// Only the fields needed to resolve lipid descriptors and
/// to weight marker centers are kept.
#[derive(Debug, Default, Clone)]
pub struct Atom {
    /// Atom name.
    pub name: String,
    /// Residue name.
    pub resname: String,
    /// Residue id (aka residue number). This could be negative!
    pub resid: i32,
    /// Residue index. Assigned by [Topology::assign_resindex](super::Topology::assign_resindex).
    /// Unique for each contigous span of resid. Starts from zero.
    pub resindex: usize,
    /// Mass in atomic units
    pub mass: f32,
}

impl Atom {
    pub fn new(name: impl Into<String>, resname: impl Into<String>, resid: i32, mass: f32) -> Self {
        Self {
            name: name.into(),
            resname: resname.into(),
            resid,
            resindex: 0,
            mass,
        }
    }
}
