use super::{Atom, LenProvider};

/// Atoms of the molecular system.
///
/// [Topology] is normally produced by the structure readers of the
/// trajectory subsystem. Here it only serves as the source of atom names,
/// residues and masses for [TopologySelector](crate::selection::TopologySelector).
#[derive(Debug, Default, Clone)]
pub struct Topology {
    atoms: Vec<Atom>,
}

impl Topology {
    pub fn new(atoms: Vec<Atom>) -> Self {
        let mut top = Self { atoms };
        top.assign_resindex();
        top
    }

    pub fn assign_resindex(&mut self) {
        let Some(first) = self.atoms.first() else {
            return;
        };
        let mut resindex = 0usize;
        let mut cur_resid = first.resid;
        for at in self.atoms.iter_mut() {
            if at.resid != cur_resid {
                cur_resid = at.resid;
                resindex += 1;
            }
            at.resindex = resindex;
        }
    }

    pub fn get_atom(&self, i: usize) -> Option<&Atom> {
        self.atoms.get(i)
    }
}

impl LenProvider for Topology {
    fn len(&self) -> usize {
        self.atoms.len()
    }
}
