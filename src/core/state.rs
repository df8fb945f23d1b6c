use super::*;

/// State of molecular system: coordinates, time stamp
/// and [periodic box](super::PeriodicBox).
///
/// [State] is the coordinate buffer of a single frame. It is produced by the
/// trajectory readers and is passed mutably to
/// [Membrane::compute_properties](crate::membrane::Membrane::compute_properties),
/// which writes lipid markers into it only for the duration of a
/// [MarkerScope](crate::lipid::MarkerScope).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct State {
    pub coords: Vec<Pos>,
    pub time: f32,
    pub pbox: Option<PeriodicBox>,
}

impl State {
    pub fn new(coords: Vec<Pos>, pbox: Option<PeriodicBox>) -> Self {
        Self {
            coords,
            time: 0.0,
            pbox,
        }
    }

    pub fn with_time(mut self, t: f32) -> Self {
        self.time = t;
        self
    }
}

impl LenProvider for State {
    fn len(&self) -> usize {
        self.coords.len()
    }
}

impl PosIterProvider for State {
    fn iter_pos(&self) -> impl PosIterator<'_> {
        self.coords.iter()
    }
}

impl BoxProvider for State {
    fn get_box(&self) -> Option<&PeriodicBox> {
        self.pbox.as_ref()
    }
}
