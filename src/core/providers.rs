use super::{PeriodicBox, PosIterator};

pub trait LenProvider {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait PosIterProvider {
    fn iter_pos(&self) -> impl PosIterator<'_>;
}

pub trait MassesProvider {
    fn iter_masses(&self) -> impl ExactSizeIterator<Item = f32>;
}

pub trait BoxProvider {
    fn get_box(&self) -> Option<&PeriodicBox>;
}
