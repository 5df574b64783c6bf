
use crate::{pyramid::FramePyramid, weighted::WeightParams};

/// Reference picture list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefList {
    L0 = 0,
    L1 = 1,
}

impl RefList {
    pub const ALL: [Self; 2] = [Self::L0, Self::L1];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One reference picture available to the current frame.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceDescriptor<'a, T> {
    pub poc: i32,
    pub list: RefList,
    /// Position inside `list`
    pub list_idx: u8,
    pub weight: WeightParams,
    pub pyramid: &'a FramePyramid<T>,
}

/// Number of references `refs` holds in `list`.
#[must_use]
pub fn count_in_list<T>(refs: &[ReferenceDescriptor<'_, T>], list: RefList) -> usize {
    refs.iter().filter(|r| r.list == list).count()
}

/// The reference at position `idx` of `list`.
#[must_use]
pub fn find_ref<'r, 'a, T>(
    refs: &'r [ReferenceDescriptor<'a, T>],
    list: RefList,
    idx: usize,
) -> Option<&'r ReferenceDescriptor<'a, T>> {
    refs.iter()
        .find(|r| r.list == list && usize::from(r.list_idx) == idx)
}
