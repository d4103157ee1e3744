//! Dirty bits and property-change results.

use bitflags::bitflags;

bitflags! {
    /// Categories of per-frame data that need recomputing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u32 {
        const TRANSFORM = 1 << 0;
        const VISIBILITY = 1 << 1;
        const PRIMVAR = 1 << 2;
        const INSTANCE_INDEX = 1 << 3;
        const POINTS = 1 << 4;
        const TOPOLOGY = 1 << 5;
        const EXTENT = 1 << 6;
        const MATERIAL_ID = 1 << 7;
        const DOUBLE_SIDED = 1 << 8;
    }
}

impl DirtyBits {
    /// Everything, used for freshly inserted prims.
    pub const ALL_DIRTY: DirtyBits = DirtyBits::all();

    /// The bits an instancer marks on itself after population.
    pub const INSTANCER_INITIAL: DirtyBits = DirtyBits::TRANSFORM
        .union(DirtyBits::PRIMVAR)
        .union(DirtyBits::INSTANCE_INDEX);
}

/// What a single authored property change means for a prim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    /// Nothing imaging cares about changed
    Clean,
    /// Recompute the given categories
    Dirty(DirtyBits),
    /// Structure changed; remove and repopulate
    Resync,
}

impl PropertyChange {
    pub fn is_resync(&self) -> bool {
        matches!(self, PropertyChange::Resync)
    }

    pub fn dirty_bits(&self) -> DirtyBits {
        match self {
            PropertyChange::Clean => DirtyBits::empty(),
            PropertyChange::Dirty(bits) => *bits,
            PropertyChange::Resync => DirtyBits::ALL_DIRTY,
        }
    }
}

impl From<DirtyBits> for PropertyChange {
    fn from(bits: DirtyBits) -> Self {
        if bits.is_empty() {
            PropertyChange::Clean
        } else {
            PropertyChange::Dirty(bits)
        }
    }
}
