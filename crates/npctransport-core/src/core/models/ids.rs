use serde::Serialize;
use slotmap::new_key_type;

new_key_type! {
    pub struct BodyId;
    pub struct ChainId;
}

/// Interned identifier of a body type (e.g. an FG repeat, a karyopherin, an inert).
///
/// Types are interned by [`BodySystem::intern_type`](super::system::BodySystem::intern_type)
/// and compared by value, so type-pair lookups are plain integer-pair hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BodyTypeId(pub(crate) u32);

impl BodyTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
