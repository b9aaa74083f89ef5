//! Strongly-typed buffer handles.

use std::fmt;

/// Opaque handle identifying one registered active buffer.
///
/// Encodes a registry slot (upper 32 bits) and that slot's generation
/// (lower 32 bits). A handle whose buffer was freed keeps its old
/// generation and never resolves again, even after the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    /// Build a handle from its slot index and generation.
    pub fn new(slot: u32, generation: u32) -> Self {
        Self(((slot as u64) << 32) | generation as u64)
    }

    /// Reconstruct a handle from its raw 64-bit encoding.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit encoding.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Registry slot index.
    pub fn slot(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}.{}", self.slot(), self.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_and_generation_round_trip() {
        let id = BufferId::new(7, 3);
        assert_eq!(id.slot(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(BufferId::from_raw(id.as_raw()), id);
    }

    #[test]
    fn display_names_slot_and_generation() {
        assert_eq!(BufferId::new(2, 9).to_string(), "buf2.9");
    }

    #[test]
    fn extreme_values_do_not_collide() {
        let a = BufferId::new(u32::MAX, 0);
        let b = BufferId::new(0, u32::MAX);
        assert_ne!(a, b);
        assert_eq!(a.slot(), u32::MAX);
        assert_eq!(b.generation(), u32::MAX);
    }
}
