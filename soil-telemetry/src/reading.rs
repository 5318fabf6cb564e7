//! Latest-reading cell shared between the sampler and the reporter.

use core::sync::atomic::{AtomicU32, Ordering};

/// Most recent moisture percentage.
///
/// Single writer (the sampler task), single reader (the reporter task).
/// The value is stored as raw `f32` bits in a word-sized atomic, so the
/// reader may observe a value up to one sampling interval old but never a
/// torn one. Most-recent-wins; no history is kept.
pub struct MoistureCell(AtomicU32);

impl MoistureCell {
    pub const fn new() -> Self {
        MoistureCell(AtomicU32::new(0))
    }

    pub fn store(&self, percent: f32) {
        self.0.store(percent.to_bits(), Ordering::SeqCst);
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::SeqCst))
    }
}

impl Default for MoistureCell {
    fn default() -> Self {
        MoistureCell::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(MoistureCell::new().load(), 0.0);
    }

    #[test]
    fn last_store_wins() {
        let cell = MoistureCell::new();
        cell.store(42.5);
        cell.store(17.25);
        assert_eq!(cell.load(), 17.25);
    }
}
