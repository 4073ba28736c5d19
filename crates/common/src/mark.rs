use std::sync::atomic::{AtomicU32, Ordering};

/// A query generation token.
///
/// Every independent top-level query (one sweep, one visibility pass) takes a
/// fresh generation. Elements stamped with it are skipped if reached again
/// through another cell or tree branch during that query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u32);

impl Generation {
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Source of generation tokens. Never hands out zero, which is the value
/// fresh [`Mark`]s start with.
#[derive(Debug)]
pub struct GenerationCounter {
    next: AtomicU32,
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Take the next generation.
    pub fn advance(&self) -> Generation {
        loop {
            let g = self.next.fetch_add(1, Ordering::Relaxed);
            if g != 0 {
                return Generation(g);
            }
        }
    }
}

/// Per-element visited stamp.
#[derive(Debug, Default)]
pub struct Mark(AtomicU32);

impl Mark {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Stamp with `generation`. Returns true if it already carried it.
    pub fn stamp(&self, generation: Generation) -> bool {
        self.0.swap(generation.0, Ordering::Relaxed) == generation.0
    }

    pub fn is_stamped(&self, generation: Generation) -> bool {
        self.0.load(Ordering::Relaxed) == generation.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_increase() {
        let counter = GenerationCounter::new();
        let a = counter.advance();
        let b = counter.advance();
        assert!(b.value() > a.value());
    }

    #[test]
    fn stamp_reports_repeat_only_within_generation() {
        let counter = GenerationCounter::new();
        let mark = Mark::new();
        let g1 = counter.advance();
        assert!(!mark.stamp(g1));
        assert!(mark.stamp(g1));
        assert!(mark.is_stamped(g1));

        let g2 = counter.advance();
        assert!(!mark.is_stamped(g2));
        assert!(!mark.stamp(g2));
    }

    #[test]
    fn counter_skips_zero_on_wrap() {
        let counter = GenerationCounter {
            next: AtomicU32::new(u32::MAX),
        };
        assert_eq!(counter.advance().value(), u32::MAX);
        assert_eq!(counter.advance().value(), 1);
    }
}
