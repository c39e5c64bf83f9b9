/// Granularity of the arenas requested from the kernel by default (128 KiB).
pub const ARENA_UNIT: usize = 128 * 1024;

/// Tunables of the allocator.
///
/// Kept as a plain `const`-constructible struct so an allocator can be
/// configured inside a `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Every arena is a multiple of this many bytes, and at least one unit.
    /// It is rounded up to a multiple of the page size before use.
    pub arena_unit: usize,
}

impl Config {
    pub const DEFAULT: Self = Self { arena_unit: ARENA_UNIT };

    pub const fn with_arena_unit(self, arena_unit: usize) -> Self {
        Self { arena_unit }
    }

    /// The arena unit actually used: `arena_unit` rounded up to a multiple
    /// of `page_size`, never smaller than one page.
    pub(crate) fn effective_unit(&self, page_size: usize) -> usize {
        self.arena_unit
            .max(1)
            .checked_next_multiple_of(page_size)
            .unwrap_or(page_size)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_unit_is_128_kib() {
        assert_eq!(Config::default().arena_unit, 128 * 1024);
        assert_eq!(Config::default(), Config::DEFAULT);
    }

    #[test]
    fn unit_is_rounded_to_pages() {
        let config = Config::DEFAULT.with_arena_unit(5000);
        assert_eq!(config.effective_unit(4096), 8192);

        let config = Config::DEFAULT.with_arena_unit(0);
        assert_eq!(config.effective_unit(4096), 4096);

        assert_eq!(Config::DEFAULT.effective_unit(4096), ARENA_UNIT);
    }
}
