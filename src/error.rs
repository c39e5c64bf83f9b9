use thiserror::Error;

/// Reasons the arena manager could not hand out a new [`crate::arena::Arena`].
///
/// None of these cross the public boundary: the allocator logs them and
/// reports the failed request as `None`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArenaError {
    #[error("arena of {requested} bytes cannot hold its {minimum} bytes of metadata")]
    TooSmall { requested: usize, minimum: usize },

    #[error("arena size for a request of {requested} bytes overflows")]
    Overflow { requested: usize },

    #[error("the kernel refused to map {len} bytes")]
    MapFailed { len: usize },
}
