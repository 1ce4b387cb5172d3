//! Rayon or sequential iteration, depending on the `parallel` feature.
//!
//! Code that sweeps grids row by row imports `crate::maybe_rayon::*` and
//! calls `into_par_iter()`. Without the feature the call falls back to
//! `into_iter()`, so `.map()` and `.sum()` resolve to `Iterator` methods.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
