//! Map/set selection for the reconciler internals.
//!
//! The `std-hash` feature swaps `hashbrown` for the standard library
//! collections; the default build uses `hashbrown` throughout.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};
}
