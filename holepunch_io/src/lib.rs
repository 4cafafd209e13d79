//! Runtime plumbing shared by the holepunch crates.
//!
//! Every crate in the workspace reaches tokio through this crate so that the
//! runtime version and feature set are decided in one place.

pub mod locks;
pub mod spawn;

pub use locks::*;
pub use spawn::*;

#[cfg(feature = "deadlock-detection")]
pub use parking_lot::deadlock;

pub use parking_lot::{const_mutex, const_rwlock};

pub use tokio;
pub use tokio_util;
