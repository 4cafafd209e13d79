//! Synchronous lock primitives backed by parking_lot.
//!
//! These are used for short, non-async critical sections (registries, port
//! bindings). Never hold one of these guards across an `.await`.

/// A mutual exclusion primitive useful for protecting shared data.
pub type Mutex<T> = parking_lot::Mutex<T>;

pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

/// A reader-writer lock, allowing multiple readers or a single writer at any point in time.
pub type RwLock<T> = parking_lot::RwLock<T>;

pub type RwLockReadGuard<'a, T> = parking_lot::RwLockReadGuard<'a, T>;

pub type RwLockWriteGuard<'a, T> = parking_lot::RwLockWriteGuard<'a, T>;
