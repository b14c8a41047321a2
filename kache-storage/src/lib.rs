//! Kache Storage - Backend Trait and Implementations
//!
//! Defines the storage abstraction that cached computations call through,
//! an in-process map backend and a persistent LMDB backend.

pub mod factory;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use factory::open_backend;
pub use lmdb_backend::{LmdbBackend, LmdbError};
pub use memory::MemoryBackend;
pub use traits::{BackendHandle, BackendKind, StorageBackend};
