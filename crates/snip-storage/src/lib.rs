//! Storage backends for the snip URL shortener.
//!
//! Every backend implements [`snip_core::Storage`] with identical semantics:
//!
//! - [`InMemoryStorage`]: a mutex-guarded map, lost on restart.
//! - [`FileStorage`]: an append-only newline-delimited JSON log.
//! - [`PostgresStorage`]: a relational table with constraint-backed uniqueness.

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use snip_core::{Storage, StorageError};
