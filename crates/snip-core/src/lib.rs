//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the record model, the error taxonomy, the execution
//! context, and the traits shared by the storage backends, the shortener
//! service, and the HTTP gateway.

pub mod context;
pub mod error;
pub mod generator;
pub mod record;
pub mod short_id;
pub mod shortener;
pub mod storage;

pub use context::{Canceller, Context};
pub use error::{Result, StorageError};
pub use generator::{Generator, RandomGenerator, SeqGenerator};
pub use record::{BatchEntry, BatchItem, OwnerId, ShortUrlRecord};
pub use short_id::ShortId;
pub use shortener::Shortener;
pub use storage::Storage;
