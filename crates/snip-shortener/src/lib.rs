//! URL shortening service.
//!
//! [`ShortenerService`] sits between the HTTP layer and a
//! [`Storage`](snip_core::Storage) backend and turns losing a uniqueness race
//! into the id of the record that won it.

pub mod service;

pub use service::ShortenerService;
