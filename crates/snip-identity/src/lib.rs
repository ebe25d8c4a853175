//! Anonymous, cookie-based caller identity.
//!
//! A caller is identified by a signed token the server hands out on first
//! contact. The token carries a random 8-byte identity followed by a keyed
//! BLAKE3 tag; the owner id used to partition storage is derived from the
//! identity bytes.

pub mod error;
pub mod provider;
pub mod signer;

pub use error::{IdentityError, Result};
pub use provider::{EntropySource, Identified, IdentityProvider, OsEntropy};
pub use signer::{CookieSigner, IDENTITY_LEN};
