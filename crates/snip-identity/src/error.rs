use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

/// Failures that prevent the provider from producing any identity.
///
/// An invalid or missing token is not an error: the provider issues a new
/// identity instead.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to draw a random identity: {0}")]
    Entropy(String),
}
