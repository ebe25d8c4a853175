use crate::error::{IdentityError, Result};
use crate::signer::{owner_of, CookieSigner, IDENTITY_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use snip_core::OwnerId;
use tracing::debug;

/// Source of the random bytes behind a new identity.
pub trait EntropySource: Send + Sync + 'static {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error>;
}

/// The operating system's random number generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

/// Outcome of identifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identified {
    /// The caller presented a valid token.
    Returning(OwnerId),
    /// The caller had no valid token; `token` must be handed back to them.
    Issued { owner: OwnerId, token: String },
}

impl Identified {
    pub fn owner(&self) -> OwnerId {
        match self {
            Identified::Returning(owner) => *owner,
            Identified::Issued { owner, .. } => *owner,
        }
    }

    /// The token to send back, present only when a new identity was minted.
    pub fn issued_token(&self) -> Option<&str> {
        match self {
            Identified::Returning(_) => None,
            Identified::Issued { token, .. } => Some(token),
        }
    }
}

/// Resolves the owner of a request from its identity token.
#[derive(Debug, Clone)]
pub struct IdentityProvider<E = OsEntropy> {
    signer: CookieSigner,
    entropy: E,
}

impl IdentityProvider<OsEntropy> {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self::with_entropy(CookieSigner::new(secret), OsEntropy)
    }
}

impl<E: EntropySource> IdentityProvider<E> {
    pub fn with_entropy(signer: CookieSigner, entropy: E) -> Self {
        Self { signer, entropy }
    }

    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    /// Identifies a request carrying `token`, if any.
    ///
    /// A missing, malformed or forged token leads to a freshly issued
    /// identity. Only a failure to produce randomness is an error.
    pub fn identify(&self, token: Option<&str>) -> Result<Identified> {
        if let Some(identity) = token.and_then(|token| self.signer.verify(token)) {
            return Ok(Identified::Returning(owner_of(&identity)));
        }
        if token.is_some() {
            debug!("rejected identity token, issuing a new one");
        }
        self.issue()
    }

    /// Mints a brand-new identity.
    pub fn issue(&self) -> Result<Identified> {
        let mut identity = [0u8; IDENTITY_LEN];
        self.entropy
            .fill(&mut identity)
            .map_err(|e| IdentityError::Entropy(e.to_string()))?;

        Ok(Identified::Issued {
            owner: owner_of(&identity),
            token: self.signer.mint(identity),
        })
    }
}
