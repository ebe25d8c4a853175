use snip_core::OwnerId;
use subtle::ConstantTimeEq;

/// Length of the random identity embedded in every token.
pub const IDENTITY_LEN: usize = 8;

const TAG_LEN: usize = blake3::OUT_LEN;
const KEY_CONTEXT: &str = "snip 2024 anonymous owner cookie v1";

/// Signs and verifies identity tokens with a server-held secret.
///
/// A token is `hex(identity || tag)` where `tag` is the keyed BLAKE3 hash of
/// the identity under a key derived from the secret.
#[derive(Clone)]
pub struct CookieSigner {
    key: [u8; 32],
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_ref()),
        }
    }

    /// Builds the token for `identity`.
    pub fn mint(&self, identity: [u8; IDENTITY_LEN]) -> String {
        let tag = self.tag(&identity);
        let mut raw = Vec::with_capacity(IDENTITY_LEN + TAG_LEN);
        raw.extend_from_slice(&identity);
        raw.extend_from_slice(&tag);
        hex::encode(raw)
    }

    /// Returns the identity carried by `token` if its tag verifies.
    ///
    /// Bad hex, a wrong length and a forged tag all yield `None`.
    pub fn verify(&self, token: &str) -> Option<[u8; IDENTITY_LEN]> {
        let raw = hex::decode(token).ok()?;
        if raw.len() != IDENTITY_LEN + TAG_LEN {
            return None;
        }

        let (identity, tag) = raw.split_at(IDENTITY_LEN);
        let expected = self.tag(identity);
        if !bool::from(expected.ct_eq(tag)) {
            return None;
        }

        identity.try_into().ok()
    }

    fn tag(&self, identity: &[u8]) -> [u8; TAG_LEN] {
        *blake3::keyed_hash(&self.key, identity).as_bytes()
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

/// Owner id embedded in an identity: its first four bytes, big-endian.
pub fn owner_of(identity: &[u8; IDENTITY_LEN]) -> OwnerId {
    OwnerId(u32::from_be_bytes([
        identity[0],
        identity[1],
        identity[2],
        identity[3],
    ]))
}
