//! Digest and signature primitives.
//!
//! Thin wrappers so the rest of the library never touches the backing
//! crates directly. Publishers are identified by the SHA-256 digest of
//! their 32-byte public key encoding; content objects carry a 64-byte
//! signature over the name, signed info and payload.

use crate::{WireError, WireResult};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

pub use ed25519_dalek::SigningKey;

pub const DIGEST_SIZE: usize = 32;
pub const KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[inline]
pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
    Sha256::digest(data).into()
}

/// A parsed publisher public key.
#[derive(Clone)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse a key from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> WireResult<PublicKey> {
        if bytes.len() != KEY_SIZE {
            return Err(WireError::BadKey);
        }
        let mut raw = [0u8; KEY_SIZE];
        raw.copy_from_slice(bytes);
        let inner = VerifyingKey::from_bytes(&raw).map_err(|_| WireError::BadKey)?;
        Ok(PublicKey { inner })
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// The digest a publisher is known by.
    #[inline]
    pub fn digest(&self) -> [u8; DIGEST_SIZE] {
        sha256(&self.to_bytes())
    }

    /// Check `sig` over `data`. Malformed signatures simply fail.
    pub fn verify(&self, data: &[u8], sig: &[u8]) -> bool {
        if sig.len() != SIGNATURE_SIZE {
            return false;
        }
        let mut raw = [0u8; SIGNATURE_SIZE];
        raw.copy_from_slice(sig);
        let sig = Signature::from_bytes(&raw);
        self.inner.verify(data, &sig).is_ok()
    }
}

/// Deterministic signing key from seed bytes.
#[inline]
pub fn signing_key_from_seed(seed: &[u8; KEY_SIZE]) -> SigningKey {
    SigningKey::from_bytes(seed)
}

/// The public half of a signing key.
#[inline]
pub fn public_key_of(signer: &SigningKey) -> PublicKey {
    PublicKey { inner: signer.verifying_key() }
}

/// Sign `data`, returning the raw signature bytes.
#[inline]
pub fn sign(signer: &SigningKey, data: &[u8]) -> [u8; SIGNATURE_SIZE] {
    signer.sign(data).to_bytes()
}
