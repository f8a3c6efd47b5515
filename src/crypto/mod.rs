//! Authenticated encryption primitives using AES-256-GCM
//!
//! This module provides the low-level encrypt/decrypt/checksum operations
//! the rest of the core builds on. Values are encrypted with AES-256-GCM
//! under a key derived from the caller-supplied master key by SHA-256, and
//! serialized into an opaque token:
//!
//! ```text
//! base64( nonce[12] || tag[16] || ciphertext[n] )
//! ```
//!
//! The token format is stable: tokens written by any prior version decrypt
//! under the same master key. A failed tag check or a malformed token
//! surfaces as an integrity error, never as garbage plaintext.

use crate::errors::{Result, StrongroomError};
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

/// Size of AES-256-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of AES-256 keys in bytes
pub const KEY_SIZE: usize = 32;

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Derive a 256-bit AES key from an arbitrary master key string.
///
/// The derivation is the SHA-256 digest of the UTF-8 bytes, so the same
/// master key always yields the same cipher key.
pub fn derive_key(master_key: &str) -> [u8; KEY_SIZE] {
    let digest = digest::digest(&digest::SHA256, master_key.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(digest.as_ref());
    key
}

/// Generate a random 96-bit nonce.
pub(crate) fn random_nonce() -> Result<[u8; NONCE_SIZE]> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    SystemRandom::new().fill(&mut nonce_bytes).map_err(|_| {
        StrongroomError::internal("Failed to generate random nonce for encryption")
    })?;
    Ok(nonce_bytes)
}

/// Encrypt plaintext under a raw 32-byte key with a fresh random nonce.
///
/// Returns the ciphertext with the 16-byte authentication tag appended,
/// plus the nonce used.
pub(crate) fn seal_bytes(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let nonce_bytes = random_nonce()?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| StrongroomError::internal("Failed to create encryption key"))?;
    let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut ciphertext = plaintext.to_vec();
    ciphertext.reserve(TAG_SIZE);
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut ciphertext)
        .map_err(|_| StrongroomError::internal("Failed to encrypt secret value"))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypt ciphertext (with appended tag) under a raw 32-byte key.
///
/// Fails with an integrity error if the tag check fails.
pub(crate) fn open_bytes(
    key: &[u8; KEY_SIZE],
    ciphertext_and_tag: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>> {
    if ciphertext_and_tag.len() < TAG_SIZE {
        return Err(StrongroomError::integrity(
            "ciphertext too short (missing authentication tag)",
        ));
    }

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| StrongroomError::internal("Failed to create decryption key"))?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut buffer = ciphertext_and_tag.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut buffer)
        .map_err(|_| StrongroomError::integrity("authentication tag check failed"))?;

    Ok(plaintext.to_vec())
}

/// Assemble the opaque token `base64( nonce || tag || ciphertext )`.
pub(crate) fn encode_token(nonce: &[u8; NONCE_SIZE], ciphertext_and_tag: &[u8]) -> String {
    // seal_bytes produces ciphertext||tag; the wire layout is nonce||tag||ciphertext.
    let (body, tag) = ciphertext_and_tag.split_at(ciphertext_and_tag.len() - TAG_SIZE);
    let mut raw = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + body.len());
    raw.extend_from_slice(nonce);
    raw.extend_from_slice(tag);
    raw.extend_from_slice(body);
    base64::engine::general_purpose::STANDARD.encode(raw)
}

/// Parse an opaque token back into `(nonce, ciphertext||tag)`.
pub(crate) fn decode_token(token: &str) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|_| StrongroomError::integrity("ciphertext token is not valid base64"))?;

    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(StrongroomError::integrity("ciphertext token truncated"));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&raw[..NONCE_SIZE]);
    let tag = &raw[NONCE_SIZE..NONCE_SIZE + TAG_SIZE];
    let body = &raw[NONCE_SIZE + TAG_SIZE..];

    let mut ciphertext_and_tag = Vec::with_capacity(body.len() + TAG_SIZE);
    ciphertext_and_tag.extend_from_slice(body);
    ciphertext_and_tag.extend_from_slice(tag);
    Ok((nonce, ciphertext_and_tag))
}

/// Encrypt a plaintext string under the supplied master key.
///
/// Produces the opaque `base64(nonce || tag || ciphertext)` token.
pub fn encrypt(plaintext: &str, master_key: &str) -> Result<String> {
    let key = derive_key(master_key);
    let (sealed, nonce) = seal_bytes(&key, plaintext.as_bytes())?;
    Ok(encode_token(&nonce, &sealed))
}

/// Decrypt an opaque token under the supplied master key.
///
/// Fails with an integrity error when the token is malformed or the
/// authentication tag does not verify (wrong key or tampered data).
pub fn decrypt(token: &str, master_key: &str) -> Result<String> {
    let key = derive_key(master_key);
    let (nonce, ciphertext_and_tag) = decode_token(token)?;
    let plaintext = open_bytes(&key, &ciphertext_and_tag, &nonce)?;
    String::from_utf8(plaintext)
        .map_err(|_| StrongroomError::integrity("decrypted value is not valid UTF-8"))
}

/// SHA-256 hex digest of a value's UTF-8 bytes.
///
/// Retained alongside each encrypted version for integrity checks and
/// drift detection.
pub fn checksum(value: &str) -> String {
    let digest = digest::digest(&digest::SHA256, value.as_bytes());
    digest.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
}
