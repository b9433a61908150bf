//! Cryptographic primitives for records and tree roots.
//!
//! Uses secp256k1 recoverable ECDSA over Keccak-256 digests. Signatures
//! travel in compact form: 64 bytes for records (the recovery id is
//! dropped, verification happens against the declared public key) and
//! 65 bytes for tree roots (compact signature plus recovery id).

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Compressed SEC1 public key length.
pub const PUBKEY_LEN: usize = 33;

/// Compact signature length without the recovery id.
pub const SIG_LEN: usize = 64;

/// Recoverable signature length (compact + recovery id).
pub const RECOVERABLE_SIG_LEN: usize = 65;

fn ctx() -> &'static Secp256k1<All> {
    static CTX: OnceLock<Secp256k1<All>> = OnceLock::new();
    CTX.get_or_init(Secp256k1::new)
}

/// Compute the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Generate a fresh secp256k1 keypair.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    ctx().generate_keypair(&mut rand::thread_rng())
}

/// Parse a secret key from a hex string.
pub fn secret_from_hex(hex_str: &str) -> Result<SecretKey> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| Error::Parse(format!("invalid secret key hex: {}", e)))?;
    SecretKey::from_slice(&bytes)
        .map_err(|e| Error::Parse(format!("invalid secret key: {}", e)))
}

/// Derive the public key for a secret key.
pub fn public_key(secret: &SecretKey) -> PublicKey {
    PublicKey::from_secret_key(ctx(), secret)
}

/// Parse a compressed public key, checking the length up front.
pub fn parse_pubkey(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBKEY_LEN {
        return Err(Error::Signature(format!(
            "invalid public key length {}",
            bytes.len()
        )));
    }
    PublicKey::from_slice(bytes)
        .map_err(|e| Error::Signature(format!("invalid public key: {}", e)))
}

/// Produce a recoverable signature over a 32-byte digest.
///
/// Output layout matches the wire form: 64 compact bytes followed by the
/// recovery id. Signing is deterministic (RFC 6979).
pub fn sign_recoverable(secret: &SecretKey, digest: &[u8; 32]) -> [u8; RECOVERABLE_SIG_LEN] {
    let msg = Message::from_digest_slice(digest).expect("digest is 32 bytes");
    let (rec_id, compact) = ctx()
        .sign_ecdsa_recoverable(&msg, secret)
        .serialize_compact();
    let mut out = [0u8; RECOVERABLE_SIG_LEN];
    out[..SIG_LEN].copy_from_slice(&compact);
    out[SIG_LEN] = rec_id.to_i32() as u8;
    out
}

/// Verify a 64-byte compact signature over a digest with a known key.
pub fn verify(pubkey: &PublicKey, digest: &[u8; 32], sig: &[u8]) -> bool {
    let Ok(msg) = Message::from_digest_slice(digest) else {
        return false;
    };
    let Ok(sig) = Signature::from_compact(sig) else {
        return false;
    };
    ctx().verify_ecdsa(&msg, &sig, pubkey).is_ok()
}

/// Recover the signer's public key from a 65-byte recoverable signature.
pub fn recover(digest: &[u8; 32], sig: &[u8]) -> Result<PublicKey> {
    if sig.len() != RECOVERABLE_SIG_LEN {
        return Err(Error::Signature(format!(
            "invalid recoverable signature length {}",
            sig.len()
        )));
    }
    let rec_id = RecoveryId::from_i32(i32::from(sig[SIG_LEN]))
        .map_err(|e| Error::Signature(format!("invalid recovery id: {}", e)))?;
    let rec_sig = RecoverableSignature::from_compact(&sig[..SIG_LEN], rec_id)
        .map_err(|e| Error::Signature(format!("invalid signature: {}", e)))?;
    let msg = Message::from_digest_slice(digest)
        .map_err(|e| Error::Signature(format!("invalid digest: {}", e)))?;
    ctx()
        .recover_ecdsa(&msg, &rec_sig)
        .map_err(|e| Error::Signature(format!("recovery failed: {}", e)))
}
