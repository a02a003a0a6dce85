//! Transaction signing over ECDSA P-256.
//!
//! The signed message is `from|to|amount`, digested with SHA-256. Signatures
//! travel as hex of the JSON object `{"r":"<hex>","s":"<hex>"}` where `r` and
//! `s` are base-16 integers without leading zeros. Non-coinbase transactions
//! carry the sender's PEM public key in `from`.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::Signature;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{FieldBytes, SecretKey};
use rand::rngs::OsRng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::HASH_HEX_SIZE;
use crate::error::CryptoError;
use crate::Transaction;

pub use p256::ecdsa::{SigningKey, VerifyingKey};

#[derive(Deserialize)]
struct EncodedSignature {
    r: String,
    s: String,
}

pub fn signing_message(tx: &Transaction) -> String {
    format!("{}|{}|{}", tx.from, tx.to, tx.amount)
}

pub fn signing_digest(tx: &Transaction) -> [u8; 32] {
    Sha256::digest(signing_message(tx).as_bytes()).into()
}

fn scalar_to_hex(bytes: &[u8]) -> String {
    let h = hex::encode(bytes);
    let trimmed = h.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn scalar_from_hex(s: &str) -> Result<FieldBytes, CryptoError> {
    if s.is_empty() || s.len() > HASH_HEX_SIZE {
        return Err(CryptoError::MalformedSignature);
    }
    let padded = format!("{s:0>width$}", width = HASH_HEX_SIZE);
    let bytes = hex::decode(padded).map_err(|_| CryptoError::MalformedSignature)?;
    Ok(FieldBytes::clone_from_slice(&bytes))
}

pub fn encode_signature(sig: &Signature) -> String {
    let bytes = sig.to_bytes();
    let (r, s) = bytes.split_at(32);
    // Hex digits need no JSON escaping.
    let json = format!(r#"{{"r":"{}","s":"{}"}}"#, scalar_to_hex(r), scalar_to_hex(s));
    hex::encode(json)
}

pub fn decode_signature(encoded: &str) -> Result<Signature, CryptoError> {
    let raw = hex::decode(encoded).map_err(|_| CryptoError::MalformedSignature)?;
    let parsed: EncodedSignature =
        serde_json::from_slice(&raw).map_err(|_| CryptoError::MalformedSignature)?;
    let r = scalar_from_hex(&parsed.r)?;
    let s = scalar_from_hex(&parsed.s)?;
    Signature::from_scalars(r, s).map_err(|_| CryptoError::MalformedSignature)
}

/// Accepts a PKIX PEM (`-----BEGIN PUBLIC KEY-----`) or hex SEC1 point.
pub fn parse_public_key(encoded: &str) -> Result<VerifyingKey, CryptoError> {
    let trimmed = encoded.trim();
    if trimmed.starts_with("-----BEGIN") {
        return VerifyingKey::from_public_key_pem(trimmed).map_err(|_| CryptoError::InvalidPublicKey);
    }
    let bytes = hex::decode(trimmed).map_err(|_| CryptoError::InvalidPublicKey)?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Accepts PKCS#8 (`PRIVATE KEY`) or SEC1 (`EC PRIVATE KEY`) PEM.
pub fn parse_signing_key(pem: &str) -> Result<SigningKey, CryptoError> {
    let pem = pem.trim();
    if let Ok(key) = SigningKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    SecretKey::from_sec1_pem(pem)
        .map(SigningKey::from)
        .map_err(|_| CryptoError::InvalidPrivateKey)
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

pub fn public_key_pem(key: &SigningKey) -> Result<String, CryptoError> {
    key.verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|_| CryptoError::InvalidPublicKey)
}

/// PKCS#8 PEM of the private key, readable by [`parse_signing_key`].
pub fn signing_key_pem(key: &SigningKey) -> Result<String, CryptoError> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|_| CryptoError::InvalidPrivateKey)
}

/// Sign `tx` in place.
pub fn sign_transaction(tx: &mut Transaction, key: &SigningKey) -> Result<(), CryptoError> {
    let digest = signing_digest(tx);
    let sig: Signature = key.sign_prehash(&digest).map_err(|_| CryptoError::Signing)?;
    tx.signature = encode_signature(&sig);
    Ok(())
}

pub fn verify_with_key(tx: &Transaction, key: &VerifyingKey) -> Result<(), CryptoError> {
    let sig = decode_signature(&tx.signature)?;
    key.verify_prehash(&signing_digest(tx), &sig)
        .map_err(|_| CryptoError::BadSignature)
}

/// Verify against the public key carried in `tx.from`.
pub fn verify_transaction(tx: &Transaction) -> Result<(), CryptoError> {
    let key = parse_public_key(&tx.from)?;
    verify_with_key(tx, &key)
}
