//! Trust store and signature verification engine.
//!
//! A trust-key specifier is either a filesystem path to a PEM file or an
//! inline PEM block. Each specifier that loads yields one [`Verifier`];
//! specifiers that fail to load are skipped with a diagnostic so the
//! remaining ones still apply. A candidate key survives verification when at
//! least one verifier accepts its signature, and is appended once per
//! accepting verifier — downstream consumers may read the duplicate count as
//! a trust-weight signal, so it is deliberately not collapsed here.

use ed25519_dalek::pkcs8::DecodePublicKey as _;
use ed25519_dalek::{Signature as Ed25519Signature, Verifier as _, VerifyingKey};
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::keys::Key;

const PEM_PUBLIC_KEY_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

#[derive(Debug, Error)]
pub enum TrustKeyError {
    #[error("unable to read public key {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unsupported or malformed public key material")]
    Unsupported,
}

/// Signature-checking capability bound to one trusted signer key.
///
/// Stateless after construction; adding an algorithm means adding one
/// variant here and one branch in [`parse_public_key_pem`].
pub enum Verifier {
    /// RSA with SHA-256 digest and PKCS#1 v1.5 padding.
    Rsa(RsaPublicKey),
    /// Ed25519, direct verification without pre-hash.
    Ed25519(VerifyingKey),
}

impl Verifier {
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Verifier::Rsa(key) => {
                let digest = Sha256::digest(message);
                key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                    .is_ok()
            }
            Verifier::Ed25519(key) => match Ed25519Signature::from_slice(signature) {
                Ok(sig) => key.verify(message, &sig).is_ok(),
                Err(_) => false,
            },
        }
    }
}

/// Load one trust-key specifier: inline PEM when it starts with the PEM
/// public-key header, otherwise a filesystem path.
pub fn load_specifier(spec: &str) -> Result<Verifier, TrustKeyError> {
    let spec = spec.trim();
    if spec.starts_with(PEM_PUBLIC_KEY_HEADER) {
        parse_public_key_pem(spec)
    } else {
        let pem = std::fs::read_to_string(spec).map_err(|source| TrustKeyError::Read {
            path: spec.to_string(),
            source,
        })?;
        parse_public_key_pem(&pem)
    }
}

/// Parse an X.509 SubjectPublicKeyInfo PEM block and classify the key type.
pub fn parse_public_key_pem(pem: &str) -> Result<Verifier, TrustKeyError> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(Verifier::Rsa(key));
    }
    if let Ok(key) = VerifyingKey::from_public_key_pem(pem) {
        return Ok(Verifier::Ed25519(key));
    }
    Err(TrustKeyError::Unsupported)
}

/// Run every candidate key against every trust-key specifier.
///
/// An empty specifier list means verification is disabled and every
/// candidate passes through unchanged. Individual signature mismatches are
/// never fatal; they only exclude that (key, verifier) pair.
pub fn verify_keys(specifiers: &[String], keys: &[Key]) -> Vec<Key> {
    if specifiers.is_empty() {
        return keys.to_vec();
    }
    let mut accepted = Vec::new();
    for spec in specifiers {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        let verifier = match load_specifier(spec) {
            Ok(verifier) => verifier,
            Err(err) => {
                tracing::warn!("skipping trusted public key: {err}");
                continue;
            }
        };
        for key in keys {
            // A malformed hex signature decodes to nothing and fails below.
            let signature = hex::decode(&key.public_key_sig).unwrap_or_default();
            if verifier.verify(key.public_key.as_bytes(), &signature) {
                accepted.push(key.clone());
            } else {
                tracing::debug!(account = %key.account, "signature rejected");
            }
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_PEM: &str = include_str!("../tests/data/trusted_rsa.pem");
    const ED25519_PEM: &str = include_str!("../tests/data/trusted_ed25519.pem");
    const SIGNED_KEYS: &str = include_str!("../tests/data/keys.signed.json");

    fn signed_keys() -> Vec<Key> {
        serde_json::from_str(SIGNED_KEYS).unwrap()
    }

    #[test]
    fn parses_rsa_public_key() {
        assert!(matches!(
            parse_public_key_pem(RSA_PEM).unwrap(),
            Verifier::Rsa(_)
        ));
    }

    #[test]
    fn parses_ed25519_public_key() {
        assert!(matches!(
            parse_public_key_pem(ED25519_PEM).unwrap(),
            Verifier::Ed25519(_)
        ));
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(parse_public_key_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
        assert!(parse_public_key_pem("not a key at all").is_err());
    }

    #[test]
    fn missing_file_specifier_is_an_error() {
        assert!(matches!(
            load_specifier("/nonexistent/trusted.pem"),
            Err(TrustKeyError::Read { .. })
        ));
    }

    #[test]
    fn rsa_signature_verifies() {
        let keys = signed_keys();
        let verifier = parse_public_key_pem(RSA_PEM).unwrap();
        let sig = hex::decode(&keys[0].public_key_sig).unwrap();
        assert!(verifier.verify(keys[0].public_key.as_bytes(), &sig));
        // The same signature must not verify a different message.
        assert!(!verifier.verify(keys[1].public_key.as_bytes(), &sig));
    }

    #[test]
    fn ed25519_signature_verifies() {
        let keys = signed_keys();
        let verifier = parse_public_key_pem(ED25519_PEM).unwrap();
        let sig = hex::decode(&keys[1].public_key_sig).unwrap();
        assert!(verifier.verify(keys[1].public_key.as_bytes(), &sig));
        assert!(!verifier.verify(keys[0].public_key.as_bytes(), &sig));
    }

    #[test]
    fn ed25519_rejects_wrong_length_signature() {
        let verifier = parse_public_key_pem(ED25519_PEM).unwrap();
        assert!(!verifier.verify(b"message", b"short"));
        assert!(!verifier.verify(b"message", &[]));
    }

    #[test]
    fn empty_specifier_list_is_identity() {
        let keys = signed_keys();
        assert_eq!(verify_keys(&[], &keys), keys);
    }

    #[test]
    fn each_key_survives_only_under_its_signer() {
        let keys = signed_keys();
        let specs = vec![
            RSA_PEM.to_string(),     // accepts keys[0]
            ED25519_PEM.to_string(), // accepts keys[1]
        ];
        let out = verify_keys(&specs, &keys);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], keys[0]);
        assert_eq!(out[1], keys[1]);
    }

    #[test]
    fn key_accepted_by_two_specifiers_appears_twice() {
        let keys = vec![signed_keys()[0].clone()];
        // Same trust key given twice (inline and again inline) — the
        // duplicate in the output is intentional.
        let specs = vec![RSA_PEM.to_string(), RSA_PEM.to_string()];
        let out = verify_keys(&specs, &keys);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn garbled_hex_signature_is_always_rejected() {
        let keys = signed_keys();
        let garbage = &keys[2]; // public_key_sig = "deadbeef"
        for spec in [RSA_PEM, ED25519_PEM] {
            let out = verify_keys(&[spec.to_string()], std::slice::from_ref(garbage));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn unloadable_specifier_rejects_everything() {
        let keys = signed_keys();
        // Non-empty specifier list that yields zero verifiers: nothing passes.
        let out = verify_keys(&["/nonexistent/trusted.pem".to_string()], &keys);
        assert!(out.is_empty());
    }

    #[test]
    fn blank_specifiers_are_skipped() {
        let keys = signed_keys();
        let specs = vec!["   ".to_string(), RSA_PEM.to_string()];
        let out = verify_keys(&specs, &keys);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], keys[0]);
    }
}
