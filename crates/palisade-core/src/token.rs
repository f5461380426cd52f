//! Compact identity token minting and verification.
//!
//! A compact token is a small signed artifact that substitutes for a full
//! certificate chain during identity exchange: it binds a leaf certificate's
//! public-key fingerprint to a trust anchor's signature. Any party holding
//! the anchor's public key can verify it; the token itself carries no
//! reference to the private signing key.
//!
//! Wire format: a CBOR envelope `{claims, signature}` where `claims` is the
//! canonical CBOR encoding of [`TokenClaims`] and `signature` is an ASN.1 DER
//! ECDSA P-256 signature over those claim bytes.

use std::fmt;

use base64::Engine;
use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::material::{CertificateMaterial, PrivateKeyMaterial};

/// Expiry value meaning "no expiry restriction".
pub const UNLIMITED_EXPIRY: i64 = -1;

/// The signed statement inside a compact token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenClaims {
    /// SHA-256 fingerprint of the leaf certificate's public key.
    leaf_key_fingerprint: Vec<u8>,
    /// SHA-256 fingerprint of the issuing trust anchor's public key.
    issuer_key_fingerprint: Vec<u8>,
    /// Unix expiry seconds, or [`UNLIMITED_EXPIRY`].
    expiry: i64,
}

/// CBOR envelope carrying the claim bytes and their signature.
#[derive(Serialize, Deserialize)]
struct SignedEnvelope {
    claims: Vec<u8>,
    signature: Vec<u8>,
}

/// An opaque signed byte sequence binding a leaf certificate to a trust
/// anchor. Transferable; independently verifiable by any holder of the
/// anchor's public key.
#[derive(Clone, PartialEq, Eq)]
pub struct CompactToken {
    bytes: Vec<u8>,
}

impl CompactToken {
    /// Wrap token bytes received from a peer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw token bytes for exchange.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verify this token against a trust anchor's public key (uncompressed
    /// SEC1 point) and the leaf certificate it is expected to vouch for.
    ///
    /// Fails deterministically against the wrong anchor, a different leaf,
    /// altered token bytes, or an elapsed expiry.
    pub fn verify(&self, anchor_public_key: &[u8], leaf: &CertificateMaterial) -> Result<()> {
        let envelope: SignedEnvelope =
            ciborium::from_reader(self.bytes.as_slice()).map_err(|e| {
                CoreError::TokenVerify(format!("malformed token envelope: {e}"))
            })?;

        UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, anchor_public_key)
            .verify(&envelope.claims, &envelope.signature)
            .map_err(|_| {
                CoreError::TokenVerify("signature not valid for trust anchor".to_string())
            })?;

        let claims: TokenClaims =
            ciborium::from_reader(envelope.claims.as_slice()).map_err(|e| {
                CoreError::TokenVerify(format!("malformed token claims: {e}"))
            })?;

        if claims.issuer_key_fingerprint != sha256(anchor_public_key) {
            return Err(CoreError::TokenVerify(
                "token was issued by a different trust anchor".to_string(),
            ));
        }

        if claims.leaf_key_fingerprint != leaf.public_key_fingerprint() {
            return Err(CoreError::TokenVerify(
                "token does not vouch for this leaf certificate".to_string(),
            ));
        }

        if claims.expiry != UNLIMITED_EXPIRY && claims.expiry < chrono::Utc::now().timestamp() {
            return Err(CoreError::TokenVerify("token has expired".to_string()));
        }

        Ok(())
    }
}

impl fmt::Debug for CompactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        f.debug_struct("CompactToken")
            .field("len", &self.bytes.len())
            .field("b64", &b64)
            .finish()
    }
}

/// Mint a compact token vouching for `leaf`, signed by the trust anchor's
/// private key, with no expiry restriction.
///
/// The CA private key is used transiently; the resulting token carries no
/// reference to it.
pub fn mint(
    ca_key: &PrivateKeyMaterial,
    ca_cert: &CertificateMaterial,
    leaf: &CertificateMaterial,
) -> Result<CompactToken> {
    mint_with_expiry(ca_key, ca_cert, leaf, UNLIMITED_EXPIRY)
}

/// Mint a compact token with an explicit unix expiry.
pub fn mint_with_expiry(
    ca_key: &PrivateKeyMaterial,
    ca_cert: &CertificateMaterial,
    leaf: &CertificateMaterial,
    expiry: i64,
) -> Result<CompactToken> {
    // The CA certificate and key must be the same elliptic-curve pair.
    // Point bytes are canonical, so equality is a deterministic check.
    if ca_key.public_key() != ca_cert.public_key() {
        return Err(CoreError::KeyMismatch(format!(
            "CA private key from {} does not pair with CA certificate {}",
            ca_key.source(),
            ca_cert.subject(),
        )));
    }

    let claims = TokenClaims {
        leaf_key_fingerprint: leaf.public_key_fingerprint(),
        issuer_key_fingerprint: sha256(ca_cert.public_key()),
        expiry,
    };

    let mut claim_bytes = Vec::new();
    ciborium::into_writer(&claims, &mut claim_bytes)
        .map_err(|e| CoreError::Signing(format!("claims encoding failed: {e}")))?;

    let signature = ca_key.sign(&claim_bytes)?;

    let envelope = SignedEnvelope {
        claims: claim_bytes,
        signature,
    };
    let mut bytes = Vec::new();
    ciborium::into_writer(&envelope, &mut bytes)
        .map_err(|e| CoreError::Signing(format!("envelope encoding failed: {e}")))?;

    Ok(CompactToken { bytes })
}

/// SHA-256 digest of a byte slice.
pub(crate) fn sha256(bytes: &[u8]) -> Vec<u8> {
    ring::digest::digest(&ring::digest::SHA256, bytes)
        .as_ref()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(name: &str) -> (CertificateMaterial, PrivateKeyMaterial) {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        (
            CertificateMaterial::from_pem("inline-ca", cert.pem().as_bytes()).unwrap(),
            PrivateKeyMaterial::from_pem("inline-ca-key", key.serialize_pem().as_bytes()).unwrap(),
        )
    }

    fn leaf(name: &str) -> CertificateMaterial {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        let cert = params.self_signed(&key).unwrap();
        CertificateMaterial::from_pem("inline-leaf", cert.pem().as_bytes()).unwrap()
    }

    #[test]
    fn minted_token_verifies_against_its_anchor() {
        let (ca_cert, ca_key) = anchor("ca.palisade.test");
        let workload = leaf("leaf.palisade.test");

        let token = mint(&ca_key, &ca_cert, &workload).unwrap();
        token.verify(ca_cert.public_key(), &workload).unwrap();
    }

    #[test]
    fn verification_fails_against_other_anchor() {
        let (ca_cert, ca_key) = anchor("ca.palisade.test");
        let (other_cert, _) = anchor("other-ca.palisade.test");
        let workload = leaf("leaf.palisade.test");

        let token = mint(&ca_key, &ca_cert, &workload).unwrap();
        let err = token.verify(other_cert.public_key(), &workload).unwrap_err();
        assert!(matches!(err, CoreError::TokenVerify(_)), "{err}");
    }

    #[test]
    fn verification_fails_for_other_leaf() {
        let (ca_cert, ca_key) = anchor("ca.palisade.test");
        let workload = leaf("leaf.palisade.test");
        let impostor = leaf("impostor.palisade.test");

        let token = mint(&ca_key, &ca_cert, &workload).unwrap();
        let err = token.verify(ca_cert.public_key(), &impostor).unwrap_err();
        assert!(matches!(err, CoreError::TokenVerify(_)), "{err}");
    }

    #[test]
    fn altered_token_fails_verification() {
        let (ca_cert, ca_key) = anchor("ca.palisade.test");
        let workload = leaf("leaf.palisade.test");

        let token = mint(&ca_key, &ca_cert, &workload).unwrap();
        let mut bytes = token.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let altered = CompactToken::from_bytes(bytes);

        assert!(altered.verify(ca_cert.public_key(), &workload).is_err());
    }

    #[test]
    fn mismatched_ca_pair_is_rejected_before_minting() {
        let (ca_cert, _) = anchor("ca.palisade.test");
        let (_, unrelated_key) = anchor("other-ca.palisade.test");
        let workload = leaf("leaf.palisade.test");

        let err = mint(&unrelated_key, &ca_cert, &workload).unwrap_err();
        assert!(matches!(err, CoreError::KeyMismatch(_)), "{err}");
    }

    #[test]
    fn elapsed_expiry_fails_verification() {
        let (ca_cert, ca_key) = anchor("ca.palisade.test");
        let workload = leaf("leaf.palisade.test");

        let past = chrono::Utc::now().timestamp() - 60;
        let token = mint_with_expiry(&ca_key, &ca_cert, &workload, past).unwrap();
        let err = token.verify(ca_cert.public_key(), &workload).unwrap_err();
        assert!(matches!(err, CoreError::TokenVerify(_)), "{err}");
    }
}
