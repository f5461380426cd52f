//! PEM material loading and validation.
//!
//! Reads PEM-encoded certificates and private keys from named sources and
//! parses them into immutable material values. The loader fails fast on
//! malformed input and is never the decision point for which secret strategy
//! is active — that belongs to [`crate::secrets`].

use std::fmt;
use std::path::Path;

use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use x509_parser::public_key::PublicKey;

use crate::error::{CoreError, Result};

/// An X.509 certificate loaded from PEM, restricted to elliptic-curve keys.
///
/// Immutable once loaded. The raw PEM is retained because it is what gets
/// registered with the policy resolver and exchanged with peers.
#[derive(Clone)]
pub struct CertificateMaterial {
    pem: Vec<u8>,
    der: Vec<u8>,
    subject: String,
    public_key: Vec<u8>,
}

impl CertificateMaterial {
    /// Load a certificate from a PEM file.
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| CoreError::io(&display, e))?;
        Self::from_pem(&display, &bytes)
    }

    /// Parse a certificate from PEM bytes. `source` names the origin for
    /// error reporting (a path, or a label like `"inline"` in tests).
    pub fn from_pem(source: &str, pem_bytes: &[u8]) -> Result<Self> {
        let block = first_pem_block(source, pem_bytes)?;
        if block.tag() != "CERTIFICATE" {
            return Err(CoreError::PemDecode {
                path: source.to_string(),
                reason: format!("expected CERTIFICATE block, found {}", block.tag()),
            });
        }

        let der = block.contents().to_vec();
        let (_, cert) =
            x509_parser::parse_x509_certificate(&der).map_err(|e| CoreError::CertParse {
                path: source.to_string(),
                reason: e.to_string(),
            })?;

        let spki = cert.public_key();
        let public_key = match spki.parsed() {
            Ok(PublicKey::EC(point)) => point.data().to_vec(),
            Ok(other) => {
                return Err(CoreError::UnsupportedKeyType {
                    path: source.to_string(),
                    reason: format!("certificate key is {}, expected elliptic curve", key_name(&other)),
                });
            }
            Err(e) => {
                return Err(CoreError::CertParse {
                    path: source.to_string(),
                    reason: format!("subject public key: {e}"),
                });
            }
        };

        let subject = cert.subject().to_string();

        Ok(Self {
            pem: pem_bytes.to_vec(),
            der,
            subject,
            public_key,
        })
    }

    /// Raw PEM bytes as read from the source.
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// DER bytes of the decoded certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Certificate subject as an RFC 2253 string.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Uncompressed SEC1 point bytes of the subject public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// SHA-256 fingerprint of the subject public key.
    pub fn public_key_fingerprint(&self) -> Vec<u8> {
        crate::token::sha256(&self.public_key)
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("subject", &self.subject)
            .field("fingerprint", &hex::encode(self.public_key_fingerprint()))
            .finish_non_exhaustive()
    }
}

/// An ECDSA P-256 private key loaded from a PKCS#8 PEM file.
///
/// Usable only for signing; the key bytes never leave this value.
pub struct PrivateKeyMaterial {
    source: String,
    key_pair: EcdsaKeyPair,
}

impl PrivateKeyMaterial {
    /// Load a private key from a PEM file.
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| CoreError::io(&display, e))?;
        Self::from_pem(&display, &bytes)
    }

    /// Parse a private key from PEM bytes.
    pub fn from_pem(source: &str, pem_bytes: &[u8]) -> Result<Self> {
        let block = first_pem_block(source, pem_bytes)?;
        match block.tag() {
            "PRIVATE KEY" => {}
            "EC PRIVATE KEY" => {
                return Err(CoreError::UnsupportedKeyType {
                    path: source.to_string(),
                    reason: "SEC1 'EC PRIVATE KEY' encoding not supported, re-encode as PKCS#8"
                        .to_string(),
                });
            }
            other => {
                return Err(CoreError::PemDecode {
                    path: source.to_string(),
                    reason: format!("expected PRIVATE KEY block, found {other}"),
                });
            }
        }

        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, block.contents(), &rng)
                .map_err(|e| CoreError::UnsupportedKeyType {
                    path: source.to_string(),
                    reason: format!("not an ECDSA P-256 key: {e}"),
                })?;

        Ok(Self {
            source: source.to_string(),
            key_pair,
        })
    }

    /// Sign a message with this key, producing an ASN.1 DER ECDSA signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let sig = self
            .key_pair
            .sign(&rng, message)
            .map_err(|_| CoreError::Signing(format!("ecdsa signing failed for {}", self.source)))?;
        Ok(sig.as_ref().to_vec())
    }

    /// Uncompressed SEC1 point bytes of the corresponding public key.
    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }

    /// The source this key was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Decode the first PEM block of a source. A source with no valid PEM block
/// is an error, never an empty result.
fn first_pem_block(source: &str, bytes: &[u8]) -> Result<pem::Pem> {
    let blocks = pem::parse_many(bytes).map_err(|e| CoreError::PemDecode {
        path: source.to_string(),
        reason: e.to_string(),
    })?;
    blocks
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::PemDecode {
            path: source.to_string(),
            reason: "no PEM block found".to_string(),
        })
}

fn key_name(key: &PublicKey<'_>) -> &'static str {
    match key {
        PublicKey::RSA(_) => "RSA",
        PublicKey::DSA(_) => "DSA",
        PublicKey::EC(_) => "EC",
        _ => "an unrecognized algorithm",
    }
}
