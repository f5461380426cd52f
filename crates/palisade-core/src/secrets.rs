//! Secret strategy selection: exactly one authentication mode per instance.
//!
//! The selector chooses one of four mutually exclusive modes, loads and
//! validates the cryptographic material the mode requires, and produces a
//! fully populated [`SecretStrategy`]. Selection either succeeds completely
//! or fails the startup; there is no silent fallback between modes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::material::{CertificateMaterial, PrivateKeyMaterial};
use crate::monitor::PolicyResolver;
use crate::token::{self, CompactToken};

/// Demonstration passphrase used when no passphrase is configured.
///
/// Deliberately weak and publicly known. It exists so demo setups run out of
/// the box; it is never a security boundary and must be overridden for
/// anything beyond a demo.
pub const DEMO_PASSPHRASE: &str = "BAD PASSWORD - PALISADE DEMO ONLY";

/// The authentication mode of a running instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Pre-shared key: a passphrase wrapped as-is.
    #[default]
    Psk,
    /// Full PKI: the complete certificate is exchanged at connection time.
    Pki,
    /// PKI with a compact token exchanged instead of the certificate chain:
    /// larger one-time setup, smaller steady-state handshake payload.
    CompactPki,
    /// Two independent bundles for two concurrently active monitor sets.
    Hybrid,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Psk => "psk",
            Self::Pki => "pki",
            Self::CompactPki => "compact-pki",
            Self::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

impl FromStr for AuthMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "psk" => Ok(Self::Psk),
            "pki" => Ok(Self::Pki),
            "compact-pki" => Ok(Self::CompactPki),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(CoreError::Configuration(format!(
                "unknown auth mode {other:?}, expected psk, pki, compact-pki or hybrid"
            ))),
        }
    }
}

/// Parameters for strategy selection, typically deserialized from the daemon
/// configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Authentication mode to activate.
    #[serde(default)]
    pub mode: AuthMode,
    /// Passphrase for `psk` mode.
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Path to the node's private key PEM (`pki`, `compact-pki`).
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// Path to the node's certificate PEM (`pki`, `compact-pki`).
    #[serde(default)]
    pub cert: Option<PathBuf>,
    /// Path to the CA certificate PEM (`pki`, `compact-pki`).
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Path to the CA private key PEM (`compact-pki` only; used transiently
    /// for minting and never retained).
    #[serde(default)]
    pub ca_key: Option<PathBuf>,
    /// Bundle for locally supervised workloads (`hybrid` only).
    #[serde(default)]
    pub local: Option<Box<SecretsConfig>>,
    /// Bundle for externally orchestrated workloads (`hybrid` only).
    #[serde(default)]
    pub orchestrated: Option<Box<SecretsConfig>>,
}

/// A passphrase with a redacted debug rendering.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    /// Wrap passphrase bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw passphrase bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passphrase(<{} bytes redacted>)", self.0.len())
    }
}

/// Material for full-certificate PKI authentication.
#[derive(Debug)]
pub struct PkiBundle {
    /// The node's private key.
    pub key: PrivateKeyMaterial,
    /// The node's leaf certificate.
    pub cert: CertificateMaterial,
    /// The trust anchor certificate.
    pub ca_cert: CertificateMaterial,
}

/// Material for compact-token PKI authentication.
#[derive(Debug)]
pub struct CompactPkiBundle {
    /// The node's private key.
    pub key: PrivateKeyMaterial,
    /// The node's leaf certificate.
    pub cert: CertificateMaterial,
    /// The trust anchor certificate.
    pub ca_cert: CertificateMaterial,
    /// Token vouching for `cert`, signed by the trust anchor.
    pub token: CompactToken,
}

/// The selected authentication mode with its cryptographic material.
///
/// A tagged variant: fields from two modes can never coexist, and exactly
/// one variant is active per running instance.
#[derive(Debug)]
pub enum SecretStrategy {
    /// Pre-shared key.
    PreSharedKey(Passphrase),
    /// Full-certificate PKI.
    Pki(PkiBundle),
    /// Compact-token PKI.
    CompactPki(CompactPkiBundle),
    /// Two isolated bundles for two concurrent monitor sets.
    Hybrid {
        /// Bundle for locally supervised workloads.
        local: Box<SecretStrategy>,
        /// Bundle for externally orchestrated workloads.
        orchestrated: Box<SecretStrategy>,
    },
}

impl SecretStrategy {
    /// The mode this strategy realizes.
    pub fn mode(&self) -> AuthMode {
        match self {
            Self::PreSharedKey(_) => AuthMode::Psk,
            Self::Pki(_) => AuthMode::Pki,
            Self::CompactPki(_) => AuthMode::CompactPki,
            Self::Hybrid { .. } => AuthMode::Hybrid,
        }
    }

    /// Whether the strategy carries usable secret material.
    pub fn is_populated(&self) -> bool {
        match self {
            Self::PreSharedKey(p) => !p.as_bytes().is_empty(),
            Self::Pki(_) | Self::CompactPki(_) => true,
            Self::Hybrid {
                local,
                orchestrated,
            } => local.is_populated() && orchestrated.is_populated(),
        }
    }
}

/// Select and build the secret strategy for this instance.
///
/// On `pki` and `compact-pki` the node's own certificate is registered with
/// the policy resolver so peers can validate this node's identity; a
/// registration failure is fatal.
pub fn select(
    config: &SecretsConfig,
    resolver: &dyn PolicyResolver,
    node_id: &str,
) -> Result<SecretStrategy> {
    match config.mode {
        AuthMode::Psk => {
            warn!("initializing with PSK auth, not suitable for production");
            let passphrase = config.passphrase.as_deref().ok_or_else(|| {
                CoreError::Configuration("psk mode requires a passphrase".to_string())
            })?;
            if passphrase.is_empty() {
                return Err(CoreError::Configuration(
                    "psk passphrase must not be empty".to_string(),
                ));
            }
            Ok(SecretStrategy::PreSharedKey(Passphrase::new(passphrase)))
        }
        AuthMode::Pki => {
            info!(node = node_id, "initializing with PKI auth");
            let key = PrivateKeyMaterial::load(require(&config.key, "pki", "key")?)?;
            let cert = CertificateMaterial::load(require(&config.cert, "pki", "cert")?)?;
            let ca_cert = CertificateMaterial::load(require(&config.ca_cert, "pki", "ca_cert")?)?;

            register_identity(resolver, node_id, &cert)?;

            Ok(SecretStrategy::Pki(PkiBundle { key, cert, ca_cert }))
        }
        AuthMode::CompactPki => {
            info!(node = node_id, "initializing with compact-PKI auth");
            let key = PrivateKeyMaterial::load(require(&config.key, "compact-pki", "key")?)?;
            let cert = CertificateMaterial::load(require(&config.cert, "compact-pki", "cert")?)?;
            let ca_cert =
                CertificateMaterial::load(require(&config.ca_cert, "compact-pki", "ca_cert")?)?;

            // The CA key is needed only to mint the token and is dropped at
            // the end of this scope.
            let ca_key =
                PrivateKeyMaterial::load(require(&config.ca_key, "compact-pki", "ca_key")?)?;
            let token = token::mint(&ca_key, &ca_cert, &cert)?;

            register_identity(resolver, node_id, &cert)?;

            Ok(SecretStrategy::CompactPki(CompactPkiBundle {
                key,
                cert,
                ca_cert,
                token,
            }))
        }
        AuthMode::Hybrid => {
            info!(node = node_id, "initializing with hybrid auth");
            let local = hybrid_member(&config.local, "local")?;
            let orchestrated = hybrid_member(&config.orchestrated, "orchestrated")?;
            Ok(SecretStrategy::Hybrid {
                local: Box::new(select(local, resolver, node_id)?),
                orchestrated: Box::new(select(orchestrated, resolver, node_id)?),
            })
        }
    }
}

fn require<'a>(path: &'a Option<PathBuf>, mode: &str, field: &str) -> Result<&'a Path> {
    path.as_deref().ok_or_else(|| {
        CoreError::Configuration(format!("{mode} mode requires the {field} path"))
    })
}

fn hybrid_member<'a>(
    member: &'a Option<Box<SecretsConfig>>,
    which: &str,
) -> Result<&'a SecretsConfig> {
    let config = member.as_deref().ok_or_else(|| {
        CoreError::Configuration(format!("hybrid mode requires the {which} bundle"))
    })?;
    if config.mode == AuthMode::Hybrid {
        return Err(CoreError::Configuration(format!(
            "hybrid {which} bundle must not itself be hybrid"
        )));
    }
    Ok(config)
}

fn register_identity(
    resolver: &dyn PolicyResolver,
    node_id: &str,
    cert: &CertificateMaterial,
) -> Result<()> {
    resolver
        .register_public_key(node_id, cert.pem())
        .map_err(|e| CoreError::Registration(format!("publishing identity for {node_id}: {e}")))?;
    info!(node = node_id, subject = cert.subject(), "local identity registered");
    Ok(())
}
