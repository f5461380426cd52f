//! Error types for identity bootstrap and instance supervision.
//!
//! Every startup-time failure (configuration, material, crypto, registration,
//! monitor start) is fatal for the process instance: the operator fixes the
//! inputs and restarts. Only monitor-stop failures are tolerated; they are
//! aggregated into a single report so shutdown always runs to completion.

use thiserror::Error;

use crate::monitor::MonitorKind;

/// Result type alias for palisade-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while bootstrapping identity or supervising an
/// assembled instance.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Auth mode parameters are missing or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A material source could not be read.
    #[error("io error reading {path}: {source}")]
    Io {
        /// Path of the unreadable source.
        path: String,
        /// Underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// No valid PEM block was found in the source.
    #[error("pem decode error in {path}: {reason}")]
    PemDecode {
        /// Path of the malformed source.
        path: String,
        /// What the decoder rejected.
        reason: String,
    },

    /// X.509 certificate parsing failed.
    #[error("certificate parse error in {path}: {reason}")]
    CertParse {
        /// Path of the malformed certificate.
        path: String,
        /// Parser rejection reason.
        reason: String,
    },

    /// The key algorithm is not elliptic curve, or the encoding is not
    /// usable for ECDSA signing.
    #[error("unsupported key type in {path}: {reason}")]
    UnsupportedKeyType {
        /// Path of the offending key or certificate.
        path: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// CA certificate and CA private key are not an elliptic-curve pair.
    #[error("key mismatch: {0}")]
    KeyMismatch(String),

    /// A cryptographic signing operation failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// A compact token failed verification.
    #[error("token verification failed: {0}")]
    TokenVerify(String),

    /// Publishing the local identity to the policy resolver failed.
    #[error("registration error: {0}")]
    Registration(String),

    /// A monitor failed to start. Already-started monitors have been rolled
    /// back (best effort, reverse order) before this error surfaces.
    #[error("monitor {kind} failed to start: {reason}")]
    MonitorStart {
        /// Which monitor failed.
        kind: MonitorKind,
        /// Start failure reason.
        reason: String,
    },

    /// One or more monitors failed to stop. Non-fatal: shutdown completed,
    /// the failures are aggregated here for reporting.
    #[error("monitor stop failures: {}", .0.join("; "))]
    MonitorStop(Vec<String>),

    /// A runtime failure inside a monitor implementation.
    #[error("monitor error: {0}")]
    Monitor(String),

    /// A lifecycle transition was requested from the wrong state.
    #[error("invalid lifecycle transition: {0}")]
    State(String),
}

impl CoreError {
    /// Build an io error with the source path attached.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
