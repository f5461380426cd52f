//! Shared fixtures: generated ECDSA P-256 certificate sets on disk.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use palisade_core::monitor::{PolicyDecision, PolicyResolver, WorkloadRuntime};
use palisade_core::{CoreError, Result};

/// Paths of a complete 4-file PEM set: node key/cert plus CA cert/key.
pub struct PemSet {
    pub key: PathBuf,
    pub cert: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
}

/// Generate a CA and a leaf certificate signed by it, written as PEM files
/// under `dir`.
pub fn write_pem_set(dir: &Path, ca_name: &str, leaf_name: &str) -> PemSet {
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::new(vec![ca_name.to_string()]).unwrap();
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, ca_name);
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = rcgen::KeyPair::generate().unwrap();
    let mut leaf_params = rcgen::CertificateParams::new(vec![leaf_name.to_string()]).unwrap();
    leaf_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, leaf_name);
    let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    let set = PemSet {
        key: dir.join("key.pem"),
        cert: dir.join("cert.pem"),
        ca_cert: dir.join("ca-cert.pem"),
        ca_key: dir.join("ca-key.pem"),
    };
    std::fs::write(&set.key, leaf_key.serialize_pem()).unwrap();
    std::fs::write(&set.cert, leaf_cert.pem()).unwrap();
    std::fs::write(&set.ca_cert, ca_cert.pem()).unwrap();
    std::fs::write(&set.ca_key, ca_key.serialize_pem()).unwrap();
    set
}

/// A resolver that admits everything and records registered identities.
#[derive(Default)]
pub struct RecordingResolver {
    pub registered: Mutex<Vec<(String, Vec<u8>)>>,
}

impl PolicyResolver for RecordingResolver {
    fn resolve(&self, _node_id: &str, _runtime: &WorkloadRuntime) -> PolicyDecision {
        PolicyDecision::Allow
    }

    fn register_public_key(&self, node_id: &str, cert_pem: &[u8]) -> Result<()> {
        self.registered
            .lock()
            .unwrap()
            .push((node_id.to_string(), cert_pem.to_vec()));
        Ok(())
    }
}

/// A resolver whose registration always fails.
pub struct RejectingResolver;

impl PolicyResolver for RejectingResolver {
    fn resolve(&self, _node_id: &str, _runtime: &WorkloadRuntime) -> PolicyDecision {
        PolicyDecision::Deny
    }

    fn register_public_key(&self, _node_id: &str, _cert_pem: &[u8]) -> Result<()> {
        Err(CoreError::Registration("resolver unreachable".to_string()))
    }
}
