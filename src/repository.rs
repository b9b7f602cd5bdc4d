//! File-backed certificate repository
//!
//! One JSON file holds any number of named certificate stores. Setup creates
//! the file and the store named by the configured identifier; issuance
//! appends a record per certificate; the OCSP responder reads a snapshot.
//!
//! Writers hold an exclusive session lease on the repository path for the
//! whole read-modify-write cycle, readers a shared one.

use crate::artifacts::{write_artifact, WriteMode};
use crate::configs::RepositoryConfiguration;
use crate::distinguished_name::DistinguishedName;
use crate::error::{CaError, Result};
use crate::provider::CryptoProvider;
use crate::session::{Access, CryptoSession};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tracing::{debug, info};

const REPOSITORY_FORMAT: &str = "pki-authority-repository/1";

/// An issued certificate as recorded in a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Upper-case hex serial number
    pub serial: String,
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    /// SHA-256 of the DER certificate, colon separated upper-case hex
    pub fingerprint: String,
    pub not_after: String,
    pub is_ca: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateStore {
    #[serde(default)]
    entries: Vec<RepositoryEntry>,
}

impl CertificateStore {
    pub fn entries(&self) -> &[RepositoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look a certificate up by serial. Case and leading zeros are ignored.
    pub fn find(&self, serial: &str) -> Option<&RepositoryEntry> {
        let wanted = normalize_serial(serial);
        self.entries
            .iter()
            .find(|entry| normalize_serial(&entry.serial).eq_ignore_ascii_case(wanted))
    }
}

#[derive(Serialize, Deserialize)]
struct RepositoryDocument {
    format: String,
    #[serde(default)]
    stores: BTreeMap<String, CertificateStore>,
}

impl Default for RepositoryDocument {
    fn default() -> Self {
        Self {
            format: REPOSITORY_FORMAT.to_string(),
            stores: BTreeMap::new(),
        }
    }
}

pub struct CertificateRepository<'s, P: CryptoProvider> {
    session: &'s CryptoSession<P>,
    config: RepositoryConfiguration,
}

impl<'s, P: CryptoProvider> CertificateRepository<'s, P> {
    pub fn new(session: &'s CryptoSession<P>, config: RepositoryConfiguration) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &RepositoryConfiguration {
        &self.config
    }

    /// Create the repository file and the configured store when absent.
    /// An existing store is left untouched.
    pub fn initialize(&self) -> Result<()> {
        let path = self.config.path.as_path();
        let _lease = self.session.lock_path(path, Access::Exclusive);
        let mut document = read_document(path)?.unwrap_or_default();
        if document.stores.contains_key(&self.config.identifier) {
            debug!(path = %path.display(), identifier = %self.config.identifier, "repository store already present");
            return Ok(());
        }
        document
            .stores
            .insert(self.config.identifier.clone(), CertificateStore::default());
        write_document(path, &document)?;
        info!(path = %path.display(), identifier = %self.config.identifier, "initialized certificate repository");
        Ok(())
    }

    /// Append an issued certificate to the configured store
    pub fn record(&self, entry: RepositoryEntry) -> Result<()> {
        let path = self.config.path.as_path();
        let _lease = self.session.lock_path(path, Access::Exclusive);
        let mut document = read_document(path)?.ok_or_else(|| not_initialized(path))?;
        let store = document
            .stores
            .get_mut(&self.config.identifier)
            .ok_or_else(|| missing_store(path, &self.config.identifier))?;
        debug!(serial = %entry.serial, subject = %entry.subject, "recording certificate");
        store.entries.push(entry);
        write_document(path, &document)
    }

    /// Current contents of the configured store
    pub fn load_store(&self) -> Result<CertificateStore> {
        let path = self.config.path.as_path();
        let _lease = self.session.lock_path(path, Access::Shared);
        let mut document = read_document(path)?.ok_or_else(|| not_initialized(path))?;
        document
            .stores
            .remove(&self.config.identifier)
            .ok_or_else(|| missing_store(path, &self.config.identifier))
    }
}

/// SHA-256 fingerprint of a DER certificate
pub fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

fn normalize_serial(serial: &str) -> &str {
    let trimmed = serial.trim().trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

fn not_initialized(path: &Path) -> CaError {
    CaError::repository(path, "has not been initialized")
}

fn missing_store(path: &Path, identifier: &str) -> CaError {
    CaError::repository(path, format!("has no store named '{}'", identifier))
}

fn read_document(path: &Path) -> Result<Option<RepositoryDocument>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CaError::io(path, e)),
    };
    let document: RepositoryDocument = serde_json::from_slice(&bytes)
        .map_err(|e| CaError::repository(path, format!("unreadable repository: {}", e)))?;
    if document.format != REPOSITORY_FORMAT {
        return Err(CaError::repository(
            path,
            format!("unsupported repository format '{}'", document.format),
        ));
    }
    Ok(Some(document))
}

fn write_document(path: &Path, document: &RepositoryDocument) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(document)
        .map_err(|e| CaError::repository(path, format!("failed to encode: {}", e)))?;
    write_artifact(path, &bytes, WriteMode::Replace)
}
