//! OCSP responder lifecycle
//!
//! The responder answers status queries from a snapshot of one repository
//! store taken when it starts. It has no network transport of its own; a
//! front end hands it serial numbers and relays the answers.

use crate::error::{CaError, Result};
use crate::provider::CryptoProvider;
use crate::repository::{CertificateRepository, CertificateStore};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    /// Issued by this authority and recorded in the repository
    Good,
    /// Not known to this authority
    Unknown,
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateStatus::Good => f.write_str("good"),
            CertificateStatus::Unknown => f.write_str("unknown"),
        }
    }
}

pub struct OcspResponder<'s, P: CryptoProvider> {
    repository: CertificateRepository<'s, P>,
    snapshot: Option<CertificateStore>,
}

impl<'s, P: CryptoProvider> OcspResponder<'s, P> {
    pub fn new(repository: CertificateRepository<'s, P>) -> Self {
        Self {
            repository,
            snapshot: None,
        }
    }

    /// Load the store and begin answering. Fails with `Repository` when the
    /// repository or its store has not been initialized. Starting a running
    /// responder refreshes its snapshot.
    pub fn start(&mut self) -> Result<()> {
        let store = self.repository.load_store()?;
        info!(
            path = %self.repository.config().path.display(),
            identifier = %self.repository.config().identifier,
            certificates = store.len(),
            "OCSP responder started"
        );
        self.snapshot = Some(store);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.snapshot.take().is_some() {
            info!("OCSP responder stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn status(&self, serial: &str) -> Result<CertificateStatus> {
        let store = self
            .snapshot
            .as_ref()
            .ok_or_else(|| CaError::State("OCSP responder is not running".to_string()))?;
        let status = match store.find(serial) {
            Some(_) => CertificateStatus::Good,
            None => CertificateStatus::Unknown,
        };
        debug!(serial, %status, "answered status query");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::RepositoryConfiguration;
    use crate::distinguished_name::DistinguishedName;
    use crate::error::ErrorKind;
    use crate::provider::OpensslProvider;
    use crate::repository::RepositoryEntry;
    use crate::session::CryptoSession;
    use tempfile::TempDir;

    fn repository_config(dir: &TempDir) -> RepositoryConfiguration {
        RepositoryConfiguration {
            path: dir.path().join("TrustUsStore.db"),
            identifier: "TrustUs".to_string(),
        }
    }

    #[test]
    fn test_start_requires_initialized_repository() {
        let dir = TempDir::new().unwrap();
        let session = CryptoSession::open(OpensslProvider::new()).unwrap();
        let mut responder =
            OcspResponder::new(CertificateRepository::new(&session, repository_config(&dir)));
        let err = responder.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert!(!responder.is_running());
    }

    #[test]
    fn test_status_lifecycle() {
        let dir = TempDir::new().unwrap();
        let session = CryptoSession::open(OpensslProvider::new()).unwrap();
        let repository = CertificateRepository::new(&session, repository_config(&dir));
        repository.initialize().unwrap();
        repository
            .record(RepositoryEntry {
                serial: "5EED".to_string(),
                subject: DistinguishedName::new("Flight Ops"),
                issuer: DistinguishedName::new("Cleveland Certificate"),
                fingerprint: String::new(),
                not_after: String::new(),
                is_ca: false,
            })
            .unwrap();

        let mut responder = OcspResponder::new(repository);
        assert_eq!(responder.status("5EED").unwrap_err().kind(), ErrorKind::State);

        responder.start().unwrap();
        assert_eq!(responder.status("5eed").unwrap(), CertificateStatus::Good);
        assert_eq!(responder.status("BEEF").unwrap(), CertificateStatus::Unknown);

        responder.stop();
        assert!(!responder.is_running());
        assert!(responder.status("5EED").is_err());
    }
}
