//! End-entity certificate issuance
//!
//! A [`CertificateAuthority`] takes one submitted CSR at a time through
//! `Submitted → Validated → Signed → Exported`. Any failure after
//! submission moves it to `Failed` and discards the request; a new request
//! must then be submitted. A request that reached `Exported` stays pending
//! and may be issued again, which yields a fresh certificate each time.
//!
//! The signing key is named per issuance by [`CertificateConfiguration`]
//! and may belong to the root or to any intermediate.

use crate::artifacts::{write_artifact, WriteMode};
use crate::configs::{CertificateConfiguration, RepositoryConfiguration};
use crate::error::{CaError, Result};
use crate::key_generator::CertificateSigningRequest;
use crate::ocsp::{CertificateStatus, OcspResponder};
use crate::provider::{
    export_certificate_bytes, CertificateIssuer, CertificateProfile, CertificateSummary,
    CryptoProvider, ExportFormat, KeystoreMode, SubjectName,
};
use crate::repository::{fingerprint, CertificateRepository, RepositoryEntry};
use crate::session::CryptoSession;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    /// Nothing submitted yet
    Idle,
    Submitted,
    Validated,
    Signed,
    Exported,
    Failed,
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate_file_name: PathBuf,
    pub summary: CertificateSummary,
    /// SHA-256 of `der`
    pub fingerprint: String,
    pub der: Vec<u8>,
}

struct PendingRequest<K> {
    csr: CertificateSigningRequest,
    public_key: K,
    /// Issued certificates carry this name byte for byte
    subject_der: Vec<u8>,
    signature_valid: bool,
}

pub struct CertificateAuthority<'s, P: CryptoProvider> {
    session: &'s CryptoSession<P>,
    pending: Option<PendingRequest<P::PublicKey>>,
    state: IssuanceState,
    repository: Option<RepositoryConfiguration>,
    responder: Option<OcspResponder<'s, P>>,
    overwrite: bool,
}

impl<'s, P: CryptoProvider> CertificateAuthority<'s, P> {
    pub fn new(session: &'s CryptoSession<P>) -> Self {
        Self {
            session,
            pending: None,
            state: IssuanceState::Idle,
            repository: None,
            responder: None,
            overwrite: true,
        }
    }

    /// Record every issued certificate in `repository`
    pub fn with_repository(mut self, repository: RepositoryConfiguration) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Whether issuance may replace an existing certificate file (default true)
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn state(&self) -> IssuanceState {
        self.state
    }

    /// Read and parse the CSR at `path`, replacing any pending request.
    pub fn submit_certificate_request(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<CertificateSigningRequest> {
        let path = path.as_ref();
        self.pending = None;
        match self.parse_request(path) {
            Ok(pending) => {
                let csr = pending.csr.clone();
                info!(subject = %csr.subject, path = %path.display(), "certificate request submitted");
                self.pending = Some(pending);
                self.state = IssuanceState::Submitted;
                Ok(csr)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "certificate request rejected");
                self.state = IssuanceState::Failed;
                Err(error)
            }
        }
    }

    /// Issue a certificate for the pending request, signed by the key that
    /// `config.signing_key` names.
    ///
    /// # Errors
    /// - `State` when no request is pending
    /// - `Parse` when the request's signature or subject is unusable
    /// - `Authentication` / `NotFound` when the signing key cannot be loaded
    /// - `Signing`, `Io`, `Repository` from the later steps
    pub fn issue_certificate(
        &mut self,
        config: &CertificateConfiguration,
    ) -> Result<IssuedCertificate> {
        let pending = self.pending.take().ok_or_else(|| {
            CaError::State(format!(
                "no certificate request is pending (state {:?})",
                self.state
            ))
        })?;
        match self.issue(&pending, config) {
            Ok(issued) => {
                self.state = IssuanceState::Exported;
                self.pending = Some(pending);
                info!(
                    subject = %issued.summary.subject,
                    issuer = %issued.summary.issuer,
                    serial = %issued.summary.serial,
                    path = %issued.certificate_file_name.display(),
                    "certificate issued"
                );
                Ok(issued)
            }
            Err(error) => {
                warn!(subject = %pending.csr.subject, %error, "issuance failed");
                self.state = IssuanceState::Failed;
                Err(error)
            }
        }
    }

    /// Start answering status queries from the configured repository. The
    /// repository must have been initialized by setup.
    pub fn start_ocsp_responder(&mut self) -> Result<()> {
        let repository = self.repository.clone().ok_or_else(|| {
            CaError::Configuration("no certificate repository is configured".to_string())
        })?;
        let mut responder = OcspResponder::new(CertificateRepository::new(self.session, repository));
        responder.start()?;
        if let Some(mut previous) = self.responder.replace(responder) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_ocsp_responder(&mut self) {
        if let Some(mut responder) = self.responder.take() {
            responder.stop();
        }
    }

    pub fn certificate_status(&self, serial: &str) -> Result<CertificateStatus> {
        match &self.responder {
            Some(responder) => responder.status(serial),
            None => Err(CaError::State("OCSP responder is not running".to_string())),
        }
    }

    fn parse_request(&self, path: &Path) -> Result<PendingRequest<P::PublicKey>> {
        let provider = self.session.provider();
        let encoded = fs::read(path).map_err(|e| CaError::io(path, e))?;
        let parsed = provider.parse_certificate_request(&encoded)?;
        let public_key_der = provider.encode_public_key(&parsed.public_key)?;
        Ok(PendingRequest {
            csr: CertificateSigningRequest {
                subject: parsed.subject,
                public_key_der,
                encoded,
            },
            public_key: parsed.public_key,
            subject_der: parsed.subject_der,
            signature_valid: parsed.signature_valid,
        })
    }

    fn issue(
        &mut self,
        pending: &PendingRequest<P::PublicKey>,
        config: &CertificateConfiguration,
    ) -> Result<IssuedCertificate> {
        if !pending.signature_valid {
            return Err(CaError::Parse {
                what: "certificate request",
                reason: "signature does not verify under the requested public key".to_string(),
            });
        }
        if pending.csr.subject.common_name.trim().is_empty() {
            return Err(CaError::Parse {
                what: "certificate request",
                reason: "subject has no common name".to_string(),
            });
        }
        config.validate()?;
        self.advance(IssuanceState::Validated);

        let session = self.session;
        let provider = session.provider();
        let signing = &config.signing_key;
        let keystore = session.open_keystore(&signing.keystore_file_name, KeystoreMode::ReadOnly)?;
        let signing_key = provider.load_private_key(&*keystore, &signing.label, &signing.password);
        session.close_keystore(keystore)?;
        let signing_key = signing_key?;

        let profile = CertificateProfile::end_entity(config.validity_days);
        let mut certificate = provider.build_certificate(
            &pending.public_key,
            SubjectName::Encoded(&pending.subject_der),
            CertificateIssuer::SignedBy(&signing_key),
            &profile,
        )?;
        provider.sign_certificate(&mut certificate, &signing_key)?;
        provider.release(signing_key);
        self.advance(IssuanceState::Signed);

        let der = export_certificate_bytes(provider, &certificate, ExportFormat::Der)?;
        let summary = provider.describe_certificate(&certificate)?;
        provider.release(certificate);
        let mode = if self.overwrite {
            WriteMode::Replace
        } else {
            WriteMode::CreateNew
        };
        write_artifact(&config.certificate_file_name, &der, mode)?;

        let fingerprint = fingerprint(&der);
        if let Some(repository) = &self.repository {
            CertificateRepository::new(session, repository.clone()).record(RepositoryEntry {
                serial: summary.serial.clone(),
                subject: summary.subject.clone(),
                issuer: summary.issuer.clone(),
                fingerprint: fingerprint.clone(),
                not_after: summary.not_after.clone(),
                is_ca: summary.is_ca,
            })?;
        }

        Ok(IssuedCertificate {
            certificate_file_name: config.certificate_file_name.clone(),
            summary,
            fingerprint,
            der,
        })
    }

    fn advance(&mut self, state: IssuanceState) {
        debug!(from = ?self.state, to = ?state, "issuance state");
        self.state = state;
    }
}
