//! Certificate Authority installation
//!
//! Bootstraps a root CA, initializes its certificate repository and chains
//! the configured intermediate CAs beneath it.
//!
//! # Hierarchy
//! ```text
//! Root CA (self-signed, keystore created new)
//!   ├── Intermediate CA (signed by Root)
//!   │     └── Intermediate CA (signed by the intermediate above)
//!   └── Intermediate CA (signed by Root)
//! ```
//!
//! The whole installation is validated as a [`TrustHierarchy`] before any
//! key is generated. Each CA's key is stored in a keystore that must not
//! exist yet, with its certificate attached, and the DER certificate is
//! written to the configured file.
//!
//! # Failure handling
//! Files written by CAs that completed stay in place when a later CA fails.
//! With [`FailurePolicy::FailFast`] the first failed intermediate ends the
//! installation; with [`FailurePolicy::Continue`] it is recorded in the
//! [`InstallReport`] and every intermediate below it is skipped.

use crate::artifacts::{write_artifact, WriteMode};
use crate::configs::{CertificateAuthorityConfiguration, FailurePolicy, SetupPolicy};
use crate::error::{CaError, Result};
use crate::hierarchy::{HierarchyNode, Parent, TrustHierarchy};
use crate::provider::{
    export_certificate_bytes, CertificateIssuer, CertificateProfile, CertificateSummary,
    CryptoProvider, ExportFormat, KeyAlgorithm, KeystoreMode, SubjectName,
};
use crate::repository::CertificateRepository;
use crate::session::CryptoSession;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

/// A CA created by [`CertificateAuthoritySetup::install`]
#[derive(Debug, Clone)]
pub struct InstalledAuthority {
    pub label: String,
    pub certificate_file_name: PathBuf,
    pub summary: CertificateSummary,
}

#[derive(Debug)]
pub struct IntermediateFailure {
    pub label: String,
    pub error: CaError,
}

#[derive(Debug)]
pub struct InstallReport {
    pub root: InstalledAuthority,
    /// Intermediates installed, in installation order
    pub intermediates: Vec<InstalledAuthority>,
    /// Intermediates that failed or were skipped; empty under fail-fast
    pub failures: Vec<IntermediateFailure>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct CertificateAuthoritySetup<'s, P: CryptoProvider> {
    session: &'s CryptoSession<P>,
    policy: SetupPolicy,
}

impl<'s, P: CryptoProvider> CertificateAuthoritySetup<'s, P> {
    pub fn new(session: &'s CryptoSession<P>) -> Self {
        Self {
            session,
            policy: SetupPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SetupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Install `root` and then each of `intermediates` in order.
    ///
    /// # Errors
    /// - `Configuration` when the hierarchy does not validate
    /// - `Keystore` when the root keystore already exists
    /// - the error of the first failed intermediate, wrapped in
    ///   [`CaError::Intermediate`], under fail-fast
    pub fn install(
        &self,
        root: &CertificateAuthorityConfiguration,
        intermediates: &[CertificateAuthorityConfiguration],
    ) -> Result<InstallReport> {
        let hierarchy = TrustHierarchy::build(root, intermediates)?;
        info!(
            root = %root.key_label,
            intermediates = intermediates.len(),
            policy = ?self.policy.on_failure,
            "installing certificate authority"
        );

        let root_installed = self.install_root(hierarchy.root())?;

        if let Some(repository) = &root.repository {
            CertificateRepository::new(self.session, repository.clone()).initialize()?;
        }

        let mut report = InstallReport {
            root: root_installed,
            intermediates: Vec::new(),
            failures: Vec::new(),
        };
        let mut failed = vec![false; hierarchy.intermediates().len()];

        for (index, node) in hierarchy.intermediates().iter().enumerate() {
            let outcome = match node.parent() {
                Parent::Intermediate(parent) if failed[parent] => Err(CaError::Configuration(format!(
                    "skipped because its parent '{}' failed",
                    hierarchy.intermediates()[parent].label()
                ))),
                _ => self.install_intermediate(node),
            };
            match outcome {
                Ok(installed) => report.intermediates.push(installed),
                Err(error) => {
                    warn!(label = %node.label(), %error, "intermediate CA failed");
                    if self.policy.on_failure == FailurePolicy::FailFast {
                        return Err(CaError::Intermediate {
                            label: node.label().to_string(),
                            source: Box::new(error),
                        });
                    }
                    failed[index] = true;
                    report.failures.push(IntermediateFailure {
                        label: node.label().to_string(),
                        error,
                    });
                }
            }
        }

        info!(
            installed = report.intermediates.len(),
            failed = report.failures.len(),
            "installation finished"
        );
        Ok(report)
    }

    fn install_root(
        &self,
        config: &CertificateAuthorityConfiguration,
    ) -> Result<InstalledAuthority> {
        let profile = CertificateProfile::root(config.validity_days(), &config.endpoints);
        let installed = self.create_authority(config, None, &profile)?;
        info!(
            label = %installed.label,
            subject = %installed.summary.subject,
            certificate = %installed.certificate_file_name.display(),
            "root CA installed"
        );
        Ok(installed)
    }

    fn install_intermediate(&self, node: &HierarchyNode<'_>) -> Result<InstalledAuthority> {
        let config = node.config();
        let signing_key = config.signing_key.as_ref().ok_or_else(|| {
            CaError::Configuration(format!(
                "intermediate '{}' must declare a signing key",
                config.key_label
            ))
        })?;
        let provider = self.session.provider();

        let parent_keystore = self
            .session
            .open_keystore(&signing_key.keystore_file_name, KeystoreMode::ReadOnly)?;
        let parent_key =
            provider.load_private_key(&*parent_keystore, &signing_key.label, &signing_key.password);
        self.session.close_keystore(parent_keystore)?;
        let parent_key = parent_key?;

        let profile = CertificateProfile::intermediate(config.validity_days(), node.path_length());
        let installed = self.create_authority(config, Some(&parent_key), &profile);
        provider.release(parent_key);
        let installed = installed?;
        info!(
            label = %installed.label,
            issuer = %installed.summary.issuer,
            path_length = node.path_length(),
            certificate = %installed.certificate_file_name.display(),
            "intermediate CA installed"
        );
        Ok(installed)
    }

    /// Create a CA key in a new keystore and certify it, self-signed when
    /// `parent` is `None`.
    fn create_authority(
        &self,
        config: &CertificateAuthorityConfiguration,
        parent: Option<&P::KeyPair>,
        profile: &CertificateProfile<'_>,
    ) -> Result<InstalledAuthority> {
        let write_mode = if self.policy.overwrite_certificates {
            WriteMode::Replace
        } else {
            WriteMode::CreateNew
        };
        if write_mode == WriteMode::CreateNew && config.certificate_file_name.exists() {
            return Err(CaError::io(
                &config.certificate_file_name,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "certificate file already exists",
                ),
            ));
        }

        let provider = self.session.provider();
        let mut keystore = self
            .session
            .open_keystore(&config.keystore_file_name, KeystoreMode::CreateNew)?;
        let key = provider.generate_key_pair(KeyAlgorithm::default(), &config.key_label)?;
        provider.store_private_key(&mut *keystore, &key, &config.private_key_password)?;

        let public_key = provider.public_key(&key)?;
        let (issuer, signer) = match parent {
            Some(parent) => (CertificateIssuer::SignedBy(parent), parent),
            None => (CertificateIssuer::SelfSigned, &key),
        };
        let subject = SubjectName::Attributes(&config.distinguished_name);
        let mut certificate = provider.build_certificate(&public_key, subject, issuer, profile)?;
        provider.sign_certificate(&mut certificate, signer)?;
        provider.attach_certificate(&mut *keystore, &config.key_label, &certificate)?;

        let der = export_certificate_bytes(provider, &certificate, ExportFormat::Der)?;
        let summary = provider.describe_certificate(&certificate)?;
        self.session.close_keystore(keystore)?;
        write_artifact(&config.certificate_file_name, &der, write_mode)?;

        provider.release(certificate);
        provider.release(public_key);
        provider.release(key);
        Ok(InstalledAuthority {
            label: config.key_label.clone(),
            certificate_file_name: config.certificate_file_name.clone(),
            summary,
        })
    }
}
