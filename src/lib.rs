//! PKI Authority - a minimal file-based Certificate Authority
//!
//! Bootstraps a self-signed root CA, chains intermediate CAs beneath it and
//! issues end-entity certificates from certificate signing requests. Keys
//! live in password-protected keystore files; certificates and CSRs are
//! written as DER files.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed)
//!   └── Intermediate CA (signed by Root)
//!       └── End-entity certificate (signed by Intermediate, CA=false)
//! ```
//!
//! All cryptography goes through the [`provider::CryptoProvider`] trait.
//! [`provider::OpensslProvider`] implements it over OpenSSL. A
//! [`session::CryptoSession`] owns the provider for the lifetime of the
//! process and is borrowed by every component.
//!
//! # Example
//!
//! ```no_run
//! use pki_authority::ca_setup::CertificateAuthoritySetup;
//! use pki_authority::certificate_authority::CertificateAuthority;
//! use pki_authority::configs::{CertificateConfiguration, InstallConfig};
//! use pki_authority::key_generator::KeyGenerator;
//! use pki_authority::provider::OpensslProvider;
//! use pki_authority::session::CryptoSession;
//!
//! fn run() -> pki_authority::error::Result<()> {
//!     let session = CryptoSession::open(OpensslProvider::new())?;
//!
//!     let install = InstallConfig::from_file("ca.toml")?;
//!     CertificateAuthoritySetup::new(&session)
//!         .with_policy(install.setup)
//!         .install(&install.root, &install.intermediates)?;
//!
//!     let request = CertificateConfiguration::from_file("flight-ops.toml")?;
//!     KeyGenerator::new(&session).generate_key_pair(&request.key)?;
//!
//!     let mut authority = CertificateAuthority::new(&session);
//!     authority.submit_certificate_request(&request.key.certificate_request_file_name)?;
//!     let issued = authority.issue_certificate(&request)?;
//!     println!("issued serial {}", issued.summary.serial);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`configs`]: TOML configuration for CAs, keys and certificates
//! - [`hierarchy`]: validation of an installation before any key is made
//! - [`ca_setup`]: root and intermediate installation
//! - [`key_generator`]: end-entity keys and CSRs
//! - [`certificate_authority`]: CSR submission and issuance
//! - [`repository`] and [`ocsp`]: issued-certificate records and status
//!
//! # Error Handling
//!
//! Library operations return [`error::Result`]; [`error::CaError::kind`]
//! classifies a failure so callers can tell a wrong password from a missing
//! key or an unreadable request.

pub mod artifacts;
pub mod ca_setup;
pub mod certificate_authority;
pub mod configs;
pub mod distinguished_name;
pub mod error;
pub mod hierarchy;
pub mod key_generator;
pub mod ocsp;
pub mod provider;
pub mod repository;
pub mod session;
