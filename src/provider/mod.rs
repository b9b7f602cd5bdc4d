//! Cryptographic Provider interface
//!
//! The orchestration layer (setup, key generation, issuance) talks to key
//! material, keystores and certificates only through [`CryptoProvider`].
//! Handles are opaque associated types; dropping a handle releases it, and
//! [`CryptoProvider::release`] is the explicit form of that.
//!
//! [`OpensslProvider`] is the implementation shipped with the crate.

mod openssl_provider;

pub use openssl_provider::{
    distinguished_name_from_x509, OpensslCertificate, OpensslCertificateRequest, OpensslKeyPair,
    OpensslKeystore, OpensslProvider,
};

use crate::configs::{Password, ServiceEndpoints};
use crate::distinguished_name::DistinguishedName;
use crate::error::{CaError, Result};
use std::path::Path;

/// RSA modulus length used for every key the authority generates
pub const RSA_KEY_BITS: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: u32 },
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        KeyAlgorithm::Rsa { bits: RSA_KEY_BITS }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreMode {
    /// Create a keystore that must not exist yet
    CreateNew,
    /// Open an existing keystore without write access
    ReadOnly,
    /// Open an existing keystore for adding keys, creating it if absent
    Append,
}

impl KeystoreMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, KeystoreMode::ReadOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Der,
    Pem,
}

/// Who signs a certificate under construction
pub enum CertificateIssuer<'a, K> {
    /// Issuer name equals the subject; signed by the subject's own key
    SelfSigned,
    /// Issuer name taken from the certificate attached to this key
    SignedBy(&'a K),
}

/// Subject name of a certificate under construction
#[derive(Debug, Clone, Copy)]
pub enum SubjectName<'a> {
    /// Encode the naming attributes in their fixed order
    Attributes(&'a DistinguishedName),
    /// DER X.509 Name copied as-is, e.g. from a certificate request
    Encoded(&'a [u8]),
}

/// Certificate kind and the extensions that come with it
#[derive(Debug, Clone)]
pub struct CertificateProfile<'a> {
    pub ca: bool,
    pub path_length: Option<u32>,
    pub validity_days: u32,
    pub endpoints: Option<&'a ServiceEndpoints>,
}

impl<'a> CertificateProfile<'a> {
    pub fn root(validity_days: u32, endpoints: &'a ServiceEndpoints) -> Self {
        Self {
            ca: true,
            path_length: None,
            validity_days,
            endpoints: Some(endpoints),
        }
    }

    pub fn intermediate(validity_days: u32, path_length: u32) -> Self {
        Self {
            ca: true,
            path_length: Some(path_length),
            validity_days,
            endpoints: None,
        }
    }

    pub fn end_entity(validity_days: u32) -> Self {
        Self {
            ca: false,
            path_length: None,
            validity_days,
            endpoints: None,
        }
    }
}

/// Contents of a decoded certificate request
#[derive(Debug)]
pub struct ParsedRequest<K> {
    pub public_key: K,
    pub subject: DistinguishedName,
    /// DER of the subject name exactly as the requester signed it
    pub subject_der: Vec<u8>,
    /// Whether the request's self-signature verifies under `public_key`
    pub signature_valid: bool,
}

/// Identifying fields of a signed certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Serial number, upper-case hex
    pub serial: String,
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub is_ca: bool,
    pub not_after: String,
}

pub trait CryptoProvider {
    type KeyPair;
    type PublicKey;
    type Certificate;
    type CertificateRequest;
    type Keystore;

    /// Process-wide engine setup, run once by the owning session
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Engine teardown, run when the owning session ends
    fn shutdown(&self) {}

    fn generate_key_pair(&self, algorithm: KeyAlgorithm, label: &str) -> Result<Self::KeyPair>;

    fn key_label<'k>(&self, key: &'k Self::KeyPair) -> &'k str;

    fn public_key(&self, key: &Self::KeyPair) -> Result<Self::PublicKey>;

    /// DER SubjectPublicKeyInfo of `key`
    fn encode_public_key(&self, key: &Self::PublicKey) -> Result<Vec<u8>>;

    fn open_keystore(&self, path: &Path, mode: KeystoreMode) -> Result<Self::Keystore>;

    /// Close a keystore, persisting any pending changes
    fn close_keystore(&self, keystore: Self::Keystore) -> Result<()>;

    fn store_private_key(
        &self,
        keystore: &mut Self::Keystore,
        key: &Self::KeyPair,
        password: &Password,
    ) -> Result<()>;

    /// Fails with `Authentication` on a wrong password and `NotFound` when
    /// the label is absent.
    fn load_private_key(
        &self,
        keystore: &Self::Keystore,
        label: &str,
        password: &Password,
    ) -> Result<Self::KeyPair>;

    /// Attach a signed certificate to the key stored under `label`
    fn attach_certificate(
        &self,
        keystore: &mut Self::Keystore,
        label: &str,
        certificate: &Self::Certificate,
    ) -> Result<()>;

    fn build_certificate(
        &self,
        subject_key: &Self::PublicKey,
        subject: SubjectName<'_>,
        issuer: CertificateIssuer<'_, Self::KeyPair>,
        profile: &CertificateProfile<'_>,
    ) -> Result<Self::Certificate>;

    fn sign_certificate(
        &self,
        certificate: &mut Self::Certificate,
        signing_key: &Self::KeyPair,
    ) -> Result<()>;

    /// Two-call export: with `None` returns the encoded size; with a buffer
    /// of exactly that size fills it and returns the bytes written.
    fn export_certificate(
        &self,
        certificate: &Self::Certificate,
        format: ExportFormat,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize>;

    fn describe_certificate(&self, certificate: &Self::Certificate) -> Result<CertificateSummary>;

    fn create_certificate_request(
        &self,
        key: &Self::KeyPair,
        subject: &DistinguishedName,
    ) -> Result<Self::CertificateRequest>;

    /// Same two-call protocol as [`CryptoProvider::export_certificate`]
    fn export_certificate_request(
        &self,
        request: &Self::CertificateRequest,
        format: ExportFormat,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize>;

    /// Decode a DER or PEM certificate request
    fn parse_certificate_request(&self, bytes: &[u8]) -> Result<ParsedRequest<Self::PublicKey>>;

    /// Destroy a handle. Ownership makes a second destroy impossible.
    fn release<H>(&self, handle: H) {
        drop(handle);
    }
}

/// Export a certificate with the query-then-fill protocol
pub fn export_certificate_bytes<P: CryptoProvider>(
    provider: &P,
    certificate: &P::Certificate,
    format: ExportFormat,
) -> Result<Vec<u8>> {
    let size = provider.export_certificate(certificate, format, None)?;
    let mut buffer = vec![0u8; size];
    let written = provider.export_certificate(certificate, format, Some(&mut buffer))?;
    check_export_size("certificate", size, written)?;
    Ok(buffer)
}

/// Export a certificate request with the query-then-fill protocol
pub fn export_request_bytes<P: CryptoProvider>(
    provider: &P,
    request: &P::CertificateRequest,
    format: ExportFormat,
) -> Result<Vec<u8>> {
    let size = provider.export_certificate_request(request, format, None)?;
    let mut buffer = vec![0u8; size];
    let written = provider.export_certificate_request(request, format, Some(&mut buffer))?;
    check_export_size("certificate request", size, written)?;
    Ok(buffer)
}

fn check_export_size(what: &str, expected: usize, written: usize) -> Result<()> {
    if expected != written {
        return Err(CaError::Provider(format!(
            "{} export wrote {} bytes, size query reported {}",
            what, written, expected
        )));
    }
    Ok(())
}

/// Fill `buffer` from `encoded`, or report the size when no buffer is given.
pub(crate) fn fill_export_buffer(encoded: &[u8], buffer: Option<&mut [u8]>) -> Result<usize> {
    match buffer {
        None => Ok(encoded.len()),
        Some(buffer) if buffer.len() == encoded.len() => {
            buffer.copy_from_slice(encoded);
            Ok(encoded.len())
        }
        Some(buffer) => Err(CaError::Provider(format!(
            "export buffer is {} bytes, encoding needs {}",
            buffer.len(),
            encoded.len()
        ))),
    }
}
