//! End-entity key generation
//!
//! Produces an RSA key pair for a subscriber, stores it in the subscriber's
//! keystore and writes a DER certificate signing request next to it. The
//! request is self-signed with the new key so the authority can check
//! proof of possession when it is submitted.

use crate::artifacts::{write_artifact, WriteMode};
use crate::configs::KeyConfiguration;
use crate::distinguished_name::DistinguishedName;
use crate::error::Result;
use crate::provider::{export_request_bytes, CryptoProvider, ExportFormat, KeyAlgorithm, KeystoreMode};
use crate::session::CryptoSession;
use tracing::info;

/// A certificate signing request as seen by the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSigningRequest {
    pub subject: DistinguishedName,
    /// DER SubjectPublicKeyInfo of the requested key
    pub public_key_der: Vec<u8>,
    /// Encoded request as written to or read from disk
    pub encoded: Vec<u8>,
}

pub struct KeyGenerator<'s, P: CryptoProvider> {
    session: &'s CryptoSession<P>,
}

impl<'s, P: CryptoProvider> KeyGenerator<'s, P> {
    pub fn new(session: &'s CryptoSession<P>) -> Self {
        Self { session }
    }

    /// Generate a key pair for `config` and write its CSR.
    ///
    /// The keystore is created if absent and appended to otherwise; a label
    /// already present in it is a `Keystore` error.
    pub fn generate_key_pair(&self, config: &KeyConfiguration) -> Result<CertificateSigningRequest> {
        config.validate()?;
        let provider = self.session.provider();

        let key = provider.generate_key_pair(KeyAlgorithm::default(), &config.key_label)?;
        let mut keystore = self
            .session
            .open_keystore(&config.keystore_file_name, KeystoreMode::Append)?;
        provider.store_private_key(&mut *keystore, &key, &config.private_key_password)?;
        self.session.close_keystore(keystore)?;
        info!(
            label = %config.key_label,
            keystore = %config.keystore_file_name.display(),
            "stored private key"
        );

        let request = provider.create_certificate_request(&key, &config.distinguished_name)?;
        let encoded = export_request_bytes(provider, &request, ExportFormat::Der)?;
        write_artifact(&config.certificate_request_file_name, &encoded, WriteMode::Replace)?;
        info!(
            subject = %config.distinguished_name,
            path = %config.certificate_request_file_name.display(),
            "wrote certificate signing request"
        );

        let public_key_der = provider.encode_public_key(&provider.public_key(&key)?)?;
        provider.release(request);
        provider.release(key);

        Ok(CertificateSigningRequest {
            subject: config.distinguished_name.clone(),
            public_key_der,
            encoded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::Password;
    use crate::error::ErrorKind;
    use crate::provider::OpensslProvider;
    use std::path::Path;
    use tempfile::TempDir;

    fn flight_ops(dir: &Path) -> KeyConfiguration {
        KeyConfiguration {
            key_label: "DuckAirlinesKey".to_string(),
            keystore_file_name: dir.join("DuckAir.key"),
            certificate_request_file_name: dir.join("FlightOps.csr"),
            private_key_password: Password::new("QuackQuack"),
            distinguished_name: DistinguishedName::new("Flight Ops")
                .country("US")
                .state("OH")
                .locality("Cleveland")
                .organization("Duck Airlines")
                .organizational_unit("Flight Operations"),
        }
    }

    #[test]
    fn test_generate_writes_keystore_and_request() {
        let dir = TempDir::new().unwrap();
        let session = CryptoSession::open(OpensslProvider::new()).unwrap();
        let config = flight_ops(dir.path());

        let csr = KeyGenerator::new(&session).generate_key_pair(&config).unwrap();
        assert_eq!(csr.subject.common_name, "Flight Ops");
        assert_eq!(std::fs::read(&config.certificate_request_file_name).unwrap(), csr.encoded);

        let provider = session.provider();
        let parsed = provider.parse_certificate_request(&csr.encoded).unwrap();
        assert!(parsed.signature_valid);
        assert_eq!(parsed.subject, config.distinguished_name);
        assert_eq!(provider.encode_public_key(&parsed.public_key).unwrap(), csr.public_key_der);

        let keystore = provider
            .open_keystore(&config.keystore_file_name, KeystoreMode::ReadOnly)
            .unwrap();
        assert_eq!(keystore.labels(), vec!["DuckAirlinesKey"]);
        let key = provider
            .load_private_key(&keystore, "DuckAirlinesKey", &config.private_key_password)
            .unwrap();
        assert_eq!(
            provider.encode_public_key(&provider.public_key(&key).unwrap()).unwrap(),
            csr.public_key_der
        );
    }

    #[test]
    fn test_second_key_appends_to_keystore() {
        let dir = TempDir::new().unwrap();
        let session = CryptoSession::open(OpensslProvider::new()).unwrap();
        let generator = KeyGenerator::new(&session);
        let config = flight_ops(dir.path());
        generator.generate_key_pair(&config).unwrap();

        let mut ground_ops = config.clone();
        ground_ops.key_label = "GroundOpsKey".to_string();
        ground_ops.certificate_request_file_name = dir.path().join("GroundOps.csr");
        ground_ops.distinguished_name = DistinguishedName::new("Ground Ops");
        generator.generate_key_pair(&ground_ops).unwrap();

        let keystore = session
            .provider()
            .open_keystore(&config.keystore_file_name, KeystoreMode::ReadOnly)
            .unwrap();
        assert_eq!(keystore.labels(), vec!["DuckAirlinesKey", "GroundOpsKey"]);

        let err = generator.generate_key_pair(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Keystore);
    }

    #[test]
    fn test_empty_common_name_rejected() {
        let dir = TempDir::new().unwrap();
        let session = CryptoSession::open(OpensslProvider::new()).unwrap();
        let mut config = flight_ops(dir.path());
        config.distinguished_name.common_name = String::new();

        let err = KeyGenerator::new(&session).generate_key_pair(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!config.keystore_file_name.exists());
    }

    #[test]
    fn test_unwritable_request_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        let session = CryptoSession::open(OpensslProvider::new()).unwrap();
        let mut config = flight_ops(dir.path());
        config.certificate_request_file_name = dir.path().join("missing").join("FlightOps.csr");

        let err = KeyGenerator::new(&session).generate_key_pair(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
