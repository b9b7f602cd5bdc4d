use openssl::x509::X509;
use pki_authority::ca_setup::CertificateAuthoritySetup;
use pki_authority::certificate_authority::{CertificateAuthority, IssuanceState};
use pki_authority::configs::{
    CertificateAuthorityConfiguration, CertificateConfiguration, InstallConfig, KeyConfiguration,
    Password, SigningKeyReference,
};
use pki_authority::distinguished_name::DistinguishedName;
use pki_authority::error::ErrorKind;
use pki_authority::key_generator::KeyGenerator;
use pki_authority::ocsp::CertificateStatus;
use pki_authority::provider::{
    distinguished_name_from_x509, CryptoProvider, KeystoreMode, OpensslProvider,
};
use pki_authority::session::CryptoSession;
use std::path::Path;
use tempfile::TempDir;

fn install_config(dir: &Path) -> InstallConfig {
    let keys = dir.display();
    let toml = format!(
        r#"
        [root]
        key_label = "Root"
        keystore_file_name = "{keys}/ca.key"
        certificate_file_name = "{keys}/ca.cer"
        private_key_password = "P@ssw0rd"

        [root.distinguished_name]
        country = "US"
        state = "OH"
        locality = "Cleveland"
        organization = "Trust Us"
        organizational_unit = "Certificates"
        common_name = "Root Certificate"

        [root.repository]
        path = "{keys}/TrustUsStore.db"
        identifier = "TrustUs"

        [root.endpoints]
        cert_store_url = "http://certs.trustusca.net"
        ocsp_url = "http://ocsp.trustusca.net"

        [[intermediates]]
        key_label = "Cleveland"
        keystore_file_name = "{keys}/clevelandIca.key"
        certificate_file_name = "{keys}/clevelandIca.cer"
        private_key_password = "P@ssw0rd"

        [intermediates.distinguished_name]
        country = "US"
        state = "OH"
        locality = "Cleveland"
        organization = "Trust Us"
        organizational_unit = "Cleveland Office"
        common_name = "Cleveland Certificate"

        [intermediates.signing_key]
        label = "Root"
        keystore_file_name = "{keys}/ca.key"
        password = "P@ssw0rd"
        "#
    );
    toml::from_str(&toml).unwrap()
}

fn subscriber(dir: &Path, name: &str) -> CertificateConfiguration {
    let file = name.replace(' ', "");
    CertificateConfiguration {
        key: KeyConfiguration {
            key_label: format!("{}Key", file),
            keystore_file_name: dir.join("DuckAir.key"),
            certificate_request_file_name: dir.join(format!("{}.csr", file)),
            private_key_password: Password::new("QuackQuack"),
            distinguished_name: DistinguishedName::new(name)
                .country("US")
                .state("OH")
                .locality("Cleveland")
                .organization("Duck Airlines"),
        },
        certificate_file_name: dir.join(format!("{}.cer", file)),
        signing_key: SigningKeyReference {
            label: "Cleveland".to_string(),
            keystore_file_name: dir.join("clevelandIca.key"),
            password: Password::new("P@ssw0rd"),
        },
        validity_days: 365,
    }
}

fn read_certificate(path: &Path) -> X509 {
    X509::from_der(&std::fs::read(path).unwrap()).unwrap()
}

fn install(session: &CryptoSession<OpensslProvider>, config: &InstallConfig) {
    let report = CertificateAuthoritySetup::new(session)
        .with_policy(config.setup)
        .install(&config.root, &config.intermediates)
        .unwrap();
    assert!(report.is_complete());
}

#[test]
fn test_root_to_flight_ops_chain() {
    let dir = TempDir::new().unwrap();
    let session = CryptoSession::open(OpensslProvider::new()).unwrap();
    let config = install_config(dir.path());
    install(&session, &config);

    let root_cert = read_certificate(&config.root.certificate_file_name);
    let root_subject = distinguished_name_from_x509(root_cert.subject_name()).unwrap();
    assert_eq!(root_subject, config.root.distinguished_name);
    assert_eq!(
        distinguished_name_from_x509(root_cert.issuer_name()).unwrap(),
        root_subject
    );
    assert!(root_cert.verify(&root_cert.public_key().unwrap()).unwrap());

    let provider = session.provider();
    let root_keystore = provider
        .open_keystore(&config.root.keystore_file_name, KeystoreMode::ReadOnly)
        .unwrap();
    assert_eq!(root_keystore.labels(), vec!["Root"]);

    let cleveland = &config.intermediates[0];
    let cleveland_cert = read_certificate(&cleveland.certificate_file_name);
    assert_eq!(
        distinguished_name_from_x509(cleveland_cert.issuer_name()).unwrap(),
        root_subject
    );
    assert!(cleveland_cert.verify(&root_cert.public_key().unwrap()).unwrap());
    let cleveland_keystore = provider
        .open_keystore(&cleveland.keystore_file_name, KeystoreMode::ReadOnly)
        .unwrap();
    assert_eq!(cleveland_keystore.labels(), vec!["Cleveland"]);

    let flight_ops = subscriber(dir.path(), "Flight Ops");
    let csr = KeyGenerator::new(&session)
        .generate_key_pair(&flight_ops.key)
        .unwrap();

    let mut authority = CertificateAuthority::new(&session)
        .with_repository(config.root.repository.clone().unwrap());
    authority
        .submit_certificate_request(&flight_ops.key.certificate_request_file_name)
        .unwrap();
    let issued = authority.issue_certificate(&flight_ops).unwrap();
    assert_eq!(authority.state(), IssuanceState::Exported);

    let leaf = read_certificate(&flight_ops.certificate_file_name);
    let leaf_subject = distinguished_name_from_x509(leaf.subject_name()).unwrap();
    assert_eq!(leaf_subject.common_name, "Flight Ops");
    assert_eq!(leaf_subject, csr.subject);
    assert_eq!(
        leaf.public_key().unwrap().public_key_to_der().unwrap(),
        csr.public_key_der
    );
    assert_eq!(
        distinguished_name_from_x509(leaf.issuer_name()).unwrap(),
        cleveland.distinguished_name
    );
    assert!(leaf.verify(&cleveland_cert.public_key().unwrap()).unwrap());
    assert_eq!(issued.der, std::fs::read(&flight_ops.certificate_file_name).unwrap());

    authority.start_ocsp_responder().unwrap();
    assert_eq!(
        authority.certificate_status(&issued.summary.serial).unwrap(),
        CertificateStatus::Good
    );
    authority.stop_ocsp_responder();
}

#[test]
fn test_reinstall_keeps_existing_root() {
    let dir = TempDir::new().unwrap();
    let session = CryptoSession::open(OpensslProvider::new()).unwrap();
    let mut config = install_config(dir.path());
    install(&session, &config);
    let keystore = std::fs::read(&config.root.keystore_file_name).unwrap();
    let certificate = std::fs::read(&config.root.certificate_file_name).unwrap();

    config.setup.overwrite_certificates = true;
    let err = CertificateAuthoritySetup::new(&session)
        .with_policy(config.setup)
        .install(&config.root, &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Keystore);
    assert_eq!(std::fs::read(&config.root.keystore_file_name).unwrap(), keystore);
    assert_eq!(std::fs::read(&config.root.certificate_file_name).unwrap(), certificate);
}

#[test]
fn test_wrong_password_never_yields_key() {
    let dir = TempDir::new().unwrap();
    let session = CryptoSession::open(OpensslProvider::new()).unwrap();
    let config = install_config(dir.path());
    install(&session, &config);

    let provider = session.provider();
    let keystore = provider
        .open_keystore(&config.root.keystore_file_name, KeystoreMode::ReadOnly)
        .unwrap();
    for password in ["", "p@ssw0rd", "P@ssw0rd "] {
        let err = provider
            .load_private_key(&keystore, "Root", &Password::new(password))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}

#[test]
fn test_intermediate_chained_to_unknown_parent_rejected_upfront() {
    let dir = TempDir::new().unwrap();
    let session = CryptoSession::open(OpensslProvider::new()).unwrap();
    let config = install_config(dir.path());
    let mut orphan: CertificateAuthorityConfiguration = config.intermediates[0].clone();
    if let Some(signing_key) = orphan.signing_key.as_mut() {
        signing_key.keystore_file_name = dir.path().join("akron.key");
        signing_key.label = "Akron".to_string();
    }

    let err = CertificateAuthoritySetup::new(&session)
        .install(&config.root, &[orphan])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!config.root.keystore_file_name.exists());
    assert!(!config.root.certificate_file_name.exists());
}

#[test]
fn test_concurrent_independent_issuance() {
    let dir = TempDir::new().unwrap();
    let session = CryptoSession::open(OpensslProvider::new()).unwrap();
    let config = install_config(dir.path());
    install(&session, &config);

    let names = ["Flight Ops", "Ground Ops", "Cargo Ops", "Crew Scheduling"];
    let subscribers: Vec<_> = names
        .iter()
        .map(|name| subscriber(dir.path(), name))
        .collect();
    let repository = config.root.repository.clone().unwrap();

    std::thread::scope(|scope| {
        for subscriber in &subscribers {
            let session = &session;
            let repository = repository.clone();
            scope.spawn(move || {
                // every subscriber appends to the shared DuckAir keystore
                KeyGenerator::new(session)
                    .generate_key_pair(&subscriber.key)
                    .unwrap();
                let mut authority = CertificateAuthority::new(session).with_repository(repository);
                authority
                    .submit_certificate_request(&subscriber.key.certificate_request_file_name)
                    .unwrap();
                authority.issue_certificate(subscriber).unwrap();
            });
        }
    });

    let provider = session.provider();
    let keystore = provider
        .open_keystore(&subscribers[0].key.keystore_file_name, KeystoreMode::ReadOnly)
        .unwrap();
    let mut labels = keystore.labels();
    labels.sort_unstable();
    assert_eq!(
        labels,
        vec!["CargoOpsKey", "CrewSchedulingKey", "FlightOpsKey", "GroundOpsKey"]
    );

    for subscriber in &subscribers {
        let leaf = read_certificate(&subscriber.certificate_file_name);
        assert_eq!(
            distinguished_name_from_x509(leaf.subject_name()).unwrap(),
            subscriber.key.distinguished_name
        );
    }

    let mut authority = CertificateAuthority::new(&session).with_repository(repository);
    authority.start_ocsp_responder().unwrap();
    let store = pki_authority::repository::CertificateRepository::new(
        &session,
        config.root.repository.clone().unwrap(),
    )
    .load_store()
    .unwrap();
    assert_eq!(store.len(), names.len());
    for entry in store.entries() {
        assert_eq!(
            authority.certificate_status(&entry.serial).unwrap(),
            CertificateStatus::Good
        );
    }
}
