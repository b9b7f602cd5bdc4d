//! PKI Authority command line
//!
//! ```bash
//! pki-authority install --config ca.toml
//! pki-authority keygen --config flight-ops.toml
//! pki-authority issue --config flight-ops.toml --repository keys/TrustUsStore.db --identifier TrustUs
//! pki-authority ocsp --repository keys/TrustUsStore.db --identifier TrustUs --serial 5EED
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pki_authority::ca_setup::CertificateAuthoritySetup;
use pki_authority::certificate_authority::CertificateAuthority;
use pki_authority::configs::{CertificateConfiguration, InstallConfig, KeyConfiguration, RepositoryConfiguration};
use pki_authority::key_generator::KeyGenerator;
use pki_authority::provider::OpensslProvider;
use pki_authority::session::CryptoSession;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pki-authority")]
#[command(author, version, about = "Minimal file-based Certificate Authority", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the root CA and its intermediates
    Install {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Generate an end-entity key pair and its certificate signing request
    Keygen {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Issue a certificate for the CSR named in a certificate configuration
    Issue {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        repository: RepositoryArgs,
        /// Refuse to replace an existing certificate file
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Answer a certificate status query from the repository
    Ocsp {
        #[command(flatten)]
        repository: RepositoryArgs,
        /// Serial number in hex
        #[arg(short, long)]
        serial: String,
    },
}

#[derive(Args)]
struct RepositoryArgs {
    /// Certificate repository file
    #[arg(long, requires = "identifier")]
    repository: Option<PathBuf>,
    /// Store identifier inside the repository
    #[arg(long, requires = "repository")]
    identifier: Option<String>,
}

impl RepositoryArgs {
    fn into_config(self) -> Option<RepositoryConfiguration> {
        match (self.repository, self.identifier) {
            (Some(path), Some(identifier)) => Some(RepositoryConfiguration { path, identifier }),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let session = CryptoSession::open(OpensslProvider::new())
        .context("Failed to initialize the cryptographic provider")?;

    match cli.command {
        Commands::Install { config } => install(&session, config),
        Commands::Keygen { config } => keygen(&session, config),
        Commands::Issue {
            config,
            repository,
            no_overwrite,
        } => issue(&session, config, repository.into_config(), !no_overwrite),
        Commands::Ocsp { repository, serial } => {
            let Some(repository) = repository.into_config() else {
                bail!("--repository and --identifier are required");
            };
            status(&session, repository, &serial)
        }
    }
}

fn install(session: &CryptoSession<OpensslProvider>, path: PathBuf) -> Result<()> {
    let config = InstallConfig::from_file(&path)
        .with_context(|| format!("Failed to load installation from {}", path.display()))?;
    let report = CertificateAuthoritySetup::new(session)
        .with_policy(config.setup)
        .install(&config.root, &config.intermediates)
        .context("Installation failed")?;

    println!(
        "✓ Root CA '{}' written to {}",
        report.root.label,
        report.root.certificate_file_name.display()
    );
    for installed in &report.intermediates {
        println!(
            "✓ Intermediate CA '{}' written to {}",
            installed.label,
            installed.certificate_file_name.display()
        );
    }
    for failure in &report.failures {
        println!("✗ Intermediate CA '{}': {}", failure.label, failure.error);
    }
    if !report.is_complete() {
        bail!("{} intermediate CA(s) were not installed", report.failures.len());
    }
    Ok(())
}

fn keygen(session: &CryptoSession<OpensslProvider>, path: PathBuf) -> Result<()> {
    let config = KeyConfiguration::from_file(&path)
        .with_context(|| format!("Failed to load key configuration from {}", path.display()))?;
    let csr = KeyGenerator::new(session)
        .generate_key_pair(&config)
        .context("Key generation failed")?;
    println!(
        "✓ Key '{}' stored in {}",
        config.key_label,
        config.keystore_file_name.display()
    );
    println!(
        "✓ Certificate request for '{}' written to {}",
        csr.subject,
        config.certificate_request_file_name.display()
    );
    Ok(())
}

fn issue(
    session: &CryptoSession<OpensslProvider>,
    path: PathBuf,
    repository: Option<RepositoryConfiguration>,
    overwrite: bool,
) -> Result<()> {
    let config = CertificateConfiguration::from_file(&path)
        .with_context(|| format!("Failed to load certificate configuration from {}", path.display()))?;
    let mut authority = CertificateAuthority::new(session).with_overwrite(overwrite);
    if let Some(repository) = repository {
        authority = authority.with_repository(repository);
    }
    authority
        .submit_certificate_request(&config.key.certificate_request_file_name)
        .context("Certificate request rejected")?;
    let issued = authority
        .issue_certificate(&config)
        .context("Issuance failed")?;
    println!(
        "✓ Certificate for '{}' issued by '{}' written to {}",
        issued.summary.subject,
        issued.summary.issuer,
        issued.certificate_file_name.display()
    );
    println!("  serial      {}", issued.summary.serial);
    println!("  fingerprint {}", issued.fingerprint);
    Ok(())
}

fn status(
    session: &CryptoSession<OpensslProvider>,
    repository: RepositoryConfiguration,
    serial: &str,
) -> Result<()> {
    let mut authority = CertificateAuthority::new(session).with_repository(repository);
    authority
        .start_ocsp_responder()
        .context("Failed to start the OCSP responder")?;
    let status = authority.certificate_status(serial)?;
    authority.stop_ocsp_responder();
    println!("{}: {}", serial, status);
    Ok(())
}
