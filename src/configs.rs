use crate::distinguished_name::DistinguishedName;
use crate::error::{CaError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A private-key password. Never printed, zeroized on drop.
#[derive(Deserialize)]
#[serde(from = "String")]
pub struct Password(SecretString);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::new(password.into().into_boxed_str()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<String> for Password {
    fn from(password: String) -> Self {
        Self::new(password)
    }
}

impl Clone for Password {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Identity of the key that signs a certificate
#[derive(Debug, Deserialize, Clone)]
pub struct SigningKeyReference {
    pub label: String,
    pub keystore_file_name: PathBuf,
    pub password: Password,
}

impl SigningKeyReference {
    fn validate(&self, owner: &str) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(CaError::Configuration(format!(
                "'{}' has an empty signing key label",
                owner
            )));
        }
        require_path(&self.keystore_file_name, "signing keystore", owner)?;
        if self.password.is_empty() {
            return Err(CaError::Configuration(format!(
                "'{}' has an empty signing key password",
                owner
            )));
        }
        Ok(())
    }
}

/// Service URLs copied into the root certificate. Opaque strings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceEndpoints {
    #[serde(default)]
    pub cert_store_url: Option<String>,
    #[serde(default)]
    pub ocsp_url: Option<String>,
    #[serde(default)]
    pub revocation_list_url: Option<String>,
}

impl ServiceEndpoints {
    pub fn is_empty(&self) -> bool {
        self.cert_store_url.is_none() && self.ocsp_url.is_none() && self.revocation_list_url.is_none()
    }
}

/// Location of the certificate repository: a file plus the logical store
/// identifier inside it
#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfiguration {
    pub path: PathBuf,
    pub identifier: String,
}

/// A CA node in the hierarchy: the root (no `signing_key`) or an
/// intermediate (with `signing_key`)
#[derive(Debug, Deserialize, Clone)]
pub struct CertificateAuthorityConfiguration {
    pub key_label: String,
    pub keystore_file_name: PathBuf,
    pub certificate_file_name: PathBuf,
    pub private_key_password: Password,
    pub distinguished_name: DistinguishedName,
    #[serde(default)]
    pub signing_key: Option<SigningKeyReference>,
    #[serde(default)]
    pub repository: Option<RepositoryConfiguration>,
    #[serde(default)]
    pub endpoints: ServiceEndpoints,
    #[serde(default)]
    pub validity_days: Option<u32>,
}

impl CertificateAuthorityConfiguration {
    pub fn is_root(&self) -> bool {
        self.signing_key.is_none()
    }

    pub fn validity_days(&self) -> u32 {
        match self.validity_days {
            Some(days) => days,
            None if self.is_root() => default_root_validity(),
            None => default_intermediate_validity(),
        }
    }

    /// Validate as the root of an installation
    pub fn validate_root(&self) -> Result<()> {
        self.validate_common()?;
        if self.signing_key.is_some() {
            return Err(CaError::Configuration(format!(
                "root '{}' must not declare a signing key",
                self.key_label
            )));
        }
        if let Some(repository) = &self.repository {
            require_path(&repository.path, "repository", &self.key_label)?;
            if repository.identifier.trim().is_empty() {
                return Err(CaError::Configuration(format!(
                    "root '{}' has an empty repository identifier",
                    self.key_label
                )));
            }
        }
        Ok(())
    }

    /// Validate as an intermediate CA
    pub fn validate_intermediate(&self) -> Result<()> {
        self.validate_common()?;
        let signing_key = self.signing_key.as_ref().ok_or_else(|| {
            CaError::Configuration(format!(
                "intermediate '{}' must declare a signing key",
                self.key_label
            ))
        })?;
        signing_key.validate(&self.key_label)?;
        if self.repository.is_some() || !self.endpoints.is_empty() {
            return Err(CaError::Configuration(format!(
                "repository and service endpoints belong to the root, not '{}'",
                self.key_label
            )));
        }
        Ok(())
    }

    fn validate_common(&self) -> Result<()> {
        if self.key_label.trim().is_empty() {
            return Err(CaError::Configuration(format!(
                "CA '{}' has an empty key label",
                self.distinguished_name.common_name
            )));
        }
        require_path(&self.keystore_file_name, "keystore", &self.key_label)?;
        require_path(&self.certificate_file_name, "certificate", &self.key_label)?;
        if self.private_key_password.is_empty() {
            return Err(CaError::Configuration(format!(
                "CA '{}' has an empty private key password",
                self.key_label
            )));
        }
        if self.validity_days == Some(0) {
            return Err(CaError::Configuration(format!(
                "CA '{}' has a zero validity period",
                self.key_label
            )));
        }
        self.distinguished_name.validate()
    }
}

/// An end-entity key: where it is stored and where its CSR is written
#[derive(Debug, Deserialize, Clone)]
pub struct KeyConfiguration {
    pub key_label: String,
    pub keystore_file_name: PathBuf,
    pub certificate_request_file_name: PathBuf,
    pub private_key_password: Password,
    pub distinguished_name: DistinguishedName,
}

impl KeyConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.key_label.trim().is_empty() {
            return Err(CaError::Configuration(format!(
                "key for '{}' has an empty label",
                self.distinguished_name.common_name
            )));
        }
        require_path(&self.keystore_file_name, "keystore", &self.key_label)?;
        require_path(
            &self.certificate_request_file_name,
            "certificate request",
            &self.key_label,
        )?;
        if self.private_key_password.is_empty() {
            return Err(CaError::Configuration(format!(
                "key '{}' has an empty private key password",
                self.key_label
            )));
        }
        self.distinguished_name.validate()
    }
}

/// An end-entity certificate: the key configuration plus the output path and
/// the (always required) signing key
#[derive(Debug, Deserialize, Clone)]
pub struct CertificateConfiguration {
    #[serde(flatten)]
    pub key: KeyConfiguration,
    pub certificate_file_name: PathBuf,
    pub signing_key: SigningKeyReference,
    #[serde(default = "default_end_entity_validity")]
    pub validity_days: u32,
}

impl CertificateConfiguration {
    pub fn validate(&self) -> Result<()> {
        require_path(
            &self.certificate_file_name,
            "certificate",
            &self.key.key_label,
        )?;
        self.signing_key.validate(&self.key.key_label)?;
        if self.validity_days == 0 {
            return Err(CaError::Configuration(format!(
                "certificate '{}' has a zero validity period",
                self.key.key_label
            )));
        }
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path.as_ref())
    }
}

/// What `install` does when an intermediate fails
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failed intermediate and report it
    #[default]
    FailFast,
    /// Record the failure and carry on with the remaining intermediates
    Continue,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct SetupPolicy {
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default)]
    pub overwrite_certificates: bool,
}

/// Contents of an installation file: the root and its intermediates
#[derive(Debug, Deserialize, Clone)]
pub struct InstallConfig {
    #[serde(default)]
    pub setup: SetupPolicy,
    pub root: CertificateAuthorityConfiguration,
    #[serde(default)]
    pub intermediates: Vec<CertificateAuthorityConfiguration>,
}

impl InstallConfig {
    /// Load an installation from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path.as_ref())
    }
}

impl KeyConfiguration {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path.as_ref())
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let config_str = fs::read_to_string(path).map_err(|e| CaError::io(path, e))?;
    toml::from_str(&config_str).map_err(|e| {
        CaError::Configuration(format!("failed to parse {}: {}", path.display(), e))
    })
}

fn require_path(path: &Path, what: &str, owner: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(CaError::Configuration(format!(
            "'{}' has an empty {} path",
            owner, what
        )));
    }
    Ok(())
}

fn default_root_validity() -> u32 {
    3650 // 10 years
}

fn default_intermediate_validity() -> u32 {
    1825 // 5 years
}

fn default_end_entity_validity() -> u32 {
    365
}
