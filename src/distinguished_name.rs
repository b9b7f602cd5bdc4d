//! Distinguished Name value type
//!
//! The naming attributes placed in a certificate subject or issuer. Only the
//! common name is mandatory; the remaining attributes are omitted from the
//! encoded name when unset.
//!
//! # Example
//! ```
//! use pki_authority::distinguished_name::DistinguishedName;
//!
//! let dn = DistinguishedName::new("Root Certificate")
//!     .country("US")
//!     .state("OH")
//!     .locality("Cleveland")
//!     .organization("Trust Us")
//!     .organizational_unit("Certificates");
//! assert_eq!(dn.to_string(), "C=US, ST=OH, L=Cleveland, O=Trust Us, OU=Certificates, CN=Root Certificate");
//! ```

use crate::error::{CaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject/issuer naming attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    pub common_name: String,
}

impl DistinguishedName {
    /// Create a name carrying only the common name (CN)
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    /// Set the country (C), a two-letter ISO 3166 code
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Set the state/province (ST)
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Set the locality (L)
    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = Some(locality.into());
        self
    }

    /// Set the organization (O)
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Set the organizational unit (OU)
    pub fn organizational_unit(mut self, unit: impl Into<String>) -> Self {
        self.organizational_unit = Some(unit.into());
        self
    }

    /// Attributes in encoding order (C, ST, L, O, OU, CN), skipping unset ones.
    pub fn attributes(&self) -> Vec<(&'static str, &str)> {
        let optional = [
            ("C", &self.country),
            ("ST", &self.state),
            ("L", &self.locality),
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
        ];
        let mut attributes: Vec<(&'static str, &str)> = optional
            .into_iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
            .collect();
        attributes.push(("CN", self.common_name.as_str()));
        attributes
    }

    /// Check that the name can be encoded into a certificate subject.
    ///
    /// An empty optional attribute is treated as a mistake rather than as
    /// "unset", since it would encode as an empty RDN.
    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(CaError::Configuration(
                "distinguished name requires a common name".to_string(),
            ));
        }
        for (key, value) in self.attributes() {
            if value.trim().is_empty() {
                return Err(CaError::Configuration(format!(
                    "distinguished name attribute {} of '{}' is empty",
                    key, self.common_name
                )));
            }
        }
        if let Some(country) = &self.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CaError::Configuration(format!(
                    "country '{}' of '{}' is not a two-letter code",
                    country, self.common_name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .attributes()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}
