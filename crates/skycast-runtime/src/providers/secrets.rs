//! Credential handling for keyed upstreams.
//!
//! Keys are wrapped in [`secrecy::SecretString`] as soon as they are read, so
//! they cannot show up in `Debug` or `Display` output, logs, or serialized
//! configuration.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential came from. Reported in diagnostics instead of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `geocoding.api_key` in the YAML file
    Config,
    /// One of the key environment variables
    Environment,
    /// Handed in by code (tests, embedding applications)
    Programmatic,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Config => "config file",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "caller",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upstream API key.
///
/// The raw value is only reachable through [`ApiCredential::expose`].
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source,
            label,
        }
    }

    /// First non-blank variable among `vars`, in order.
    pub fn first_set<F>(vars: &[&str], lookup: F, label: &'static str) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        vars.iter()
            .filter_map(|var| lookup(var))
            .find(|value| !value.trim().is_empty())
            .map(|value| Self::new(value.trim(), CredentialSource::Environment, label))
    }

    /// Expose the value at the point of use (query parameter).
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Human name of the key, e.g. "Mapbox access token".
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose(), self.source, self.label)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, {}, [REDACTED])", self.label, self.source)
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED] {} (from {})", self.label, self.source)
    }
}
