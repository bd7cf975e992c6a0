use crate::error::{GatewayError, Result};
use std::fmt;

/// An opaque secret for the inference endpoint. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} chars>)", self.0.len())
    }
}

/// Picks the credential for one outbound call.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    default: Credential,
}

impl CredentialResolver {
    pub fn new(default: Credential) -> Self {
        Self { default }
    }

    pub fn from_default_key(api_key: &str) -> Result<Self> {
        Credential::new(api_key)
            .map(Self::new)
            .ok_or_else(|| GatewayError::ConfigError("default API key is empty".into()))
    }

    /// An explicit key overrides the default for this call only. A key that
    /// was sent but is blank is a malformed request, not a fallback.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<Credential> {
        match explicit {
            None => Ok(self.default.clone()),
            Some(raw) => Credential::new(raw).ok_or_else(|| {
                GatewayError::InvalidRequestShape("API key must be a non-empty string".into())
            }),
        }
    }
}
