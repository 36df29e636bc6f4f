//! External identity provider adapters.
//!
//! An adapter turns a provider access token into a [`ProviderProfile`] by
//! calling the provider's userinfo endpoint. Adapters are registered once at
//! startup in an [`OAuthRegistry`] and looked up by name per request.

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info_span};

use crate::APP_USER_AGENT;

pub const GOOGLE: &str = "google";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn user_info(&self, token: &str) -> Result<ProviderProfile>;
}

#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: Option<String>,
}

pub struct GoogleProvider {
    client: Client,
    config: OAuthClientConfig,
    userinfo_url: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl TryFrom<GoogleUserInfo> for ProviderProfile {
    type Error = anyhow::Error;

    fn try_from(info: GoogleUserInfo) -> Result<Self> {
        let email = info.email.unwrap_or_default();
        ensure!(!email.is_empty(), "provider profile has no email");
        Ok(Self {
            provider_id: info.sub,
            email,
            first_name: info.given_name,
            last_name: info.family_name,
            picture: info.picture,
        })
    }
}

impl GoogleProvider {
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .context("failed to build OAuth HTTP client")?;
        Ok(Self {
            client,
            config,
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: impl Into<String>) -> Self {
        self.userinfo_url = url.into();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }
}

impl fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("client_id", &self.config.client_id)
            .field("userinfo_url", &self.userinfo_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        GOOGLE
    }

    async fn user_info(&self, token: &str) -> Result<ProviderProfile> {
        let span = info_span!("oauth.userinfo", provider = GOOGLE);
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .instrument(span)
            .await
            .context("userinfo request failed")?;
        let status = response.status();
        ensure!(status.is_success(), "userinfo returned {status}");
        let info: GoogleUserInfo = response
            .json()
            .await
            .context("failed to decode userinfo response")?;
        ProviderProfile::try_from(info)
    }
}

/// Read-only after startup.
#[derive(Clone, Default)]
pub struct OAuthRegistry {
    providers: HashMap<&'static str, Arc<dyn OAuthProvider>>,
}

impl OAuthRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }
}

impl fmt::Debug for OAuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("OAuthRegistry").field("providers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_profile_requires_email() -> Result<()> {
        let info: GoogleUserInfo = serde_json::from_str(
            r#"{"sub":"1090","email":"a@x","given_name":"A","family_name":"B","picture":"https://p/a.png"}"#,
        )?;
        let profile = ProviderProfile::try_from(info)?;
        assert_eq!(profile.provider_id, "1090");
        assert_eq!(profile.first_name.as_deref(), Some("A"));

        let info: GoogleUserInfo = serde_json::from_str(r#"{"sub":"1091"}"#)?;
        assert!(ProviderProfile::try_from(info).is_err());
        Ok(())
    }

    #[test]
    fn registry_resolves_by_name() -> Result<()> {
        let google = GoogleProvider::new(OAuthClientConfig {
            client_id: "client".into(),
            client_secret: SecretString::from("secret".to_string()),
            redirect_uri: None,
        })?;
        assert_eq!(google.client_id(), "client");
        let registry = OAuthRegistry::new().with_provider(Arc::new(google));
        assert!(registry.get(GOOGLE).is_some());
        assert!(registry.get("apple").is_none());
        Ok(())
    }
}
