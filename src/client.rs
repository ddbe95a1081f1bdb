//! Entry point holding credentials and endpoint configuration.

use secrecy::SecretString;

use crate::api::{ApiError, SessionApiClient};
use crate::config::{Environment, SdkConfig};
use crate::session::Session;

/// Factory for [`Session`]s sharing one API key and HTTP connection pool.
#[derive(Clone, Debug)]
pub struct AssisfyClient {
    api: SessionApiClient,
}

impl AssisfyClient {
    /// Creates a client for the production environment.
    pub fn new(api_key: SecretString) -> Result<Self, ApiError> {
        Self::with_config(api_key, SdkConfig::default())
    }

    /// Creates a client for one of the preset environments.
    pub fn with_environment(
        api_key: SecretString,
        environment: Environment,
    ) -> Result<Self, ApiError> {
        Self::with_config(api_key, SdkConfig::for_environment(environment))
    }

    /// Creates a client with fully custom endpoints.
    pub fn with_config(api_key: SecretString, config: SdkConfig) -> Result<Self, ApiError> {
        Ok(Self {
            api: SessionApiClient::new(api_key, config)?,
        })
    }

    pub fn config(&self) -> &SdkConfig {
        self.api.config()
    }

    /// Returns a new, unstarted session.
    pub fn session(&self) -> Session {
        Session::new(self.api.clone())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::AssisfyClient;
    use crate::config::{Environment, STAGING_BASE_URL};
    use crate::session::SessionState;

    #[test]
    fn sessions_start_unstarted_and_independent() {
        let client = AssisfyClient::with_environment(
            SecretString::new("test-api-key".to_string()),
            Environment::Staging,
        )
        .expect("build client");
        assert_eq!(client.config().base_url, STAGING_BASE_URL);

        let first = client.session();
        let second = client.session();
        assert_eq!(first.state(), SessionState::Unstarted);
        assert_eq!(second.session_id(), None);
    }
}
