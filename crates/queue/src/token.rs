//! Cached job service token.

use tracing::{debug, warn};

use crate::client::TokenEndpoint;
use crate::error::QueueError;

/// Holds the current token; renewal is always triggered by the caller.
pub struct AuthTokenProvider<E> {
    endpoint: E,
    token: Option<String>,
}

impl<E: TokenEndpoint> AuthTokenProvider<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            token: None,
        }
    }

    /// Fetch a fresh token and cache it.
    ///
    /// On failure the previously cached token, if any, is kept.
    pub async fn get_token(&mut self) -> Result<String, QueueError> {
        match self.endpoint.fetch_token().await {
            Ok(token) => {
                debug!("Token renewed");
                self.token = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Token request failed");
                Err(e)
            }
        }
    }

    /// Drop the cached token.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }
}
