//! Session authentication for the CLOB venue.
//!
//! The venue hands out a JWT after the user signs a server-provided
//! challenge with their wallet key. The token is cached and refreshed
//! once per request on 401-class failures; repeated authentication
//! simply replaces the cached token, leaving no dangling session.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use arbot_core::{Signer, VenueError};

/// A cached session token.
#[derive(Debug, Clone)]
pub struct SessionToken {
    /// The bearer token.
    pub token: String,
    /// Expiry, when the venue reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionToken {
    /// Returns true if the token is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Utc::now())
    }
}

#[derive(Debug, Deserialize)]
struct RawChallenge {
    challenge: String,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Challenge-signing session manager.
pub struct SessionAuth {
    http: Client,
    base_url: String,
    signer: Arc<dyn Signer>,
    token: RwLock<Option<SessionToken>>,
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuth")
            .field("base_url", &self.base_url)
            .field("address", &self.signer.address())
            .field("has_token", &self.token.read().is_some())
            .finish()
    }
}

impl SessionAuth {
    /// Creates a session manager.
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>, signer: Arc<dyn Signer>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            signer,
            token: RwLock::new(None),
        }
    }

    /// Fetches the challenge, signs it, and exchanges it for a session
    /// token. Replaces any previously cached token.
    ///
    /// # Errors
    /// Returns an error if any step of the exchange fails.
    pub async fn authenticate(&self) -> Result<SessionToken, VenueError> {
        let address = self.signer.address().to_string();

        let challenge: RawChallenge = self
            .http
            .get(format!("{}/auth/challenge", self.base_url))
            .query(&[("address", address.as_str())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| VenueError::Auth(e.to_string()))?
            .json()
            .await?;

        let signature = self
            .signer
            .sign_message(challenge.challenge.as_bytes())
            .await
            .map_err(|e| VenueError::Auth(e.to_string()))?;

        let session: RawSession = self
            .http
            .post(format!("{}/auth/verify", self.base_url))
            .json(&serde_json::json!({
                "address": address,
                "signature": signature,
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| VenueError::Auth(e.to_string()))?
            .json()
            .await?;

        let token = SessionToken {
            token: session.token,
            expires_at: session.expires_at,
        };
        debug!(address = %address, "clob session established");
        *self.token.write() = Some(token.clone());
        Ok(token)
    }

    /// Returns a valid bearer token, authenticating if none is cached.
    ///
    /// # Errors
    /// Returns an error if authentication is needed and fails.
    pub async fn bearer(&self) -> Result<String, VenueError> {
        let cached = self.token.read().clone();
        match cached {
            Some(token) if !token.is_expired() => Ok(token.token),
            _ => Ok(self.authenticate().await?.token),
        }
    }

    /// Drops the cached token so the next request re-authenticates.
    pub fn invalidate(&self) {
        *self.token.write() = None;
    }

    /// Returns true if a token is currently cached.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }
}
