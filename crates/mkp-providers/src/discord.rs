//! Discord OAuth2 identity provider (scope `identify`).

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::{
    http_client, AccessToken, Identity, IdentityProvider, ProviderError, DEFAULT_REQUEST_TIMEOUT,
};

pub const DISCORD_BASE_URL: &str = "https://discord.com";

/// Client secret is passed in by the caller; do not log it.
#[derive(Clone)]
pub struct DiscordIdentityProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for DiscordIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordIdentityProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("redirect_uri", &self.redirect_uri)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DiscordIdentityProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Result<Self, ProviderError> {
        Self::new_with_base_url(
            client_id,
            client_secret,
            redirect_uri,
            DISCORD_BASE_URL.to_string(),
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    pub fn new_with_base_url(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            http: http_client(timeout)?,
            base_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for DiscordIdentityProvider {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        if self.client_id.is_empty() {
            return Err(ProviderError::Config(
                "identity.client_id is not configured".to_string(),
            ));
        }
        let url = Url::parse_with_params(
            &self.url("/oauth2/authorize"),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "identify"),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::Config(format!("invalid discord base url: {e}")))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ProviderError> {
        let resp = self
            .http
            .post(self.url("/api/oauth2/token"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: DiscordErrorBody = resp.json().await.unwrap_or_default();
            return Err(ProviderError::Api {
                code: Some(i64::from(status.as_u16())),
                message: body.message(),
            });
        }

        let body: DiscordTokenResponse = resp.json().await?;
        Ok(AccessToken(body.access_token))
    }

    async fn fetch_identity(&self, token: &AccessToken) -> Result<Identity, ProviderError> {
        let resp = self
            .http
            .get(self.url("/api/users/@me"))
            .bearer_auth(&token.0)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: DiscordErrorBody = resp.json().await.unwrap_or_default();
            return Err(ProviderError::Api {
                code: Some(i64::from(status.as_u16())),
                message: body.message(),
            });
        }

        let user: DiscordUser = resp.json().await?;
        let id = user
            .id
            .parse::<i64>()
            .map_err(|_| ProviderError::Decode(format!("discord user id is not numeric: {}", user.id)))?;
        Ok(Identity {
            id,
            username: user.username,
            avatar: user.avatar.filter(|a| !a.is_empty()),
        })
    }
}

/// Public avatar URL; accounts without an avatar get the default embed avatar.
pub fn avatar_url(account_id: i64, avatar_hash: Option<&str>) -> String {
    match avatar_hash {
        Some(hash) => format!("https://cdn.discordapp.com/avatars/{account_id}/{hash}.png"),
        None => "https://cdn.discordapp.com/embed/avatars/0.png".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct DiscordTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

impl DiscordErrorBody {
    fn message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
