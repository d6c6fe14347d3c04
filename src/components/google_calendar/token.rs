use super::models::TokenResponse;
use crate::calendar::provider::{AuthStart, Authorizer};
use crate::error::{auth_error, other_error, CalendarResult, Error};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

pub const AUTHORIZATION_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// Tokens closer than this to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token as persisted in the account's token file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp
    pub expires_at: i64,
}

impl StoredToken {
    fn from_response(response: TokenResponse, previous_refresh: Option<String>) -> Self {
        let expires_in = response.expires_in.unwrap_or(3600);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: Utc::now().timestamp() + expires_in,
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at - Utc::now().timestamp() > EXPIRY_MARGIN_SECS
    }

    /// Usable now or after a refresh
    pub fn is_usable(&self) -> bool {
        self.refresh_token.is_some() || self.is_fresh()
    }
}

/// OAuth credentials of one Google account, stored as JSON on disk
#[derive(Clone)]
pub struct TokenManager {
    account: String,
    client_id: String,
    client_secret: String,
    token_path: PathBuf,
    token_url: String,
    redirect_uri: String,
    client: Client,
}

impl TokenManager {
    pub fn new(
        account: &str,
        client_id: &str,
        client_secret: &str,
        token_dir: &Path,
    ) -> Self {
        Self {
            account: account.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_path: token_dir.join(token_file_name(account)),
            token_url: TOKEN_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            client: Client::new(),
        }
    }

    /// Use a different token endpoint
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Self {
        self.redirect_uri = redirect_uri.to_string();
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Consent page URL for the authorization-code flow
    pub fn authorization_url(&self, state: Option<&str>) -> CalendarResult<String> {
        let mut url = Url::parse(AUTHORIZATION_URL)
            .map_err(|e| other_error(&format!("Failed to parse URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", CALENDAR_SCOPE);
        if let Some(state) = state {
            url.query_pairs_mut().append_pair("state", state);
        }
        Ok(url.to_string())
    }

    /// Read the token file; a missing file means no token yet
    pub async fn load(&self) -> CalendarResult<Option<StoredToken>> {
        match tokio::fs::read_to_string(&self.token_path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn store(&self, token: &StoredToken) -> CalendarResult<()> {
        if let Some(dir) = self.token_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.token_path, json).await?;
        debug!("Stored token for {} in {}", self.account, self.token_path.display());
        Ok(())
    }

    /// Access token for API calls, refreshed when close to expiry
    pub async fn access_token(&self) -> CalendarResult<String> {
        let token = self.load().await?.ok_or_else(|| {
            auth_error(&format!(
                "No token for Google account {}, run authorize_google",
                self.account
            ))
        })?;

        if token.is_fresh() {
            return Ok(token.access_token);
        }

        let refreshed = self.refresh(&token).await?;
        Ok(refreshed.access_token)
    }

    async fn refresh(&self, token: &StoredToken) -> CalendarResult<StoredToken> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            auth_error(&format!(
                "Token for {} expired and has no refresh token",
                self.account
            ))
        })?;

        let params = [
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
            ("refresh_token", refresh_token.clone()),
            ("grant_type", "refresh_token".to_string()),
        ];
        let response = self.request_token(&params).await?;

        let refreshed = StoredToken::from_response(response, Some(refresh_token));
        self.store(&refreshed).await?;
        info!("Refreshed Google token for {}", self.account);
        Ok(refreshed)
    }

    /// Exchange an authorization code and store the resulting token
    pub async fn exchange_code(&self, code: &str) -> CalendarResult<StoredToken> {
        let params = [
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("grant_type", "authorization_code".to_string()),
        ];
        let response = self.request_token(&params).await?;

        let token = StoredToken::from_response(response, None);
        self.store(&token).await?;
        info!("Stored new Google token for {}", self.account);
        Ok(token)
    }

    async fn request_token(&self, params: &[(&str, String)]) -> CalendarResult<TokenResponse> {
        let response = self.client.post(&self.token_url).form(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            // invalid_grant comes back as 400 and means the grant is dead
            if status.as_u16() == 400 {
                return Err(auth_error(&format!("Token request rejected: {}", error_body)));
            }
            return Err(Error::from_status(status.as_u16(), &error_body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Authorizer for TokenManager {
    async fn begin(&self) -> CalendarResult<AuthStart> {
        match self.load().await? {
            Some(token) if token.is_usable() => Ok(AuthStart::Ready),
            _ => Ok(AuthStart::NeedsCode {
                authorization_url: self.authorization_url(None)?,
            }),
        }
    }

    async fn submit_code(&self, code: &str) -> CalendarResult<()> {
        self.exchange_code(code).await.map(|_| ())
    }
}

/// Account names become file names, so keep them to a safe alphabet
pub fn token_file_name(account: &str) -> String {
    let safe: String = account
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_file_name() {
        assert_eq!(token_file_name("work"), "work.json");
        assert_eq!(token_file_name("my work/cal"), "my_work_cal.json");
    }

    #[test]
    fn test_usable_tokens() {
        let now = Utc::now().timestamp();
        let fresh = StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: now + 600,
        };
        assert!(fresh.is_usable());

        let nearly_expired = StoredToken {
            expires_at: now + 30,
            ..fresh.clone()
        };
        assert!(!nearly_expired.is_usable());

        let refreshable = StoredToken {
            refresh_token: Some("r".to_string()),
            ..nearly_expired
        };
        assert!(refreshable.is_usable());
    }

    #[test]
    fn test_authorization_url() {
        let manager = TokenManager::new("work", "client-1", "secret", Path::new("tokens"));
        let url = manager.authorization_url(Some("xyz")).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        assert!(pairs.contains(&("scope".to_string(), CALENDAR_SCOPE.to_string())));
    }
}
