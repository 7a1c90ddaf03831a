use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;

use super::SheetsError;
use super::credentials::ServiceAccountKey;
use super::types::{JwtClaims, TokenResponse};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Exchanges a service-account key for OAuth2 access tokens (JWT-bearer grant)
/// and caches the token until shortly before it expires.
pub struct TokenProvider {
    http: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: Client, key: ServiceAccountKey) -> Result<Self, SheetsError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            http,
            key,
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = cached.as_ref()
            && token.expires_at - EXPIRY_MARGIN_SECS > now
        {
            return Ok(token.token.clone());
        }

        let fresh = self.fetch_token(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    fn sign_assertion(&self, now: i64) -> Result<String, SheetsError> {
        let claims = JwtClaims {
            iss: &self.key.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.private_key_id.clone());
        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding_key)?)
    }

    async fn fetch_token(&self, now: i64) -> Result<CachedToken, SheetsError> {
        let assertion = self.sign_assertion(now)?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", GRANT_TYPE)
            .append_pair("assertion", &assertion)
            .finish();

        let response = self
            .http
            .post(&self.key.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("User-Agent", crate::USER_AGENT)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed = serde_json::from_str::<TokenResponse>(&text).ok();
        let expires_in = parsed
            .as_ref()
            .and_then(|t| t.expires_in)
            .unwrap_or(ASSERTION_LIFETIME_SECS);

        let access_token = parsed
            .as_ref()
            .filter(|_| status.is_success())
            .and_then(|t| t.access_token.clone());

        let Some(token) = access_token else {
            let reason = parsed
                .and_then(|t| match (t.error, t.error_description) {
                    (Some(e), Some(d)) => Some(format!("{e}: {d}")),
                    (e, d) => e.or(d),
                })
                .unwrap_or_else(|| {
                    let end = text.floor_char_boundary(200);
                    format!("HTTP {status}: {}", &text[..end])
                });
            return Err(SheetsError::Auth(reason));
        };

        debug!(client = %self.key.client_email, expires_in, "access token obtained");
        Ok(CachedToken {
            token,
            expires_at: now + expires_in,
        })
    }
}
