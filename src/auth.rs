//! Bearer token authentication
//!
//! Tokens are either verified locally with the project's HS256 secret, or
//! handed to the auth service's `/auth/v1/user` endpoint. Either way a request
//! without a valid token is rejected before any feed work starts.

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Access token claims we read; `aud` and `exp` are checked by [`Validation`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Response of `GET /auth/v1/user`
#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Resolves bearer tokens to users
#[derive(Clone)]
pub enum Authenticator {
    Jwt {
        key: DecodingKey,
        validation: Validation,
    },
    Remote {
        client: reqwest::Client,
        user_url: String,
        api_key: Option<String>,
    },
}

impl Authenticator {
    /// Local JWT verification wins when both strategies are configured
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        if let Some(secret) = &config.jwt_secret {
            return Ok(Self::jwt(secret, config.jwt_audience.as_deref()));
        }

        match &config.auth_url {
            Some(url) => Self::remote(url, config.api_key.clone(), config.timeout),
            None => Err(Error::InvalidConfig {
                key: "AUTH_URL",
                message: "no authentication strategy configured".into(),
            }),
        }
    }

    pub fn jwt(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Self::Jwt {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn remote(
        base_url: &str,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: "failed to build auth HTTP client".into(),
                source: Some(Box::new(e)),
            })?;

        Ok(Self::Remote {
            client,
            user_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    /// Resolve the caller from the `Authorization` header
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser> {
        let token = bearer_token(headers)?;

        match self {
            Self::Jwt { key, validation } => verify_jwt(token, key, validation),
            Self::Remote {
                client,
                user_url,
                api_key,
            } => fetch_remote_user(client, user_url, api_key.as_deref(), token).await,
        }
    }
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Error::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| Error::unauthorized("Invalid Authorization header"))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::unauthorized("Authorization must use Bearer scheme"))?
        .trim();

    if token.is_empty() {
        return Err(Error::unauthorized("Empty bearer token"));
    }
    Ok(token)
}

fn verify_jwt(token: &str, key: &DecodingKey, validation: &Validation) -> Result<AuthenticatedUser> {
    let data = decode::<Claims>(token, key, validation).map_err(|e| {
        debug!("Rejected token: {}", e);
        Error::unauthorized(format!("Invalid token: {}", e))
    })?;

    let id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| Error::unauthorized("Token subject is not a user id"))?;

    Ok(AuthenticatedUser {
        id,
        email: data.claims.email,
    })
}

async fn fetch_remote_user(
    client: &reqwest::Client,
    user_url: &str,
    api_key: Option<&str>,
    token: &str,
) -> Result<AuthenticatedUser> {
    let mut request = client.get(user_url).bearer_auth(token);
    if let Some(key) = api_key {
        request = request.header("apikey", key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        debug!("Auth service rejected token with {}", status);
        return Err(Error::unauthorized("Invalid or expired token"));
    }

    let user: RemoteUser = response.json().await.map_err(|e| {
        warn!("Unexpected auth service response: {}", e);
        Error::unauthorized("Invalid or expired token")
    })?;

    Ok(AuthenticatedUser {
        id: user.id,
        email: user.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, aud: &str, expires_in: i64) -> String {
        let claims = serde_json::json!({
            "sub": sub,
            "exp": chrono::Utc::now().timestamp() + expires_in,
            "aud": aud,
            "email": "citizen@example.com",
            "role": "authenticated",
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(&HeaderMap::new()).is_err());
        assert!(bearer_token(&headers("Basic abc")).is_err());
        assert!(bearer_token(&headers("Bearer   ")).is_err());
    }

    #[tokio::test]
    async fn test_valid_jwt_resolves_user() {
        let user_id = Uuid::new_v4();
        let auth = Authenticator::jwt(SECRET, Some("authenticated"));
        let jwt = token(&user_id.to_string(), "authenticated", 3600);

        let user = auth
            .authenticate(&headers(&format!("Bearer {}", jwt)))
            .await
            .unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.email.as_deref(), Some("citizen@example.com"));
    }

    #[tokio::test]
    async fn test_expired_jwt_rejected() {
        let auth = Authenticator::jwt(SECRET, Some("authenticated"));
        let jwt = token(&Uuid::new_v4().to_string(), "authenticated", -3600);
        let err = auth
            .authenticate(&headers(&format!("Bearer {}", jwt)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let auth = Authenticator::jwt(SECRET, Some("authenticated"));
        let jwt = token(&Uuid::new_v4().to_string(), "anon", 3600);
        assert!(auth
            .authenticate(&headers(&format!("Bearer {}", jwt)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_non_uuid_subject_rejected() {
        let auth = Authenticator::jwt(SECRET, None);
        let jwt = token("user-123", "authenticated", 3600);
        let err = auth
            .authenticate(&headers(&format!("Bearer {}", jwt)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_from_config_requires_a_strategy() {
        assert!(Authenticator::from_config(&AuthConfig::default()).is_err());

        let config = AuthConfig {
            auth_url: Some("http://localhost:9999".to_string()),
            ..Default::default()
        };
        match Authenticator::from_config(&config).unwrap() {
            Authenticator::Remote { user_url, .. } => {
                assert_eq!(user_url, "http://localhost:9999/auth/v1/user")
            }
            Authenticator::Jwt { .. } => panic!("expected remote authenticator"),
        }
    }
}
