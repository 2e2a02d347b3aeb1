use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
use rocket::{
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::db::identity::Uid;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

const BEARER_PREFIX: &str = "Bearer ";

/// Claims carried by a token from the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// The provider's stable user ID.
    pub sub: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
}

/// The currently authenticated principal, as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uid,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Principal {
    /// Verify a provider token and extract the principal it names.
    pub fn from_token(token: &str, config: &Config) -> Result<Self, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = config.identity_issuer() {
            validation.set_issuer(&[issuer]);
        }
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.identity_secret()),
            &validation,
        )
        .map(|data: TokenData<IdentityClaims>| data.claims)?;

        Ok(Self {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
        })
    }
}

/// Find the raw token on a request: an `Authorization: Bearer` header takes
/// precedence over the `auth_token` cookie.
fn raw_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    req.headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .or_else(|| req.cookies().get(AUTH_TOKEN_COOKIE).map(|c| c.value()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = Error;

    /// Get the [`Principal`] from the request's identity token.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let token = match raw_token(req) {
            Some(token) => token,
            None => {
                return Error::Unauthenticated("no identity token presented".to_string())
                    .fail_guard(req)
            }
        };

        match Self::from_token(token, config) {
            Ok(principal) => Outcome::Success(principal),
            Err(err) => err.fail_guard(req),
        }
    }
}

/// Example data and token minting for tests, standing in for the identity provider.
#[cfg(test)]
mod examples {
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};
    use rocket::http::Header as HttpHeader;

    use super::*;

    impl Principal {
        pub fn example_voter() -> Self {
            Self {
                id: "voter-uid-1".into(),
                email: Some("voter@example.com".to_string()),
                name: Some("Valentina Voter".to_string()),
            }
        }

        pub fn example_admin() -> Self {
            Self {
                id: "admin-uid-1".into(),
                email: Some("admin@example.com".to_string()),
                name: Some("Adam Admin".to_string()),
            }
        }

        /// Sign a token for this principal, expiring after `ttl`.
        pub fn sign(&self, secret: &[u8], ttl: Duration) -> String {
            let claims = IdentityClaims {
                sub: self.id.clone(),
                email: self.email.clone(),
                name: self.name.clone(),
                expire_at: Utc::now() + ttl,
            };
            jsonwebtoken::encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(secret),
            )
            .unwrap()
        }

        /// An `Authorization` header carrying a freshly signed token.
        pub fn bearer(&self, config: &Config) -> HttpHeader<'static> {
            let token = self.sign(config.identity_secret(), Duration::hours(1));
            HttpHeader::new("Authorization", format!("{BEARER_PREFIX}{token}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn token_round_trip() {
        let config = Config::example();
        let principal = Principal::example_voter();
        let token = principal.sign(config.identity_secret(), Duration::minutes(5));
        assert_eq!(Principal::from_token(&token, &config).unwrap(), principal);
    }

    #[test]
    fn rejects_bad_tokens() {
        let config = Config::example();
        let principal = Principal::example_voter();

        // Wrong secret.
        let forged = principal.sign(b"some other secret", Duration::minutes(5));
        assert!(matches!(
            Principal::from_token(&forged, &config),
            Err(Error::Jwt(_))
        ));

        // Expired well beyond the default leeway.
        let expired = principal.sign(config.identity_secret(), Duration::minutes(-10));
        assert!(Principal::from_token(&expired, &config).is_err());

        // Garbage.
        assert!(Principal::from_token("not.a.token", &config).is_err());
    }
}
