// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};

use super::claims::TokenClaims;
use super::{AuthError, AuthenticatedUser};
use crate::storage::is_valid_key_part;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8], issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;
        validation.validate_nbf = true;
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            },
        )?;
        // The subject becomes part of ledger keys.
        if !is_valid_key_part(&data.claims.sub) {
            return Err(AuthError::MalformedToken);
        }
        Ok(AuthenticatedUser::from_claims(data.claims))
    }
}

/// Extractor for authenticated users.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    JwtVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = JwtVerifier::from_ref(state).verify(token)?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Extractor that requires the admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for AdminOnly
where
    JwtVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminOnly(user))
    }
}

/// Sign a token with `secret`, valid for one hour.
#[cfg(test)]
pub(crate) fn issue_test_token(secret: &[u8], user_id: &str, role: Option<&str>) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
        iss: None,
        role: role.map(str::to_string),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret))
        .expect("test token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use axum::http::Request;

    const SECRET: &[u8] = b"test-secret";

    fn parts_with(token: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(SECRET, None)
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let mut parts = parts_with(None);
        let result = Auth::from_request_parts(&mut parts, &verifier()).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_accepts_valid_token() {
        let mut parts = parts_with(Some(issue_test_token(SECRET, "user_123", None)));
        let Auth(user) = Auth::from_request_parts(&mut parts, &verifier()).await.unwrap();
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.role, Role::Client);
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let mut parts = parts_with(Some(issue_test_token(b"other", "user_123", None)));
        let result = Auth::from_request_parts(&mut parts, &verifier()).await;
        assert!(matches!(result, Err(AuthError::InvalidSignature)));

        let mut parts = parts_with(Some("not.a.jwt".to_string()));
        let result = Auth::from_request_parts(&mut parts, &verifier()).await;
        assert!(matches!(result, Err(AuthError::MalformedToken)));
    }

    #[tokio::test]
    async fn subject_with_control_characters_is_rejected() {
        for subject in ["", "alice\0bob", "alice\nbob"] {
            let mut parts = parts_with(Some(issue_test_token(SECRET, subject, None)));
            let result = Auth::from_request_parts(&mut parts, &verifier()).await;
            assert!(matches!(result, Err(AuthError::MalformedToken)), "{subject:?}");
        }
    }

    #[tokio::test]
    async fn issuer_is_enforced_when_configured() {
        let strict = JwtVerifier::new(SECRET, Some("folio"));
        let mut parts = parts_with(Some(issue_test_token(SECRET, "user_123", None)));
        assert!(Auth::from_request_parts(&mut parts, &strict).await.is_err());
    }

    #[tokio::test]
    async fn admin_only_checks_role() {
        let mut parts = parts_with(Some(issue_test_token(SECRET, "user_123", Some("client"))));
        let result = AdminOnly::from_request_parts(&mut parts, &verifier()).await;
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));

        let mut parts = parts_with(Some(issue_test_token(SECRET, "ops", Some("admin"))));
        let AdminOnly(user) = AdminOnly::from_request_parts(&mut parts, &verifier())
            .await
            .unwrap();
        assert_eq!(user.user_id, "ops");
    }
}
