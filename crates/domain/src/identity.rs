//! Identity provider and capability checks.
//!
//! A credential is a signed token carrying the subject id and role. Once
//! verified, the subject id is trusted as the acting user.
//!
//! Tokens are HS256 JWTs with claims
//! `{"sub": <id>, "role": "customer"|"admin", "exp": <unix secs>}`. The subject
//! id is also accepted under `id`, and a missing role means customer.

use chrono::{DateTime, Duration, Utc};
use common::SubjectId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capability level of a subject.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    /// Returns true if holding `self` satisfies a requirement of `required`.
    ///
    /// Admin grants every capability.
    pub fn grants(&self, required: Role) -> bool {
        matches!(
            (self, required),
            (Role::Admin, _) | (Role::Customer, Role::Customer)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: SubjectId,
    pub role: Role,
}

impl Subject {
    pub fn customer(id: SubjectId) -> Self {
        Self {
            id,
            role: Role::Customer,
        }
    }

    pub fn admin(id: SubjectId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }
}

/// Errors raised while authenticating or authorising a subject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("No token, authorization denied")]
    MissingCredential,

    /// The credential could not be decoded or its signature does not match.
    #[error("Token is not valid: {0}")]
    InvalidCredential(String),

    /// The credential is past its expiry.
    #[error("Token has expired")]
    Expired,

    /// The subject lacks the required capability.
    #[error("Access denied: {required} role required")]
    Forbidden { required: Role },
}

impl AuthError {
    /// Returns true when the subject is known but not allowed.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::Forbidden { .. })
    }
}

/// Checks that a subject holds at least `role`.
pub fn require_role(subject: &Subject, role: Role) -> Result<(), AuthError> {
    if subject.role.grants(role) {
        Ok(())
    } else {
        tracing::debug!(subject_id = %subject.id, required = %role, "capability check failed");
        Err(AuthError::Forbidden { required: role })
    }
}

/// Verifies credentials and yields the subject they belong to.
pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<Subject, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(alias = "id")]
    sub: i64,
    #[serde(default)]
    role: Role,
    exp: i64,
}

fn invalid(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidCredential(e.to_string()),
    }
}

/// Identity provider backed by HMAC-SHA256 (HS256) signed JWTs.
pub struct HmacIdentityProvider {
    secret: SecretString,
}

impl HmacIdentityProvider {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Issues a token for `subject` valid for `ttl`.
    pub fn issue(&self, subject: &Subject, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.id.as_i64(),
            role: subject.role,
            exp: (Utc::now() + ttl).timestamp(),
        };
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(invalid)
    }

    /// Verifies a token against a given instant.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Subject, AuthError> {
        // Expiry is checked below against `now`, not the system clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let claims = jsonwebtoken::decode::<Claims>(token, &key, &validation)
            .map_err(invalid)?
            .claims;

        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(Subject {
            id: SubjectId::new(claims.sub),
            role: claims.role,
        })
    }
}

impl IdentityProvider for HmacIdentityProvider {
    fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        self.verify_at(token, Utc::now())
    }
}
