//! Identity token verification.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AppError, IdentityResolver, UserIdentity};

/// JWT claims issued by the account service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (UTC timestamp)
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// Resolves HS256 bearer tokens to user identities
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, credential: &str) -> Result<UserIdentity, AppError> {
        let token_data =
            decode::<Claims>(credential, &self.decoding_key, &self.validation).map_err(|e| {
                debug!(error = %e, "Identity token rejected");
                AppError::Authentication(format!("Invalid identity token: {}", e))
            })?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AppError::Authentication(
                "Identity token has no subject".to_string(),
            ));
        }

        Ok(UserIdentity {
            user_id: token_data.claims.sub,
        })
    }
}
