//! HMAC JWT validation backed by `jsonwebtoken`.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use super::TokenValidator;

/// Validates HS256/HS384/HS512 tokens signed with a shared secret.
///
/// The claim set is not inspected beyond the standard time claims: an
/// `exp` in the past rejects the token, a missing `exp` does not.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Creates a validator for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> bool {
        if token.is_empty() {
            tracing::debug!("empty authentication token");
            return false;
        }

        match jsonwebtoken::decode::<Map<String, Value>>(token, &self.key, &self.validation) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "token rejected");
                false
            }
        }
    }
}
