//! Bearer token validation.
//!
//! The session core only needs a yes/no answer for a token string;
//! [`TokenValidator`] is that seam and [`JwtValidator`] the production
//! implementation.

pub mod jwt;

pub use jwt::JwtValidator;

/// Decides whether a bearer token admits its holder.
///
/// Implementations must reject the empty string without doing any
/// cryptographic work.
pub trait TokenValidator: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `token` is valid.
    fn validate(&self, token: &str) -> bool;
}
