//! PSK-based write capability gate.
//!
//! The external authorization collaborator is modeled as a pre-shared key:
//! reads are open, writes require the key when one is configured. Credentials
//! travel in a request-scoped [`Caller`] extracted per request and passed to
//! every operation, never in shared mutable state. Comparison is constant
//! time to mitigate timing attacks.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::AppState;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Display name recorded as revision author for anonymous callers.
const GUEST: &str = "Guest";

/// Display name recorded as revision author for authenticated callers.
const ADMIN: &str = "Admin";

/// Request-scoped caller identity and capability.
#[derive(Debug, Clone)]
pub struct Caller {
    pub name: String,
    can_write: bool,
}

impl Caller {
    /// Check the write capability; `Unauthorized` maps to 401.
    pub fn require_write(&self) -> Result<(), AppError> {
        if self.can_write {
            Ok(())
        } else {
            Err(AppError::Unauthorized(
                "Write access requires a valid API key".to_string(),
            ))
        }
    }

    #[cfg(test)]
    pub fn test_admin() -> Self {
        Self {
            name: ADMIN.to_string(),
            can_write: true,
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // If no PSK is configured, everyone may write (dev mode).
        let Some(expected) = state.config.api_psk.as_deref() else {
            return Ok(Caller {
                name: ADMIN.to_string(),
                can_write: true,
            });
        };

        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .or_else(|| {
                parts
                    .headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.strip_prefix("Bearer "))
            });

        match provided {
            Some(key) if constant_time_compare(key, expected) => Ok(Caller {
                name: ADMIN.to_string(),
                can_write: true,
            }),
            // An explicitly wrong key is rejected outright, even for reads.
            Some(_) => Err(AppError::Unauthorized("Invalid API key".to_string())),
            None => Ok(Caller {
                name: GUEST.to_string(),
                can_write: false,
            }),
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
