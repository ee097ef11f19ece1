//! Shared-secret access guard.
//!
//! Every request must present `X-API-Key` matching the secret configured at
//! startup. The check runs as router middleware so it happens before any body
//! or query parsing.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{error::ApiError, routes::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AccessGuard {
    expected: [u8; 32],
}

impl AccessGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            expected: digest(secret),
        }
    }

    pub fn permits(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(value) => bool::from(self.expected[..].ct_eq(&digest(value)[..])),
            None => false,
        }
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard").finish_non_exhaustive()
    }
}

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !state.guard.permits(presented) {
        warn!(
            "Rejected {} {}: missing or invalid API key",
            request.method(),
            request.uri().path()
        );
        return ApiError::unauthorized().into_response();
    }

    next.run(request).await
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_secret() {
        let guard = AccessGuard::new("s3cret");
        assert!(guard.permits(Some("s3cret")));
    }

    #[test]
    fn rejects_missing_or_wrong_secret() {
        let guard = AccessGuard::new("s3cret");
        assert!(!guard.permits(None));
        assert!(!guard.permits(Some("")));
        assert!(!guard.permits(Some("s3cre")));
        assert!(!guard.permits(Some("S3CRET")));
    }

    #[test]
    fn secrets_differing_only_in_whitespace_are_distinct() {
        let guard = AccessGuard::new(" s3cret");
        assert!(guard.permits(Some(" s3cret")));
        assert!(!guard.permits(Some("s3cret")));
    }
}
