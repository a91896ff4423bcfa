use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderName, request::Parts},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::AppError::{self, MalformedPayload};

pub const USER_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Signed in user id, set by the auth layer in front of us. `None` when absent or blank.
pub struct MaybeUser(pub Option<String>);

impl MaybeUser {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn require(&self) -> Result<&str, AppError> {
        self.as_deref().ok_or(AppError::Unauthorized)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(MaybeUser(user))
    }
}

/// Splits `data:<mime>;base64,<payload>` into its mime type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), AppError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| MalformedPayload("expected a data URI".into()))?;

    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| MalformedPayload("data URI has no payload".into()))?;

    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| MalformedPayload("data URI must be base64 encoded".into()))?;

    if !mime.starts_with("image/") {
        return Err(MalformedPayload(format!("{mime} is not an image")));
    }

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| MalformedPayload(format!("bad base64: {e}")))?;

    Ok((mime.to_string(), bytes))
}

/// Negative limits mean nothing to show.
pub fn clamp_limit(limit: Option<i64>, default: usize) -> usize {
    match limit {
        None => default,
        Some(n) if n <= 0 => 0,
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
    }
}
