use std::sync::Arc;

use {
    axum::{
        extract::FromRequestParts,
        http::{HeaderMap, StatusCode, header, request::Parts},
        response::{IntoResponse, Json, Response},
    },
    relay_auth::{Namespace, credentials::redact},
    relay_protocol::{ApiResponse, TaskError},
    tracing::warn,
};

use crate::state::GatewayState;

/// Axum extractor for an API caller whose bearer key is registered in the
/// credential store. Rejects with 401 before the request reaches the bus.
///
/// Only registration is checked here; whether the key's role may run the
/// requested task is decided by the worker.
#[derive(Debug, Clone)]
pub struct ApiCaller(pub String);

/// 401 response with the standard error body.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(ApiResponse::error(
                TaskError::AuthenticationFailure.to_string(),
            )),
        )
            .into_response()
    }
}

impl FromRequestParts<Arc<GatewayState>> for ApiCaller {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(key) = extract_bearer(&parts.headers) else {
            warn!(path = %parts.uri.path(), "missing bearer credential");
            return Err(AuthRejection);
        };

        if !state
            .access
            .credentials()
            .is_registered(Namespace::Api, key)
        {
            warn!(key = %redact(key), "unregistered api key");
            return Err(AuthRejection);
        }

        Ok(Self(key.to_string()))
    }
}

/// Token from an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
