//! Builds the [`CallerContext`] every handler passes to the orchestrator.
//!
//! `X-Broker-API-Originating-Identity: <platform> <base64(json)>` is decoded
//! here; a malformed value fails the request with 400.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use broker_core::details::{CallerContext, OriginatingIdentity};

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;

pub const ORIGINATING_IDENTITY_HEADER: &str = "x-broker-api-originating-identity";

pub async fn caller_context(mut request: Request, next: Next) -> Result<Response, AppError> {
    let originating_identity = originating_identity(request.headers())?;
    let authorization_username = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.clone());
    request.extensions_mut().insert(CallerContext {
        originating_identity,
        authorization_username,
    });
    Ok(next.run(request).await)
}

fn originating_identity(headers: &HeaderMap) -> Result<Option<OriginatingIdentity>, AppError> {
    let Some(raw) = headers.get(ORIGINATING_IDENTITY_HEADER) else {
        return Ok(None);
    };
    let malformed =
        |why: &str| AppError::BadRequest(format!("malformed originating identity: {why}"));

    let raw = raw.to_str().map_err(|_| malformed("not ASCII"))?;
    let (platform, encoded) = raw
        .trim()
        .split_once(' ')
        .ok_or_else(|| malformed("expected `<platform> <value>`"))?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| malformed("value is not base64"))?;
    let value: serde_json::Value =
        serde_json::from_slice(&decoded).map_err(|_| malformed("value is not JSON"))?;

    Ok(Some(OriginatingIdentity {
        platform: platform.to_string(),
        value,
    }))
}
