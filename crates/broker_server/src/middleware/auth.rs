//! HTTP basic authentication against a configured allow-list.
//!
//! The authenticated username is stored as an [`AuthenticatedUser`] request
//! extension for the identity middleware to pick up.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::AppError;

#[derive(Clone, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: String,
}

impl BrokerCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Accepted credential pairs, shared by every request.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    accepted: Arc<Vec<BrokerCredentials>>,
}

impl BasicAuth {
    pub fn new(accepted: Vec<BrokerCredentials>) -> Self {
        Self {
            accepted: Arc::new(accepted),
        }
    }

    /// Username of the matching pair, if the header carries one.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        let presented = decode_basic(headers)?;
        self.accepted
            .iter()
            .any(|c| *c == presented)
            .then_some(presented.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

pub async fn basic_auth(
    Extension(auth): Extension<BasicAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(username) = auth.authenticate(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "rejecting unauthenticated request");
        return Err(AppError::Unauthorized);
    };
    request.extensions_mut().insert(AuthenticatedUser(username));
    Ok(next.run(request).await)
}

fn decode_basic(headers: &HeaderMap) -> Option<BrokerCredentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(BrokerCredentials::new(username, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode(format!("{user}:{pass}"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    fn auth() -> BasicAuth {
        BasicAuth::new(vec![
            BrokerCredentials::new("cf", "secret"),
            BrokerCredentials::new("k8s", "other"),
        ])
    }

    #[test]
    fn any_listed_pair_is_accepted() {
        assert_eq!(auth().authenticate(&headers("cf", "secret")), Some("cf".into()));
        assert_eq!(auth().authenticate(&headers("k8s", "other")), Some("k8s".into()));
    }

    #[test]
    fn wrong_password_or_missing_header_is_rejected() {
        assert_eq!(auth().authenticate(&headers("cf", "other")), None);
        assert_eq!(auth().authenticate(&HeaderMap::new()), None);
    }

    #[test]
    fn other_schemes_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(auth().authenticate(&headers), None);
    }

    #[test]
    fn debug_hides_password() {
        let rendered = format!("{:?}", BrokerCredentials::new("cf", "secret"));
        assert!(!rendered.contains("secret"));
    }
}
