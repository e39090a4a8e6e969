//! `X-Broker-Api-Version` gate.

use std::fmt;
use std::str::FromStr;

use axum::{extract::Request, middleware::Next, response::Response, Extension};

use crate::error::AppError;

pub const API_VERSION_HEADER: &str = "x-broker-api-version";

/// `major.minor` protocol version. A trailing patch component is accepted
/// and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const MIN_SUPPORTED: ApiVersion = ApiVersion::new(2, 13);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseApiVersionError(String);

impl fmt::Display for ParseApiVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not an API version: {:?}", self.0)
    }
}

impl std::error::Error for ParseApiVersionError {}

impl FromStr for ApiVersion {
    type Err = ParseApiVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseApiVersionError(s.to_string());
        let mut parts = s.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        match parts.next() {
            None => {}
            Some(patch) if patch.parse::<u32>().is_ok() => {}
            Some(_) => return Err(err()),
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { major, minor })
    }
}

/// Minimum version the gate admits. Installed as a request extension next
/// to the middleware.
#[derive(Debug, Clone, Copy)]
pub struct VersionGate(pub ApiVersion);

/// Reject requests whose declared protocol version is missing, unparsable,
/// or below the configured minimum.
pub async fn require_api_version(
    Extension(VersionGate(minimum)): Extension<VersionGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let declared = request
        .headers()
        .get(API_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<ApiVersion>().ok());

    match declared {
        Some(version) if version >= minimum => Ok(next.run(request).await),
        other => {
            tracing::debug!(declared = ?other, %minimum, "rejecting request by API version");
            Err(AppError::PreconditionFailed(minimum))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_minor_and_patch() {
        assert_eq!("2.13".parse::<ApiVersion>().unwrap(), ApiVersion::new(2, 13));
        assert_eq!("2.16.1".parse::<ApiVersion>().unwrap(), ApiVersion::new(2, 16));
        assert_eq!(" 3.0 ".parse::<ApiVersion>().unwrap(), ApiVersion::new(3, 0));
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "2", "two.13", "2.x", "2.13.x", "2.13.1.4"] {
            assert!(raw.parse::<ApiVersion>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(ApiVersion::new(2, 9) < ApiVersion::new(2, 13));
        assert!(ApiVersion::new(3, 0) > ApiVersion::MIN_SUPPORTED);
        assert_eq!(ApiVersion::MIN_SUPPORTED.to_string(), "2.13");
    }
}
