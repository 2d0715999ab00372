//! Pulling the request logger out of a request.
//!
//! The middleware stores the request's logger in the request extensions.
//! Handlers take it as an extractor; outside the middleware they get the
//! fallback logger instead of an error.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Extensions;

use super::RequestLogger;

impl RequestLogger {
    /// The logger stored in `extensions`, or the fallback logger.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        extensions
            .get::<RequestLogger>()
            .cloned()
            .unwrap_or_else(RequestLogger::fallback)
    }
}

impl<S> FromRequestParts<S> for RequestLogger
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestLogger::from_extensions(&parts.extensions))
    }
}
