//! Request correlation ids.
//!
//! Every request carries an `x-request-id`. An id forwarded by the proxy is
//! reused when it is short printable ASCII; anything else is replaced with a
//! fresh UUID v4. The id is recorded on the `http_request` span, tagged on
//! the Sentry scope, stored as a [`RequestId`] request extension and echoed
//! in the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream id accepted as-is.
const MAX_UPSTREAM_LEN: usize = 128;

/// Correlation id of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuse `upstream` when it is usable, otherwise generate an id.
    fn from_upstream(upstream: Option<&HeaderValue>) -> Self {
        let reusable = upstream
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| {
                !id.is_empty()
                    && id.len() <= MAX_UPSTREAM_LEN
                    && id.bytes().all(|b| b.is_ascii_graphic())
            });

        Self(reusable.map_or_else(|| Uuid::new_v4().to_string(), str::to_owned))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attach a [`RequestId`] to the request, its span and its response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_upstream(request.headers().get(REQUEST_ID_HEADER));

    Span::current().record("request_id", request_id.0.as_str());
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id.0);
    });

    let header = HeaderValue::from_str(&request_id.0).ok();
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_upstream_id() {
        let header = HeaderValue::from_static("cf-8a1b2c3d");
        assert_eq!(RequestId::from_upstream(Some(&header)).0, "cf-8a1b2c3d");
    }

    #[test]
    fn test_replaces_unusable_ids() {
        let long = "x".repeat(MAX_UPSTREAM_LEN + 1);
        for raw in ["", "   ", "has space", long.as_str()] {
            let header = HeaderValue::from_str(raw).unwrap();
            let id = RequestId::from_upstream(Some(&header));
            assert!(Uuid::parse_str(&id.0).is_ok(), "{raw:?} was reused");
        }

        let generated = RequestId::from_upstream(None);
        assert!(Uuid::parse_str(&generated.0).is_ok());
    }
}
