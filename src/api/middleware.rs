//! API Middleware
//!
//! Request context and logging middleware.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Build the per-request `OperationContext` and store it in the request
/// extensions. The correlation ID comes from the X-Correlation-Id header
/// when the caller supplies a valid UUID, otherwise one is generated here;
/// either way the response echoes it back.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let mut context = OperationContext::new();
    if let Some(id) = header_correlation_id(request.headers()) {
        context = context.with_correlation_id(id);
    }
    if let Some(ip) = extract_client_ip(request.headers()) {
        context = context.with_client_ip(ip);
    }
    let correlation_id = context.ensure_correlation_id();

    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;

    if let Ok(value) = correlation_id.to_string().parse() {
        response.headers_mut().insert("X-Correlation-Id", value);
    }

    response
}

fn header_correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// First address in X-Forwarded-For, if parseable.
fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

// =========================================================================
// Request/response logging
// =========================================================================

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_correlation_id_valid() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("X-Correlation-Id", id.to_string().parse().unwrap());
        assert_eq!(header_correlation_id(&headers), Some(id));
    }

    #[test]
    fn test_header_correlation_id_garbage_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Correlation-Id", "not-a-uuid".parse().unwrap());
        // The context generates a fresh UUID instead of failing the request.
        assert_eq!(header_correlation_id(&headers), None);
    }

    #[test]
    fn test_extract_client_ip_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "10.0.0.7, 172.16.0.1".parse().unwrap());
        assert_eq!(
            extract_client_ip(&headers),
            Some("10.0.0.7".parse().unwrap())
        );
    }

    #[test]
    fn test_extract_client_ip_absent() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);
    }
}
