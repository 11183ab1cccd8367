//! Small request-level middleware.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags every request with an id, honoring one supplied by the client, and
/// echoes it on the response for log correlation.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    let request_id = req
        .headers()
        .get(&header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(header.clone(), value.clone());
        let mut response = next.run(req).await;
        response.headers_mut().insert(header, value);
        response
    } else {
        next.run(req).await
    }
}
