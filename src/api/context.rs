use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT_LANGUAGE, request::Parts, HeaderMap, StatusCode},
};
use serde_json::Value;

use crate::model::RequestContext;
use crate::seed::USER_ID;

/// Axum extractor for the per-request engine context.
///
/// - Accept-Language: negotiated against the supported languages
/// - X-User-Id: stored under `user_id` for preset and precheck filters
///
/// Numeric user ids are stored as numbers so they compare with integer keys.
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(context_from_headers(&parts.headers))
    }
}

pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let mut ctx = RequestContext::new();
    if let Some(language) = extract_header_value(headers, ACCEPT_LANGUAGE.as_str()) {
        ctx = ctx.with_language(&language);
    }
    if let Some(user_id) = extract_header_value(headers, "x-user-id") {
        let value = user_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(user_id));
        ctx = ctx.with_values(USER_ID, vec![value]);
    }
    ctx
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContextValue;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_context_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pl, en;q=0.4"));
        headers.insert(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static("42"),
        );

        let ctx = context_from_headers(&headers);
        assert_eq!(ctx.accept_language.as_deref(), Some("pl, en;q=0.4"));
        assert_eq!(
            ctx.get(USER_ID),
            Some(&ContextValue::Values(vec![Value::from(42)]))
        );
    }

    #[test]
    fn test_anonymous_context() {
        let ctx = context_from_headers(&HeaderMap::new());
        assert!(ctx.accept_language.is_none());
        assert!(ctx.get(USER_ID).is_none());
    }
}
