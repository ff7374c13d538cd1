use crate::error::AppError;
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Deserialize)]
struct KeyParam {
    api_key: Option<String>,
}

/// Set of accepted API keys shared by every request.
#[derive(Debug, Clone)]
pub struct ApiKeys(Arc<HashSet<String>>);

impl ApiKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(keys.into_iter().map(Into::into).collect()))
    }

    fn accepts(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

/// Authentication middleware
///
/// Reads the key from `X-API-Key`. WebSocket upgrades may pass it as the
/// `api_key` query parameter instead, since browsers cannot set headers on
/// them.
pub async fn auth_middleware(
    State(keys): State<ApiKeys>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = extract_api_key(req.headers(), req.uri())
        .ok_or_else(|| AppError::Unauthorized("Missing API key".to_string()))?;

    if !keys.accepts(&key) {
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(next.run(req).await)
}

fn extract_api_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string()).filter(|v| !v.is_empty());
    }

    if !is_websocket_upgrade(headers) {
        return None;
    }

    // Percent-decoded; a malformed query counts as no key
    let Query(param) = Query::<KeyParam>::try_from_uri(uri).ok()?;
    param.api_key.filter(|v| !v.is_empty())
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}
