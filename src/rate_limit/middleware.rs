use super::{Decision, RateLimiter};
use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Count the request against its client and stop it at the ceiling.
///
/// Rejections answer `429` with a fixed body. A failing counter store answers
/// `503`; the request is never admitted unchecked.
pub async fn enforce(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_key(&req);

    match limiter.check(&client).await? {
        Decision::Admit { .. } => Ok(next.run(req).await),
        Decision::Reject => {
            crate::metrics::record_rate_limited(&limiter.strategy().to_string());
            tracing::debug!(client = %client, "Request rejected by rate limiter");
            Err(AppError::TooManyRequests)
        }
    }
}

/// Peer IP of the connection, or "unknown" when the server was not started
/// with connect info.
fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
