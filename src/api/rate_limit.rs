//! Rate gate middleware for the API
//!
//! Classifies each request by method and path and asks the [`RateGate`] to
//! admit it before routing.

use crate::rate_gate::{OperationClass, RateGate};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};

/// Header consulted for the client address behind a proxy
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Rate limiting middleware function
pub async fn rate_limit_middleware(
    State(gate): State<Arc<RateGate>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let class = OperationClass::classify(req.method(), req.uri().path());
    let forwarded_for = req
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let client = gate.client_ip(addr.ip(), forwarded_for);

    match gate.check(client, class).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}
