//! HTTP layer for the HAL business directory.
//!
//! Exposes an axum [`Router`] backed by any [`DirectoryStore`]. Every request
//! goes through one dispatcher: the path is normalised and matched against
//! the [`RouteTable`], the caller is resolved from its bearer token, the
//! route's [`AuthRequirement`](policy::AuthRequirement) is enforced, and only
//! then does the endpoint's handler run.

pub mod audit;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod principal;
pub mod routes;
pub mod token;

pub use error::ApiError;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
  Router,
  body::Body,
  extract::{ConnectInfo, Request, State},
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use hal_core::store::DirectoryStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::RequestContext;
use routes::RouteTable;
use token::{InvalidSecret, TokenCodec};

const MAX_BODY_BYTES: usize = 1024 * 1024;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and `HAL_*`
/// environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                      String,
  pub port:                      u16,
  pub store_path:                PathBuf,
  /// Prefix stripped from every request path before routing.
  #[serde(default = "default_base_path")]
  pub base_path:                 String,
  /// HMAC key for bearer tokens.
  pub token_secret:              String,
  /// When `false`, new reviews are published without moderation.
  #[serde(default = "default_true")]
  pub require_review_moderation: bool,
  /// Take the client address from `X-Forwarded-For`. Only enable behind a
  /// reverse proxy that overwrites the header.
  #[serde(default)]
  pub trust_proxy:               bool,
}

fn default_base_path() -> String { "/api".to_owned() }

fn default_true() -> bool { true }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the dispatcher. Read-only after startup.
#[derive(Clone)]
pub struct AppState<S: DirectoryStore> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
  pub codec:  Arc<TokenCodec>,
  pub routes: Arc<RouteTable>,
}

impl<S: DirectoryStore> AppState<S> {
  /// State with the standard route table and a codec keyed by
  /// `config.token_secret`.
  pub fn new(store: S, config: ServerConfig) -> Result<Self, InvalidSecret> {
    let codec = TokenCodec::new(config.token_secret.as_bytes())?;
    Ok(Self {
      store:  Arc::new(store),
      config: Arc::new(config),
      codec:  Arc::new(codec),
      routes: Arc::new(RouteTable::standard()),
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the directory API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: DirectoryStore + Clone + 'static,
{
  Router::new()
    .fallback(dispatch::<S>)
    .with_state(state)
    .layer(TraceLayer::new_for_http())
}

async fn dispatch<S>(State(state): State<AppState<S>>, req: Request<Body>) -> Response
where
  S: DirectoryStore + Clone + 'static,
{
  let path = routes::normalize(req.uri().path(), &state.config.base_path);
  let Some(found) = state.routes.find(req.method(), path) else {
    return ApiError::route_not_found().into_response();
  };

  let principal =
    principal::resolve(&*state.store, &state.codec, req.headers(), Utc::now()).await;
  if let Err(denial) = policy::authorize(principal.as_ref(), found.requirement) {
    return ApiError::from(denial).into_response();
  }

  let ip = client_ip(&req, state.config.trust_proxy);
  let uri = req.uri().clone();
  let body = match collect_body(req).await {
    Ok(b) => b,
    Err(e) => return e.into_response(),
  };

  let ctx = RequestContext { principal, params: found.params, uri, ip, body };
  match handlers::handle(&state, found.endpoint, ctx).await {
    Ok(r) => r,
    Err(e) => e.into_response(),
  }
}

// ─── Dispatch helpers ────────────────────────────────────────────────────────

async fn collect_body(req: Request<Body>) -> Result<Bytes, ApiError> {
  axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
    .await
    .map_err(|_| ApiError::PayloadTooLarge)
}

/// The first `X-Forwarded-For` hop when the proxy is trusted, else the peer
/// address from connect info.
fn client_ip(req: &Request<Body>, trust_proxy: bool) -> Option<String> {
  if trust_proxy && let Some(forwarded) = forwarded_for(req) {
    return Some(forwarded);
  }
  req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn forwarded_for(req: &Request<Body>) -> Option<String> {
  req
    .headers()
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

// ─── Integration tests ────────────────────────────────────────────────────────
