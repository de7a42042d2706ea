use axum::Router;
use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::types::AppState;

mod healthz;
mod link_header;
mod webmention;

pub fn build_router(state: AppState, webmention_endpoint: String) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz::healthz))
        .route("/webmention", post(webmention::receive))
        .route("/webmentions", get(webmention::list))
        .layer(middleware::from_fn(move |req, next| {
            let endpoint = webmention_endpoint.clone();
            link_header::advertise_endpoint(endpoint, req, next)
        }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
