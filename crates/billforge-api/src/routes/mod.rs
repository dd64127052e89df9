pub mod subscriptions;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

async fn health_check() -> &'static str {
    "OK"
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check)).merge(subscriptions::router())
}
