use axum::extract::State;
use axum::{Json, http::StatusCode};
use serde_json::{Value, json};

use super::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let authorities: Vec<String> = state
        .lifecycle
        .registry()
        .authorities()
        .into_iter()
        .map(|authority| authority.provider.to_string())
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "expediente-firma",
            "version": env!("CARGO_PKG_VERSION"),
            "providers": authorities
        })),
    )
}
