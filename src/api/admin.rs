//! Administrative endpoints

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use crate::api::entities::request_identity;
use crate::error::RequestError;
use crate::AppState;

/// Reload the runtime configuration and swap the serving snapshot.
///
/// Requires an authenticated caller. A failed rebuild keeps the previous
/// snapshot serving and reports the build error.
async fn reload(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match request_identity(&headers, &state.config.jwt_secret) {
        Ok((_, user)) => user,
        Err(err) => return err.into_response(),
    };
    if !user.is_authenticated() {
        return RequestError::Unauthenticated.into_response();
    }

    match state.gateway.reload().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "reloaded": true }))).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": {
                    "code": "ReloadFailed",
                    "message": err.to_string(),
                }
            })),
        )
            .into_response(),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/reload", post(reload))
}
