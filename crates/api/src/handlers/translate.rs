//! Handler for `POST /translate`.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translated: String,
}

/// POST /api/v1/translate
///
/// Always 200: when the completion endpoint is unavailable the prompt is
/// returned untranslated.
pub async fn translate(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<TranslateRequest>,
) -> AppResult<Json<DataResponse<TranslateResponse>>> {
    let translated = state.translator.translate(&input.prompt).await;
    Ok(Json(DataResponse {
        data: TranslateResponse { translated },
    }))
}
