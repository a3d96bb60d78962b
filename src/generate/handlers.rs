use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{GenerateRequest, GenerateResponse},
    normalize::normalize,
    prompt,
};
use crate::{
    auth::jwt::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

#[instrument(skip_all, fields(email = %user.sub))]
pub async fn generate(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<GenerateResponse>> {
    let Json(payload) = payload?;
    let user_prompt = payload.prompt.trim();
    if user_prompt.is_empty() {
        warn!("empty prompt");
        return Err(AppError::Validation("No prompt provided".into()));
    }

    let raw = state
        .completion
        .complete(&prompt::compose(user_prompt))
        .await
        .map_err(|e| {
            error!(error = %e, "completion failed");
            AppError::Internal(e.to_string())
        })?;

    let code = normalize(&raw);
    let result = serde_json::to_string(&code).map_err(|e| AppError::Internal(e.to_string()))?;

    info!(html_len = code.html.len(), css_len = code.css.len(), "page generated");
    Ok(Json(GenerateResponse { result }))
}
