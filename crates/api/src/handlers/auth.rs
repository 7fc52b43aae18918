//! Handlers for the `/auth` resource (signup, login).

use atelier_core::error::CoreError;
use atelier_db::models::profile::{CreateProfile, Profile, ProfileResponse};
use atelier_db::repositories::ProfileRepo;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::token::IssuedToken;
use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/signup`.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters long"))]
    pub password: String,
    #[validate(length(max = 100, message = "display_name must be at most 100 characters"))]
    pub display_name: Option<String>,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful authentication response.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: ProfileResponse,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/signup
///
/// Create a `user` profile and return an access token. Returns 409 if the
/// email is already registered.
pub async fn signup(
    State(state): State<AppState>,
    Json(input): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<AuthResponse>>)> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(first_message(&e))))?;

    let email = input.email.trim().to_lowercase();
    if ProfileRepo::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Core(CoreError::Conflict(
            "Email is already registered".into(),
        )));
    }

    let password_hash = hash_password(&input.password)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    let profile = ProfileRepo::create(
        &state.pool,
        &CreateProfile {
            email,
            display_name: input.display_name.filter(|n| !n.trim().is_empty()),
            password_hash,
        },
    )
    .await?;

    tracing::info!(user_id = profile.id, "Profile created");
    let response = auth_response(&state, &profile)?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: response })))
}

/// POST /api/v1/auth/login
///
/// Authenticate with email + password. Unknown emails and wrong passwords
/// get the same 401 after the same amount of hashing work.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<DataResponse<AuthResponse>>> {
    let invalid = || AppError::Core(CoreError::Unauthorized("Invalid email or password".into()));

    let email = input.email.trim().to_lowercase();
    let profile = ProfileRepo::find_by_email(&state.pool, &email).await?;

    let stored = profile.as_ref().map(|p| p.password_hash.as_str());
    let password_valid = verify_password(&input.password, stored)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let profile = match profile {
        Some(profile) if password_valid => profile,
        other => {
            tracing::info!(user_id = ?other.map(|p| p.id), "Rejected login attempt");
            return Err(invalid());
        }
    };

    let response = auth_response(&state, &profile)?;
    Ok(Json(DataResponse { data: response }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn auth_response(state: &AppState, profile: &Profile) -> AppResult<AuthResponse> {
    let token = state
        .tokens
        .issue(profile.id, &profile.role)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;
    Ok(AuthResponse {
        token,
        user: ProfileResponse::from(profile),
    })
}

/// The first field message of a validation failure, sorted by field name
/// so the reported error is stable.
fn first_message(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"))
            })
        })
        .next()
        .unwrap_or_else(|| "Invalid request".to_string())
}
