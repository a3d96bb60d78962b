use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, MessageResponse, PublicUser, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::UserStore,
        repo_types::User,
        services::{is_valid_email, normalize_email, required},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let Json(payload) = payload?;

    let (Some(name), Some(email), Some(password)) = (
        required(payload.name),
        required(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        warn!("register with missing fields");
        return Err(AppError::Validation(
            "Name, email and password are required".into(),
        ));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    let taken = state.users.exists_by_email(&email).await.map_err(|e| {
        error!(error = %e, "exists_by_email failed");
        AppError::from(e)
    })?;
    if taken {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::from(e)
    })?;

    let user = User {
        name,
        email,
        password_hash,
        created_at: OffsetDateTime::now_utc(),
    };
    let email = user.email.clone();
    state.users.append(user).await.map_err(|e| {
        error!(error = %e, "append user failed");
        AppError::from(e)
    })?;

    info!(email = %email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(payload) = payload?;

    let (Some(email), Some(password)) = (
        required(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        warn!("login with missing fields");
        return Err(AppError::Validation("Email and password are required".into()));
    };
    let email = normalize_email(&email);

    let user = match state.users.find_by_email(&email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(e.into());
        }
    };

    let ok = match verify_password(&password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            // an unreadable stored hash cannot match anything
            error!(error = %e, email = %email, "verify_password failed");
            false
        }
    };
    if !ok {
        warn!(email = %email, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user.email, &user.name).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        AppError::from(e)
    })?;

    info!(email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
        user: PublicUser {
            name: user.name,
            email: user.email,
        },
    }))
}
