use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    geo::GeoPoint,
    utils::{
        Claims, error_codes, error_to_api_response, generate_token, success_to_api_response,
        verify_password,
    },
};

use super::model::{LoginRequest, LoginResponse, RegisterRequest, UpdateLocationRequest, User};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if req.username.is_empty() || !req.username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "Username may only contain letters, digits and underscores".to_string(),
            ),
        );
    }

    match User::create(&state.pool, req).await {
        Ok(user) => match generate_token(&user.user_id, &state.config) {
            Ok((token, _)) => (
                StatusCode::CREATED,
                success_to_api_response(LoginResponse {
                    user_id: user.user_id,
                    token,
                }),
            ),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(
                    error_codes::INTERNAL_ERROR,
                    "Failed to issue token".to_string(),
                ),
            ),
        },
        Err(e) => {
            if e.to_string().contains("unique constraint")
                || e.to_string().contains("duplicate key")
            {
                (
                    StatusCode::CONFLICT,
                    error_to_api_response(
                        error_codes::USER_EXISTS,
                        "Username or email already registered".to_string(),
                    ),
                )
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_to_api_response(
                        error_codes::INTERNAL_ERROR,
                        "Failed to create user".to_string(),
                    ),
                )
            }
        }
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = match User::find_by_username(&state.pool, &req.username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "User not found".to_string()),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    let valid = user
        .password_hash
        .as_deref()
        .map(|hash| verify_password(&req.password, hash).unwrap_or(false))
        .unwrap_or(false);

    if !valid || !user.is_active {
        return (
            StatusCode::UNAUTHORIZED,
            error_to_api_response(error_codes::AUTH_FAILED, "Invalid credentials".to_string()),
        );
    }

    match generate_token(&user.user_id, &state.config) {
        Ok((token, _)) => (
            StatusCode::OK,
            success_to_api_response(LoginResponse {
                user_id: user.user_id,
                token,
            }),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(
                error_codes::INTERNAL_ERROR,
                "Failed to issue token".to_string(),
            ),
        ),
    }
}

#[axum::debug_handler]
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateLocationRequest>,
) -> impl IntoResponse {
    let point = match GeoPoint::new(req.latitude, req.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };

    match User::update_location(&state.pool, &claims.sub, point).await {
        Ok(user) => (StatusCode::OK, success_to_api_response(user)),
        Err(sqlx::Error::RowNotFound) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "User not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(user)) => (StatusCode::OK, success_to_api_response(user)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "User not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}
