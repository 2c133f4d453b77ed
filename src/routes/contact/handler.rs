use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{CreateContactRequest, EmergencyContact, UpdateContactRequest};

#[axum::debug_handler]
pub async fn add_contact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateContactRequest>,
) -> impl IntoResponse {
    if req.contact_name.is_empty() || req.contact_phone.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "Contact name and phone are required".to_string(),
            ),
        );
    }

    match EmergencyContact::create(&state.pool, &claims.sub, req).await {
        Ok(contact) => (StatusCode::CREATED, success_to_api_response(contact)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match EmergencyContact::find_for_user(&state.pool, &claims.sub).await {
        Ok(contacts) => (StatusCode::OK, success_to_api_response(contacts)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn update_contact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contact_id): Path<String>,
    Json(req): Json<UpdateContactRequest>,
) -> impl IntoResponse {
    match EmergencyContact::update(&state.pool, &contact_id, &claims.sub, req).await {
        Ok(contact) => (StatusCode::OK, success_to_api_response(contact)),
        Err(sqlx::Error::RowNotFound) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Contact not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn delete_contact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contact_id): Path<String>,
) -> impl IntoResponse {
    match EmergencyContact::delete(&state.pool, &contact_id, &claims.sub).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({ "deleted": true })),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Contact not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}
