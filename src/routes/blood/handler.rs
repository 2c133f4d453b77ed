use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState,
    geo::GeoPoint,
    matching::{self, BloodType},
    notify::Category,
    routes::user::User,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    BloodRequest, CONTACT_PREFERENCES, CreateBloodRequestRequest, Donor, EmergencyDonorQuery,
    RegisterDonorRequest, URGENCY_LEVELS, UpdateRequestStatusRequest,
};

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

#[axum::debug_handler]
pub async fn register_donor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterDonorRequest>,
) -> impl IntoResponse {
    if req.blood_type.parse::<BloodType>().is_err() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                format!("Unknown blood type: {}", req.blood_type),
            ),
        );
    }
    if let Some(pref) = &req.contact_preference {
        if !CONTACT_PREFERENCES.contains(&pref.as_str()) {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!("Unknown contact preference: {}", pref),
                ),
            );
        }
    }

    // 属主必须存在，任何写入之前先确认
    match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(_)) => {}
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
    }

    // 一个用户只能有一份献血者档案
    match Donor::find_by_user(&state.pool, &claims.sub).await {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::ALREADY_REGISTERED,
                    "User is already registered as a blood donor".to_string(),
                ),
            );
        }
        Ok(None) => {}
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    }

    match Donor::register(&state.pool, &claims.sub, &req).await {
        Ok(donor) => (StatusCode::CREATED, success_to_api_response(donor)),
        Err(e) => {
            tracing::error!("Failed to register blood donor: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn update_donor_availability(
    State(state): State<AppState>,
    Path(donor_id): Path<String>,
    Json(req): Json<AvailabilityRequest>,
) -> impl IntoResponse {
    match Donor::update_availability(&state.pool, &donor_id, req.is_available).await {
        Ok(Some(donor)) => (StatusCode::OK, success_to_api_response(donor)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Donor not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_my_donor_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match Donor::find_by_user(&state.pool, &claims.sub).await {
        Ok(Some(donor)) => (StatusCode::OK, success_to_api_response(donor)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(
                error_codes::NOT_FOUND,
                "User is not registered as a blood donor".to_string(),
            ),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 指定血型当前可用的献血者（匹配策略过滤后）
#[axum::debug_handler]
pub async fn get_available_donors(
    State(state): State<AppState>,
    Path(blood_type): Path<String>,
) -> impl IntoResponse {
    let parsed: BloodType = match blood_type.parse() {
        Ok(bt) => bt,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!("Unknown blood type: {}", blood_type),
                ),
            );
        }
    };

    match Donor::pool_by_blood_type(&state.pool, &blood_type).await {
        Ok(rows) => {
            let candidates: Vec<_> = rows.iter().filter_map(|r| r.as_candidate()).collect();
            let matched = matching::match_donors(parsed, &candidates);
            (StatusCode::OK, success_to_api_response(matched))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 某位置附近的紧急献血者，按距离升序
#[axum::debug_handler]
pub async fn get_emergency_donors_near(
    State(state): State<AppState>,
    Query(query): Query<EmergencyDonorQuery>,
) -> impl IntoResponse {
    let parsed: BloodType = match query.blood_type.parse() {
        Ok(bt) => bt,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!("Unknown blood type: {}", query.blood_type),
                ),
            );
        }
    };
    let center = match GeoPoint::new(query.latitude, query.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };
    let radius = query
        .radius_km
        .unwrap_or(state.config.max_search_radius_km)
        .min(state.config.max_search_radius_km);

    match Donor::emergency_pool_near(&state.pool, &query.blood_type, center, radius).await {
        Ok(rows) => {
            let candidates: Vec<_> = rows.iter().filter_map(|r| r.as_candidate()).collect();
            let matched = matching::match_emergency_donors(parsed, center, radius, &candidates);
            (StatusCode::OK, success_to_api_response(matched))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 创建血液求助：落库后向匹配的献血者扇出通知
#[axum::debug_handler]
pub async fn create_blood_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBloodRequestRequest>,
) -> impl IntoResponse {
    let parsed_type: BloodType = match req.blood_type.parse() {
        Ok(bt) => bt,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!("Unknown blood type: {}", req.blood_type),
                ),
            );
        }
    };
    if !URGENCY_LEVELS.contains(&req.urgency.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                format!("Unknown urgency level: {}", req.urgency),
            ),
        );
    }
    if req.units_needed <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "units_needed must be positive".to_string(),
            ),
        );
    }

    // 请求方必须存在，任何写入之前先确认
    match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(_)) => {}
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
    }

    let request = match BloodRequest::create(&state.pool, &claims.sub, &req).await {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("Failed to create blood request: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    // 匹配扇出：通知所有可用的同血型献血者，CRITICAL 级加急标题
    match Donor::pool_by_blood_type(&state.pool, &req.blood_type).await {
        Ok(rows) => {
            let candidates: Vec<_> = rows.iter().filter_map(|r| r.as_candidate()).collect();
            let matched = matching::match_donors(parsed_type, &candidates);
            let recipients: Vec<_> = rows
                .iter()
                .filter(|r| matched.iter().any(|m| m.user_id == r.user_id))
                .map(|r| r.as_recipient())
                .collect();

            let title = if request.urgency == "CRITICAL" {
                "URGENT: Blood Donation Request"
            } else {
                "Blood Donation Request"
            };
            let body = format!(
                "Your blood type {} is needed at {}",
                request.blood_type, request.hospital_name
            );
            let delivered = state
                .notifier
                .fan_out(
                    &recipients,
                    Category::BloodRequest,
                    title,
                    &body,
                    Some(&request.request_id),
                )
                .await;
            tracing::info!(
                "Blood request {} fanned out to {} matching donors",
                request.request_id,
                delivered
            );
        }
        Err(e) => tracing::error!("Donor pool lookup failed: {}", e),
    }

    (StatusCode::CREATED, success_to_api_response(request))
}

#[axum::debug_handler]
pub async fn update_blood_request_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(req): Json<UpdateRequestStatusRequest>,
) -> impl IntoResponse {
    let status = match &req.status {
        Some(s) => match s.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    error_to_api_response(
                        error_codes::INVALID_STATE,
                        format!("Unknown request status: {}", s),
                    ),
                );
            }
        },
        None => None,
    };

    if let Some(units) = req.fulfilled_units {
        if units < 0 {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    "fulfilled_units cannot be negative".to_string(),
                ),
            );
        }
    }

    match BloodRequest::update_status(&state.pool, &request_id, status, req.fulfilled_units).await {
        Ok(Some(request)) => (StatusCode::OK, success_to_api_response(request)),
        // 没有可更新的行：区分不存在与已关闭
        Ok(None) => match BloodRequest::find_by_id(&state.pool, &request_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Blood request is {}, cannot update", existing.status),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "Blood request not found".to_string(),
                ),
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_active_blood_requests(State(state): State<AppState>) -> impl IntoResponse {
    match BloodRequest::find_active(&state.pool).await {
        Ok(requests) => (StatusCode::OK, success_to_api_response(requests)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_critical_blood_requests(State(state): State<AppState>) -> impl IntoResponse {
    match BloodRequest::find_critical(&state.pool).await {
        Ok(requests) => (StatusCode::OK, success_to_api_response(requests)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}
