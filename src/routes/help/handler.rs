use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState, geocode,
    geo::GeoPoint,
    lifecycle::HelpStatus,
    matching,
    notify::Category,
    routes::user::User,
    routes::volunteer::Volunteer,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{CreateHelpRequestRequest, HELP_CATEGORIES, HELP_URGENCY_LEVELS, HelpRequest};

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct NearbyHelpQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
}

/// 创建求助：落库后向附近匹配的志愿者扇出通知
#[axum::debug_handler]
pub async fn create_help_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateHelpRequestRequest>,
) -> impl IntoResponse {
    if !HELP_CATEGORIES.contains(&req.category.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                format!("Unknown help category: {}", req.category),
            ),
        );
    }
    if let Some(u) = &req.urgency {
        if !HELP_URGENCY_LEVELS.contains(&u.as_str()) {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!("Unknown urgency level: {}", u),
                ),
            );
        }
    }
    let center = match GeoPoint::new(req.latitude, req.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };

    // 求助者必须存在，任何写入之前先确认
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

    let address = geocode::address_for(&state.config, center).await;

    let request = match HelpRequest::create(&state.pool, &claims.sub, &req, &address).await {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("Failed to create help request: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    // 扇出给能接这单的志愿者：技能求交、各自出行半径内
    match Volunteer::pool_near(&state.pool, center, state.config.max_search_radius_km).await {
        Ok(rows) => {
            let candidates: Vec<_> = rows.iter().map(|r| r.as_candidate()).collect();
            let matched = matching::match_volunteers(
                center,
                req.required_skills.as_deref(),
                &candidates,
            );
            let recipients: Vec<_> = rows
                .iter()
                .filter(|r| matched.iter().any(|m| m.user_id == r.user_id))
                .filter(|r| r.user_id != claims.sub)
                .map(|r| r.as_recipient())
                .collect();
            let delivered = state
                .notifier
                .fan_out(
                    &recipients,
                    Category::HelpRequest,
                    "New Help Request",
                    &format!("A new help request near you: {}", request.title),
                    Some(&request.request_id),
                )
                .await;
            tracing::info!(
                "Help request {} fanned out to {} matching volunteers",
                request.request_id,
                delivered
            );
        }
        Err(e) => tracing::error!("Volunteer pool lookup failed: {}", e),
    }

    (StatusCode::CREATED, success_to_api_response(request))
}

/// 志愿者认领求助，先到先得
#[axum::debug_handler]
pub async fn assign_help_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AssignRequest>,
) -> impl IntoResponse {
    // 认领者必须是已审核通过的志愿者
    let volunteer = match Volunteer::find_by_user(&state.pool, &claims.sub).await {
        Ok(Some(v)) => v,
        Ok(None) => {
            return (
                StatusCode::FORBIDDEN,
                error_to_api_response(
                    error_codes::PERMISSION_DENIED,
                    "User is not registered as a volunteer".to_string(),
                ),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };
    if volunteer.verification_status != "VERIFIED" {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(
                error_codes::PERMISSION_DENIED,
                "Volunteer is not verified".to_string(),
            ),
        );
    }

    match HelpRequest::assign(&state.pool, &req.request_id, &volunteer.volunteer_id).await {
        Ok(Some(request)) => {
            // 通知求助者已有志愿者接单
            if let Ok(Some(requester)) = User::find_by_id(&state.pool, &request.requester_id).await
            {
                let _ = state
                    .notifier
                    .send(
                        &requester.as_recipient(),
                        Category::HelpRequest,
                        "Volunteer Assigned",
                        &format!("A volunteer has been assigned to: {}", request.title),
                        Some(&request.request_id),
                    )
                    .await
                    .map_err(|e| tracing::error!("Failed to notify requester: {}", e));
            }
            (StatusCode::OK, success_to_api_response(request))
        }
        // 没有可认领的行：区分不存在与已被认领
        Ok(None) => match HelpRequest::find_by_id(&state.pool, &req.request_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Help request is {}, cannot assign", existing.status),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "Help request not found".to_string(),
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

/// 状态流转，完成时给接单志愿者累计任务数
#[axum::debug_handler]
pub async fn update_help_request_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> impl IntoResponse {
    let target: HelpStatus = match req.status.parse() {
        Ok(s) => s,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Unknown help request status: {}", req.status),
                ),
            );
        }
    };

    let current = match HelpRequest::find_by_id(&state.pool, &request_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "Help request not found".to_string(),
                ),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    let allowed = current
        .parsed_status()
        .map(|from| from.can_transition(target))
        .unwrap_or(false);
    if !allowed {
        return (
            StatusCode::CONFLICT,
            error_to_api_response(
                error_codes::INVALID_STATE,
                format!("Cannot move help request from {} to {}", current.status, target),
            ),
        );
    }

    match HelpRequest::set_status(&state.pool, &request_id, target).await {
        Ok(Some(request)) => {
            if target == HelpStatus::Completed {
                if let Some(volunteer_id) = &request.assigned_volunteer_id {
                    if let Err(e) =
                        Volunteer::increment_completed_tasks(&state.pool, volunteer_id).await
                    {
                        tracing::error!("Failed to credit volunteer {}: {}", volunteer_id, e);
                    }
                }
            }
            (StatusCode::OK, success_to_api_response(request))
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Help request not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_open_help_requests(State(state): State<AppState>) -> impl IntoResponse {
    match HelpRequest::find_open(&state.pool).await {
        Ok(requests) => (StatusCode::OK, success_to_api_response(requests)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_nearby_help_requests(
    State(state): State<AppState>,
    Query(query): Query<NearbyHelpQuery>,
) -> impl IntoResponse {
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

    match HelpRequest::find_open_within_radius(&state.pool, center, radius).await {
        Ok(requests) => (StatusCode::OK, success_to_api_response(requests)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_my_help_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match HelpRequest::find_by_requester(&state.pool, &claims.sub).await {
        Ok(requests) => (StatusCode::OK, success_to_api_response(requests)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 当前用户作为志愿者接下的求助单
#[axum::debug_handler]
pub async fn get_my_assignments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let volunteer = match Volunteer::find_by_user(&state.pool, &claims.sub).await {
        Ok(Some(v)) => v,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "User is not registered as a volunteer".to_string(),
                ),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    match HelpRequest::find_by_volunteer(&state.pool, &volunteer.volunteer_id).await {
        Ok(requests) => (StatusCode::OK, success_to_api_response(requests)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}
