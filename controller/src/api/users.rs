use crate::{
    auth::{hash_password, issue_token, verify_password, CurrentUser},
    error::ControllerError,
    state::ControllerState,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use deploy_models::users::{LoginRequest, LoginResponse, RegisterRequest, UserSummary};
use uuid::Uuid;
use validator::Validate;

pub async fn register(
    State(state): State<ControllerState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<UserSummary>, ControllerError> {
    request.validate().map_err(|e| ControllerError::InvalidInput(e.to_string()))?;

    if state.users.username_exists(&request.username).await? {
        return Err(ControllerError::NameConflict(request.username));
    }

    let id = Uuid::new_v4();
    let hash = hash_password(&request.password).map_err(|e| ControllerError::Internal(anyhow::anyhow!(e)))?;
    state.users.insert(id, &request.username, &hash, false).await?;

    Ok(Json(UserSummary { id, username: request.username, is_admin: false }))
}

pub async fn login(
    State(state): State<ControllerState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ControllerError> {
    request.validate().map_err(|e| ControllerError::InvalidInput(e.to_string()))?;

    let user = state
        .users
        .find_by_username(&request.username)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or(ControllerError::Forbidden)?;

    let token = issue_token(&state.config.auth.secret_key, user.id, user.is_admin, state.config.auth.token_ttl)
        .map_err(|e| ControllerError::Internal(anyhow::anyhow!(e)))?;

    Ok(Json(LoginResponse { token }))
}

pub async fn list(
    State(state): State<ControllerState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<UserSummary>>, ControllerError> {
    if !current.is_admin {
        return Err(ControllerError::Forbidden);
    }
    Ok(Json(state.users.list().await?))
}

pub async fn delete(
    State(state): State<ControllerState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<deploy_models::agent::ActionResponse>, ControllerError> {
    if !current.is_admin {
        return Err(ControllerError::Forbidden);
    }
    let target = state.users.get(user_id).await?.ok_or_else(|| ControllerError::NotFound("user".into()))?;
    if target.username == "admin" {
        return Err(ControllerError::Forbidden);
    }
    state.users.delete(user_id).await?;
    Ok(Json(deploy_models::agent::ActionResponse { detail: "user deleted".to_string() }))
}
