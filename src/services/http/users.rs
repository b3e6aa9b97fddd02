use axum::{extract::State, http::HeaderMap, Json};

use super::{AppState, HttpError};
use crate::models::{boxes::OpenBoxOutcome, users::UserRecord};
use crate::services::users::UserRequest;

pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserRecord>, HttpError> {
    let identity = state.authenticate(&headers)?;

    let user = state
        .ask_user_service(|response| UserRequest::ResolveOrCreate {
            identity: identity.user,
            response,
        })
        .await?;

    Ok(Json(user))
}

pub async fn open_box(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OpenBoxOutcome>, HttpError> {
    let identity = state.authenticate(&headers)?;
    let user_id = identity.user.id;

    let outcome = state
        .ask_user_service(|response| UserRequest::OpenBox { user_id, response })
        .await?;

    Ok(Json(outcome))
}
