//! UI session endpoints: page rendering and the admin login dialog.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::site::gate::UiSession;
use crate::site::Page;
use crate::AppState;

/// A freshly opened UI session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub page: Page,
}

/// Request body for typing into the passcode field.
#[derive(Debug, Deserialize)]
pub struct PasscodeRequest {
    #[serde(default)]
    pub passcode: String,
}

fn unknown_session(id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {} not found", id))
}

/// Apply `f` to the session and render the resulting page.
async fn update_and_render(
    state: &AppState,
    id: Uuid,
    f: impl FnOnce(&mut UiSession),
) -> ApiResult<Page> {
    let ((), session) = state
        .sessions
        .update(id, f)
        .await
        .ok_or_else(|| unknown_session(id))?;
    success(state.site.render(&session).await)
}

/// POST /api/sessions - Open a UI session.
pub async fn create_session(State(state): State<AppState>) -> ApiResult<SessionCreated> {
    let (session_id, session) = state.sessions.create().await;
    let page = state.site.render(&session).await;
    success(SessionCreated { session_id, page })
}

/// GET /api/sessions/:id - Render the current page.
pub async fn get_page(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Page> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| unknown_session(id))?;
    success(state.site.render(&session).await)
}

/// DELETE /api/sessions/:id - Discard a UI session.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    if !state.sessions.remove(id).await {
        return Err(unknown_session(id));
    }
    success(())
}

/// POST /api/sessions/:id/login/open - Show the login dialog.
pub async fn open_login(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Page> {
    update_and_render(&state, id, |s| s.open_login()).await
}

/// POST /api/sessions/:id/login/close - Hide the login dialog.
pub async fn close_login(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Page> {
    update_and_render(&state, id, |s| s.close_login()).await
}

/// PUT /api/sessions/:id/passcode - Set the passcode buffer.
pub async fn set_passcode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PasscodeRequest>,
) -> ApiResult<Page> {
    update_and_render(&state, id, move |s| s.set_passcode(request.passcode)).await
}

/// POST /api/sessions/:id/login - Check the passcode buffer.
pub async fn login(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Page> {
    let expected = state.site.admin_passcode().to_string();
    let (entered, session) = state
        .sessions
        .update(id, |s| s.attempt_login(&expected))
        .await
        .ok_or_else(|| unknown_session(id))?;

    if !entered {
        tracing::info!(session = %id, "Admin passcode mismatch");
        return Err(AppError::Unauthorized("Incorrect Passcode".to_string()));
    }

    tracing::info!(session = %id, "Admin view entered");
    success(state.site.render(&session).await)
}

/// POST /api/sessions/:id/logout - Leave the admin view.
pub async fn logout(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Page> {
    update_and_render(&state, id, |s| s.exit_admin()).await
}
