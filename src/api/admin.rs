//! Admin view endpoints: inquiry list and content editor.

use axum::{extract::State, Json};

use super::{success, ApiResponse, ApiResult};
use crate::models::{Inquiry, SiteConfig, SiteConfigUpdate};
use crate::AppState;

/// GET /api/admin/inquiries - All inquiries, most recent first.
pub async fn list_inquiries(State(state): State<AppState>) -> ApiResult<Vec<Inquiry>> {
    success(state.site.inquiries_newest_first().await)
}

/// GET /api/admin/config - The site config as currently synced.
pub async fn get_site_config(State(state): State<AppState>) -> ApiResult<SiteConfig> {
    success(state.site.site_config().await)
}

/// PUT /api/admin/config - Update a subset of the editable fields.
pub async fn update_site_config(
    State(state): State<AppState>,
    Json(update): Json<SiteConfigUpdate>,
) -> ApiResult<SiteConfigUpdate> {
    state.site.update_site_config(&update).await?;
    Ok(ApiResponse::new(update).with_message("Website updated successfully!"))
}
