//! Public inquiry endpoint.

use axum::{extract::State, Json};

use super::{ApiResponse, ApiResult};
use crate::models::{Inquiry, InquiryForm};
use crate::AppState;

/// POST /api/inquiries - Submit an enrollment inquiry.
pub async fn submit_inquiry(
    State(state): State<AppState>,
    Json(form): Json<InquiryForm>,
) -> ApiResult<Inquiry> {
    let inquiry = state.site.submit_inquiry(&form).await?;
    Ok(ApiResponse::new(inquiry).with_message("Inquiry submitted successfully!"))
}
