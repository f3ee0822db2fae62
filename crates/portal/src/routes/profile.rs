//! Agent profile and profile image.

use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::middleware::RequireAgent;
use crate::models::{Agent, AgentStats};
use crate::services::{OrderService, ProfileError, ProfileInput, ProfileService};
use crate::state::AppState;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub agent: Agent,
    pub stats: AgentStats,
}

/// # Route
///
/// `GET /api/delivery/profile`
pub async fn show(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
) -> Result<Json<ProfileResponse>> {
    let stats = OrderService::new(state.store())
        .stats(current.agent.id)
        .await?;

    Ok(Json(ProfileResponse {
        agent: current.agent,
        stats,
    }))
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub message: &'static str,
    pub agent: Agent,
}

/// # Route
///
/// `PUT /api/delivery/profile`
pub async fn update(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
    Json(input): Json<ProfileInput>,
) -> Result<Json<UpdateResponse>> {
    let agent = ProfileService::new(state.store(), state.storage())
        .update(&current.agent, &input)
        .await?;

    Ok(Json(UpdateResponse {
        success: true,
        message: "Profile updated successfully",
        agent,
    }))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub message: &'static str,
}

/// # Route
///
/// `POST /api/delivery/profile/upload`
pub async fn upload(
    State(state): State<AppState>,
    RequireAgent(current): RequireAgent,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        file = Some((content_type, bytes.to_vec()));
        break;
    }

    let (content_type, body) =
        file.ok_or_else(|| ProfileError::Validation("No file provided".to_owned()))?;

    let agent = ProfileService::new(state.store(), state.storage())
        .upload_image(&current.agent, &current.identity.id, &content_type, body)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        url: agent.profile_image_url.unwrap_or_default(),
        message: "Profile image uploaded successfully",
    }))
}
