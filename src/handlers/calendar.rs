use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use chrono::{Duration, Utc};

use crate::error::{AppError, Result};
use crate::services::FeedService;
use crate::AppState;

/// Subscribe to a pet's care calendar
/// GET /calendar/:token
pub async fn get_calendar(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    let share_config = &state.config.share;
    let refresh = i64::try_from(share_config.feed_refresh_interval_mins)
        .ok()
        .filter(|mins| *mins > 0)
        .map(Duration::minutes);

    let feed = FeedService::render_feed(
        state.feeds.as_ref(),
        &token,
        &share_config.public_origin,
        refresh,
        Utc::now(),
    )
    .await?;

    let filename = attachment_filename(&feed.calendar_name);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/calendar; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}.ics\"; filename*=UTF-8''{}.ics",
                filename,
                urlencoding::encode(&feed.calendar_name)
            ),
        )
        .header(
            header::CACHE_CONTROL,
            format!(
                "public, max-age={}, must-revalidate",
                share_config.feed_cache_max_age_secs
            ),
        )
        .body(Body::from(feed.body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// ASCII-only fallback name for the quoted `filename` parameter
fn attachment_filename(calendar_name: &str) -> String {
    let cleaned: String = calendar_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "calendar".to_string()
    } else {
        cleaned.to_string()
    }
}
